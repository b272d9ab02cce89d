//! Permission-aware formsets for generically related inline rows.
//!
//! Rows shown to a non-superuser are limited to categories on which they hold
//! view or change. After per-row validation a second pass checks what the
//! submission would do: creating rows needs change on the parent and add on
//! the chosen category, deleting needs delete on the model and on the row's
//! category, moving a row to another category needs change on both. Models
//! without a category field only get the model-level checks.

use std::collections::HashMap;

use anyhow::bail;
use diesel::prelude::*;
use log::debug;
use serde::Serialize;

use super::options::{InlineAdmin, InlineModel};
use crate::auth::RequestContext;
use crate::content_types::GenericRef;
use crate::forms::{FieldError, Form, FormData, FormField, FormView};
use crate::models::ContentType;
use crate::permissions::{permission_name, Action};

pub const TOTAL_FORM_COUNT: &str = "TOTAL_FORMS";
pub const INITIAL_FORM_COUNT: &str = "INITIAL_FORMS";
pub const DELETION_FIELD_NAME: &str = "DELETE";
pub const MAX_FORM_COUNT: usize = 1000;

pub const MANAGEMENT_FORM_ERROR: &str = "ManagementForm data is missing or has been tampered with.";
pub const CREATE_NOT_PERMITTED: &str = "Creating objects is not permitted.";
pub const DELETE_NOT_PERMITTED: &str = "Object deletion is not permitted.";
pub const CHANGE_NOT_PERMITTED: &str = "Object change is not permitted.";
pub const CATEGORY_NOT_PERMITTED: &str = "Category not permitted";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub created: usize,
    pub changed: usize,
    pub deleted: usize,
}

#[derive(Debug, Serialize)]
pub struct InlineFormView {
    pub prefix: String,
    pub id: Option<i32>,
    pub deleted: bool,
    pub form: FormView,
}

#[derive(Debug, Serialize)]
pub struct FormsetView {
    pub prefix: String,
    pub verbose_name: &'static str,
    pub total_forms: usize,
    pub initial_forms: usize,
    pub max_num: Option<usize>,
    pub can_delete: bool,
    pub forms: Vec<InlineFormView>,
    pub non_form_errors: Vec<String>,
}

pub struct GenericInlineFormSet<M: InlineModel> {
    prefix: String,
    parent: GenericRef,
    parent_change_perm: String,
    can_delete: bool,
    max_num: Option<usize>,
    /// Rows backing the initial forms, in form order.
    objects: Vec<M>,
    forms: Vec<Form>,
    deleted: Vec<bool>,
    non_form_errors: Vec<String>,
    bound: bool,
}

fn parse_count(data: &FormData, key: &str) -> Option<usize> {
    data.get(key).and_then(|v| v.trim().parse().ok())
}

fn is_checked(value: Option<&str>) -> bool {
    matches!(value.map(|v| v.to_lowercase()).as_deref(), Some("on") | Some("true") | Some("1"))
}

impl<M: InlineModel> GenericInlineFormSet<M> {
    pub fn default_prefix() -> String {
        format!("{}-{}-content_type-object_id", M::APP_LABEL, M::MODEL)
    }

    /// Rows related to `parent` that `ctx` may see.
    pub fn queryset(
        conn: &mut SqliteConnection,
        ctx: &RequestContext,
        parent: GenericRef,
    ) -> QueryResult<Vec<M>> {
        let rows = M::for_parent(conn, parent)?;
        if ctx.permissions.is_superuser() || M::CATEGORY_FIELD.is_none() {
            return Ok(rows);
        }
        let perms = [M::permission(Action::View), M::permission(Action::Change)];
        Ok(ctx.permissions.filter_by_category(rows, &perms, |row| row.category_id()))
    }

    pub fn new(
        conn: &mut SqliteConnection,
        ctx: &RequestContext,
        admin: &InlineAdmin<M>,
        parent_ct: &ContentType,
        object_id: i32,
        fields: Vec<FormField>,
        data: Option<FormData>,
    ) -> QueryResult<Self> {
        let parent = GenericRef::new(parent_ct.id, object_id);
        let visible = Self::queryset(conn, ctx, parent)?;

        let mut formset = Self {
            prefix: Self::default_prefix(),
            parent,
            parent_change_perm: permission_name(Action::Change, &parent_ct.app_label, &parent_ct.model),
            can_delete: admin.can_delete,
            max_num: admin.max_num,
            objects: vec![],
            forms: vec![],
            deleted: vec![],
            non_form_errors: vec![],
            bound: data.is_some(),
        };

        match data {
            None => formset.construct_unbound(visible, &fields, admin.extra),
            Some(data) => formset.construct_bound(visible, &fields, data),
        }
        if formset.bound {
            formset.full_clean(ctx);
        }
        Ok(formset)
    }

    fn form_prefix(&self, i: usize) -> String {
        format!("{}-{}", self.prefix, i)
    }

    fn key(&self, name: &str) -> String {
        format!("{}-{}", self.prefix, name)
    }

    fn construct_unbound(&mut self, visible: Vec<M>, fields: &[FormField], extra: usize) {
        let extra = match self.max_num {
            Some(max) => extra.min(max.saturating_sub(visible.len())),
            None => extra,
        };
        for (i, obj) in visible.iter().enumerate() {
            let form = Form::new(fields.to_vec())
                .with_prefix(self.form_prefix(i))
                .with_initial(obj.initial());
            self.forms.push(form);
            self.deleted.push(false);
        }
        for i in visible.len()..visible.len() + extra {
            let form = Form::new(fields.to_vec())
                .with_prefix(self.form_prefix(i))
                .with_empty_permitted(true);
            self.forms.push(form);
            self.deleted.push(false);
        }
        self.objects = visible;
    }

    fn construct_bound(&mut self, visible: Vec<M>, fields: &[FormField], data: FormData) {
        let total = parse_count(&data, &self.key(TOTAL_FORM_COUNT));
        let initial = parse_count(&data, &self.key(INITIAL_FORM_COUNT));
        let (total, initial) = match (total, initial) {
            (Some(total), Some(initial)) if initial <= total => (total, initial),
            _ => {
                self.non_form_errors.push(MANAGEMENT_FORM_ERROR.into());
                return;
            }
        };
        let cap = self.max_num.map_or(MAX_FORM_COUNT, |max| max.max(initial)).min(MAX_FORM_COUNT);
        let total = total.min(cap);
        let initial = initial.min(total);

        let mut by_id: HashMap<i32, M> = visible.into_iter().map(|o| (o.id(), o)).collect();
        for i in 0..total {
            let prefix = self.form_prefix(i);
            if i < initial {
                // only rows this user can see may be edited or deleted
                let obj = data
                    .get(&format!("{}-id", prefix))
                    .and_then(|id| id.trim().parse::<i32>().ok())
                    .and_then(|id| by_id.remove(&id));
                let obj = match obj {
                    Some(obj) => obj,
                    None => {
                        debug!("inline form {} submitted an unknown id", prefix);
                        self.non_form_errors.push(FieldError::InvalidChoice.to_string());
                        continue;
                    }
                };
                let deleted = self.can_delete
                    && is_checked(data.get(&format!("{}-{}", prefix, DELETION_FIELD_NAME)));
                let form = Form::new(fields.to_vec())
                    .with_prefix(prefix)
                    .with_initial(obj.initial())
                    .bind(data.clone());
                self.objects.push(obj);
                self.forms.push(form);
                self.deleted.push(deleted);
            } else {
                let form = Form::new(fields.to_vec())
                    .with_prefix(prefix)
                    .with_empty_permitted(true)
                    .bind(data.clone());
                self.forms.push(form);
                self.deleted.push(false);
            }
        }
    }

    pub fn initial_form_count(&self) -> usize {
        self.objects.len()
    }

    pub fn total_form_count(&self) -> usize {
        self.forms.len()
    }

    pub fn forms(&self) -> &[Form] {
        &self.forms
    }

    pub fn objects(&self) -> &[M] {
        &self.objects
    }

    pub fn non_form_errors(&self) -> &[String] {
        &self.non_form_errors
    }

    fn full_clean(&mut self, ctx: &RequestContext) {
        let cfield = M::CATEGORY_FIELD;
        let perms = &ctx.permissions;
        let add_perm = M::permission(Action::Add);
        let change_perm = M::permission(Action::Change);
        let delete_perm = M::permission(Action::Delete);
        let initial = self.initial_form_count();
        // without a category field every changed row is checked
        let needs_check = |form: &Form| {
            form.has_changed()
                && cfield.map_or(true, |cfield| form.changed_data().iter().any(|f| f == cfield))
        };

        for form in self.forms.iter_mut().skip(initial) {
            if !needs_check(form) {
                continue;
            }
            let may_create = perms.has_object_permission(&self.parent_change_perm)
                && (cfield.is_some() || perms.has_object_permission(&add_perm));
            if !may_create {
                self.non_form_errors.push(CREATE_NOT_PERMITTED.into());
                continue;
            }
            if let Some(cfield) = cfield {
                if let Some(category) = form.cleaned_data().integer(cfield) {
                    if !perms.has_category_permission(category, &add_perm) {
                        form.set_field_error(cfield, CATEGORY_NOT_PERMITTED);
                    }
                }
            }
        }

        for (i, form) in self.forms.iter_mut().enumerate().take(initial) {
            let obj = &self.objects[i];
            if self.deleted[i] {
                let in_category = match cfield {
                    Some(_) => obj
                        .category_id()
                        .map_or(false, |c| perms.has_category_permission(c, &delete_perm)),
                    None => true,
                };
                if !(perms.has_object_permission(&delete_perm) && in_category) {
                    self.non_form_errors.push(DELETE_NOT_PERMITTED.into());
                }
                continue;
            }
            if !needs_check(form) {
                continue;
            }
            if !perms.has_object_permission(&change_perm) {
                self.non_form_errors.push(CHANGE_NOT_PERMITTED.into());
                continue;
            }
            if let Some(cfield) = cfield {
                if let Some(category) = form.cleaned_data().integer(cfield) {
                    if !perms.has_category_permission(category, &change_perm) {
                        form.set_field_error(cfield, CATEGORY_NOT_PERMITTED);
                    }
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.bound
            && self.non_form_errors.is_empty()
            && self
                .forms
                .iter()
                .zip(&self.deleted)
                .all(|(form, deleted)| *deleted || form.is_valid())
    }

    pub fn save(&self, conn: &mut SqliteConnection) -> Result<SaveSummary, anyhow::Error> {
        if !self.is_valid() {
            bail!("cannot save an invalid formset");
        }
        let mut summary = SaveSummary::default();
        for (i, form) in self.forms.iter().enumerate() {
            match self.objects.get(i) {
                Some(obj) if self.deleted[i] => {
                    obj.delete(conn)?;
                    summary.deleted += 1;
                }
                Some(obj) => {
                    if form.has_changed() {
                        obj.update(conn, form.cleaned_data(), form.changed_data())?;
                        summary.changed += 1;
                    }
                }
                None => {
                    if form.has_changed() {
                        M::insert(conn, self.parent, form.cleaned_data())?;
                        summary.created += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    pub fn view(&self) -> FormsetView {
        let forms = self
            .forms
            .iter()
            .enumerate()
            .map(|(i, form)| InlineFormView {
                prefix: form.prefix().unwrap_or_default().to_string(),
                id: self.objects.get(i).map(|o| o.id()),
                deleted: self.deleted[i],
                form: form.view(),
            })
            .collect();
        FormsetView {
            prefix: self.prefix.clone(),
            verbose_name: M::VERBOSE_NAME,
            total_forms: self.total_form_count(),
            initial_forms: self.initial_form_count(),
            max_num: self.max_num,
            can_delete: self.can_delete,
            forms,
            non_form_errors: self.non_form_errors.clone(),
        }
    }
}

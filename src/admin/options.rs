use std::collections::HashMap;
use std::marker::PhantomData;

use diesel::prelude::*;

use super::fields::CategoryChoiceField;
use super::generic::GenericInlineFormSet;
use crate::auth::RequestContext;
use crate::content_types::GenericRef;
use crate::forms::{Choice, CleanedData, FieldKind, FieldSpec, FormData, FormField};
use crate::models::{Category, ContentType};
use crate::permissions::{permission_name, Action};

/// A model edited inline below a parent it addresses through `(content_type, object_id)`.
pub trait InlineModel: Sized {
    const APP_LABEL: &'static str;
    const MODEL: &'static str;
    const VERBOSE_NAME: &'static str;
    const FIELDS: &'static [FieldSpec];
    /// Name of the `core_category` field, if rows are category scoped.
    const CATEGORY_FIELD: Option<&'static str>;

    fn id(&self) -> i32;

    fn category_id(&self) -> Option<i32>;

    /// Current values keyed by field name, formatted the way forms submit them.
    fn initial(&self) -> HashMap<String, String>;

    fn for_parent(conn: &mut SqliteConnection, parent: GenericRef) -> QueryResult<Vec<Self>>;

    fn insert(
        conn: &mut SqliteConnection,
        parent: GenericRef,
        data: &CleanedData,
    ) -> Result<(), anyhow::Error>;

    fn update(
        &self,
        conn: &mut SqliteConnection,
        data: &CleanedData,
        changed: &[String],
    ) -> Result<(), anyhow::Error>;

    fn delete(&self, conn: &mut SqliteConnection) -> QueryResult<()>;

    /// Options for `FieldKind::Choice` fields.
    fn choices(_conn: &mut SqliteConnection, _field: &str) -> QueryResult<Vec<Choice>> {
        Ok(vec![])
    }

    fn permission(action: Action) -> String {
        permission_name(action, Self::APP_LABEL, Self::MODEL)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InlineTemplate {
    Stacked,
    Tabular,
}

impl InlineTemplate {
    pub fn path(&self) -> &'static str {
        match self {
            InlineTemplate::Stacked => "admin/edit_inline/stacked.html",
            InlineTemplate::Tabular => "admin/edit_inline/tabular.html",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Fieldset {
    pub name: Option<&'static str>,
    pub fields: &'static [&'static str],
}

pub fn flatten_fieldsets(fieldsets: &[Fieldset]) -> Vec<&'static str> {
    fieldsets.iter().flat_map(|f| f.fields.iter().copied()).collect()
}

/// Builds generic inline formsets for `M`. Deletion is always offered, ordering never.
#[derive(Clone, Debug)]
pub struct InlineAdmin<M> {
    pub fieldsets: Option<Vec<Fieldset>>,
    pub extra: usize,
    pub max_num: Option<usize>,
    pub can_delete: bool,
    pub template: InlineTemplate,
    model: PhantomData<M>,
}

impl<M: InlineModel> InlineAdmin<M> {
    pub fn new(template: InlineTemplate) -> Self {
        Self {
            fieldsets: None,
            extra: 3,
            max_num: None,
            can_delete: true,
            template,
            model: PhantomData,
        }
    }

    pub fn stacked() -> Self {
        Self::new(InlineTemplate::Stacked)
    }

    pub fn tabular() -> Self {
        Self::new(InlineTemplate::Tabular)
    }

    pub fn with_fieldsets(mut self, fieldsets: Vec<Fieldset>) -> Self {
        self.fieldsets = Some(fieldsets);
        self
    }

    pub fn with_extra(mut self, extra: usize) -> Self {
        self.extra = extra;
        self
    }

    pub fn with_max_num(mut self, max_num: usize) -> Self {
        self.max_num = Some(max_num);
        self
    }

    /// Declared fields, in fieldset order when fieldsets are given.
    pub fn fields(&self) -> Vec<&'static FieldSpec> {
        match &self.fieldsets {
            Some(fieldsets) => flatten_fieldsets(fieldsets)
                .into_iter()
                .filter_map(|name| M::FIELDS.iter().find(|f| f.name == name))
                .collect(),
            None => M::FIELDS.iter().collect(),
        }
    }

    pub fn formfield_for_dbfield(
        &self,
        conn: &mut SqliteConnection,
        ctx: &RequestContext,
        spec: &FieldSpec,
        categories: &mut Option<CategoryChoiceField>,
    ) -> QueryResult<FormField> {
        match spec.kind {
            FieldKind::Category => {
                if categories.is_none() {
                    *categories = Some(CategoryChoiceField::new(Category::all(conn)?));
                }
                let mut field = FormField::from(spec);
                if let Some(categories) = categories {
                    categories.restrict(
                        &ctx.permissions,
                        &[M::permission(Action::View), M::permission(Action::Change)],
                    );
                    field.choices = categories.choices();
                }
                Ok(field)
            }
            FieldKind::Choice => {
                let mut field = FormField::from(spec);
                field.choices = M::choices(conn, spec.name)?;
                Ok(field)
            }
            _ => Ok(FormField::from(spec)),
        }
    }

    pub fn form_fields(
        &self,
        conn: &mut SqliteConnection,
        ctx: &RequestContext,
    ) -> QueryResult<Vec<FormField>> {
        let mut categories = None;
        self.fields()
            .into_iter()
            .map(|spec| self.formfield_for_dbfield(conn, ctx, spec, &mut categories))
            .collect()
    }

    pub fn formset(
        &self,
        conn: &mut SqliteConnection,
        ctx: &RequestContext,
        parent: &ContentType,
        object_id: i32,
        data: Option<FormData>,
    ) -> QueryResult<GenericInlineFormSet<M>> {
        let fields = self.form_fields(conn, ctx)?;
        GenericInlineFormSet::new(conn, ctx, self, parent, object_id, fields, data)
    }
}

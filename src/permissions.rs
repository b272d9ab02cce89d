//! Model-level and category-scoped permissions.
//!
//! Permission names follow the `app_label.action_model` convention, e.g.
//! `core.change_placement`. Category grants come from the denormalized role
//! table, which already lists every category a role reaches (including
//! descendants of the category the role was assigned on).

use std::collections::{HashMap, HashSet};

use diesel::prelude::*;

use crate::models::User;
use crate::schema::{auth_user_permission, newman_denormalizedcategoryuserrole};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Add => "add",
            Action::Change => "change",
            Action::Delete => "delete",
        }
    }
}

pub fn permission_name(action: Action, app_label: &str, model: &str) -> String {
    format!("{}.{}_{}", app_label, action.as_str(), model)
}

/// Everything the acting user may do, loaded once per request.
#[derive(Clone, Debug, Default)]
pub struct UserPermissions {
    superuser: bool,
    model_perms: HashSet<String>,
    category_perms: HashMap<String, HashSet<i32>>,
}

impl UserPermissions {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn superuser() -> Self {
        Self {
            superuser: true,
            ..Self::default()
        }
    }

    pub fn load(conn: &mut SqliteConnection, user: &User) -> QueryResult<Self> {
        if !user.is_active {
            return Ok(Self::anonymous());
        }
        if user.is_superuser {
            return Ok(Self::superuser());
        }

        let model_perms: Vec<String> = auth_user_permission::table
            .filter(auth_user_permission::user_id.eq(user.id))
            .select(auth_user_permission::permission)
            .load(conn)?;

        let roles: Vec<(String, i32)> = newman_denormalizedcategoryuserrole::table
            .filter(newman_denormalizedcategoryuserrole::user_id.eq(user.id))
            .select((
                newman_denormalizedcategoryuserrole::permission_codename,
                newman_denormalizedcategoryuserrole::category_id,
            ))
            .load(conn)?;

        let mut perms = Self {
            superuser: false,
            model_perms: model_perms.into_iter().collect(),
            category_perms: HashMap::new(),
        };
        for (codename, category_id) in roles {
            perms.grant_category(&codename, category_id);
        }
        Ok(perms)
    }

    pub fn grant(&mut self, permission: &str) {
        self.model_perms.insert(permission.to_string());
    }

    pub fn grant_category(&mut self, permission: &str, category_id: i32) {
        self.category_perms
            .entry(permission.to_string())
            .or_default()
            .insert(category_id);
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser
    }

    pub fn has_object_permission(&self, permission: &str) -> bool {
        self.superuser || self.model_perms.contains(permission)
    }

    pub fn has_category_permission(&self, category_id: i32, permission: &str) -> bool {
        self.superuser
            || self
                .category_perms
                .get(permission)
                .map_or(false, |categories| categories.contains(&category_id))
    }

    /// Categories on which any of `permissions` is held. `None` means every category.
    pub fn permitted_categories(&self, permissions: &[String]) -> Option<HashSet<i32>> {
        if self.superuser {
            return None;
        }
        Some(
            permissions
                .iter()
                .filter_map(|p| self.category_perms.get(p))
                .flatten()
                .copied()
                .collect(),
        )
    }

    /// Keeps the items whose category carries any of `permissions`.
    pub fn filter_by_category<T, F>(&self, items: Vec<T>, permissions: &[String], category: F) -> Vec<T>
    where
        F: Fn(&T) -> Option<i32>,
    {
        match self.permitted_categories(permissions) {
            None => items,
            Some(allowed) => items
                .into_iter()
                .filter(|item| category(item).map_or(false, |c| allowed.contains(&c)))
                .collect(),
        }
    }
}

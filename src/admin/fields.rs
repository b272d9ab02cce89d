use crate::forms::Choice;
use crate::models::Category;
use crate::permissions::UserPermissions;

/// Category dropdown limited to the categories the acting user may work in.
#[derive(Clone, Debug)]
pub struct CategoryChoiceField {
    categories: Vec<Category>,
    filtered: bool,
}

impl CategoryChoiceField {
    pub fn new(categories: Vec<Category>) -> Self {
        Self {
            categories,
            filtered: false,
        }
    }

    /// Keeps categories carrying any of `permissions`. Only the first call filters.
    pub fn restrict(&mut self, user_perms: &UserPermissions, permissions: &[String]) {
        if self.filtered {
            return;
        }
        let categories = std::mem::take(&mut self.categories);
        self.categories = user_perms.filter_by_category(categories, permissions, |c| Some(c.id));
        self.filtered = true;
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn choices(&self) -> Vec<Choice> {
        self.categories
            .iter()
            .map(|c| Choice::new(c.id, c.title.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::CategoryChoiceField;
    use crate::models::Category;
    use crate::permissions::UserPermissions;

    fn category(id: i32, slug: &str) -> Category {
        Category {
            id,
            title: slug.to_uppercase(),
            slug: slug.into(),
            tree_parent_id: None,
            tree_path: slug.into(),
        }
    }

    #[test]
    fn it_restricts_only_once() {
        let perms_needed = vec!["core.view_placement".to_string()];
        let mut field = CategoryChoiceField::new(vec![category(1, "news"), category(2, "sport")]);

        let mut perms = UserPermissions::anonymous();
        perms.grant_category("core.view_placement", 2);
        field.restrict(&perms, &perms_needed);
        assert!(field.is_filtered());
        let values: Vec<String> = field.choices().into_iter().map(|c| c.value).collect();
        assert_eq!(values, vec!["2"]);

        // a second pass with wider grants must not widen or re-filter the list
        field.restrict(&UserPermissions::superuser(), &perms_needed);
        field.restrict(&UserPermissions::anonymous(), &perms_needed);
        assert_eq!(field.choices().len(), 1);
    }

    #[test]
    fn superusers_see_every_category() {
        let mut field = CategoryChoiceField::new(vec![category(1, "news"), category(2, "sport")]);
        field.restrict(&UserPermissions::superuser(), &["core.view_placement".into()]);
        assert_eq!(field.choices()[0].label, "NEWS");
        assert_eq!(field.choices().len(), 2);
    }
}

mod fields;
mod generic;
mod inlines;
mod options;

pub use fields::CategoryChoiceField;
pub use generic::*;
pub use inlines::{placement_admin, tag_admin};
pub use options::{flatten_fieldsets, Fieldset, InlineAdmin, InlineModel, InlineTemplate};

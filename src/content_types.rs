use diesel::prelude::*;
use serde::Serialize;

use crate::models::{ContentType, Interview, Publishable};
use crate::schema::core_publishable;

/// A polymorphic reference: a content-type tag plus the id of a row of that type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct GenericRef {
    pub content_type_id: i32,
    pub object_id: i32,
}

impl GenericRef {
    pub fn new(content_type_id: i32, object_id: i32) -> Self {
        Self {
            content_type_id,
            object_id,
        }
    }
}

/// What a [`GenericRef`] points at once resolved.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GenericTarget {
    Publishable(Publishable),
    Interview(Interview),
}

impl GenericTarget {
    pub fn title(&self) -> &str {
        match self {
            GenericTarget::Publishable(p) => &p.title,
            GenericTarget::Interview(i) => &i.title,
        }
    }

    pub fn category_id(&self) -> i32 {
        match self {
            GenericTarget::Publishable(p) => p.category_id,
            GenericTarget::Interview(i) => i.category_id,
        }
    }
}

/// Resolves `(content_type, object_id)` to the row it addresses. `Ok(None)` for unknown types and dangling ids.
pub fn resolve(
    conn: &mut SqliteConnection,
    content_type: &ContentType,
    object_id: i32,
) -> QueryResult<Option<GenericTarget>> {
    match (content_type.app_label.as_str(), content_type.model.as_str()) {
        ("interviews", "interview") => Interview::get(conn, object_id)
            .optional()
            .map(|i| i.map(GenericTarget::Interview)),
        ("core", "publishable") => core_publishable::table
            .find(object_id)
            .select(Publishable::as_select())
            .first(conn)
            .optional()
            .map(|p| p.map(GenericTarget::Publishable)),
        // publishable subtypes keep their own content type on the base row
        _ => core_publishable::table
            .find(object_id)
            .filter(core_publishable::content_type_id.eq(content_type.id))
            .select(Publishable::as_select())
            .first(conn)
            .optional()
            .map(|p| p.map(GenericTarget::Publishable)),
    }
}

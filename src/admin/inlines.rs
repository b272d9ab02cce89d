use std::collections::HashMap;

use anyhow::anyhow;
use diesel::prelude::*;

use super::options::{Fieldset, InlineAdmin, InlineModel};
use crate::content_types::GenericRef;
use crate::forms::{Choice, CleanedData, FieldKind, FieldSpec};
use crate::models::{
    format_db_datetime, NewPlacement, NewTaggedItem, Placement, PlacementChanges, TaggedItem,
    TaggedItemChanges,
};
use crate::schema::{core_placement, tagging_tag, tagging_taggeditem};

const PLACEMENT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "category",
        label: "Category",
        kind: FieldKind::Category,
        required: true,
    },
    FieldSpec {
        name: "publish_from",
        label: "Publish from",
        kind: FieldKind::DateTime,
        required: true,
    },
    FieldSpec {
        name: "publish_to",
        label: "Publish to",
        kind: FieldKind::DateTime,
        required: false,
    },
    FieldSpec {
        name: "slug",
        label: "Slug",
        kind: FieldKind::Text { max_length: 255 },
        required: false,
    },
    FieldSpec {
        name: "static",
        label: "Static",
        kind: FieldKind::Boolean,
        required: false,
    },
];

const TAGGED_ITEM_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "tag",
        label: "Tag",
        kind: FieldKind::Choice,
        required: true,
    },
    FieldSpec {
        name: "priority",
        label: "Priority",
        kind: FieldKind::Integer,
        required: false,
    },
];

fn datetime_field(data: &CleanedData, name: &str) -> Option<String> {
    data.datetime(name).map(|dt| format_db_datetime(&dt))
}

impl PlacementChanges {
    fn is_empty(&self) -> bool {
        self.category_id.is_none()
            && self.slug.is_none()
            && self.publish_from.is_none()
            && self.publish_to.is_none()
            && self.static_.is_none()
    }
}

impl InlineModel for Placement {
    const APP_LABEL: &'static str = "core";
    const MODEL: &'static str = "placement";
    const VERBOSE_NAME: &'static str = "Placements";
    const FIELDS: &'static [FieldSpec] = PLACEMENT_FIELDS;
    const CATEGORY_FIELD: Option<&'static str> = Some("category");

    fn id(&self) -> i32 {
        self.id
    }

    fn category_id(&self) -> Option<i32> {
        Some(self.category_id)
    }

    fn initial(&self) -> HashMap<String, String> {
        let mut initial = HashMap::new();
        initial.insert("category".into(), self.category_id.to_string());
        initial.insert("publish_from".into(), self.publish_from.clone());
        initial.insert("publish_to".into(), self.publish_to.clone().unwrap_or_default());
        initial.insert("slug".into(), self.slug.clone());
        initial.insert("static".into(), if self.static_ { "on" } else { "" }.into());
        initial
    }

    fn for_parent(conn: &mut SqliteConnection, parent: GenericRef) -> QueryResult<Vec<Self>> {
        core_placement::table
            .filter(core_placement::target_ct_id.eq(parent.content_type_id))
            .filter(core_placement::target_id.eq(parent.object_id))
            .order(core_placement::id.asc())
            .select(Placement::as_select())
            .load(conn)
    }

    fn insert(
        conn: &mut SqliteConnection,
        parent: GenericRef,
        data: &CleanedData,
    ) -> Result<(), anyhow::Error> {
        let category_id = data
            .integer("category")
            .ok_or_else(|| anyhow!("placement without a category"))?;
        let publish_from = datetime_field(data, "publish_from")
            .ok_or_else(|| anyhow!("placement without publish_from"))?;
        let publish_to = datetime_field(data, "publish_to");
        diesel::insert_into(core_placement::table)
            .values(NewPlacement {
                target_ct_id: parent.content_type_id,
                target_id: parent.object_id,
                category_id,
                slug: data.text("slug").unwrap_or(""),
                publish_from: &publish_from,
                publish_to: publish_to.as_deref(),
                static_: data.boolean("static").unwrap_or(false),
            })
            .execute(conn)?;
        Ok(())
    }

    fn update(
        &self,
        conn: &mut SqliteConnection,
        data: &CleanedData,
        changed: &[String],
    ) -> Result<(), anyhow::Error> {
        let mut changes = PlacementChanges::default();
        for field in changed {
            match field.as_str() {
                "category" => changes.category_id = data.integer("category"),
                "slug" => changes.slug = Some(data.text("slug").unwrap_or("").to_string()),
                "publish_from" => changes.publish_from = datetime_field(data, "publish_from"),
                "publish_to" => changes.publish_to = Some(datetime_field(data, "publish_to")),
                "static" => changes.static_ = data.boolean("static"),
                _ => {}
            }
        }
        if changes.is_empty() {
            return Ok(());
        }
        diesel::update(core_placement::table.find(self.id))
            .set(&changes)
            .execute(conn)?;
        Ok(())
    }

    fn delete(&self, conn: &mut SqliteConnection) -> QueryResult<()> {
        diesel::delete(core_placement::table.find(self.id)).execute(conn)?;
        Ok(())
    }
}

impl InlineModel for TaggedItem {
    const APP_LABEL: &'static str = "tagging";
    const MODEL: &'static str = "taggeditem";
    const VERBOSE_NAME: &'static str = "Tags";
    const FIELDS: &'static [FieldSpec] = TAGGED_ITEM_FIELDS;
    const CATEGORY_FIELD: Option<&'static str> = None;

    fn id(&self) -> i32 {
        self.id
    }

    fn category_id(&self) -> Option<i32> {
        None
    }

    fn initial(&self) -> HashMap<String, String> {
        let mut initial = HashMap::new();
        initial.insert("tag".into(), self.tag_id.to_string());
        initial.insert("priority".into(), self.priority.to_string());
        initial
    }

    fn for_parent(conn: &mut SqliteConnection, parent: GenericRef) -> QueryResult<Vec<Self>> {
        tagging_taggeditem::table
            .filter(tagging_taggeditem::content_type_id.eq(parent.content_type_id))
            .filter(tagging_taggeditem::object_id.eq(parent.object_id))
            .order(tagging_taggeditem::priority.desc())
            .then_order_by(tagging_taggeditem::id.asc())
            .select(TaggedItem::as_select())
            .load(conn)
    }

    fn insert(
        conn: &mut SqliteConnection,
        parent: GenericRef,
        data: &CleanedData,
    ) -> Result<(), anyhow::Error> {
        let tag_id = data
            .integer("tag")
            .ok_or_else(|| anyhow!("tagged item without a tag"))?;
        diesel::insert_into(tagging_taggeditem::table)
            .values(NewTaggedItem {
                tag_id,
                content_type_id: parent.content_type_id,
                object_id: parent.object_id,
                priority: data.integer("priority").unwrap_or(0),
            })
            .execute(conn)?;
        Ok(())
    }

    fn update(
        &self,
        conn: &mut SqliteConnection,
        data: &CleanedData,
        changed: &[String],
    ) -> Result<(), anyhow::Error> {
        let changes = TaggedItemChanges {
            tag_id: changed
                .iter()
                .any(|f| f == "tag")
                .then(|| data.integer("tag"))
                .flatten(),
            priority: changed
                .iter()
                .any(|f| f == "priority")
                .then(|| data.integer("priority").unwrap_or(0)),
        };
        if changes.tag_id.is_none() && changes.priority.is_none() {
            return Ok(());
        }
        diesel::update(tagging_taggeditem::table.find(self.id))
            .set(&changes)
            .execute(conn)?;
        Ok(())
    }

    fn delete(&self, conn: &mut SqliteConnection) -> QueryResult<()> {
        diesel::delete(tagging_taggeditem::table.find(self.id)).execute(conn)?;
        Ok(())
    }

    fn choices(conn: &mut SqliteConnection, field: &str) -> QueryResult<Vec<Choice>> {
        if field != "tag" {
            return Ok(vec![]);
        }
        let tags: Vec<(i32, String)> = tagging_tag::table
            .order(tagging_tag::name.asc())
            .select((tagging_tag::id, tagging_tag::name))
            .load(conn)?;
        Ok(tags.into_iter().map(|(id, name)| Choice::new(id, name)).collect())
    }
}

pub fn placement_admin() -> InlineAdmin<Placement> {
    InlineAdmin::stacked()
        .with_fieldsets(vec![
            Fieldset {
                name: None,
                fields: &["category", "publish_from", "publish_to"],
            },
            Fieldset {
                name: Some("Advanced"),
                fields: &["slug", "static"],
            },
        ])
        .with_extra(1)
}

pub fn tag_admin() -> InlineAdmin<TaggedItem> {
    InlineAdmin::tabular().with_extra(3).with_max_num(10)
}

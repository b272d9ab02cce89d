use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::constants::DB_DATETIME_FORMAT;
use crate::schema::{
    auth_user, core_category, core_placement, core_publishable, django_content_type,
    interviews_answer, interviews_interview, interviews_interview_interviewees,
    interviews_interviewee, interviews_question, tagging_taggeditem,
};

pub fn parse_db_datetime(value: &str) -> Result<NaiveDateTime, chrono::format::ParseError> {
    NaiveDateTime::parse_from_str(value, DB_DATETIME_FORMAT)
}

pub fn format_db_datetime(value: &NaiveDateTime) -> String {
    value.format(DB_DATETIME_FORMAT).to_string()
}

/// Polymorphic type tag, keyed by `(app_label, model)`.
#[derive(Clone, Debug, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = django_content_type)]
pub struct ContentType {
    pub id: i32,
    pub name: String,
    pub app_label: String,
    pub model: String,
}

impl ContentType {
    pub fn get(conn: &mut SqliteConnection, ct_id: i32) -> QueryResult<ContentType> {
        django_content_type::table
            .find(ct_id)
            .select(ContentType::as_select())
            .first(conn)
    }

    pub fn get_by_natural_key(
        conn: &mut SqliteConnection,
        app_label: &str,
        model: &str,
    ) -> QueryResult<ContentType> {
        django_content_type::table
            .filter(django_content_type::app_label.eq(app_label))
            .filter(django_content_type::model.eq(model))
            .select(ContentType::as_select())
            .first(conn)
    }

    pub fn natural_key(&self) -> String {
        format!("{}.{}", self.app_label, self.model)
    }
}

#[derive(Clone, Debug, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = auth_user)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = auth_user)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub is_staff: bool,
    pub is_active: bool,
    pub is_superuser: bool,
}

#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = core_category)]
pub struct Category {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub tree_parent_id: Option<i32>,
    pub tree_path: String,
}

impl Category {
    pub fn all(conn: &mut SqliteConnection) -> QueryResult<Vec<Category>> {
        core_category::table
            .order(core_category::tree_path.asc())
            .select(Category::as_select())
            .load(conn)
    }

    pub fn get(conn: &mut SqliteConnection, category_id: i32) -> QueryResult<Category> {
        core_category::table
            .find(category_id)
            .select(Category::as_select())
            .first(conn)
    }
}

#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = core_publishable)]
pub struct Publishable {
    pub id: i32,
    pub content_type_id: i32,
    pub category_id: i32,
    pub title: String,
    pub slug: String,
    pub source_id: Option<i32>,
    pub photo_id: Option<i32>,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = core_placement)]
pub struct Placement {
    pub id: i32,
    pub target_ct_id: i32,
    pub target_id: i32,
    pub category_id: i32,
    pub slug: String,
    pub publish_from: String,
    pub publish_to: Option<String>,
    pub static_: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = core_placement)]
pub struct NewPlacement<'a> {
    pub target_ct_id: i32,
    pub target_id: i32,
    pub category_id: i32,
    pub slug: &'a str,
    pub publish_from: &'a str,
    pub publish_to: Option<&'a str>,
    pub static_: bool,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = core_placement)]
pub struct PlacementChanges {
    pub category_id: Option<i32>,
    pub slug: Option<String>,
    pub publish_from: Option<String>,
    pub publish_to: Option<Option<String>>,
    pub static_: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = tagging_taggeditem)]
pub struct TaggedItem {
    pub id: i32,
    pub tag_id: i32,
    pub content_type_id: i32,
    pub object_id: i32,
    pub priority: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tagging_taggeditem)]
pub struct NewTaggedItem {
    pub tag_id: i32,
    pub content_type_id: i32,
    pub object_id: i32,
    pub priority: i32,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = tagging_taggeditem)]
pub struct TaggedItemChanges {
    pub tag_id: Option<i32>,
    pub priority: Option<i32>,
}

#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = interviews_interview)]
pub struct Interview {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub category_id: i32,
    pub perex: String,
    pub ask_from: String,
    pub ask_to: String,
    pub reply_from: String,
    pub reply_to: String,
}

impl Interview {
    pub fn get(conn: &mut SqliteConnection, interview_id: i32) -> QueryResult<Interview> {
        interviews_interview::table
            .find(interview_id)
            .select(Interview::as_select())
            .first(conn)
    }

    pub fn by_slug(conn: &mut SqliteConnection, slug: &str) -> QueryResult<Interview> {
        interviews_interview::table
            .filter(interviews_interview::slug.eq(slug))
            .select(Interview::as_select())
            .first(conn)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = interviews_interview)]
pub struct NewInterview<'a> {
    pub title: &'a str,
    pub slug: &'a str,
    pub category_id: i32,
    pub perex: &'a str,
    pub ask_from: &'a str,
    pub ask_to: &'a str,
    pub reply_from: &'a str,
    pub reply_to: &'a str,
}

#[derive(Clone, Debug, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = interviews_interviewee)]
pub struct Interviewee {
    pub id: i32,
    pub user_id: Option<i32>,
    pub name: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = interviews_interviewee)]
pub struct NewInterviewee<'a> {
    pub user_id: Option<i32>,
    pub name: &'a str,
    pub slug: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = interviews_interview_interviewees)]
pub struct NewInterviewInterviewee {
    pub interview_id: i32,
    pub interviewee_id: i32,
}

#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = interviews_question)]
pub struct Question {
    pub id: i32,
    pub interview_id: i32,
    pub user_id: Option<i32>,
    pub nickname: String,
    pub email: String,
    pub content: String,
    pub ip_address: String,
    pub submit_date: String,
    pub is_public: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = interviews_question)]
pub struct NewQuestion<'a> {
    pub interview_id: i32,
    pub user_id: Option<i32>,
    pub nickname: &'a str,
    pub email: &'a str,
    pub content: &'a str,
    pub ip_address: &'a str,
}

#[derive(Clone, Debug, Queryable, Selectable, Serialize)]
#[diesel(table_name = interviews_answer)]
pub struct Answer {
    pub id: i32,
    pub question_id: i32,
    pub interviewee_id: i32,
    pub content: String,
    pub submit_date: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = interviews_answer)]
pub struct NewAnswer<'a> {
    pub question_id: i32,
    pub interviewee_id: i32,
    pub content: &'a str,
}

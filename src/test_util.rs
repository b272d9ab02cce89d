//! Fixtures shared by the in-crate tests.

use std::sync::Arc;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::Integer;

use crate::config::EllaSiteConfig;
use crate::models::*;
use crate::schema::{
    auth_session, auth_user, auth_user_permission, core_category, core_placement,
    interviews_interview, interviews_interview_interviewees, interviews_interviewee,
    interviews_question, newman_denormalizedcategoryuserrole, tagging_tag, tagging_taggeditem,
};
use crate::templates::Templates;

pub const OPEN_FROM: &str = "2000-01-01 00:00:00";
pub const OPEN_TO: &str = "2999-12-31 23:59:59";

fn last_id(conn: &mut SqliteConnection) -> i32 {
    diesel::select(diesel::dsl::sql::<Integer>("last_insert_rowid()"))
        .get_result(conn)
        .unwrap()
}

pub fn connection() -> SqliteConnection {
    let mut conn = SqliteConnection::establish(":memory:").unwrap();
    crate::run_schema_migrations(&mut conn).unwrap();
    conn
}

/// A single-connection pool, so every checkout sees the same in-memory database.
pub fn pool() -> Arc<Pool<ConnectionManager<SqliteConnection>>> {
    let pool = Pool::builder()
        .max_size(1)
        .build(ConnectionManager::<SqliteConnection>::new(":memory:"))
        .unwrap();
    {
        let mut conn = pool.get().unwrap();
        crate::run_schema_migrations(&mut conn).unwrap();
    }
    Arc::new(pool)
}

pub fn templates() -> Arc<Templates> {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");
    Arc::new(Templates::from_dir(dir, "Ella").unwrap())
}

pub fn config() -> Arc<EllaSiteConfig> {
    Arc::new(
        EllaSiteConfig::from_str(
            r#"
            database_url = ":memory:"
            template_dir = "."
            secret_key = "not-so-secret"

            [site]
            site_name = "Ella"
            "#,
        )
        .unwrap(),
    )
}

pub fn create_user(conn: &mut SqliteConnection, username: &str, superuser: bool, staff: bool) -> User {
    diesel::insert_into(auth_user::table)
        .values(NewUser {
            username,
            email: "",
            is_staff: staff,
            is_active: true,
            is_superuser: superuser,
        })
        .execute(conn)
        .unwrap();
    let id = last_id(conn);
    auth_user::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .unwrap()
}

pub fn create_session(conn: &mut SqliteConnection, user: &User) -> String {
    let key = format!("session-{}-{}", user.id, user.username);
    diesel::insert_into(auth_session::table)
        .values((
            auth_session::session_key.eq(&key),
            auth_session::user_id.eq(user.id),
            auth_session::expire_date.eq(OPEN_TO),
        ))
        .execute(conn)
        .unwrap();
    key
}

pub fn grant(conn: &mut SqliteConnection, user: &User, permission: &str) {
    diesel::insert_into(auth_user_permission::table)
        .values((
            auth_user_permission::user_id.eq(user.id),
            auth_user_permission::permission.eq(permission),
        ))
        .execute(conn)
        .unwrap();
}

pub fn grant_category(conn: &mut SqliteConnection, user: &User, permission: &str, category: &Category) {
    diesel::insert_into(newman_denormalizedcategoryuserrole::table)
        .values((
            newman_denormalizedcategoryuserrole::user_id.eq(user.id),
            newman_denormalizedcategoryuserrole::permission_codename.eq(permission),
            newman_denormalizedcategoryuserrole::category_id.eq(category.id),
            newman_denormalizedcategoryuserrole::root_category_id.eq(category.id),
        ))
        .execute(conn)
        .unwrap();
}

pub fn create_category(
    conn: &mut SqliteConnection,
    title: &str,
    slug: &str,
    parent: Option<&Category>,
) -> Category {
    let tree_path = match parent {
        Some(parent) => format!("{}/{}", parent.tree_path, slug),
        None => slug.to_string(),
    };
    diesel::insert_into(core_category::table)
        .values((
            core_category::title.eq(title),
            core_category::slug.eq(slug),
            core_category::tree_parent_id.eq(parent.map(|p| p.id)),
            core_category::tree_path.eq(&tree_path),
        ))
        .execute(conn)
        .unwrap();
    let id = last_id(conn);
    Category::get(conn, id).unwrap()
}

/// An interview open for both questions and replies.
pub fn create_interview(conn: &mut SqliteConnection, slug: &str, category: &Category) -> Interview {
    diesel::insert_into(interviews_interview::table)
        .values(NewInterview {
            title: "Interview",
            slug,
            category_id: category.id,
            perex: "",
            ask_from: OPEN_FROM,
            ask_to: OPEN_TO,
            reply_from: OPEN_FROM,
            reply_to: OPEN_TO,
        })
        .execute(conn)
        .unwrap();
    Interview::by_slug(conn, slug).unwrap()
}

pub fn create_interviewee(
    conn: &mut SqliteConnection,
    interview: &Interview,
    name: &str,
    user: Option<&User>,
) -> Interviewee {
    diesel::insert_into(interviews_interviewee::table)
        .values(NewInterviewee {
            user_id: user.map(|u| u.id),
            name,
            slug: &name.to_lowercase(),
            description: "",
        })
        .execute(conn)
        .unwrap();
    let id = last_id(conn);
    diesel::insert_into(interviews_interview_interviewees::table)
        .values(NewInterviewInterviewee {
            interview_id: interview.id,
            interviewee_id: id,
        })
        .execute(conn)
        .unwrap();
    interviews_interviewee::table
        .find(id)
        .select(Interviewee::as_select())
        .first(conn)
        .unwrap()
}

pub fn create_question(conn: &mut SqliteConnection, interview: &Interview, content: &str) -> Question {
    diesel::insert_into(interviews_question::table)
        .values(NewQuestion {
            interview_id: interview.id,
            user_id: None,
            nickname: "Visitor",
            email: "",
            content,
            ip_address: "127.0.0.1",
        })
        .execute(conn)
        .unwrap();
    let id = last_id(conn);
    interviews_question::table
        .find(id)
        .select(Question::as_select())
        .first(conn)
        .unwrap()
}

pub fn create_placement(
    conn: &mut SqliteConnection,
    target_ct_id: i32,
    target_id: i32,
    category: &Category,
    slug: &str,
) -> Placement {
    diesel::insert_into(core_placement::table)
        .values(NewPlacement {
            target_ct_id,
            target_id,
            category_id: category.id,
            slug,
            publish_from: OPEN_FROM,
            publish_to: None,
            static_: false,
        })
        .execute(conn)
        .unwrap();
    let id = last_id(conn);
    core_placement::table
        .find(id)
        .select(Placement::as_select())
        .first(conn)
        .unwrap()
}

pub fn create_tagged_item(
    conn: &mut SqliteConnection,
    content_type_id: i32,
    object_id: i32,
    tag: &str,
) -> TaggedItem {
    diesel::insert_into(tagging_tag::table)
        .values(tagging_tag::name.eq(tag))
        .execute(conn)
        .unwrap();
    let tag_id = last_id(conn);
    diesel::insert_into(tagging_taggeditem::table)
        .values(NewTaggedItem {
            tag_id,
            content_type_id,
            object_id,
            priority: 0,
        })
        .execute(conn)
        .unwrap();
    let id = last_id(conn);
    tagging_taggeditem::table
        .find(id)
        .select(TaggedItem::as_select())
        .first(conn)
        .unwrap()
}

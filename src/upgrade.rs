//! Folds a legacy per-type content table into `core_publishable`.
//!
//! The whole plan runs in a single transaction with foreign key enforcement
//! switched off, so a failing step leaves the database as it was. Commit is
//! the point of no return: there is no backwards direction.

mod editor;
mod steps;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{Integer, Text};
use thiserror::Error;
use tracing::{info, info_span, warn};

pub use editor::{ColumnDef, ForeignKeyDef, IndexDef, SchemaEditor, TableDef};
pub use steps::{plan, LegacyModel, Step, Upgrade};

use crate::config::UpgradeConfig;
use crate::schema::ella_upgrade_history;

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("content type {app_label}.{model} not found")]
    ContentTypeNotFound { app_label: String, model: String },
    #[error("table {0} does not exist")]
    MissingTable(String),
    #[error("column {column} does not exist on {table}")]
    MissingColumn { table: String, column: String },
    #[error("foreign key check failed on {0}")]
    ForeignKeyViolation(String),
    #[error("upgrade {0} has already been applied")]
    AlreadyApplied(String),
    #[error("stage {0} is not supported")]
    UnsupportedStage(&'static str),
    #[error("there is no way back")]
    NoWayBack,
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Default)]
pub struct UpgradeReport {
    pub steps: Vec<Step>,
    pub copied_rows: usize,
    pub moved_authors: usize,
    /// `(table, column)` pairs still holding legacy ids.
    pub unresolved_referrers: Vec<(String, String)>,
    pub remapped: Vec<(String, usize)>,
}

#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}

fn migration_name(model: &LegacyModel) -> String {
    format!("publishable_from_{}", model.table())
}

pub fn is_applied(conn: &mut SqliteConnection, model: &LegacyModel) -> QueryResult<bool> {
    let count: i64 = ella_upgrade_history::table
        .filter(ella_upgrade_history::app_name.eq(&model.app_label))
        .filter(ella_upgrade_history::migration.eq(migration_name(model)))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Copies the whole database to `path` while it is still untouched.
pub fn snapshot(conn: &mut SqliteConnection, path: &str) -> QueryResult<()> {
    info!(path, "writing pre-upgrade snapshot");
    sql_query("VACUUM INTO ?").bind::<Text, _>(path).execute(conn)?;
    Ok(())
}

pub fn forwards(
    conn: &mut SqliteConnection,
    config: &UpgradeConfig,
) -> Result<UpgradeReport, UpgradeError> {
    let model = LegacyModel::from(config);
    let span = info_span!("upgrade", table = %model.table());
    let _enter = span.enter();

    if is_applied(conn, &model)? {
        return Err(UpgradeError::AlreadyApplied(migration_name(&model)));
    }
    if !SchemaEditor::new(conn).table_exists(&model.table())? {
        return Err(UpgradeError::MissingTable(model.table()));
    }
    if let Some(path) = &config.backup_path {
        snapshot(conn, path)?;
    }

    // the pragma is a no-op inside a transaction
    let enforced: ForeignKeys = sql_query("PRAGMA foreign_keys").get_result(conn)?;
    conn.batch_execute("PRAGMA foreign_keys = OFF")?;

    let steps = plan(config);
    let result = conn.transaction::<_, UpgradeError, _>(|conn| {
        let report = Upgrade::new(conn, &model).run(&steps)?;
        diesel::insert_into(ella_upgrade_history::table)
            .values((
                ella_upgrade_history::app_name.eq(&model.app_label),
                ella_upgrade_history::migration.eq(migration_name(&model)),
            ))
            .execute(conn)?;
        Ok(report)
    });

    if enforced.foreign_keys != 0 {
        conn.batch_execute("PRAGMA foreign_keys = ON")?;
    }

    match &result {
        Ok(report) => {
            info!(
                rows = report.copied_rows,
                authors = report.moved_authors,
                "upgrade committed"
            );
            if !config.remap_generic_relations {
                warn!("generic relations still address legacy ids");
            }
            warn!("placements still address legacy ids");
        }
        Err(e) => warn!("upgrade rolled back: {}", e),
    }
    result
}

pub fn backwards() -> Result<(), UpgradeError> {
    Err(UpgradeError::NoWayBack)
}

#[cfg(test)]
mod test {
    use diesel::connection::SimpleConnection;
    use diesel::prelude::*;
    use diesel::sql_query;
    use diesel::sql_types::{Integer, Nullable, Text};

    use super::{backwards, forwards, plan, LegacyModel, SchemaEditor, Upgrade, UpgradeError};
    use crate::config::UpgradeConfig;
    use crate::models::ContentType;
    use crate::schema::django_content_type;
    use crate::test_util;

    #[derive(QueryableByName, Debug)]
    struct MigratedRow {
        #[diesel(sql_type = Integer)]
        id: i32,
        #[diesel(sql_type = Nullable<Integer>)]
        old_id: Option<i32>,
        #[diesel(sql_type = Text)]
        title: String,
        #[diesel(sql_type = Integer)]
        category_id: i32,
        #[diesel(sql_type = Text)]
        description: String,
    }

    #[derive(QueryableByName, Debug)]
    struct Link {
        #[diesel(sql_type = Integer)]
        publishable_ptr_id: i32,
    }

    #[derive(QueryableByName, Debug)]
    struct Membership {
        #[diesel(sql_type = Integer)]
        publishable_id: i32,
        #[diesel(sql_type = Integer)]
        author_id: i32,
    }

    #[derive(QueryableByName, Debug)]
    struct ObjectId {
        #[diesel(sql_type = Integer)]
        object_id: i32,
    }

    /// One legacy article (id 5, "T", category 3) with an author and a contents row.
    fn legacy_database() -> SqliteConnection {
        let mut conn = test_util::connection();
        test_util::create_category(&mut conn, "News", "news", None);
        test_util::create_category(&mut conn, "Sport", "sport", None);
        let culture = test_util::create_category(&mut conn, "Culture", "culture", None);
        assert_eq!(culture.id, 3);

        conn.batch_execute(
            r#"
            INSERT INTO "core_author" ("id", "name", "slug") VALUES (1, 'Ann', 'ann');
            INSERT INTO "articles_article" ("id", "title", "slug", "perex", "category_id")
                VALUES (5, 'T', 't', 'Lead', 3);
            INSERT INTO "articles_article_authors" ("article_id", "author_id") VALUES (5, 1);
            INSERT INTO "articles_articlecontents" ("article_id", "content") VALUES (5, 'Body');
            "#,
        )
        .unwrap();
        conn
    }

    fn publishables(conn: &mut SqliteConnection) -> Vec<MigratedRow> {
        sql_query(
            "SELECT id, old_id, title, category_id, description FROM core_publishable ORDER BY id",
        )
        .load(conn)
        .unwrap()
    }

    #[test]
    fn rows_keep_their_legacy_id_until_the_last_step() {
        let mut conn = legacy_database();
        let config = UpgradeConfig::default();
        let model = LegacyModel::from(&config);
        let steps = plan(&config);

        Upgrade::new(&mut conn, &model)
            .run(&steps[..steps.len() - 1])
            .unwrap();

        let rows = publishables(&mut conn);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].old_id, Some(5));
        assert_eq!(rows[0].title, "T");
        assert_eq!(rows[0].category_id, 3);
        assert_eq!(rows[0].description, "Lead");

        let links: Vec<Link> = sql_query("SELECT publishable_ptr_id FROM articles_article")
            .load(&mut conn)
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].publishable_ptr_id, rows[0].id);
    }

    #[test]
    fn forwards_merges_articles_into_publishables() {
        let mut conn = legacy_database();
        let report = forwards(&mut conn, &UpgradeConfig::default()).unwrap();
        assert_eq!(report.copied_rows, 1);
        assert_eq!(report.moved_authors, 1);
        assert_eq!(
            report.unresolved_referrers,
            vec![("articles_articlecontents".to_string(), "article".to_string())]
        );

        let rows = publishables(&mut conn);
        assert_eq!(rows.len(), 1);
        let new_id = rows[0].id;

        let mut editor = SchemaEditor::new(&mut conn);
        assert!(!editor.has_column("core_publishable", "old_id").unwrap());
        assert!(!editor.table_exists("articles_article_authors").unwrap());

        let article = editor.describe("articles_article").unwrap();
        let names: Vec<&str> = article.columns.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"publishable_ptr_id"));
        for dropped in &["id", "title", "slug", "category_id", "perex", "source_id", "photo_id"] {
            assert!(!names.contains(dropped), "{} should be gone", dropped);
        }
        let ptr = article.column("publishable_ptr_id").unwrap();
        assert!(ptr.primary_key && ptr.not_null && !ptr.autoincrement);
        assert_eq!(
            ptr.references.as_ref().map(|fk| fk.table.as_str()),
            Some("core_publishable")
        );

        let contents = editor.describe("articles_articlecontents").unwrap();
        assert_eq!(contents.column("article").unwrap().references, None);

        let members: Vec<Membership> =
            sql_query("SELECT publishable_id, author_id FROM core_publishable_authors")
                .load(&mut conn)
                .unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!((members[0].publishable_id, members[0].author_id), (new_id, 1));
    }

    #[test]
    fn missing_content_type_rolls_everything_back() {
        let mut conn = legacy_database();
        diesel::delete(
            django_content_type::table
                .filter(django_content_type::app_label.eq("articles"))
                .filter(django_content_type::model.eq("article")),
        )
        .execute(&mut conn)
        .unwrap();

        match forwards(&mut conn, &UpgradeConfig::default()) {
            Err(UpgradeError::ContentTypeNotFound { app_label, model }) => {
                assert_eq!((app_label.as_str(), model.as_str()), ("articles", "article"));
            }
            other => panic!("unexpected result {:?}", other),
        }

        let mut editor = SchemaEditor::new(&mut conn);
        assert!(!editor.has_column("core_publishable", "old_id").unwrap());
        assert!(editor.table_exists("articles_article_authors").unwrap());
        assert!(publishables(&mut conn).is_empty());
    }

    #[test]
    fn it_runs_only_once_and_never_backwards() {
        let mut conn = legacy_database();
        forwards(&mut conn, &UpgradeConfig::default()).unwrap();
        assert!(matches!(
            forwards(&mut conn, &UpgradeConfig::default()),
            Err(UpgradeError::AlreadyApplied(_))
        ));
        assert!(matches!(backwards(), Err(UpgradeError::NoWayBack)));
        assert_eq!(UpgradeError::NoWayBack.to_string(), "there is no way back");
    }

    #[test]
    fn enabled_remaps_rewrite_generic_references() {
        let mut conn = legacy_database();
        let article_ct =
            ContentType::get_by_natural_key(&mut conn, "articles", "article").unwrap();
        let interview_ct =
            ContentType::get_by_natural_key(&mut conn, "interviews", "interview").unwrap();
        conn.batch_execute(&format!(
            r#"
            INSERT INTO "tagging_tag" ("id", "name") VALUES (1, 'rust');
            INSERT INTO "tagging_taggeditem" ("tag_id", "content_type_id", "object_id") VALUES (1, {article}, 5);
            INSERT INTO "tagging_taggeditem" ("tag_id", "content_type_id", "object_id") VALUES (1, {interview}, 5);
            INSERT INTO "core_placement" ("target_ct_id", "target_id", "category_id", "publish_from")
                VALUES ({article}, 5, 3, '2009-01-01 00:00:00');
            "#,
            article = article_ct.id,
            interview = interview_ct.id,
        ))
        .unwrap();

        let config = UpgradeConfig {
            remap_generic_relations: true,
            ..UpgradeConfig::default()
        };
        let report = forwards(&mut conn, &config).unwrap();
        let new_id = publishables(&mut conn)[0].id;
        assert_ne!(new_id, 5);
        let tables: Vec<&str> = report.remapped.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(tables, vec!["tagging_taggeditem", "comments_comment"]);

        let tagged: Vec<ObjectId> = sql_query(format!(
            "SELECT object_id FROM tagging_taggeditem WHERE content_type_id = {}",
            article_ct.id
        ))
        .load(&mut conn)
        .unwrap();
        assert_eq!(tagged[0].object_id, new_id);

        let untouched: Vec<ObjectId> = sql_query(format!(
            "SELECT object_id FROM tagging_taggeditem WHERE content_type_id = {}",
            interview_ct.id
        ))
        .load(&mut conn)
        .unwrap();
        assert_eq!(untouched[0].object_id, 5);

        let placed: Vec<ObjectId> =
            sql_query("SELECT target_id AS object_id FROM core_placement")
                .load(&mut conn)
                .unwrap();
        assert_eq!(placed[0].object_id, 5);
    }

    #[test]
    fn placement_remap_is_refused_and_rolled_back() {
        let mut conn = legacy_database();
        let config = UpgradeConfig {
            remap_placements: true,
            ..UpgradeConfig::default()
        };
        match forwards(&mut conn, &config) {
            Err(UpgradeError::UnsupportedStage(stage)) => assert_eq!(stage, "remap_placements"),
            other => panic!("unexpected result {:?}", other),
        }

        let mut editor = SchemaEditor::new(&mut conn);
        assert!(!editor.has_column("core_publishable", "old_id").unwrap());
        assert!(editor.has_column("core_placement", "target_ct_id").unwrap());
        assert!(editor.has_column("articles_article", "id").unwrap());
        assert!(publishables(&mut conn).is_empty());
        assert!(!super::is_applied(&mut conn, &LegacyModel::from(&config)).unwrap());
    }
}

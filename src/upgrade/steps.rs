use diesel::prelude::*;
use indoc::formatdoc;
use tracing::{info, warn};

use super::editor::{quote, ColumnDef, ForeignKeyDef, SchemaEditor};
use super::{UpgradeError, UpgradeReport};
use crate::config::UpgradeConfig;
use crate::models::ContentType;

pub const BASE_TABLE: &str = "core_publishable";
pub const BASE_AUTHORS_TABLE: &str = "core_publishable_authors";
pub const OLD_ID: &str = "old_id";
pub const PARENT_LINK: &str = "publishable_ptr";

/// Tables holding `(content_type, object_id)` pairs that may address a legacy row.
const GENERIC_RELATIONS: &[(&str, &str, &str)] = &[
    ("tagging_taggeditem", "content_type_id", "object_id"),
    ("comments_comment", "target_ct_id", "target_id"),
];

/// The legacy per-type table being folded into `core_publishable`.
#[derive(Clone, Debug)]
pub struct LegacyModel {
    pub app_label: String,
    pub model: String,
    pub description_column: String,
}

impl LegacyModel {
    pub fn table(&self) -> String {
        format!("{}_{}", self.app_label, self.model)
    }

    pub fn authors_table(&self) -> String {
        format!("{}_authors", self.table())
    }

    pub fn join_column(&self) -> String {
        format!("{}_id", self.model)
    }

    pub fn parent_link_column(&self) -> String {
        format!("{}_id", PARENT_LINK)
    }

    /// Columns that live on `core_publishable` once the upgrade is through.
    pub fn duplicate_columns(&self) -> Vec<String> {
        vec![
            "category_id".into(),
            self.description_column.clone(),
            "id".into(),
            "slug".into(),
            "photo_id".into(),
            "source_id".into(),
            "title".into(),
        ]
    }
}

impl From<&UpgradeConfig> for LegacyModel {
    fn from(config: &UpgradeConfig) -> Self {
        Self {
            app_label: config.app_label.clone(),
            model: config.model.clone(),
            description_column: config.description_column.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    AddOldId,
    CopyRows,
    AddParentLink,
    FillParentLink,
    DetachAuthorsJoin,
    DetachReferrers,
    ReplacePrimaryKey,
    MoveAuthors,
    DropDuplicateColumns,
    RemapGenericRelations,
    RemapPlacements,
    DropOldId,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::AddOldId => "add_old_id",
            Step::CopyRows => "copy_rows",
            Step::AddParentLink => "add_parent_link",
            Step::FillParentLink => "fill_parent_link",
            Step::DetachAuthorsJoin => "detach_authors_join",
            Step::DetachReferrers => "detach_referrers",
            Step::ReplacePrimaryKey => "replace_primary_key",
            Step::MoveAuthors => "move_authors",
            Step::DropDuplicateColumns => "drop_duplicate_columns",
            Step::RemapGenericRelations => "remap_generic_relations",
            Step::RemapPlacements => "remap_placements",
            Step::DropOldId => "drop_old_id",
        }
    }
}

/// Ordered steps for `config`. Both remap stages need `old_id`, so they sit right before it is dropped.
pub fn plan(config: &UpgradeConfig) -> Vec<Step> {
    let mut steps = vec![
        Step::AddOldId,
        Step::CopyRows,
        Step::AddParentLink,
        Step::FillParentLink,
        Step::DetachAuthorsJoin,
        Step::DetachReferrers,
        Step::ReplacePrimaryKey,
        Step::MoveAuthors,
        Step::DropDuplicateColumns,
    ];
    if config.remap_generic_relations {
        steps.push(Step::RemapGenericRelations);
    }
    if config.remap_placements {
        steps.push(Step::RemapPlacements);
    }
    steps.push(Step::DropOldId);
    steps
}

pub struct Upgrade<'a> {
    conn: &'a mut SqliteConnection,
    model: &'a LegacyModel,
    content_type_id: Option<i32>,
    report: UpgradeReport,
}

impl<'a> Upgrade<'a> {
    pub fn new(conn: &'a mut SqliteConnection, model: &'a LegacyModel) -> Self {
        Self {
            conn,
            model,
            content_type_id: None,
            report: UpgradeReport::default(),
        }
    }

    pub fn run(mut self, steps: &[Step]) -> Result<UpgradeReport, UpgradeError> {
        for step in steps {
            info!(step = step.name(), table = %self.model.table(), "applying upgrade step");
            self.apply(*step)?;
            self.report.steps.push(*step);
        }
        Ok(self.report)
    }

    fn editor(&mut self) -> SchemaEditor<'_> {
        SchemaEditor::new(&mut *self.conn)
    }

    fn content_type_id(&mut self) -> Result<i32, UpgradeError> {
        if let Some(id) = self.content_type_id {
            return Ok(id);
        }
        let ct = ContentType::get_by_natural_key(&mut *self.conn, &self.model.app_label, &self.model.model)
            .optional()?
            .ok_or_else(|| UpgradeError::ContentTypeNotFound {
                app_label: self.model.app_label.clone(),
                model: self.model.model.clone(),
            })?;
        self.content_type_id = Some(ct.id);
        Ok(ct.id)
    }

    fn require_column(&mut self, table: &str, column: &str) -> Result<(), UpgradeError> {
        if self.editor().has_column(table, column)? {
            Ok(())
        } else {
            Err(UpgradeError::MissingColumn {
                table: table.into(),
                column: column.into(),
            })
        }
    }

    fn check_foreign_keys(&mut self, table: &str) -> Result<(), UpgradeError> {
        if self.editor().foreign_key_violations(table)? > 0 {
            return Err(UpgradeError::ForeignKeyViolation(table.into()));
        }
        Ok(())
    }

    fn apply(&mut self, step: Step) -> Result<(), UpgradeError> {
        let table = self.model.table();
        match step {
            Step::AddOldId => {
                let mut editor = self.editor();
                if !editor.has_column(BASE_TABLE, OLD_ID)? {
                    editor.add_column(BASE_TABLE, &ColumnDef::nullable_integer(OLD_ID))?;
                }
            }
            Step::CopyRows => {
                let ct = self.content_type_id()?;
                let description = self.model.description_column.clone();
                self.require_column(&table, &description)?;
                let copied = self.editor().execute(&formatdoc!(
                    r#"
                    INSERT INTO "{base}" ("old_id", "title", "slug", "category_id", "source_id", "photo_id", "description", "content_type_id")
                    SELECT a."id", a."title", a."slug", a."category_id", a."source_id", a."photo_id", a.{description}, {ct}
                    FROM {table} a
                    ORDER BY a."id""#,
                    base = BASE_TABLE,
                    description = quote(&description),
                    ct = ct,
                    table = quote(&table),
                ))?;
                info!(rows = copied, "copied legacy rows into {}", BASE_TABLE);
                self.report.copied_rows = copied;
            }
            Step::AddParentLink => {
                let mut editor = self.editor();
                if !editor.has_column(&table, PARENT_LINK)? {
                    editor.add_column(&table, &ColumnDef::nullable_integer(PARENT_LINK))?;
                }
            }
            Step::FillParentLink => {
                let ct = self.content_type_id()?;
                self.editor().execute(&formatdoc!(
                    r#"
                    UPDATE {table} SET "{link}" = (
                        SELECT pub."id" FROM "{base}" pub
                        WHERE pub."old_id" = {table}."id" AND pub."content_type_id" = {ct}
                    )"#,
                    table = quote(&table),
                    link = PARENT_LINK,
                    base = BASE_TABLE,
                    ct = ct,
                ))?;
            }
            Step::DetachAuthorsJoin => {
                let authors = self.model.authors_table();
                let join_column = self.model.join_column();
                let model = self.model.model.clone();
                let mut editor = self.editor();
                if editor.table_exists(&authors)? {
                    editor.alter_foreignkey_to_int(&authors, &join_column, &model)?;
                } else {
                    warn!(table = %authors, "no authors join table, skipping");
                }
            }
            Step::DetachReferrers => {
                let authors = self.model.authors_table();
                let referrers = self.editor().referrers(&table)?;
                for (referrer, column) in referrers.into_iter().filter(|(t, _)| *t != authors) {
                    let plain = column.strip_suffix("_id").unwrap_or(&column).to_string();
                    self.editor().alter_foreignkey_to_int(&referrer, &column, &plain)?;
                    warn!(
                        table = %referrer,
                        column = %plain,
                        "references into {} were not remapped to publishable ids",
                        table
                    );
                    self.report.unresolved_referrers.push((referrer, plain));
                }
            }
            Step::ReplacePrimaryKey => {
                let link = self.model.parent_link_column();
                self.require_column(&table, PARENT_LINK)?;
                self.editor().rebuild(&table, |def| {
                    if let Some(id) = def.column_mut("id") {
                        id.primary_key = false;
                        id.autoincrement = false;
                    }
                    if let Some(ptr) = def.column_mut(PARENT_LINK) {
                        ptr.name = link.clone();
                        ptr.not_null = true;
                        ptr.primary_key = true;
                        ptr.references = Some(ForeignKeyDef {
                            table: BASE_TABLE.into(),
                            column: Some("id".into()),
                        });
                    }
                })?;
                self.check_foreign_keys(&table)?;
            }
            Step::MoveAuthors => {
                let authors = self.model.authors_table();
                if !self.editor().table_exists(&authors)? {
                    return Ok(());
                }
                let sql = formatdoc!(
                    r#"
                    INSERT INTO "{base_authors}" ("publishable_id", "author_id")
                    SELECT art."{link}", art_aut."author_id"
                    FROM {table} art
                    INNER JOIN {authors} art_aut ON art."id" = art_aut.{join}"#,
                    base_authors = BASE_AUTHORS_TABLE,
                    link = self.model.parent_link_column(),
                    table = quote(&table),
                    authors = quote(&authors),
                    join = quote(&self.model.model),
                );
                let moved = self.editor().execute(&sql)?;
                self.editor().drop_table(&authors)?;
                info!(rows = moved, "moved author memberships to {}", BASE_AUTHORS_TABLE);
                self.report.moved_authors = moved;
            }
            Step::DropDuplicateColumns => {
                let duplicates = self.model.duplicate_columns();
                let duplicates: Vec<&str> = duplicates.iter().map(|c| c.as_str()).collect();
                self.editor().drop_columns(&table, &duplicates)?;
                self.check_foreign_keys(&table)?;
            }
            Step::RemapGenericRelations => {
                let ct = self.content_type_id()?;
                for (relation, ct_column, id_column) in GENERIC_RELATIONS {
                    self.remap(relation, ct_column, id_column, ct)?;
                }
            }
            // moving placements onto a publishable foreign key would orphan
            // placements of interviews and other non-publishable targets
            Step::RemapPlacements => return Err(UpgradeError::UnsupportedStage(step.name())),
            Step::DropOldId => {
                self.editor().drop_columns(BASE_TABLE, &[OLD_ID])?;
                self.check_foreign_keys(BASE_TABLE)?;
            }
        }
        Ok(())
    }

    /// Points `(ct, old id)` pairs at the new publishable id. The content type is kept.
    fn remap(
        &mut self,
        relation: &str,
        ct_column: &str,
        id_column: &str,
        ct: i32,
    ) -> Result<(), UpgradeError> {
        if !self.editor().table_exists(relation)? {
            warn!(table = relation, "generic relation table missing, skipping remap");
            return Ok(());
        }
        let matching = formatdoc!(
            r#"
            SELECT pub."id" FROM "{base}" pub
            WHERE pub."old_id" = {relation}.{id_column} AND pub."content_type_id" = {ct}"#,
            base = BASE_TABLE,
            relation = quote(relation),
            id_column = quote(id_column),
            ct = ct,
        );
        let remapped = self.editor().execute(&formatdoc!(
            r#"
            UPDATE {relation} SET {id_column} = ({matching})
            WHERE {ct_column} = {ct} AND EXISTS ({matching})"#,
            relation = quote(relation),
            id_column = quote(id_column),
            ct_column = quote(ct_column),
            ct = ct,
            matching = matching,
        ))?;
        info!(table = relation, rows = remapped, "remapped generic references");
        self.report.remapped.push((relation.to_string(), remapped));
        Ok(())
    }
}

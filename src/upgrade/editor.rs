//! Schema changes SQLite cannot express as a single `ALTER TABLE`.
//!
//! Tables are introspected through the `pragma_*` table-valued functions and
//! rebuilt with the create, copy, drop, rename sequence: the new definition is
//! created as `{table}_temp`, rows are copied over, the original is dropped and
//! the temporary table takes its name. Indexes whose columns survive the
//! change unrenamed are recreated afterwards.

use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Integer, Nullable, Text};
use indoc::formatdoc;
use tracing::debug;

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub table: String,
    /// `None` targets the referenced table's primary key.
    pub column: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub references: Option<ForeignKeyDef>,
    /// Column of the existing table whose values fill this one on rebuild.
    pub copied_from: Option<String>,
}

impl ColumnDef {
    pub fn nullable_integer(name: &str) -> Self {
        Self {
            name: name.into(),
            sql_type: "integer".into(),
            not_null: false,
            default: None,
            primary_key: false,
            autoincrement: false,
            references: None,
            copied_from: None,
        }
    }

    fn sql(&self, inline_pk: bool) -> String {
        let mut sql = quote(&self.name);
        if !self.sql_type.is_empty() {
            sql.push(' ');
            sql.push_str(&self.sql_type);
        }
        sql.push_str(if self.not_null { " NOT NULL" } else { " NULL" });
        if self.primary_key && inline_pk {
            sql.push_str(" PRIMARY KEY");
            if self.autoincrement {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if let Some(fk) = &self.references {
            sql.push_str(&format!(" REFERENCES {}", quote(&fk.table)));
            if let Some(column) = &fk.column {
                sql.push_str(&format!(" ({})", quote(column)));
            }
        }
        sql
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    fn create_sql(&self, table: &str) -> String {
        let pk: Vec<&ColumnDef> = self.columns.iter().filter(|c| c.primary_key).collect();
        let inline_pk = pk.len() == 1;
        let mut parts: Vec<String> = self.columns.iter().map(|c| c.sql(inline_pk)).collect();
        if pk.len() > 1 {
            let names: Vec<String> = pk.iter().map(|c| quote(&c.name)).collect();
            parts.push(format!("PRIMARY KEY ({})", names.join(", ")));
        }
        formatdoc!(
            "
            CREATE TABLE {} (
                {}
            )",
            quote(table),
            parts.join(",\n    ")
        )
    }

    /// Drops indexes that mention a removed or renamed column.
    fn retain_surviving_indexes(&mut self) {
        let columns = &self.columns;
        self.indexes.retain(|index| {
            index.columns.iter().all(|name| {
                columns
                    .iter()
                    .any(|c| &c.name == name && c.copied_from.as_ref() == Some(name))
            })
        });
    }
}

#[derive(QueryableByName)]
struct PragmaColumn {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    col_type: String,
    #[diesel(sql_type = Integer)]
    notnull: i32,
    #[diesel(sql_type = Nullable<Text>)]
    dflt_value: Option<String>,
    #[diesel(sql_type = Integer)]
    pk: i32,
}

#[derive(QueryableByName)]
struct PragmaForeignKey {
    #[diesel(sql_type = Text)]
    from_column: String,
    #[diesel(sql_type = Text)]
    target_table: String,
    #[diesel(sql_type = Nullable<Text>)]
    to_column: Option<String>,
}

#[derive(QueryableByName)]
struct PragmaIndex {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Integer)]
    is_unique: i32,
    #[diesel(sql_type = Text)]
    origin: String,
}

#[derive(QueryableByName)]
struct PragmaIndexColumn {
    #[diesel(sql_type = Nullable<Text>)]
    name: Option<String>,
}

#[derive(QueryableByName)]
struct TableSql {
    #[diesel(sql_type = Nullable<Text>)]
    sql: Option<String>,
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

pub struct SchemaEditor<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> SchemaEditor<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub fn execute(&mut self, sql: &str) -> QueryResult<usize> {
        debug!(sql, "executing");
        sql_query(sql).execute(&mut *self.conn)
    }

    pub fn table_exists(&mut self, table: &str) -> QueryResult<bool> {
        let found: Count = sql_query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind::<Text, _>(table)
        .get_result(&mut *self.conn)?;
        Ok(found.count > 0)
    }

    pub fn tables(&mut self) -> QueryResult<Vec<String>> {
        let names: Vec<TableName> = sql_query(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '__diesel%' ORDER BY name",
        )
        .load(&mut *self.conn)?;
        Ok(names.into_iter().map(|t| t.name).collect())
    }

    pub fn has_column(&mut self, table: &str, column: &str) -> QueryResult<bool> {
        let found: Count =
            sql_query("SELECT COUNT(*) AS count FROM pragma_table_info(?) WHERE name = ?")
                .bind::<Text, _>(table)
                .bind::<Text, _>(column)
                .get_result(&mut *self.conn)?;
        Ok(found.count > 0)
    }

    pub fn describe(&mut self, table: &str) -> QueryResult<TableDef> {
        let columns: Vec<PragmaColumn> = sql_query(
            "SELECT name, type AS col_type, \"notnull\" AS \"notnull\", dflt_value, pk \
             FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind::<Text, _>(table)
        .load(&mut *self.conn)?;

        let foreign_keys: Vec<PragmaForeignKey> = sql_query(
            "SELECT \"from\" AS from_column, \"table\" AS target_table, \"to\" AS to_column \
             FROM pragma_foreign_key_list(?)",
        )
        .bind::<Text, _>(table)
        .load(&mut *self.conn)?;

        let create: Option<TableSql> =
            sql_query("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind::<Text, _>(table)
                .get_result(&mut *self.conn)
                .optional()?;
        let autoincrement = create
            .and_then(|t| t.sql)
            .map_or(false, |sql| sql.to_uppercase().contains("AUTOINCREMENT"));

        let columns = columns
            .into_iter()
            .map(|c| ColumnDef {
                references: foreign_keys
                    .iter()
                    .find(|fk| fk.from_column == c.name)
                    .map(|fk| ForeignKeyDef {
                        table: fk.target_table.clone(),
                        column: fk.to_column.clone(),
                    }),
                copied_from: Some(c.name.clone()),
                sql_type: c.col_type,
                not_null: c.notnull != 0,
                default: c.dflt_value,
                primary_key: c.pk > 0,
                autoincrement: autoincrement && c.pk > 0,
                name: c.name,
            })
            .collect();

        let index_list: Vec<PragmaIndex> = sql_query(
            "SELECT name, \"unique\" AS is_unique, origin FROM pragma_index_list(?) ORDER BY name",
        )
        .bind::<Text, _>(table)
        .load(&mut *self.conn)?;

        let mut indexes = vec![];
        for index in index_list.into_iter().filter(|i| i.origin != "pk") {
            let index_columns: Vec<PragmaIndexColumn> =
                sql_query("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                    .bind::<Text, _>(&index.name)
                    .load(&mut *self.conn)?;
            let columns: Vec<String> = index_columns.into_iter().filter_map(|c| c.name).collect();
            // unique constraints come back as anonymous autoindexes
            let name = if index.origin == "u" {
                format!("{}_{}_uniq", table, columns.join("_"))
            } else {
                index.name
            };
            indexes.push(IndexDef {
                name,
                columns,
                unique: index.is_unique != 0,
            });
        }

        Ok(TableDef {
            name: table.into(),
            columns,
            indexes,
        })
    }

    /// `(table, column)` pairs holding a foreign key into `target`.
    pub fn referrers(&mut self, target: &str) -> QueryResult<Vec<(String, String)>> {
        let mut found = vec![];
        for table in self.tables()? {
            if table == target {
                continue;
            }
            let foreign_keys: Vec<PragmaForeignKey> = sql_query(
                "SELECT \"from\" AS from_column, \"table\" AS target_table, \"to\" AS to_column \
                 FROM pragma_foreign_key_list(?)",
            )
            .bind::<Text, _>(&table)
            .load(&mut *self.conn)?;
            for fk in foreign_keys.into_iter().filter(|fk| fk.target_table == target) {
                found.push((table.clone(), fk.from_column));
            }
        }
        Ok(found)
    }

    pub fn add_column(&mut self, table: &str, column: &ColumnDef) -> QueryResult<()> {
        self.execute(&format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote(table),
            column.sql(false)
        ))?;
        Ok(())
    }

    pub fn drop_table(&mut self, table: &str) -> QueryResult<()> {
        self.execute(&format!("DROP TABLE {}", quote(table)))?;
        Ok(())
    }

    /// Rebuilds `table` after `change` has edited its definition.
    pub fn rebuild<F>(&mut self, table: &str, change: F) -> QueryResult<TableDef>
    where
        F: FnOnce(&mut TableDef),
    {
        let mut def = self.describe(table)?;
        change(&mut def);
        def.retain_surviving_indexes();

        let temp = format!("{}_temp", table);
        self.execute(&def.create_sql(&temp))?;

        let (targets, sources): (Vec<String>, Vec<String>) = def
            .columns
            .iter()
            .filter_map(|c| c.copied_from.as_ref().map(|src| (quote(&c.name), quote(src))))
            .unzip();
        self.execute(&format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote(&temp),
            targets.join(", "),
            sources.join(", "),
            quote(table)
        ))?;
        self.drop_table(table)?;
        self.execute(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote(&temp),
            quote(table)
        ))?;

        for index in &def.indexes {
            let columns: Vec<String> = index.columns.iter().map(|c| quote(c)).collect();
            self.execute(&format!(
                "CREATE {}INDEX {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                quote(&index.name),
                quote(table),
                columns.join(", ")
            ))?;
        }
        Ok(def)
    }

    pub fn drop_columns(&mut self, table: &str, columns: &[&str]) -> QueryResult<TableDef> {
        self.rebuild(table, |def| {
            def.columns.retain(|c| !columns.contains(&c.name.as_str()));
        })
    }

    /// Turns a foreign key column into a plain integer named `new_name`,
    /// dropping the constraint along with any index covering it.
    pub fn alter_foreignkey_to_int(
        &mut self,
        table: &str,
        column: &str,
        new_name: &str,
    ) -> QueryResult<TableDef> {
        self.rebuild(table, |def| {
            if let Some(col) = def.column_mut(column) {
                col.name = new_name.into();
                col.sql_type = "integer".into();
                col.references = None;
            }
        })
    }

    pub fn foreign_key_violations(&mut self, table: &str) -> QueryResult<i64> {
        let found: Count = sql_query("SELECT COUNT(*) AS count FROM pragma_foreign_key_check(?)")
            .bind::<Text, _>(table)
            .get_result(&mut *self.conn)?;
        Ok(found.count)
    }
}

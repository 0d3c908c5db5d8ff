//! Local SQLite store with the harvest schema built in.

use super::{validate_batch, validate_identifier, Filter, Row, Store};
use crate::error::StoreError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS boxes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    qaq_id INTEGER NOT NULL UNIQUE,
    name TEXT NOT NULL CHECK (length(name) > 0),
    obtain_method TEXT CHECK (obtain_method IN ('rare', 'regular', 'discontinued')),
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS gun_skins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    qaq_id INTEGER NOT NULL UNIQUE,
    qaq_url TEXT,
    name TEXT NOT NULL,
    weapon_type TEXT,
    rarity TEXT NOT NULL CHECK (rarity IN ('consumer', 'industrial', 'mil_spec', 'restricted',
                                           'classified', 'covert', 'contraband', 'exceptional'))
);

CREATE TABLE IF NOT EXISTS knife_gloves (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    qaq_id INTEGER NOT NULL UNIQUE,
    qaq_url TEXT,
    name TEXT NOT NULL,
    item_type TEXT NOT NULL CHECK (item_type IN ('knife', 'glove')),
    rarity TEXT NOT NULL CHECK (rarity IN ('consumer', 'industrial', 'mil_spec', 'restricted',
                                           'classified', 'covert', 'contraband', 'exceptional'))
);

CREATE TABLE IF NOT EXISTS box_gun_skin_relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    box_id INTEGER NOT NULL REFERENCES boxes(id),
    gun_skin_id INTEGER NOT NULL REFERENCES gun_skins(id),
    UNIQUE (box_id, gun_skin_id)
);

CREATE TABLE IF NOT EXISTS box_knife_glove_relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    box_id INTEGER NOT NULL REFERENCES boxes(id),
    knife_glove_id INTEGER NOT NULL REFERENCES knife_gloves(id),
    UNIQUE (box_id, knife_glove_id)
);
";

/// Store backed by a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let db = Connection::open(path)
            .with_context(|| format!("failed to open store: {}", path.display()))?;
        Self::with_connection(db)
    }

    /// An in-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.execute_batch("PRAGMA foreign_keys = ON;")
            .context("failed to enable foreign keys")?;
        db.execute_batch(SCHEMA).context("failed to create schema")?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Number of rows in `table`.
    pub async fn count(&self, table: &str) -> Result<usize, StoreError> {
        validate_identifier(table)?;
        let sql = format!("SELECT COUNT(*) FROM {table}");
        self.with_db(move |db| {
            let n: i64 = db.query_row(&sql, [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|_| StoreError::Decode("store connection poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Decode(format!("store task failed: {e}")))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert_batch(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
    ) -> Result<Vec<Row>, StoreError> {
        validate_batch(table, rows, conflict_columns)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let table = table.to_string();
        let rows = rows.to_vec();
        let conflict: Vec<String> = conflict_columns.iter().map(|c| c.to_string()).collect();

        self.with_db(move |db| {
            let tx = db.transaction()?;
            let mut stored = Vec::with_capacity(rows.len());
            for row in &rows {
                let sql = upsert_sql(&table, row, &conflict);
                let params: Vec<SqlValue> = row.values().map(to_sql).collect();
                let mut stmt = tx.prepare(&sql)?;
                let columns: Vec<String> =
                    stmt.column_names().iter().map(|c| c.to_string()).collect();
                let returned = stmt.query_row(rusqlite::params_from_iter(params), |r| {
                    read_row(r, &columns)
                })?;
                stored.push(returned);
            }
            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    async fn query(
        &self,
        table: &str,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        validate_identifier(table)?;
        for filter in filters {
            validate_identifier(filter.column())?;
        }

        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for filter in filters {
            let n = params.len() + 1;
            match filter {
                Filter::Eq(column, value) => {
                    clauses.push(format!("{column} = ?{n}"));
                    params.push(to_sql(value));
                }
                Filter::Contains(column, needle) => {
                    clauses.push(format!("{column} LIKE ?{n} ESCAPE '\\'"));
                    params.push(SqlValue::Text(format!("%{}%", escape_like(needle))));
                }
            }
        }

        let mut sql = format!("SELECT * FROM {table}");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.with_db(move |db| {
            let mut stmt = db.prepare(&sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), |r| read_row(r, &columns))?
                .collect::<Result<Vec<Row>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

fn upsert_sql(table: &str, row: &Row, conflict: &[String]) -> String {
    let columns: Vec<&str> = row.keys().map(String::as_str).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let mut updates: Vec<String> = columns
        .iter()
        .filter(|c| !conflict.iter().any(|k| k == *c))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    if updates.is_empty() {
        // Link rows carry only their key; touch it so RETURNING yields the existing row.
        updates = conflict.iter().map(|c| format!("{c} = excluded.{c}")).collect();
    }
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {} RETURNING *",
        columns.join(", "),
        placeholders.join(", "),
        conflict.join(", "),
        updates.join(", "),
    )
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn read_row(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => Value::from(f),
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        };
        out.insert(name.clone(), value);
    }
    Ok(out)
}

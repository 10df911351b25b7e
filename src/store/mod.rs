//! SQLite-backed table store.
//!
//! Every call opens its own connection and closes it before returning. There
//! is no locking between writers: the last `replace_table`/`write_all` on a
//! table wins.

use crate::error::{ImportError, Result};
use rusqlite::{
    params_from_iter,
    types::{ToSqlOutput, ValueRef},
    Connection, OptionalExtension, ToSql,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

mod table;

pub use table::{ColumnKind, Record, Table, Value};

pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Point at the database file. Nothing is opened until the first call.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ImportError::fs(parent, e))?;
            }
        }
        Ok(Connection::open(&self.path)?)
    }

    /// Drop `name`, recreate it with `table`'s columns and insert every row,
    /// all in one transaction. Returns the number of rows written.
    pub fn replace_table(&self, name: &str, table: &Table) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let quoted = quote_ident(name);
        let column_defs: Vec<String> = table
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{} {}", quote_ident(col), table.column_kind(i).sql_type()))
            .collect();

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {quoted}; CREATE TABLE {quoted} ({});",
            column_defs.join(", ")
        ))?;

        if !table.is_empty() {
            let placeholders = vec!["?"; table.columns().len()].join(", ");
            let mut stmt = tx.prepare(&format!("INSERT INTO {quoted} VALUES ({placeholders})"))?;
            for row in table.rows() {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        info!(table = name, rows = table.len(), "table replaced");
        Ok(table.len())
    }

    /// Read every row of `name` in rowid order.
    pub fn read_all(&self, name: &str) -> Result<Table> {
        let conn = self.connect()?;
        if !table_exists(&conn, name)? {
            return Err(ImportError::MissingTable(name.to_string()));
        }

        let declared = declared_types(&conn, name)?;
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name)))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let kinds = columns
            .iter()
            .map(|c| {
                declared
                    .iter()
                    .find(|(name, _)| name == c)
                    .and_then(|(_, decl)| ColumnKind::from_sql_type(decl))
            })
            .collect();

        let mut table = Table::with_kinds(columns, kinds);
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(Value::from(row.get_ref(i)?));
            }
            table.push_row(values);
        }
        debug!(table = name, rows = table.len(), "read table");
        Ok(table)
    }

    /// Replace `name` with edited rows. Same semantics as [`Store::replace_table`].
    pub fn write_all(&self, name: &str, table: &Table) -> Result<usize> {
        self.replace_table(name, table)
    }

    /// Column names with their declared SQL types, in table order.
    pub fn declared_types(&self, name: &str) -> Result<Vec<(String, String)>> {
        let conn = self.connect()?;
        if !table_exists(&conn, name)? {
            return Err(ImportError::MissingTable(name.to_string()));
        }
        declared_types(&conn, name)
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.connect()?;
        table_exists(&conn, name)
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn row_count(&self, name: &str) -> Result<usize> {
        let conn = self.connect()?;
        if !table_exists(&conn, name)? {
            return Err(ImportError::MissingTable(name.to_string()));
        }
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(name)),
            [],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn declared_types(conn: &Connection, name: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let cols = stmt
        .query_map([name], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cols)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        }
    }
}

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::domain::{BronzeRow, EntityKind, Layer, SourceTableSpec};
use crate::error::{PipelineError, Result};

/// Storage collaborator hosting the bronze and silver relations.
///
/// Bronze relations mirror a source extract column for column and hold raw
/// text. Silver relations have the typed layout of their entity and are fully
/// replaced on every run.
pub trait Warehouse: Send + Sync {
    /// Create the bronze relation for a source if it does not exist yet
    fn ensure_bronze(&self, spec: &SourceTableSpec) -> Result<()>;

    /// Remove every row of a relation; a no-op on an empty one
    fn truncate(&self, layer: Layer, table: &str) -> Result<()>;

    /// Append raw records in the spec's column order, in one transaction
    fn bulk_insert(&self, spec: &SourceTableSpec, rows: &[Vec<Option<String>>]) -> Result<usize>;

    fn count_rows(&self, layer: Layer, table: &str) -> Result<u64>;

    fn read_bronze(&self, table: &str) -> Result<Vec<BronzeRow>>;

    /// Atomically swap the contents of an entity's silver relation
    fn replace_silver(&self, entity: EntityKind, rows: &[Value]) -> Result<usize>;

    /// Silver rows as JSON objects keyed by column, in insertion order
    fn read_silver(&self, entity: EntityKind) -> Result<Vec<Value>>;
}

/// Opens a SQLite database, creating parent directories as needed.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct SqliteWarehouse {
    conn: Mutex<Connection>,
}

impl SqliteWarehouse {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_connection(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Create every silver relation
    pub fn ensure_silver_layout(&self) -> Result<()> {
        let conn = self.conn()?;
        for entity in EntityKind::ALL {
            create_silver_table(&conn, entity)?;
        }
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::Storage("warehouse connection lock poisoned".to_string()))
    }
}

fn create_silver_table(conn: &Connection, entity: EntityKind) -> Result<()> {
    let columns = entity
        .silver_columns()
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&Layer::Silver.physical(entity.table_name())),
        columns
    );
    conn.execute_batch(&sql)?;
    Ok(())
}

fn json_to_sql(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

impl Warehouse for SqliteWarehouse {
    fn ensure_bronze(&self, spec: &SourceTableSpec) -> Result<()> {
        let columns = spec
            .columns
            .iter()
            .map(|c| format!("{} TEXT", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&Layer::Bronze.physical(&spec.table_name)),
            columns
        );
        self.conn()?.execute_batch(&sql)?;
        Ok(())
    }

    fn truncate(&self, layer: Layer, table: &str) -> Result<()> {
        let sql = format!("DELETE FROM {}", quote_ident(&layer.physical(table)));
        let removed = self.conn()?.execute(&sql, [])?;
        debug!(table = %layer.qualified(table), removed, "Truncated relation");
        Ok(())
    }

    fn bulk_insert(&self, spec: &SourceTableSpec, rows: &[Vec<Option<String>>]) -> Result<usize> {
        let column_list = spec
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=spec.columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&Layer::Bronze.physical(&spec.table_name)),
            column_list,
            placeholders
        );

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn count_rows(&self, layer: Layer, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&layer.physical(table)));
        let count: i64 = self.conn()?.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn read_bronze(&self, table: &str) -> Result<Vec<BronzeRow>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY rowid",
            quote_ident(&Layer::Bronze.physical(table))
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut bronze = BronzeRow::new();
            for (i, column) in columns.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null => None,
                    ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Integer(n) => Some(n.to_string()),
                    ValueRef::Real(f) => Some(f.to_string()),
                    ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
                };
                bronze.set(column, value);
            }
            out.push(bronze);
        }
        Ok(out)
    }

    fn replace_silver(&self, entity: EntityKind, rows: &[Value]) -> Result<usize> {
        let table = quote_ident(&Layer::Silver.physical(entity.table_name()));
        let columns = entity.silver_columns();
        let column_list = columns
            .iter()
            .map(|(name, _)| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let insert = format!("INSERT INTO {} ({}) VALUES ({})", table, column_list, placeholders);

        let mut conn = self.conn()?;
        create_silver_table(&conn, entity)?;
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", table), [])?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for row in rows {
                let obj = row.as_object().ok_or_else(|| {
                    PipelineError::Storage(format!("silver row for {} is not an object", entity))
                })?;
                let values = columns.iter().map(|(name, _)| json_to_sql(obj.get(*name)));
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn read_silver(&self, entity: EntityKind) -> Result<Vec<Value>> {
        let conn = self.conn()?;
        create_silver_table(&conn, entity)?;
        let columns = entity.silver_columns();
        let column_list = columns
            .iter()
            .map(|(name, _)| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            column_list,
            quote_ident(&Layer::Silver.physical(entity.table_name()))
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut obj = Map::new();
            for (i, (name, _)) in columns.iter().enumerate() {
                obj.insert(name.to_string(), sql_to_json(row.get_ref(i)?));
            }
            out.push(Value::Object(obj));
        }
        Ok(out)
    }
}

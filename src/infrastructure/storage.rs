use crate::infrastructure::error::InfraError;
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
const KV_TABLE: &str = "kv_store";

/// Creates the database file and the key-value table. Runs on every start.
pub fn initialize_database(database_path: &Path) -> Result<(), InfraError> {
    if let Some(parent) = database_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let connection = Connection::open(database_path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    ensure_table(&connection, KV_TABLE)
}

fn ensure_table(connection: &Connection, table: &str) -> Result<(), InfraError> {
    let present: i64 = connection.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    if present == 0 {
        return Err(InfraError::InvalidConfig(format!(
            "database is missing table {table}"
        )));
    }
    Ok(())
}

//! SQL DDL for the two logical memory stores.
//!
//! The `documents` and `user_facts` tables share one schema; each is paired
//! with a vec0 virtual table holding the embedding under the same id. Tables
//! are created lazily from the first record written to them, so a store that
//! has never been written to simply does not exist. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

use crate::memory::types::Source;

/// Create the table pair for one source, sized to the configured embedding
/// dimension. Called from the write path on first insert; idempotent.
pub fn ensure_source_tables(
    conn: &Connection,
    source: Source,
    dimension: usize,
) -> rusqlite::Result<()> {
    let table = source.table();
    let vec_table = source.vec_table();

    conn.execute_batch(&format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    source TEXT NOT NULL CHECK(source IN ('document','user_fact')),
    category TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_category ON {table}(category);
CREATE INDEX IF NOT EXISTS idx_{table}_source ON {table}(source);
"#
    ))?;

    // vec0 virtual table must be created separately (sqlite-vec syntax).
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {vec_table} USING vec0(\n\
         id TEXT PRIMARY KEY,\n\
         embedding FLOAT[{dimension}]\n\
         );"
    ))?;

    Ok(())
}

/// Whether a table exists. Used by the read path to degrade gracefully when
/// a store has never been written to.
pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type IN ('table','view') AND name = ?1",
        [name],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        crate::db::load_sqlite_vec();
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn tables_are_created_lazily() {
        let conn = test_conn();
        assert!(!table_exists(&conn, "documents").unwrap());

        ensure_source_tables(&conn, Source::Document, 8).unwrap();
        assert!(table_exists(&conn, "documents").unwrap());
        assert!(table_exists(&conn, "documents_vec").unwrap());

        // The other store stays absent until its own first write.
        assert!(!table_exists(&conn, "user_facts").unwrap());
    }

    #[test]
    fn ensure_is_idempotent() {
        let conn = test_conn();
        ensure_source_tables(&conn, Source::UserFact, 8).unwrap();
        ensure_source_tables(&conn, Source::UserFact, 8).unwrap();
        assert!(table_exists(&conn, "user_facts").unwrap());
    }
}

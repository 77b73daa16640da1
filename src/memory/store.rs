//! Write path and delete semantics for the two-table store.
//!
//! [`save_record`] is the single insert entry point: it lazily creates the
//! table pair for the target source on first write, then inserts the row and
//! its embedding inside a transaction. Deletes are scoped by the stored
//! source tag rather than by table truncation, so the schema state of a
//! store survives a blanket clear.

use anyhow::{ensure, Result};
use rusqlite::{params, Connection};
use std::path::Path;

use crate::db::schema::{ensure_source_tables, table_exists};
use crate::memory::embedding_to_bytes;
use crate::memory::types::{MemoryRecord, Source};

/// Insert one record plus its embedding. Returns the fresh record id.
///
/// The embedding must already be aligned to the repository dimension; the
/// vec0 table is sized from it on first write.
pub fn save_record(
    conn: &mut Connection,
    source: Source,
    text: &str,
    category: Option<&str>,
    embedding: &[f32],
) -> Result<String> {
    ensure!(
        !text.trim().is_empty(),
        "record text must not be empty after normalization"
    );
    ensure!(!embedding.is_empty(), "record embedding must not be empty");

    ensure_source_tables(conn, source, embedding.len())?;

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let tx = conn.transaction()?;
    tx.execute(
        &format!(
            "INSERT INTO {} (id, text, source, category, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            source.table()
        ),
        params![id, text, source.as_str(), category, now],
    )?;
    tx.execute(
        &format!(
            "INSERT INTO {} (id, embedding) VALUES (?1, ?2)",
            source.vec_table()
        ),
        params![id, embedding_to_bytes(embedding)],
    )?;
    tx.commit()?;

    Ok(id)
}

/// Save an ingested chunk. The category is the source file's basename, which
/// is also the key for [`delete_documents_by_source`].
pub fn save_document(
    conn: &mut Connection,
    text: &str,
    source_file: &str,
    embedding: &[f32],
) -> Result<String> {
    let category = basename(source_file);
    save_record(conn, Source::Document, text, Some(&category), embedding)
}

/// Save a fact written by the explicit save tool.
pub fn save_user_fact(
    conn: &mut Connection,
    fact: &str,
    category: Option<&str>,
    embedding: &[f32],
) -> Result<String> {
    save_record(conn, Source::UserFact, fact, category, embedding)
}

/// Most recent records across both stores, newest first.
pub fn recent(conn: &Connection, limit: usize) -> Result<Vec<MemoryRecord>> {
    let mut records: Vec<MemoryRecord> = Vec::new();

    for source in [Source::Document, Source::UserFact] {
        if !table_exists(conn, source.table())? {
            continue;
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT id, text, source, category, created_at FROM {} \
             ORDER BY created_at DESC LIMIT ?1",
            source.table()
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(MemoryRecord {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    source,
                    category: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        records.extend(rows);
    }

    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    records.truncate(limit);
    Ok(records)
}

/// Delete document chunks whose category equals the basename of
/// `source_file`. Returns the number of chunks removed.
///
/// Chunks are keyed by basename, so two ingested files sharing a name under
/// different directories are jointly deleted.
pub fn delete_documents_by_source(conn: &mut Connection, source_file: &str) -> Result<usize> {
    let source = Source::Document;
    if !table_exists(conn, source.table())? {
        return Ok(0);
    }

    let category = basename(source_file);
    let tx = conn.transaction()?;
    tx.execute(
        &format!(
            "DELETE FROM {} WHERE id IN \
             (SELECT id FROM {} WHERE category = ?1 AND source = ?2)",
            source.vec_table(),
            source.table()
        ),
        params![category, source.as_str()],
    )?;
    let deleted = tx.execute(
        &format!(
            "DELETE FROM {} WHERE category = ?1 AND source = ?2",
            source.table()
        ),
        params![category, source.as_str()],
    )?;
    tx.commit()?;

    Ok(deleted)
}

/// Remove every ingested document chunk. Returns the number removed.
pub fn clear_documents(conn: &mut Connection) -> Result<usize> {
    clear_source(conn, Source::Document)
}

/// Remove every saved user fact. Returns the number removed.
pub fn clear_user_facts(conn: &mut Connection) -> Result<usize> {
    clear_source(conn, Source::UserFact)
}

/// Blanket clear scoped by the stored source tag. The table pair itself is
/// left in place so schema state is preserved.
fn clear_source(conn: &mut Connection, source: Source) -> Result<usize> {
    if !table_exists(conn, source.table())? {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    tx.execute(
        &format!(
            "DELETE FROM {} WHERE id IN (SELECT id FROM {} WHERE source = ?1)",
            source.vec_table(),
            source.table()
        ),
        params![source.as_str()],
    )?;
    let deleted = tx.execute(
        &format!("DELETE FROM {} WHERE source = ?1", source.table()),
        params![source.as_str()],
    )?;
    tx.commit()?;

    Ok(deleted)
}

/// Last path component of a source file path, falling back to the raw input.
pub fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

//! FTS5 full-text search.

use rusqlite::{params, Connection};

use engram_core::errors::StoreError;
use engram_core::memory::MemoryRecord;

use crate::to_store_err;

/// Full-text search ranked by BM25, optionally filtered to one container
/// tag. The returned score is `-bm25` so higher is better.
pub fn fts_search(
    conn: &Connection,
    query: &str,
    container_tag: Option<&str>,
    k: usize,
) -> Result<Vec<(MemoryRecord, f32)>, StoreError> {
    let match_expr = match sanitize_match_query(query) {
        Some(expr) => expr,
        None => return Ok(Vec::new()),
    };

    let sql = format!(
        "SELECT {}, bm25(memories_fts)
         FROM memories_fts f
         JOIN memories m ON m.rowid = f.rowid
         WHERE memories_fts MATCH ?1
           AND (?2 IS NULL OR m.container_tag = ?2)
         ORDER BY rank
         LIMIT ?3",
        qualified_columns()
    );
    let mut stmt = conn.prepare(&sql).map_err(to_store_err)?;
    let rows = stmt
        .query_map(params![match_expr, container_tag, k as i64], |row| {
            let record = super::memory_crud::row_to_record(row)?;
            let bm25: f64 = row.get(17)?;
            Ok((record, -bm25 as f32))
        })
        .map_err(to_store_err)?;

    rows.collect::<Result<Vec<_>, _>>().map_err(to_store_err)
}

/// `MEMORY_COLUMNS` qualified with the `m.` alias for the FTS join.
fn qualified_columns() -> String {
    super::memory_crud::MEMORY_COLUMNS
        .split(", ")
        .map(|c| format!("m.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turn free text into a safe FTS5 MATCH expression: quoted terms joined
/// with OR, so partial matches still rank. Returns `None` when no
/// searchable terms remain.
fn sanitize_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizer_quotes_and_joins() {
        assert_eq!(
            sanitize_match_query("postgres production").as_deref(),
            Some("\"postgres\" OR \"production\"")
        );
    }

    #[test]
    fn sanitizer_strips_fts_syntax() {
        let expr = sanitize_match_query("NEAR(\"a\" OR b*) AND -c").unwrap();
        assert_eq!(expr, "\"near\" OR \"a\" OR \"or\" OR \"b\" OR \"and\" OR \"c\"");
    }

    #[test]
    fn sanitizer_rejects_empty() {
        assert_eq!(sanitize_match_query("  ... !!"), None);
        assert_eq!(sanitize_match_query(""), None);
    }
}

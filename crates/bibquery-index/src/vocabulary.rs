//! Controlled-vocabulary lookups over the index.

use rusqlite::{named_params, Connection};

use bibquery_plan::SubjectHint;

/// The `limit` most frequent subject headings, by number of records carrying
/// them (ties broken alphabetically). Read on demand, never cached.
pub fn top_subject_hints(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<SubjectHint>> {
    let mut stmt = conn.prepare(
        "SELECT value, COUNT(DISTINCT record_id) AS n
         FROM subjects
         GROUP BY value
         ORDER BY n DESC, value ASC
         LIMIT :limit",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt.query_map(named_params! { ":limit": limit }, |row| {
        Ok(SubjectHint {
            value: row.get(0)?,
            count: row.get::<_, i64>(1)?.max(0) as u64,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;

    #[test]
    fn hints_are_ranked_by_record_count() {
        let conn = fixture::sample_index().unwrap();
        let hints = top_subject_hints(&conn, 2).unwrap();
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].value, "Alchemy -- Early works to 1800");
        assert_eq!(hints[0].count, 3);
        assert!(hints[0].count >= hints[1].count);
    }
}

//! Facet counts over a result set.

use rusqlite::{named_params, Connection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetBucket {
    pub value: String,
    /// Distinct records in the result set with this value.
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCounts {
    pub place: Vec<FacetBucket>,
    pub publisher: Vec<FacetBucket>,
    pub language: Vec<FacetBucket>,
    pub decade: Vec<FacetBucket>,
    pub century: Vec<FacetBucket>,
}

fn facet_sql(value_expr: &str, table: &str, guard: &str) -> String {
    format!(
        "SELECT {value_expr} AS value, COUNT(DISTINCT r.id) AS n
         FROM records r
         JOIN {table} t ON t.record_id = r.id
         WHERE r.mms_id IN (SELECT value FROM json_each(:record_ids))
           AND {guard}
         GROUP BY value
         ORDER BY n DESC, value ASC
         LIMIT :top_n"
    )
}

struct FacetQuery<'a> {
    conn: &'a Connection,
    record_ids: String,
    top_n: i64,
}

impl FacetQuery<'_> {
    fn buckets(&self, value_expr: &str, table: &str, guard: &str) -> rusqlite::Result<Vec<FacetBucket>> {
        let mut stmt = self.conn.prepare(&facet_sql(value_expr, table, guard))?;
        let rows = stmt.query_map(
            named_params! { ":record_ids": self.record_ids, ":top_n": self.top_n },
            |row| {
                Ok(FacetBucket {
                    value: row.get(0)?,
                    count: row.get::<_, i64>(1)?.max(0) as u64,
                })
            },
        )?;
        rows.collect()
    }
}

/// Grouped counts over `record_ids` for place, publisher, language, decade
/// and century; each facet keeps its `top_n` largest buckets.
pub fn compute_facets(
    conn: &Connection,
    record_ids: &[String],
    top_n: usize,
) -> rusqlite::Result<FacetCounts> {
    if record_ids.is_empty() {
        return Ok(FacetCounts::default());
    }
    let query = FacetQuery {
        conn,
        record_ids: serde_json::to_string(record_ids)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        top_n: i64::try_from(top_n).unwrap_or(i64::MAX),
    };

    Ok(FacetCounts {
        place: query.buckets("t.place_norm", "imprints", "t.place_norm IS NOT NULL")?,
        publisher: query.buckets("t.publisher_norm", "imprints", "t.publisher_norm IS NOT NULL")?,
        language: query.buckets("LOWER(t.code)", "languages", "t.code IS NOT NULL")?,
        decade: query.buckets(
            "CAST((t.date_start / 10) * 10 AS TEXT) || 's'",
            "imprints",
            "t.date_start IS NOT NULL",
        )?,
        century: query.buckets(
            "CAST((t.date_start - 1) / 100 + 1 AS TEXT)",
            "imprints",
            "t.date_start IS NOT NULL",
        )?,
    })
}

//! Plan → parameterized SQL.
//!
//! Pure translation: the same plan always yields byte-identical SQL and the
//! same parameter map. Field and operator together choose the joined table,
//! the condition template and the normalization applied to the bound value;
//! the normalizations are the ones the index was built with.
//!
//! Shape of the generated statement:
//!
//! ```text
//! WITH matched AS (
//!     SELECT records.mms_id AS record_id, <evidence columns of joined tables>,
//!            ROW_NUMBER() OVER (PARTITION BY records.id ORDER BY <joined ids>) AS match_rank
//!     FROM records
//!     JOIN <table> ON <table>.record_id = records.id      -- once per table
//!     WHERE (<filter 0>) AND NOT (<filter 1>) ...
//! )
//! SELECT <columns> FROM matched WHERE match_rank = 1 ORDER BY record_id ASC [LIMIT :limit]
//! ```

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;
use serde::Serialize;
use thiserror::Error;

use bibquery_plan::{
    normalize_code, normalize_match_key, Filter, FilterField, FilterOp, FilterValue, QueryPlan,
};

use crate::fts::{fts_quote, like_contains};
use crate::schema::{column_alias, Table};

pub const LIMIT_PARAM: &str = ":limit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Int(v) => v.to_sql(),
            Self::Text(v) => v.to_sql(),
        }
    }
}

impl std::fmt::Display for SqlParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlQuery {
    pub sql: String,
    /// Named parameters (`:f0`, `:f1_0`, `:limit`), sorted by name.
    pub params: BTreeMap<String, SqlParam>,
    /// Joined tables, in join order.
    #[serde(skip)]
    pub tables: Vec<Table>,
}

impl SqlQuery {
    pub fn named_params(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }

    /// `:f0='x', :limit=10` for logs and error messages.
    pub fn params_display(&self) -> String {
        self.params
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A filter the adapter cannot express. The compilers never emit these, so
/// this is a programming error rather than a user-facing one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SqlBuildError {
    #[error("filter #{index}: `{field} {op}` has no SQL translation")]
    Unsupported {
        index: usize,
        field: FilterField,
        op: FilterOp,
    },
}

// ============================================================================
// Field targets
// ============================================================================

struct TextTarget {
    table: Table,
    /// Column expressions compared against the bound value; more than one
    /// means any may match.
    columns: &'static [&'static str],
    normalize: fn(&str) -> String,
    /// External-content FTS5 table backing `contains`; LIKE otherwise.
    fts: Option<&'static str>,
}

fn text_target(field: FilterField) -> Option<TextTarget> {
    let target = match field {
        FilterField::Publisher => TextTarget {
            table: Table::Imprints,
            columns: &["imprints.publisher_norm"],
            normalize: normalize_match_key,
            fts: None,
        },
        FilterField::Place => TextTarget {
            table: Table::Imprints,
            columns: &["imprints.place_norm"],
            normalize: normalize_match_key,
            fts: None,
        },
        FilterField::Country => TextTarget {
            table: Table::Imprints,
            columns: &["LOWER(imprints.country_name)", "LOWER(imprints.country_code)"],
            normalize: normalize_code,
            fts: None,
        },
        FilterField::Language => TextTarget {
            table: Table::Languages,
            columns: &["LOWER(languages.code)"],
            normalize: normalize_code,
            fts: None,
        },
        FilterField::Title => TextTarget {
            table: Table::Titles,
            columns: &["LOWER(titles.value)"],
            normalize: normalize_code,
            fts: Some("titles_fts"),
        },
        FilterField::Subject => TextTarget {
            table: Table::Subjects,
            columns: &["LOWER(subjects.value)"],
            normalize: normalize_code,
            fts: Some("subjects_fts"),
        },
        FilterField::Agent => TextTarget {
            table: Table::Agents,
            columns: &["LOWER(agents.agent_raw)"],
            normalize: normalize_code,
            fts: None,
        },
        FilterField::AgentNorm => TextTarget {
            table: Table::Agents,
            columns: &["agents.agent_norm"],
            normalize: normalize_match_key,
            fts: None,
        },
        FilterField::AgentRole => TextTarget {
            table: Table::Agents,
            columns: &["LOWER(agents.role_norm)"],
            normalize: normalize_code,
            fts: None,
        },
        FilterField::AgentType => TextTarget {
            table: Table::Agents,
            columns: &["LOWER(agents.agent_type)"],
            normalize: normalize_code,
            fts: None,
        },
        FilterField::Year => return None,
    };
    Some(target)
}

fn any_column(columns: &[&str], template: impl Fn(&str) -> String) -> String {
    match columns {
        [single] => template(*single),
        _ => {
            let parts: Vec<String> = columns.iter().map(|&c| template(c)).collect();
            format!("({})", parts.join(" OR "))
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Default)]
struct Builder {
    params: BTreeMap<String, SqlParam>,
    tables: BTreeSet<Table>,
}

impl Builder {
    fn bind(&mut self, name: String, value: SqlParam) -> String {
        self.params.insert(name.clone(), value);
        name
    }

    fn condition(&mut self, index: usize, filter: &Filter) -> Result<String, SqlBuildError> {
        let unsupported = || SqlBuildError::Unsupported {
            index,
            field: filter.field(),
            op: filter.op(),
        };

        let condition = match (filter.field(), filter.op(), filter.value()) {
            (FilterField::Year, FilterOp::Range, FilterValue::Range { start, end }) => {
                self.tables.insert(Table::Imprints);
                let lo = self.bind(format!(":f{index}_0"), SqlParam::Int(i64::from(*start)));
                let hi = self.bind(format!(":f{index}_1"), SqlParam::Int(i64::from(*end)));
                format!("imprints.date_end >= {lo} AND imprints.date_start <= {hi}")
            }
            (FilterField::Year, FilterOp::Equals, FilterValue::Text(year)) => {
                let year: i64 = year.trim().parse().map_err(|_| unsupported())?;
                self.tables.insert(Table::Imprints);
                let p = self.bind(format!(":f{index}"), SqlParam::Int(year));
                format!("imprints.date_end >= {p} AND imprints.date_start <= {p}")
            }
            (FilterField::Year, _, _) => return Err(unsupported()),
            (field, op, value) => {
                let target = text_target(field).ok_or_else(unsupported)?;
                self.tables.insert(target.table);
                let normalize = target.normalize;
                match (op, value) {
                    (FilterOp::Equals, FilterValue::Text(v)) => {
                        let p = self.bind(format!(":f{index}"), SqlParam::Text(normalize(v)));
                        any_column(target.columns, |c| format!("{c} = {p}"))
                    }
                    (FilterOp::Contains, FilterValue::Text(v)) => match target.fts {
                        Some(fts) => {
                            let p = self.bind(
                                format!(":f{index}"),
                                SqlParam::Text(fts_quote(&normalize(v))),
                            );
                            format!(
                                "{}.id IN (SELECT rowid FROM {fts} WHERE {fts} MATCH {p})",
                                target.table.name()
                            )
                        }
                        None => {
                            let p = self.bind(
                                format!(":f{index}"),
                                SqlParam::Text(like_contains(&normalize(v))),
                            );
                            any_column(target.columns, |c| format!("{c} LIKE {p} ESCAPE '\\'"))
                        }
                    },
                    (FilterOp::In, FilterValue::Set(values)) => {
                        let clauses: Vec<String> = values
                            .iter()
                            .enumerate()
                            .map(|(j, v)| {
                                let p = self.bind(
                                    format!(":f{index}_{j}"),
                                    SqlParam::Text(normalize(v)),
                                );
                                any_column(target.columns, |c| format!("{c} = {p}"))
                            })
                            .collect();
                        clauses.join(" OR ")
                    }
                    _ => return Err(unsupported()),
                }
            }
        };

        Ok(if filter.negate() {
            format!("NOT ({condition})")
        } else {
            format!("({condition})")
        })
    }
}

/// Translate `plan` into SQL. Soft filters are not enforced.
pub fn build_sql(plan: &QueryPlan) -> Result<SqlQuery, SqlBuildError> {
    let mut builder = Builder::default();
    let conditions = plan
        .filters
        .iter()
        .enumerate()
        .map(|(index, filter)| builder.condition(index, filter))
        .collect::<Result<Vec<_>, _>>()?;

    let tables: Vec<Table> = builder.tables.iter().copied().collect();

    let mut inner_columns = vec!["records.mms_id AS record_id".to_string()];
    let mut outer_columns = vec!["record_id".to_string()];
    for table in &tables {
        for column in table.evidence_columns() {
            let alias = column_alias(*table, column);
            inner_columns.push(format!("{}.{column} AS {alias}", table.name()));
            outer_columns.push(alias);
        }
    }
    let rank_order = if tables.is_empty() {
        "records.id".to_string()
    } else {
        tables
            .iter()
            .map(|t| format!("{}.id", t.name()))
            .collect::<Vec<_>>()
            .join(", ")
    };
    inner_columns.push(format!(
        "ROW_NUMBER() OVER (PARTITION BY records.id ORDER BY {rank_order}) AS match_rank"
    ));

    let mut sql = String::from("WITH matched AS (\n");
    sql.push_str(&format!("    SELECT {}\n", inner_columns.join(",\n           ")));
    sql.push_str("    FROM records\n");
    for table in &tables {
        let name = table.name();
        sql.push_str(&format!("    JOIN {name} ON {name}.record_id = records.id\n"));
    }
    if !conditions.is_empty() {
        sql.push_str(&format!("    WHERE {}\n", conditions.join("\n      AND ")));
    }
    sql.push_str(")\n");
    sql.push_str(&format!("SELECT {}\n", outer_columns.join(", ")));
    sql.push_str("FROM matched\nWHERE match_rank = 1\nORDER BY record_id ASC");
    if let Some(limit) = plan.limit.filter(|&n| n > 0) {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        builder.params.insert(LIMIT_PARAM.to_string(), SqlParam::Int(limit));
        sql.push_str(&format!("\nLIMIT {LIMIT_PARAM}"));
    }

    Ok(SqlQuery {
        sql,
        params: builder.params,
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(v: &str) -> SqlParam {
        SqlParam::Text(v.to_string())
    }

    fn scenario_plan() -> QueryPlan {
        QueryPlan::new("All books published by X between 1500 and 1599").with_filters(vec![
            Filter::equals(FilterField::Publisher, "X").unwrap(),
            Filter::range(FilterField::Year, 1500, 1599).unwrap(),
        ])
    }

    #[test]
    fn publisher_and_year_share_one_join() {
        let query = build_sql(&scenario_plan()).unwrap();

        assert_eq!(query.tables, vec![Table::Imprints]);
        assert_eq!(query.sql.matches("JOIN imprints").count(), 1);
        assert!(query.sql.contains("(imprints.publisher_norm = :f0)"));
        assert!(query.sql.contains("(imprints.date_end >= :f1_0 AND imprints.date_start <= :f1_1)"));
        assert!(query.sql.contains("ORDER BY record_id ASC"));
        assert!(!query.sql.contains('*'));
        assert!(!query.sql.contains("LIMIT"));

        let expected: BTreeMap<String, SqlParam> = [
            (":f0".to_string(), text("x")),
            (":f1_0".to_string(), SqlParam::Int(1500)),
            (":f1_1".to_string(), SqlParam::Int(1599)),
        ]
        .into_iter()
        .collect();
        assert_eq!(query.params, expected);
    }

    #[test]
    fn translation_is_deterministic() {
        let plan = scenario_plan().with_limit(Some(25));
        let a = build_sql(&plan).unwrap();
        let b = build_sql(&plan).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.params[LIMIT_PARAM], SqlParam::Int(25));
        assert!(a.sql.ends_with("LIMIT :limit"));
    }

    #[test]
    fn zero_limit_is_not_bound() {
        let mut plan = scenario_plan();
        plan.limit = Some(0);
        let query = build_sql(&plan).unwrap();
        assert!(!query.params.contains_key(LIMIT_PARAM));
        assert!(!query.sql.contains("LIMIT"));
    }

    #[test]
    fn negation_wraps_condition() {
        let plan = QueryPlan::new("not venice").with_filters(vec![
            Filter::equals(FilterField::Place, "Venice").unwrap().negated(true),
        ]);
        let query = build_sql(&plan).unwrap();
        assert!(query.sql.contains("NOT (imprints.place_norm = :f0)"));
        assert_eq!(query.params[":f0"], text("venice"));
    }

    #[test]
    fn contains_on_free_text_uses_fts() {
        let plan = QueryPlan::new("alchemy").with_filters(vec![
            Filter::contains(FilterField::Subject, "Alchemy Early").unwrap(),
            Filter::equals(FilterField::Title, "Hypnerotomachia Poliphili").unwrap(),
        ]);
        let query = build_sql(&plan).unwrap();
        assert!(query
            .sql
            .contains("subjects.id IN (SELECT rowid FROM subjects_fts WHERE subjects_fts MATCH :f0)"));
        assert_eq!(query.params[":f0"], text("\"alchemy\" \"early\""));
        // Exact matches are not FTS-quoted.
        assert!(query.sql.contains("(LOWER(titles.value) = :f1)"));
        assert_eq!(query.params[":f1"], text("hypnerotomachia poliphili"));
        assert_eq!(query.tables, vec![Table::Titles, Table::Subjects]);
    }

    #[test]
    fn contains_on_structured_fields_uses_like() {
        let plan = QueryPlan::new("aldine").with_filters(vec![
            Filter::contains(FilterField::Publisher, "Aldine").unwrap(),
        ]);
        let query = build_sql(&plan).unwrap();
        assert!(query.sql.contains("imprints.publisher_norm LIKE :f0 ESCAPE '\\'"));
        assert_eq!(query.params[":f0"], text("%aldine%"));
    }

    #[test]
    fn in_set_is_disjunction_and_country_checks_name_or_code() {
        let plan = QueryPlan::new("hebrew or latin in italy").with_filters(vec![
            Filter::one_of(FilterField::Language, ["HEB", "lat"]).unwrap(),
            Filter::equals(FilterField::Country, "Italy").unwrap(),
        ]);
        let query = build_sql(&plan).unwrap();
        assert!(query
            .sql
            .contains("(LOWER(languages.code) = :f0_0 OR LOWER(languages.code) = :f0_1)"));
        assert_eq!(query.params[":f0_0"], text("heb"));
        assert!(query
            .sql
            .contains("((LOWER(imprints.country_name) = :f1 OR LOWER(imprints.country_code) = :f1))"));
    }

    #[test]
    fn agent_filters_join_agents_once() {
        let plan = QueryPlan::new("printed by bomberg").with_filters(vec![
            Filter::equals(FilterField::AgentNorm, "Bomberg, Daniel").unwrap(),
            Filter::equals(FilterField::AgentRole, "Printer").unwrap(),
        ]);
        let query = build_sql(&plan).unwrap();
        assert_eq!(query.sql.matches("JOIN agents").count(), 1);
        assert_eq!(query.params[":f0"], text("bomberg daniel"));
        assert_eq!(query.params[":f1"], text("printer"));
    }

    #[test]
    fn year_equals_is_single_year_overlap() {
        let plan = QueryPlan::new("1550").with_filters(vec![Filter::equals(FilterField::Year, "1550").unwrap()]);
        let query = build_sql(&plan).unwrap();
        assert!(query.sql.contains("(imprints.date_end >= :f0 AND imprints.date_start <= :f0)"));
        assert_eq!(query.params[":f0"], SqlParam::Int(1550));
    }

    #[test]
    fn unsupported_combinations_are_rejected() {
        let plan = QueryPlan::new("q").with_filters(vec![
            Filter::equals(FilterField::Place, "venice").unwrap(),
            Filter::contains(FilterField::Year, "15").unwrap(),
        ]);
        assert_eq!(
            build_sql(&plan),
            Err(SqlBuildError::Unsupported {
                index: 1,
                field: FilterField::Year,
                op: FilterOp::Contains,
            })
        );

        let plan = QueryPlan::new("q").with_filters(vec![Filter::range(FilterField::Publisher, 1, 2).unwrap()]);
        assert!(matches!(build_sql(&plan), Err(SqlBuildError::Unsupported { index: 0, .. })));
    }

    #[test]
    fn empty_plan_selects_records_only() {
        let query = build_sql(&QueryPlan::new("books")).unwrap();
        assert!(query.tables.is_empty());
        assert!(!query.sql.contains("    WHERE"));
        assert!(query.sql.contains("PARTITION BY records.id ORDER BY records.id"));
        assert!(query.params.is_empty());
    }
}

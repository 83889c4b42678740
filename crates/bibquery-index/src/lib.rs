//! bibquery index access.
//!
//! Everything that touches the SQLite bibliographic index:
//!
//! ```text
//! QueryPlan ──adapter::build_sql──► SqlQuery { sql, :params }
//!                                        │
//!            read-only Connection ◄──────┘
//!                    │
//!                    ▼
//!   executor ──rows──► evidence / rationale ──► CandidateSet
//!       │
//!       └── zero rows + subject filter ──► vocabulary::top_subject_hints ──► retry once
//! ```
//!
//! The index itself is built elsewhere; [`schema`] holds the DDL contract the
//! adapter is written against.

pub mod adapter;
pub mod connection;
pub mod error;
pub mod evidence;
pub mod executor;
pub mod facets;
pub mod fts;
pub mod schema;
pub mod vocabulary;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;

pub use adapter::{build_sql, SqlBuildError, SqlParam, SqlQuery};
pub use connection::open_read_only;
pub use error::ExecutionError;
pub use executor::{qualifies_for_retry, ExecutionOutcome, Executor, DEFAULT_SUBJECT_HINTS};
pub use facets::{compute_facets, FacetBucket, FacetCounts};
pub use vocabulary::top_subject_hints;

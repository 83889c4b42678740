//! bibquery plan model.
//!
//! The typed vocabulary shared by every stage of the pipeline:
//!
//! ```text
//! text ──compile──► QueryPlan ──build_sql──► (SQL, params) ──execute──► CandidateSet
//! ```
//!
//! - [`Filter`] / [`QueryPlan`]: the validated intermediate representation.
//! - [`normalize`]: match-key normalization shared with the index contract.
//! - [`hash`]: canonical JSON and the plan hash.
//! - [`candidate`]: candidates and evidence.
//! - [`compiler`]: the compiler traits both backends implement.

pub mod candidate;
pub mod compiler;
pub mod error;
pub mod filter;
pub mod hash;
pub mod normalize;
pub mod plan;
pub mod schema;

pub use candidate::{Candidate, CandidateSet, Evidence};
pub use compiler::{PlanCompiler, SubjectHint, SubjectHintRetry};
pub use error::{CompilationError, FilterValidationError, EXAMPLE_QUERIES};
pub use filter::{Filter, FilterField, FilterOp, FilterValue};
pub use hash::{canonical_json, plan_hash};
pub use normalize::{normalize_code, normalize_match_key};
pub use plan::{debug_keys, PlanDebug, QueryPlan, PLAN_VERSION};

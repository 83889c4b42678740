//! Service configuration from `BIBQUERY_*` environment variables.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bibquery_compile::env::{env_string, env_usize};
use bibquery_compile::ConfigError;
use bibquery_index::DEFAULT_SUBJECT_HINTS;

pub const ENV_INDEX_PATH: &str = "BIBQUERY_INDEX_PATH";
pub const ENV_COMPILER: &str = "BIBQUERY_COMPILER";
pub const ENV_COMPILE_CACHE: &str = "BIBQUERY_COMPILE_CACHE";
pub const ENV_FACET_TOP_N: &str = "BIBQUERY_FACET_TOP_N";
pub const ENV_SUBJECT_HINTS: &str = "BIBQUERY_SUBJECT_HINTS";

pub const DEFAULT_INDEX_PATH: &str = "data/index/bibliographic.db";
pub const DEFAULT_FACET_TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilerBackend {
    #[default]
    Heuristic,
    Llm,
}

impl CompilerBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Llm => "llm",
        }
    }
}

impl fmt::Display for CompilerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompilerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::Invalid {
                name: ENV_COMPILER,
                value: other.to_string(),
                expected: "`heuristic` or `llm`",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub index_path: PathBuf,
    pub compiler: CompilerBackend,
    /// JSON-lines compile cache; only used by the LLM backend.
    pub compile_cache: Option<PathBuf>,
    pub facet_top_n: usize,
    pub subject_hints: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            compiler: CompilerBackend::default(),
            compile_cache: None,
            facet_top_n: DEFAULT_FACET_TOP_N,
            subject_hints: DEFAULT_SUBJECT_HINTS,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let compiler = match env_string(ENV_COMPILER)? {
            Some(v) => v.parse()?,
            None => CompilerBackend::default(),
        };
        Ok(Self {
            index_path: env_string(ENV_INDEX_PATH)?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_PATH)),
            compiler,
            compile_cache: env_string(ENV_COMPILE_CACHE)?.map(PathBuf::from),
            facet_top_n: env_usize(ENV_FACET_TOP_N, DEFAULT_FACET_TOP_N, 1, 100)?,
            subject_hints: env_usize(ENV_SUBJECT_HINTS, DEFAULT_SUBJECT_HINTS, 1, 500)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("LLM".parse::<CompilerBackend>().unwrap(), CompilerBackend::Llm);
        assert_eq!(" heuristic ".parse::<CompilerBackend>().unwrap(), CompilerBackend::Heuristic);
        let err = "regex".parse::<CompilerBackend>().unwrap_err();
        assert!(err.to_string().contains(ENV_COMPILER));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.index_path, PathBuf::from("data/index/bibliographic.db"));
        assert_eq!(config.compiler, CompilerBackend::Heuristic);
        assert_eq!(config.compile_cache, None);
        assert_eq!(config.facet_top_n, 10);
        assert_eq!(config.subject_hints, 100);
    }
}

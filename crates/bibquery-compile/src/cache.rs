//! Compile cache: exact query text → plan, persisted as append-only JSON lines.
//!
//! The file is read once on open into an in-memory index; later lookups never
//! touch disk. Each entry is appended as one `write` of one line, so concurrent
//! writers interleave whole lines. Duplicate keys are tolerated: the first
//! entry read for a text wins, later appends only fill gaps.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bibquery_plan::QueryPlan;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to open compile cache `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to append to compile cache `{path}`: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query_text: String,
    pub plan: QueryPlan,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

pub struct CompileCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
    file: Mutex<File>,
}

impl CompileCache {
    /// Open (creating if needed) the cache at `path` and load its entries.
    /// Malformed lines are skipped with a warning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|source| CacheError::Open {
                path: path.clone(),
                source,
            })?;

        let mut entries = HashMap::new();
        let reader = BufReader::new(File::open(&path).map_err(|source| CacheError::Open {
            path: path.clone(),
            source,
        })?);
        for (lineno, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(path = %path.display(), line = lineno + 1, error = %err, "unreadable compile cache line");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CacheEntry>(&line) {
                Ok(entry) => {
                    entries.entry(entry.query_text.clone()).or_insert(entry);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), line = lineno + 1, error = %err, "skipping malformed compile cache line");
                }
            }
        }
        tracing::debug!(path = %path.display(), entries = entries.len(), "compile cache loaded");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, query_text: &str) -> Option<CacheEntry> {
        self.entries.read().get(query_text).cloned()
    }

    pub fn put(&self, query_text: &str, plan: &QueryPlan, model: &str) -> Result<(), CacheError> {
        let entry = CacheEntry {
            query_text: query_text.to_string(),
            plan: plan.clone(),
            model: model.to_string(),
            timestamp: Utc::now(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        // Held across the index update so memory agrees with file order.
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .map_err(|source| CacheError::Append {
                path: self.path.clone(),
                source,
            })?;
        self.entries
            .write()
            .entry(entry.query_text.clone())
            .or_insert(entry);
        Ok(())
    }

    /// Swap the append handle for a read-only one so every `put` fails.
    #[cfg(test)]
    pub(crate) fn break_appends(&self) {
        if let Ok(read_only) = File::open(&self.path) {
            *self.file.lock() = read_only;
        }
    }
}

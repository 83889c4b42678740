//! Read-only index connections. One per request; never shared.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::error::ExecutionError;

pub fn open_read_only(path: &Path) -> Result<Connection, ExecutionError> {
    if !path.exists() {
        return Err(ExecutionError::IndexNotFound(path.to_path_buf()));
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    let conn = Connection::open_with_flags(path, flags).map_err(|source| ExecutionError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "opened index read-only");
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_index_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let err = open_read_only(&path).unwrap_err();
        assert!(matches!(err, ExecutionError::IndexNotFound(p) if p == path));
    }

    #[test]
    fn connection_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        crate::fixture::create_index(&path).unwrap();

        let conn = open_read_only(&path).unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 0);
        assert!(conn.execute("INSERT INTO records (mms_id) VALUES ('x')", []).is_err());
    }
}

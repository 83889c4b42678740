//! Index schema contract.
//!
//! The index is built by an external ingestion pipeline; the DDL here is the
//! contract the adapter compiles against and what fixtures are created from.

use rusqlite::Connection;

/// Logical tables a filter can join. Ordering is the join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Imprints,
    Languages,
    Titles,
    Subjects,
    Agents,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Imprints => "imprints",
            Self::Languages => "languages",
            Self::Titles => "titles",
            Self::Subjects => "subjects",
            Self::Agents => "agents",
        }
    }

    /// Columns selected when the table is joined. Only what evidence
    /// extraction reads.
    pub const fn evidence_columns(self) -> &'static [&'static str] {
        match self {
            Self::Imprints => &[
                "id",
                "occurrence",
                "source_tags",
                "date_start",
                "date_end",
                "date_confidence",
                "place_norm",
                "place_confidence",
                "publisher_norm",
                "publisher_confidence",
                "country_code",
                "country_name",
            ],
            Self::Languages => &["id", "code", "source"],
            Self::Titles => &["id", "value", "source"],
            Self::Subjects => &["id", "value", "source"],
            Self::Agents => &[
                "id",
                "agent_raw",
                "agent_type",
                "agent_norm",
                "agent_confidence",
                "role_norm",
                "role_confidence",
                "provenance_json",
            ],
        }
    }
}

/// Result-column alias of `table.column` in generated SQL.
pub fn column_alias(table: Table, column: &str) -> String {
    format!("{}_{column}", table.name())
}

pub const INDEX_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY,
    mms_id TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS imprints (
    id INTEGER PRIMARY KEY,
    record_id INTEGER NOT NULL REFERENCES records(id),
    occurrence INTEGER NOT NULL DEFAULT 0,
    source_tags TEXT,
    date_raw TEXT,
    date_start INTEGER,
    date_end INTEGER,
    date_confidence REAL,
    date_method TEXT,
    place_raw TEXT,
    place_norm TEXT,
    place_confidence REAL,
    place_method TEXT,
    publisher_raw TEXT,
    publisher_norm TEXT,
    publisher_confidence REAL,
    publisher_method TEXT,
    country_code TEXT,
    country_name TEXT
);
CREATE INDEX IF NOT EXISTS idx_imprints_record ON imprints(record_id);
CREATE INDEX IF NOT EXISTS idx_imprints_publisher_norm ON imprints(publisher_norm);
CREATE INDEX IF NOT EXISTS idx_imprints_place_norm ON imprints(place_norm);
CREATE INDEX IF NOT EXISTS idx_imprints_dates ON imprints(date_start, date_end);

CREATE TABLE IF NOT EXISTS languages (
    id INTEGER PRIMARY KEY,
    record_id INTEGER NOT NULL REFERENCES records(id),
    code TEXT NOT NULL,
    source TEXT
);
CREATE INDEX IF NOT EXISTS idx_languages_record ON languages(record_id);
CREATE INDEX IF NOT EXISTS idx_languages_code ON languages(code);

CREATE TABLE IF NOT EXISTS titles (
    id INTEGER PRIMARY KEY,
    record_id INTEGER NOT NULL REFERENCES records(id),
    title_type TEXT NOT NULL DEFAULT 'main',
    value TEXT NOT NULL,
    source TEXT
);
CREATE INDEX IF NOT EXISTS idx_titles_record ON titles(record_id);
CREATE VIRTUAL TABLE IF NOT EXISTS titles_fts USING fts5(value, content='titles', content_rowid='id');
CREATE TRIGGER IF NOT EXISTS titles_fts_insert AFTER INSERT ON titles BEGIN
    INSERT INTO titles_fts(rowid, value) VALUES (new.id, new.value);
END;

CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY,
    record_id INTEGER NOT NULL REFERENCES records(id),
    value TEXT NOT NULL,
    source_tag TEXT,
    scheme TEXT,
    source TEXT
);
CREATE INDEX IF NOT EXISTS idx_subjects_record ON subjects(record_id);
CREATE VIRTUAL TABLE IF NOT EXISTS subjects_fts USING fts5(value, content='subjects', content_rowid='id');
CREATE TRIGGER IF NOT EXISTS subjects_fts_insert AFTER INSERT ON subjects BEGIN
    INSERT INTO subjects_fts(rowid, value) VALUES (new.id, new.value);
END;

CREATE TABLE IF NOT EXISTS agents (
    id INTEGER PRIMARY KEY,
    record_id INTEGER NOT NULL REFERENCES records(id),
    agent_index INTEGER NOT NULL DEFAULT 0,
    agent_raw TEXT NOT NULL,
    agent_type TEXT,
    role_raw TEXT,
    agent_norm TEXT,
    agent_confidence REAL,
    agent_method TEXT,
    role_norm TEXT,
    role_confidence REAL,
    role_method TEXT,
    provenance_json TEXT
);
CREATE INDEX IF NOT EXISTS idx_agents_record ON agents(record_id);
CREATE INDEX IF NOT EXISTS idx_agents_norm ON agents(agent_norm);
"#;

pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(INDEX_SCHEMA_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        // Idempotent.
        create_schema(&conn).unwrap();

        for table in ["records", "imprints", "languages", "titles", "subjects", "agents", "titles_fts", "subjects_fts"] {
            let n: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(n, 1, "{table}");
        }
    }

    #[test]
    fn aliases_are_table_prefixed() {
        assert_eq!(column_alias(Table::Imprints, "date_start"), "imprints_date_start");
        assert!(Table::Imprints < Table::Agents);
    }
}

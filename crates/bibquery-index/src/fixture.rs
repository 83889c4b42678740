//! Fixture indexes for tests.
//!
//! Rows are written the way the ingestion pipeline writes them: raw values
//! alongside normalized match keys, MARC provenance as JSON.

use std::path::Path;

use rusqlite::{params, Connection};

use bibquery_plan::normalize_match_key;

use crate::schema::create_schema;

#[derive(Debug, Clone)]
pub struct AgentFixture {
    pub raw: String,
    pub role: String,
    pub agent_type: String,
    pub tag: String,
}

impl AgentFixture {
    pub fn new(raw: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            role: role.into(),
            agent_type: "personal".to_string(),
            tag: "700".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordFixture {
    pub mms_id: String,
    pub publisher: Option<String>,
    pub place: Option<String>,
    pub country: Option<(String, String)>,
    pub years: Option<(i32, i32)>,
    pub languages: Vec<String>,
    pub titles: Vec<String>,
    pub subjects: Vec<String>,
    pub agents: Vec<AgentFixture>,
}

impl RecordFixture {
    pub fn new(mms_id: impl Into<String>) -> Self {
        Self {
            mms_id: mms_id.into(),
            ..Self::default()
        }
    }

    pub fn publisher(mut self, raw: &str) -> Self {
        self.publisher = Some(raw.to_string());
        self
    }

    pub fn place(mut self, raw: &str) -> Self {
        self.place = Some(raw.to_string());
        self
    }

    pub fn country(mut self, code: &str, name: &str) -> Self {
        self.country = Some((code.to_string(), name.to_string()));
        self
    }

    pub fn years(mut self, start: i32, end: i32) -> Self {
        self.years = Some((start, end));
        self
    }

    pub fn language(mut self, code: &str) -> Self {
        self.languages.push(code.to_string());
        self
    }

    pub fn title(mut self, value: &str) -> Self {
        self.titles.push(value.to_string());
        self
    }

    pub fn subject(mut self, value: &str) -> Self {
        self.subjects.push(value.to_string());
        self
    }

    pub fn agent(mut self, agent: AgentFixture) -> Self {
        self.agents.push(agent);
        self
    }
}

/// Insert one record with its imprint, languages, titles, subjects and agents.
pub fn insert_record(conn: &Connection, record: &RecordFixture) -> rusqlite::Result<i64> {
    conn.execute("INSERT INTO records (mms_id) VALUES (?1)", [&record.mms_id])?;
    let record_id = conn.last_insert_rowid();

    let date_raw = record.years.map(|(s, e)| {
        if s == e {
            s.to_string()
        } else {
            format!("{s}-{e}")
        }
    });
    conn.execute(
        "INSERT INTO imprints (
            record_id, occurrence, source_tags, date_raw, date_start, date_end, date_confidence,
            date_method, place_raw, place_norm, place_confidence, place_method, publisher_raw,
            publisher_norm, publisher_confidence, publisher_method, country_code, country_name
         ) VALUES (?1, 0, '[\"264\"]', ?2, ?3, ?4, 0.95, 'fixture', ?5, ?6, 0.9, 'fixture', ?7, ?8, 0.9, 'fixture', ?9, ?10)",
        params![
            record_id,
            date_raw,
            record.years.map(|(s, _)| s),
            record.years.map(|(_, e)| e),
            record.place,
            record.place.as_deref().map(normalize_match_key),
            record.publisher,
            record.publisher.as_deref().map(normalize_match_key),
            record.country.as_ref().map(|(code, _)| code.clone()),
            record.country.as_ref().map(|(_, name)| name.clone()),
        ],
    )?;

    for code in &record.languages {
        conn.execute(
            "INSERT INTO languages (record_id, code, source) VALUES (?1, ?2, '041')",
            params![record_id, code],
        )?;
    }
    for (occurrence, value) in record.titles.iter().enumerate() {
        let source = format!("{{\"tag\": \"245\", \"occurrence\": {occurrence}}}");
        conn.execute(
            "INSERT INTO titles (record_id, title_type, value, source) VALUES (?1, 'main', ?2, ?3)",
            params![record_id, value, source],
        )?;
    }
    for (occurrence, value) in record.subjects.iter().enumerate() {
        let source = format!("{{\"tag\": \"650\", \"occurrence\": {occurrence}}}");
        conn.execute(
            "INSERT INTO subjects (record_id, value, source_tag, scheme, source) VALUES (?1, ?2, '650', 'lcsh', ?3)",
            params![record_id, value, source],
        )?;
    }
    for (index, agent) in record.agents.iter().enumerate() {
        let provenance = format!("[{{\"tag\": \"{}\", \"occurrence\": {index}}}]", agent.tag);
        conn.execute(
            "INSERT INTO agents (
                record_id, agent_index, agent_raw, agent_type, role_raw, agent_norm,
                agent_confidence, agent_method, role_norm, role_confidence, role_method, provenance_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0.85, 'fixture', ?7, 0.8, 'fixture', ?8)",
            params![
                record_id,
                index as i64,
                agent.raw,
                agent.agent_type,
                agent.role,
                normalize_match_key(&agent.raw),
                agent.role.to_lowercase(),
                provenance,
            ],
        )?;
    }
    Ok(record_id)
}

/// Create an empty index at `path`.
pub fn create_index(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Six records. Four have publisher "X" and an imprint date within
/// 1500–1599, including both boundary years. 990005 is "X" in 1600 and
/// 990006 is another publisher in range.
pub fn sample_records() -> Vec<RecordFixture> {
    vec![
        RecordFixture::new("990001")
            .publisher("X")
            .place("Venice")
            .country("it", "Italy")
            .years(1500, 1500)
            .language("lat")
            .title("De alchimia opuscula")
            .subject("Alchemy -- Early works to 1800")
            .agent(AgentFixture::new("Manutius, Aldus", "Printer")),
        RecordFixture::new("990002")
            .publisher("[X]")
            .place("[Venice]")
            .country("it", "Italy")
            .years(1550, 1550)
            .language("lat")
            .title("Opus alchemicum")
            .subject("Alchemy -- Early works to 1800"),
        RecordFixture::new("990003")
            .publisher("X.")
            .place("Paris")
            .country("fr", "France")
            .years(1599, 1599)
            .language("fre")
            .title("Traicté de la cabale")
            .subject("Cabala"),
        RecordFixture::new("990004")
            .publisher("X")
            .place("Venice")
            .country("it", "Italy")
            .years(1520, 1530)
            .language("heb")
            .title("Sefer ha-shorashim")
            .subject("Alchemy -- Early works to 1800")
            .agent(AgentFixture::new("Bomberg, Daniel", "Printer")),
        RecordFixture::new("990005")
            .publisher("X")
            .place("Paris")
            .country("fr", "France")
            .years(1600, 1600)
            .language("lat")
            .title("Cabala denudata")
            .subject("Cabala"),
        RecordFixture::new("990006")
            .publisher("Y")
            .place("Amsterdam")
            .country("ne", "Netherlands")
            .years(1550, 1550)
            .language("heb")
            .title("Dikduk")
            .subject("Hebrew language -- Grammar")
            .agent(AgentFixture::new("Athias, Joseph", "Printer")),
    ]
}

fn populate(conn: &Connection) -> rusqlite::Result<()> {
    create_schema(conn)?;
    for record in sample_records() {
        insert_record(conn, &record)?;
    }
    Ok(())
}

/// In-memory index holding [`sample_records`].
pub fn sample_index() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    populate(&conn)?;
    Ok(conn)
}

/// On-disk index at `path` holding [`sample_records`].
pub fn sample_index_at(path: &Path) -> rusqlite::Result<()> {
    let conn = Connection::open(path)?;
    populate(&conn)
}

//! SQLite paper store.
//!
//! Papers live in a `papers` table keyed by uid. Author names are normalized
//! into an `authors` table and linked through `paper_authors`, whose
//! `position` column preserves byline order. Keywords are stored as a JSON
//! array.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::debug;

use super::{PaperFilter, PaperStore, StorageError, StorageResult};
use crate::models::Paper;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS papers (
    uid        TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    abstract   TEXT NOT NULL DEFAULT '',
    session    TEXT,
    decision   TEXT,
    topic      TEXT,
    keywords   TEXT NOT NULL DEFAULT '[]',
    award      TEXT,
    url        TEXT,
    year       INTEGER NOT NULL,
    conference TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS authors (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    fullname TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS paper_authors (
    paper_uid TEXT NOT NULL REFERENCES papers(uid) ON DELETE CASCADE,
    author_id INTEGER NOT NULL REFERENCES authors(id),
    position  INTEGER NOT NULL,
    PRIMARY KEY (paper_uid, position)
);
CREATE INDEX IF NOT EXISTS idx_papers_year ON papers(year);
CREATE INDEX IF NOT EXISTS idx_papers_conference ON papers(conference);
CREATE INDEX IF NOT EXISTS idx_paper_authors_author ON paper_authors(author_id);
";

const PAPER_COLUMNS: &str =
    "uid, title, abstract, session, decision, topic, keywords, award, url, year, conference";

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::QueryError(e.to_string())
    }
}

/// SQLite-backed [`PaperStore`].
pub struct SqlitePaperStore {
    conn: Mutex<Connection>,
}

impl SqlitePaperStore {
    /// Open (or create) the database at `path` and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StorageError::ConnectionError(format!("{}: {}", path.display(), e))
        })?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Build a paper from a row selected with [`PAPER_COLUMNS`]; authors are
    /// filled in separately.
    fn row_to_paper(row: &Row<'_>) -> rusqlite::Result<(Paper, String)> {
        let keywords: String = row.get(6)?;
        let paper = Paper {
            uid: row.get(0)?,
            title: row.get(1)?,
            abstract_text: row.get(2)?,
            authors: Vec::new(),
            session: row.get(3)?,
            decision: row.get(4)?,
            topic: row.get(5)?,
            keywords: Vec::new(),
            award: row.get(7)?,
            url: row.get(8)?,
            year: row.get(9)?,
            conference: row.get(10)?,
        };
        Ok((paper, keywords))
    }

    fn decode_keywords(raw: &str) -> StorageResult<Vec<String>> {
        serde_json::from_str(raw).map_err(|e| StorageError::SerializationError(e.to_string()))
    }

    fn load_authors(conn: &Connection, uid: &str) -> StorageResult<Vec<String>> {
        let mut stmt = conn.prepare_cached(
            "SELECT a.fullname FROM paper_authors pa
             JOIN authors a ON a.id = pa.author_id
             WHERE pa.paper_uid = ?1
             ORDER BY pa.position",
        )?;
        let authors = stmt
            .query_map(params![uid], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(authors)
    }

    fn hydrate(conn: &Connection, rows: Vec<(Paper, String)>) -> StorageResult<Vec<Paper>> {
        rows.into_iter()
            .map(|(mut paper, keywords)| {
                paper.keywords = Self::decode_keywords(&keywords)?;
                paper.authors = Self::load_authors(conn, &paper.uid)?;
                Ok(paper)
            })
            .collect()
    }
}

#[async_trait]
impl PaperStore for SqlitePaperStore {
    async fn initialize(&self) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    async fn insert_paper(&self, paper: &Paper) -> StorageResult<()> {
        let keywords = serde_json::to_string(&paper.keywords)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let exists: bool = tx
            .query_row("SELECT 1 FROM papers WHERE uid = ?1", params![paper.uid], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if exists {
            return Err(StorageError::DuplicateEntry(paper.uid.clone()));
        }

        tx.execute(
            "INSERT INTO papers (uid, title, abstract, session, decision, topic, keywords, award, url, year, conference)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                paper.uid,
                paper.title,
                paper.abstract_text,
                paper.session,
                paper.decision,
                paper.topic,
                keywords,
                paper.award,
                paper.url,
                paper.year,
                paper.conference,
            ],
        )?;

        for (position, name) in paper.authors.iter().enumerate() {
            tx.execute("INSERT OR IGNORE INTO authors (fullname) VALUES (?1)", params![name])?;
            let author_id: i64 = tx.query_row(
                "SELECT id FROM authors WHERE fullname = ?1",
                params![name],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO paper_authors (paper_uid, author_id, position) VALUES (?1, ?2, ?3)",
                params![paper.uid, author_id, position as i64],
            )?;
        }

        tx.commit()?;
        debug!(uid = %paper.uid, authors = paper.authors.len(), "inserted paper");
        Ok(())
    }

    async fn exists(&self, uid: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().await;
        let found = conn
            .query_row("SELECT 1 FROM papers WHERE uid = ?1", params![uid], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    async fn get_paper(&self, uid: &str) -> StorageResult<Paper> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM papers WHERE uid = ?1", PAPER_COLUMNS),
                params![uid],
                Self::row_to_paper,
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(format!("paper {}", uid)))?;

        Self::hydrate(&conn, vec![row])?
            .pop()
            .ok_or_else(|| StorageError::NotFound(format!("paper {}", uid)))
    }

    async fn get_authors(&self, uid: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().await;
        Self::load_authors(&conn, uid)
    }

    async fn search_papers(&self, filter: &PaperFilter) -> StorageResult<Vec<Paper>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(keyword) = filter.keyword.as_deref().filter(|k| !k.trim().is_empty()) {
            clauses.push("(LOWER(title) LIKE ? ESCAPE '\\' OR LOWER(abstract) LIKE ? ESCAPE '\\')");
            let pattern = contains_pattern(keyword);
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }
        if let Some(session) = &filter.session {
            clauses.push("session = ?");
            values.push(Value::Text(session.clone()));
        }
        if let Some(conference) = &filter.conference {
            clauses.push("LOWER(conference) = LOWER(?)");
            values.push(Value::Text(conference.clone()));
        }
        if let Some(year) = filter.year {
            clauses.push("year = ?");
            values.push(Value::Integer(year as i64));
        }

        let mut sql = format!("SELECT {} FROM papers", PAPER_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY year DESC, title ASC LIMIT ?");
        values.push(Value::Integer(filter.limit as i64));

        let conn = self.conn.lock().await;
        let rows = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), Self::row_to_paper)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        Self::hydrate(&conn, rows)
    }

    async fn search_authors(&self, name: &str, limit: usize) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT fullname FROM authors WHERE LOWER(fullname) LIKE ?1 ESCAPE '\\' \
             ORDER BY fullname LIMIT ?2",
        )?;
        let pattern = contains_pattern(name);
        let names = stmt
            .query_map(params![pattern, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    async fn list_uids(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT uid FROM papers ORDER BY uid")?;
        let uids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(uids)
    }

    async fn count_papers(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Lowercased substring pattern for `LIKE .. ESCAPE '\'`, with the wildcards
/// in `text` matched literally.
fn contains_pattern(text: &str) -> String {
    let mut pattern = String::from("%");
    for c in text.trim().to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(uid: &str, title: &str, year: i32, authors: &[&str]) -> Paper {
        Paper {
            uid: uid.to_string(),
            title: title.to_string(),
            abstract_text: format!("Abstract of {}", title),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            session: Some("Poster Session 1".to_string()),
            decision: Some("Accept (poster)".to_string()),
            topic: Some("Deep Learning".to_string()),
            keywords: vec!["graphs".to_string(), "gnn".to_string()],
            award: None,
            url: Some(format!("https://example.org/{}", uid)),
            year,
            conference: "NeurIPS".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let store = SqlitePaperStore::in_memory().unwrap();
        let original = paper("p1", "Graph Attention", 2025, &["Zed", "Amy", "Bob"]);
        store.insert_paper(&original).await.unwrap();

        let loaded = store.get_paper("p1").await.unwrap();
        assert_eq!(loaded, original);
        // Byline order survives even though names are not alphabetical
        assert_eq!(store.get_authors("p1").await.unwrap(), vec!["Zed", "Amy", "Bob"]);
    }

    #[tokio::test]
    async fn test_duplicate_uid_rejected() {
        let store = SqlitePaperStore::in_memory().unwrap();
        store.insert_paper(&paper("p1", "A", 2025, &["X"])).await.unwrap();

        let err = store.insert_paper(&paper("p1", "B", 2025, &["Y"])).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEntry(uid) if uid == "p1"));
        assert_eq!(store.count_papers().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_paper() {
        let store = SqlitePaperStore::in_memory().unwrap();
        assert!(matches!(
            store.get_paper("nope").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_shared_authors_are_deduplicated() {
        let store = SqlitePaperStore::in_memory().unwrap();
        store.insert_paper(&paper("p1", "A", 2025, &["Ada Lovelace"])).await.unwrap();
        store
            .insert_paper(&paper("p2", "B", 2024, &["Ada Lovelace", "Grace Hopper"]))
            .await
            .unwrap();

        let names = store.search_authors("ada", 10).await.unwrap();
        assert_eq!(names, vec!["Ada Lovelace"]);
        assert_eq!(store.get_authors("p2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_papers_filters() {
        let store = SqlitePaperStore::in_memory().unwrap();
        store.insert_paper(&paper("p1", "Graph Transformers", 2025, &["A"])).await.unwrap();
        store.insert_paper(&paper("p2", "Diffusion Models", 2025, &["B"])).await.unwrap();
        store.insert_paper(&paper("p3", "Graph Kernels", 2023, &["C"])).await.unwrap();

        let hits = store.search_papers(&PaperFilter::keyword("graph")).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].uid, "p1"); // newest first

        let filter = PaperFilter {
            keyword: Some("GRAPH".to_string()),
            year: Some(2023),
            ..PaperFilter::default()
        };
        let hits = store.search_papers(&filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uid, "p3");

        let filter = PaperFilter {
            conference: Some("neurips".to_string()),
            limit: 1,
            ..PaperFilter::default()
        };
        assert_eq!(store.search_papers(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_keyword_wildcards_match_literally() {
        let store = SqlitePaperStore::in_memory().unwrap();
        store.insert_paper(&paper("p1", "Graph Transformers", 2025, &["Ada_King"])).await.unwrap();
        store.insert_paper(&paper("p2", "100% Sparse Attention", 2025, &["Bob"])).await.unwrap();

        let hits = store.search_papers(&PaperFilter::keyword("%")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uid, "p2");

        assert!(store.search_papers(&PaperFilter::keyword("graph_")).await.unwrap().is_empty());
        assert_eq!(store.search_authors("_", 10).await.unwrap(), vec!["Ada_King"]);
    }

    #[tokio::test]
    async fn test_get_paper_round_trips_authors_in_order() {
        let store = SqlitePaperStore::in_memory().unwrap();
        store
            .insert_paper(&paper("p1", "A", 2025, &["Grace Hopper", "Ada Lovelace"]))
            .await
            .unwrap();

        let stored = store.get_paper("p1").await.unwrap();
        assert_eq!(stored.authors, vec!["Grace Hopper", "Ada Lovelace"]);
        assert_eq!(store.search_papers(&PaperFilter::keyword("a")).await.unwrap()[0].authors.len(), 2);
    }

    #[tokio::test]
    async fn test_list_uids_and_count() {
        let store = SqlitePaperStore::in_memory().unwrap();
        store.insert_paper(&paper("b", "B", 2025, &[])).await.unwrap();
        store.insert_paper(&paper("a", "A", 2025, &[])).await.unwrap();

        assert_eq!(store.list_uids().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.count_papers().await.unwrap(), 2);
        store.initialize().await.unwrap();
        assert_eq!(store.count_papers().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers.db");
        {
            let store = SqlitePaperStore::open(&path).unwrap();
            store.insert_paper(&paper("p1", "A", 2025, &["X"])).await.unwrap();
        }
        let store = SqlitePaperStore::open(&path).unwrap();
        assert!(store.exists("p1").await.unwrap());
    }
}

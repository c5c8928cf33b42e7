use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use super::{format_timestamp, now, parse_timestamp, Document, DocumentId, DocumentStore};
use crate::db::{migrate, Db};
use crate::error::{DocAnalyzerError, Result};

const SELECT_DOCUMENT: &str =
    "SELECT id, content, topic, created_at, updated_at FROM documents";

/// SQLite-backed document store.
///
/// Each operation opens its own connection on the blocking pool and runs as a
/// single statement or transaction, so per-record writes are atomic.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    db: Db,
}

impl SqliteDocumentStore {
    /// Wrap an already-migrated database.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Run pending migrations, then wrap the database.
    pub async fn open(db: Db, migrations_dir: &Path) -> Result<Self> {
        let migrations_dir = migrations_dir.to_path_buf();
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await?;
        Ok(Self::new(db))
    }
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_document(row: &Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        content: row.get(1)?,
        topic: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
        updated_at: timestamp_column(row, 4)?,
    })
}

fn fetch_document(conn: &Connection, id: DocumentId) -> Result<Option<Document>> {
    let doc = conn
        .query_row(&format!("{} WHERE id = ?1", SELECT_DOCUMENT), params![id], row_to_document)
        .optional()?;
    Ok(doc)
}

fn document_exists(conn: &Connection, id: DocumentId) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn create(&self, content: String, topic: Option<String>) -> Result<DocumentId> {
        let ts = format_timestamp(&now());
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO documents (content, topic, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?3)",
                    params![content, topic, ts],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    async fn get(&self, id: DocumentId) -> Result<Document> {
        self.db
            .with_connection(move |conn| {
                fetch_document(conn, id)?.ok_or(DocAnalyzerError::NotFound(id))
            })
            .await
    }

    async fn list(&self) -> Result<Vec<Document>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(&format!("{} ORDER BY id", SELECT_DOCUMENT))?;
                let docs = stmt
                    .query_map([], row_to_document)?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(docs)
            })
            .await
    }

    async fn update(
        &self,
        id: DocumentId,
        content: String,
        topic: Option<String>,
    ) -> Result<Document> {
        // MAX() keeps updated_at monotonic if the clock stepped back
        let ts = format_timestamp(&now());
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE documents \
                     SET content = ?2, topic = ?3, updated_at = MAX(?4, updated_at) \
                     WHERE id = ?1",
                    params![id, content, topic, ts],
                )?;
                if changed == 0 {
                    return Err(DocAnalyzerError::NotFound(id));
                }
                let doc = fetch_document(&tx, id)?.ok_or(DocAnalyzerError::NotFound(id))?;
                tx.commit()?;
                Ok(doc)
            })
            .await
    }

    async fn delete(&self, id: DocumentId) -> Result<()> {
        self.db
            .with_connection(move |conn| {
                let changed = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
                if changed == 0 {
                    return Err(DocAnalyzerError::NotFound(id));
                }
                Ok(())
            })
            .await
    }

    async fn set_topic_if_untagged(&self, id: DocumentId, topic: String) -> Result<bool> {
        let ts = format_timestamp(&now());
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE documents \
                     SET topic = ?2, updated_at = MAX(?3, updated_at) \
                     WHERE id = ?1 AND (topic IS NULL OR topic = '')",
                    params![id, topic, ts],
                )?;
                if changed == 0 && !document_exists(&tx, id)? {
                    return Err(DocAnalyzerError::NotFound(id));
                }
                tx.commit()?;
                Ok(changed > 0)
            })
            .await
    }
}

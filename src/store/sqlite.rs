//! SQLite [`Store`] implementation.
//!
//! Documents, chunks (with embedding BLOBs), and session turns live in one
//! WAL-mode database. `commit_indexed` and `delete_document` run inside
//! transactions so a document's chunk set appears and disappears
//! atomically.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{Chunk, Document, DocumentStatus, Role, Turn};

use super::{EmbeddingRecord, Store};

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and run the
    /// schema migrations.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Create the schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            raw_text TEXT NOT NULL,
            page_count INTEGER NOT NULL,
            char_count INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            status TEXT NOT NULL,
            failure_reason TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            tenant_id TEXT NOT NULL,
            sequence_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            char_start INTEGER NOT NULL,
            char_end INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(document_id, sequence_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            cited_document_ids TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(tenant_id, session_id, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    let status_str: String = row.get("status");
    Document {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        filename: row.get("filename"),
        raw_text: row.get("raw_text"),
        page_count: row.get("page_count"),
        char_count: row.get("char_count"),
        content_hash: row.get("content_hash"),
        uploaded_at: row.get("uploaded_at"),
        status: DocumentStatus::parse(&status_str).unwrap_or(DocumentStatus::Failed),
        failure_reason: row.get("failure_reason"),
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let blob: Vec<u8> = row.get("embedding");
    let char_start: i64 = row.get("char_start");
    let char_end: i64 = row.get("char_end");
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        tenant_id: row.get("tenant_id"),
        sequence_index: row.get("sequence_index"),
        text: row.get("text"),
        char_start: char_start as usize,
        char_end: char_end as usize,
        embedding: blob_to_vec(&blob),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn put_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO documents
                (id, tenant_id, filename, raw_text, page_count, char_count,
                 content_hash, uploaded_at, status, failure_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.tenant_id)
        .bind(&doc.filename)
        .bind(&doc.raw_text)
        .bind(doc.page_count)
        .bind(doc.char_count)
        .bind(&doc.content_hash)
        .bind(doc.uploaded_at)
        .bind(doc.status.as_str())
        .bind(&doc.failure_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn list_documents(&self, tenant_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE tenant_id = ? AND status != 'deleted' ORDER BY rowid",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn commit_indexed(&self, document_id: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, document_id, tenant_id, sequence_index, text,
                     char_start, char_end, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.tenant_id)
            .bind(chunk.sequence_index)
            .bind(&chunk.text)
            .bind(chunk.char_start as i64)
            .bind(chunk.char_end as i64)
            .bind(vec_to_blob(&chunk.embedding))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE documents SET status = 'indexed', failure_reason = NULL WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_failed(&self, document_id: &str, reason: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET status = 'failed', failure_reason = ? WHERE id = ?")
            .bind(reason)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE documents SET status = 'deleted' WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query("SELECT * FROM chunks WHERE id = ?")
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_chunk))
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows =
            sqlx::query("SELECT * FROM chunks WHERE document_id = ? ORDER BY sequence_index")
                .bind(document_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn all_embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id AS chunk_id, c.document_id, c.tenant_id, c.embedding
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.status = 'indexed'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                EmbeddingRecord {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    tenant_id: row.get("tenant_id"),
                    vector: blob_to_vec(&blob),
                }
            })
            .collect())
    }

    async fn append_turn(&self, tenant_id: &str, session_id: &str, turn: &Turn) -> Result<()> {
        let cited = serde_json::to_string(&turn.cited_document_ids)?;
        sqlx::query(
            r#"
            INSERT INTO turns (tenant_id, session_id, role, text, created_at, cited_document_ids)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tenant_id)
        .bind(session_id)
        .bind(turn.role.as_str())
        .bind(&turn.text)
        .bind(turn.created_at)
        .bind(cited)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_turns(
        &self,
        tenant_id: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Turn>> {
        let rows = sqlx::query(
            r#"
            SELECT role, text, created_at, cited_document_ids
            FROM turns
            WHERE tenant_id = ? AND session_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(tenant_id)
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns: Vec<Turn> = rows
            .iter()
            .map(|row| {
                let role_str: String = row.get("role");
                let cited_json: String = row.get("cited_document_ids");
                Turn {
                    role: Role::parse(&role_str).unwrap_or(Role::User),
                    text: row.get("text"),
                    created_at: row.get("created_at"),
                    cited_document_ids: serde_json::from_str(&cited_json).unwrap_or_default(),
                }
            })
            .collect();
        turns.reverse();
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentStatus;
    use tempfile::TempDir;

    fn doc(id: &str, tenant: &str) -> Document {
        Document {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            filename: format!("{}.pdf", id),
            raw_text: "alpha beta".to_string(),
            page_count: 2,
            char_count: 10,
            content_hash: "h".to_string(),
            uploaded_at: 100,
            status: DocumentStatus::Uploading,
            failure_reason: None,
        }
    }

    fn chunk(id: &str, doc_id: &str, seq: i64) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: doc_id.to_string(),
            tenant_id: "t".to_string(),
            sequence_index: seq,
            text: "alpha beta".to_string(),
            char_start: 0,
            char_end: 10,
            embedding: vec![0.5, -0.25, 0.125],
        }
    }

    async fn open_store(tmp: &TempDir) -> SqliteStore {
        SqliteStore::connect(&tmp.path().join("test.sqlite"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn document_roundtrip_preserves_fields() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.put_document(&doc("d1", "t")).await.unwrap();
        let d = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(d.filename, "d1.pdf");
        assert_eq!(d.status, DocumentStatus::Uploading);
        assert_eq!(d.page_count, 2);

        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_indexed_roundtrips_embeddings() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.put_document(&doc("d1", "t")).await.unwrap();
        store
            .commit_indexed("d1", &[chunk("c1", "d1", 0), chunk("c2", "d1", 1)])
            .await
            .unwrap();

        let chunks = store.chunks_for_document("d1").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].embedding, vec![0.5, -0.25, 0.125]);

        let embeddings = store.all_embeddings().await.unwrap();
        assert_eq!(embeddings.len(), 2);
    }

    #[tokio::test]
    async fn delete_cascades_chunks_in_one_step() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.put_document(&doc("d1", "t")).await.unwrap();
        store
            .commit_indexed("d1", &[chunk("c1", "d1", 0)])
            .await
            .unwrap();

        store.delete_document("d1").await.unwrap();
        assert!(store.chunks_for_document("d1").await.unwrap().is_empty());
        assert!(store.get_chunk("c1").await.unwrap().is_none());
        let d = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(d.status, DocumentStatus::Deleted);
        assert!(store.list_documents("t").await.unwrap().is_empty());

        // idempotent for unknown ids
        store.delete_document("nope").await.unwrap();
    }

    #[tokio::test]
    async fn mark_failed_records_reason() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store.put_document(&doc("d1", "t")).await.unwrap();
        store.mark_failed("d1", "empty document").await.unwrap();

        let d = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(d.status, DocumentStatus::Failed);
        assert_eq!(d.failure_reason.as_deref(), Some("empty document"));
    }

    #[tokio::test]
    async fn turns_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open_store(&tmp).await;
            let turn = Turn {
                role: Role::Assistant,
                text: "hello".to_string(),
                created_at: 42,
                cited_document_ids: vec!["d1".to_string()],
            };
            store.append_turn("t", "s", &turn).await.unwrap();
            store.close().await;
        }

        let store = open_store(&tmp).await;
        let turns = store.recent_turns("t", "s", 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::Assistant);
        assert_eq!(turns[0].cited_document_ids, vec!["d1".to_string()]);
    }
}

//! SQLite-backed [`Store`] implementation.
//!
//! Chunks, their embeddings and their FTS5 rows are written in one
//! transaction together with the file's tracking row, so readers see either
//! the old chunk set or the new one.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use memory_indexer_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use memory_indexer_core::lexical::fts_match_expression;
use memory_indexer_core::models::{Chunk, DocumentClass, IndexedFile};
use memory_indexer_core::store::{ChunkCandidate, Store};

use crate::db::{Database, VectorIndex};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    vector: VectorIndex,
}

impl SqliteStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool.clone(),
            vector: db.vector.clone(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn vector_index(&self) -> &VectorIndex {
        &self.vector
    }

    /// Writer transactions take the write lock up front, so a concurrent
    /// writer waits on the busy timeout instead of failing a lock upgrade.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn vector_search_native(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_path, document_class, text, ordinal,
                   COALESCE(1.0 - vec_distance_cosine(embedding, ?), 0.0) AS score
            FROM chunks
            ORDER BY score DESC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(vec_to_blob(query_vec))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ChunkCandidate> {
                let score: Option<f64> = row.try_get("score")?;
                candidate_from_row(row, score.unwrap_or(0.0))
            })
            .collect()
    }

    async fn vector_search_linear(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ChunkCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source_path, document_class, text, ordinal, embedding
            FROM chunks
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
                candidate_from_row(row, similarity)
            })
            .collect::<Result<Vec<_>>>()?;

        // stable sort keeps rowid order among equal scores
        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);
        Ok(candidates)
    }
}

fn parse_class(row: &SqliteRow) -> Result<DocumentClass> {
    let class: String = row.get("document_class");
    class.parse()
}

fn candidate_from_row(row: &SqliteRow, raw_score: f64) -> Result<ChunkCandidate> {
    Ok(ChunkCandidate {
        chunk_id: row.get("id"),
        source_path: row.get("source_path"),
        document_class: parse_class(row)?,
        text: row.get("text"),
        ordinal: row.get("ordinal"),
        raw_score,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
    let blob: Vec<u8> = row.get("embedding");
    Ok(Chunk {
        chunk_id: row.get("id"),
        source_path: row.get("source_path"),
        document_class: parse_class(row)?,
        text: row.get("text"),
        ordinal: row.get("ordinal"),
        approx_token_count: row.get("approx_token_count"),
        created_at: row.get("created_at"),
        embedding: blob_to_vec(&blob),
    })
}

fn file_from_row(row: &SqliteRow) -> IndexedFile {
    IndexedFile {
        path: row.get("path"),
        content_digest: row.get("content_digest"),
        chunk_count: row.get("chunk_count"),
        last_indexed_at: row.get("last_indexed_at"),
    }
}

const CHUNK_COLUMNS: &str =
    "id, source_path, document_class, text, ordinal, approx_token_count, created_at, embedding";

#[async_trait]
impl Store for SqliteStore {
    async fn get_indexed_file(&self, path: &str) -> Result<Option<IndexedFile>> {
        let row = sqlx::query(
            "SELECT path, content_digest, chunk_count, last_indexed_at FROM indexed_files WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(file_from_row))
    }

    async fn replace_file(&self, file: &IndexedFile, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.begin_write().await?;

        sqlx::query("DELETE FROM chunks_fts WHERE source_path = ?")
            .bind(&file.path)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM chunks WHERE source_path = ?")
            .bind(&file.path)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source_path, document_class, text, ordinal,
                                    approx_token_count, created_at, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.source_path)
            .bind(chunk.document_class.as_str())
            .bind(&chunk.text)
            .bind(chunk.ordinal)
            .bind(chunk.approx_token_count)
            .bind(chunk.created_at)
            .bind(vec_to_blob(&chunk.embedding))
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, source_path, text) VALUES (?, ?, ?)")
                .bind(&chunk.chunk_id)
                .bind(&chunk.source_path)
                .bind(&chunk.text)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO indexed_files (path, content_digest, chunk_count, last_indexed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                content_digest = excluded.content_digest,
                chunk_count = excluded.chunk_count,
                last_indexed_at = excluded.last_indexed_at
            "#,
        )
        .bind(&file.path)
        .bind(&file.content_digest)
        .bind(file.chunk_count)
        .bind(file.last_indexed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<bool> {
        let mut tx = self.begin_write().await?;

        sqlx::query("DELETE FROM chunks_fts WHERE source_path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE source_path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM indexed_files WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(&format!("SELECT {} FROM chunks WHERE id = ?", CHUNK_COLUMNS))
            .bind(chunk_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(chunk_from_row).transpose()
    }

    async fn chunks_for_file(&self, path: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks WHERE source_path = ? ORDER BY ordinal ASC",
            CHUNK_COLUMNS
        ))
        .bind(path)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn list_indexed_files(&self) -> Result<Vec<IndexedFile>> {
        let rows = sqlx::query(
            "SELECT path, content_digest, chunk_count, last_indexed_at FROM indexed_files ORDER BY path ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(file_from_row).collect())
    }

    async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<ChunkCandidate>> {
        let expression = match fts_match_expression(query) {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };

        let rows = sqlx::query(
            r#"
            SELECT c.id AS id, c.source_path AS source_path, c.document_class AS document_class,
                   c.text AS text, c.ordinal AS ordinal, chunks_fts.rank AS rank
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ?
            ORDER BY chunks_fts.rank ASC, c.rowid ASC
            LIMIT ?
            "#,
        )
        .bind(&expression)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                candidate_from_row(row, -rank)
            })
            .collect()
    }

    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>> {
        if query_vec.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        match &self.vector {
            VectorIndex::Native { .. } => self.vector_search_native(query_vec, limit).await,
            VectorIndex::LinearScan => self.vector_search_linear(query_vec, limit).await,
        }
    }

    async fn recent_chunks(&self, since: i64, until: i64) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM chunks
            WHERE created_at >= ? AND created_at <= ?
            ORDER BY created_at DESC, source_path ASC, ordinal ASC
            "#,
            CHUNK_COLUMNS
        ))
        .bind(since)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO index_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

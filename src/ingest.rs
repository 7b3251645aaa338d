//! Indexing pipeline.
//!
//! Coordinates the per-file flow: digest → change check → chunking →
//! embedding → atomic swap. Embeddings for every new chunk are computed
//! before the old chunk set is touched, so a provider failure leaves the
//! previous indexed state in place.
//!
//! # Concurrency
//!
//! - Indexing of one path is serialized by a per-path async mutex.
//! - Different paths proceed in parallel, up to `[indexing] workers`.
//! - Embedding calls share a semaphore with `workers` permits.

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use uuid::Uuid;

use memory_indexer_core::chunk::{validate_params, ChunkWindow, WordWindows};
use memory_indexer_core::digest::{digest, needs_reindex};
use memory_indexer_core::embedding::{check_embeddings, EmbeddingProvider};
use memory_indexer_core::models::{Chunk, DocumentClass, IndexedFile};
use memory_indexer_core::store::{check_model_pin, pin_model, ModelPin, Store};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::error::{IndexError, IndexStage};
use crate::scan::{expand_paths, scan_corpus};
use crate::sqlite_store::SqliteStore;

/// Counts from a batch indexing run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub chunks_written: usize,
    pub files_removed: usize,
    pub failures: Vec<IndexError>,
}

/// What indexing one file did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Digest matched the stored one; nothing was written.
    Unchanged,
    /// The chunk set was replaced. `chunks` may be zero for an empty file.
    Indexed { chunks: usize },
}

impl IndexOutcome {
    pub fn chunks_written(&self) -> usize {
        match self {
            IndexOutcome::Unchanged => 0,
            IndexOutcome::Indexed { chunks } => *chunks,
        }
    }
}

/// Owns the storage and embedding handles used to index files.
pub struct Indexer {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    size_words: usize,
    overlap_words: usize,
    batch_size: usize,
    workers: usize,
    embed_permits: Semaphore,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Indexer {
    pub fn new(config: &Config, store: Arc<dyn Store>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let workers = config.indexing.workers.max(1);
        Self {
            store,
            provider,
            size_words: config.chunking.size_words,
            overlap_words: config.chunking.overlap_words,
            batch_size: config.embedding.batch_size.max(1),
            workers,
            embed_permits: Semaphore::new(workers),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn path_lock(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the map entry for `path` once no other task holds its lock.
    fn release_path_lock(&self, path: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        drop(lock);
        if locks.get(path).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(path);
        }
    }

    /// Number of paths with a live lock entry.
    pub fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Index `text` as the current content of `path`.
    ///
    /// Returns the number of chunks written: `0` when the digest matches the
    /// stored one and `force` is false. In that case the provider is not called.
    pub async fn index_file(&self, path: &str, text: &str, force: bool) -> Result<usize, IndexError> {
        Ok(self.index(path, text, force).await?.chunks_written())
    }

    /// Like [`index_file`](Self::index_file), but tells an unchanged file
    /// apart from one that was re-indexed to zero chunks.
    pub async fn index(&self, path: &str, text: &str, force: bool) -> Result<IndexOutcome, IndexError> {
        if path.trim().is_empty() {
            return Err(IndexError::malformed(path, "empty path"));
        }
        validate_params(self.size_words, self.overlap_words)
            .map_err(|e| IndexError::malformed(path, e.to_string()))?;

        let lock = self.path_lock(path);
        let outcome = {
            let _guard = lock.lock().await;
            self.index_locked(path, text, force).await
        };
        self.release_path_lock(path, lock);
        outcome
    }

    async fn index_locked(&self, path: &str, text: &str, force: bool) -> Result<IndexOutcome, IndexError> {
        let content_digest = digest(text.as_bytes());
        let existing = self
            .store
            .get_indexed_file(path)
            .await
            .map_err(|e| IndexError::storage(path, IndexStage::LoadState, e))?;

        if !force && !needs_reindex(existing.as_ref(), &content_digest) {
            tracing::debug!(path, "unchanged, skipping");
            return Ok(IndexOutcome::Unchanged);
        }

        let windows: Vec<ChunkWindow> = WordWindows::new(text, self.size_words, self.overlap_words)
            .map_err(|e| IndexError::malformed(path, e.to_string()))?
            .collect();

        let pin = if windows.is_empty() {
            None
        } else {
            Some(self.check_pin(path).await?)
        };

        let embeddings = self.embed_windows(path, &windows).await?;

        let now = Utc::now().timestamp();
        let class = DocumentClass::from_path(path);
        let chunks: Vec<Chunk> = windows
            .into_iter()
            .zip(embeddings)
            .map(|(window, embedding)| Chunk {
                chunk_id: Uuid::new_v4().to_string(),
                source_path: path.to_string(),
                document_class: class,
                text: window.text,
                ordinal: window.ordinal,
                approx_token_count: window.word_count as i64,
                created_at: now,
                embedding,
            })
            .collect();

        let file = IndexedFile {
            path: path.to_string(),
            content_digest,
            chunk_count: chunks.len() as i64,
            last_indexed_at: now,
        };

        self.store
            .replace_file(&file, &chunks)
            .await
            .map_err(|e| IndexError::storage(path, IndexStage::Persist, e))?;

        if pin == Some(ModelPin::Unpinned) {
            pin_model(self.store.as_ref(), self.provider.model_name(), self.provider.dims())
                .await
                .map_err(|e| IndexError::storage(path, IndexStage::Persist, e))?;
        }

        tracing::info!(path, chunks = chunks.len(), class = %class, "indexed");
        Ok(IndexOutcome::Indexed {
            chunks: chunks.len(),
        })
    }

    async fn check_pin(&self, path: &str) -> Result<ModelPin, IndexError> {
        let model = self.provider.model_name();
        let dims = self.provider.dims();
        let pin = check_model_pin(self.store.as_ref(), model, dims)
            .await
            .map_err(|e| IndexError::storage(path, IndexStage::LoadState, e))?;

        if let ModelPin::Mismatch {
            model: pinned,
            dims: pinned_dims,
        } = &pin
        {
            return Err(IndexError::malformed(
                path,
                format!(
                    "index was built with {} ({} dims) but provider is {} ({} dims); rebuild required",
                    pinned, pinned_dims, model, dims
                ),
            ));
        }
        Ok(pin)
    }

    async fn embed_windows(
        &self,
        path: &str,
        windows: &[ChunkWindow],
    ) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut embeddings = Vec::with_capacity(windows.len());

        for batch in windows.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|w| w.text.clone()).collect();

            let _permit = self
                .embed_permits
                .acquire()
                .await
                .map_err(|e| IndexError::provider(path, IndexStage::Embed, anyhow!(e)))?;

            let vectors = self
                .provider
                .embed(&texts)
                .await
                .map_err(|e| IndexError::provider(path, IndexStage::Embed, e))?;
            check_embeddings(&vectors, texts.len(), self.provider.dims())
                .map_err(|e| IndexError::provider(path, IndexStage::Embed, e))?;

            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    /// Read a file from disk and index it under its canonical path.
    pub async fn index_path(&self, path: &Path, force: bool) -> Result<IndexOutcome, IndexError> {
        let display = path.display().to_string();
        if display.trim().is_empty() {
            return Err(IndexError::malformed(&display, "empty path"));
        }

        let canonical = path
            .canonicalize()
            .map_err(|e| IndexError::malformed(&display, format!("unreadable: {}", e)))?;
        let key = canonical.to_string_lossy().to_string();

        let bytes = tokio::fs::read(&canonical)
            .await
            .map_err(|e| IndexError::malformed(&key, format!("unreadable: {}", e)))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| IndexError::malformed(&key, "content is not valid UTF-8"))?;

        self.index(&key, &text, force).await
    }

    /// Remove a tracked file's chunks and tracking row.
    pub async fn remove_file(&self, path: &str) -> Result<bool, IndexError> {
        if path.trim().is_empty() {
            return Err(IndexError::malformed(path, "empty path"));
        }
        let lock = self.path_lock(path);
        let removed = {
            let _guard = lock.lock().await;
            self.store.remove_file(path).await
        };
        self.release_path_lock(path, lock);

        let removed = removed.map_err(|e| IndexError::storage(path, IndexStage::Remove, e))?;
        if removed {
            tracing::info!(path, "removed");
        }
        Ok(removed)
    }

    /// Index many files through the worker pool.
    ///
    /// A failure on one file is recorded in the report and does not stop
    /// the others.
    pub async fn index_paths(&self, paths: Vec<PathBuf>, force: bool) -> IndexReport {
        let mut report = IndexReport {
            files_seen: paths.len(),
            ..IndexReport::default()
        };

        let outcomes: Vec<Result<IndexOutcome, IndexError>> = stream::iter(paths)
            .map(|path| async move { self.index_path(&path, force).await })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(IndexOutcome::Unchanged) => report.files_unchanged += 1,
                Ok(IndexOutcome::Indexed { chunks }) => {
                    report.files_indexed += 1;
                    report.chunks_written += chunks;
                }
                Err(e) => {
                    tracing::warn!(path = e.path(), error = %e, "index failed");
                    report.failures.push(e);
                }
            }
        }

        report
    }

    /// Remove tracked files under `root` that are not in `present`.
    pub async fn prune(&self, root: &Path, present: &[PathBuf], report: &mut IndexReport) {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let keep: HashSet<String> = present
            .iter()
            .map(|p| {
                p.canonicalize()
                    .unwrap_or_else(|_| p.clone())
                    .to_string_lossy()
                    .to_string()
            })
            .collect();

        let tracked = match self.store.list_indexed_files().await {
            Ok(files) => files,
            Err(e) => {
                report.failures.push(IndexError::storage(
                    &root.display().to_string(),
                    IndexStage::LoadState,
                    e,
                ));
                return;
            }
        };

        for file in tracked {
            if !Path::new(&file.path).starts_with(&root) || keep.contains(&file.path) {
                continue;
            }
            match self.remove_file(&file.path).await {
                Ok(true) => report.files_removed += 1,
                Ok(false) => {}
                Err(e) => report.failures.push(e),
            }
        }
    }
}

/// Build an [`Indexer`] over the configured SQLite database and provider.
pub async fn open_indexer(config: &Config) -> Result<(db::Database, Indexer)> {
    let database = db::open(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&database));
    let provider = create_provider(&config.embedding)?;
    Ok((database, Indexer::new(config, store, provider)))
}

/// `memidx index`: index explicit paths, or scan `[corpus]` when none are given.
pub async fn run_index(config: &Config, paths: Vec<PathBuf>, force: bool, prune: bool) -> Result<()> {
    let corpus_scan = paths.is_empty();
    if prune && !corpus_scan {
        bail!("--prune only applies to a corpus scan (run without paths)");
    }

    let files = if corpus_scan {
        let corpus = config
            .corpus
            .as_ref()
            .ok_or_else(|| anyhow!("No paths given and [corpus] is not configured"))?;
        scan_corpus(corpus)?
    } else {
        expand_paths(&paths, config.corpus.as_ref())?
    };

    let (database, indexer) = open_indexer(config).await?;
    let mut report = indexer.index_paths(files.clone(), force).await;
    if prune {
        if let Some(corpus) = &config.corpus {
            indexer.prune(&corpus.root, &files, &mut report).await;
        }
    }
    database.close().await;

    println!("index");
    println!("  files seen: {}", report.files_seen);
    println!("  files indexed: {}", report.files_indexed);
    println!("  files unchanged: {}", report.files_unchanged);
    println!("  chunks written: {}", report.chunks_written);
    if prune {
        println!("  files removed: {}", report.files_removed);
    }
    println!("  failures: {}", report.failures.len());

    if report.failures.is_empty() {
        println!("ok");
        return Ok(());
    }

    for failure in &report.failures {
        match std::error::Error::source(failure) {
            Some(source) => eprintln!("  {}: {}", failure, source),
            None => eprintln!("  {}", failure),
        }
    }
    bail!("{} file(s) failed to index", report.failures.len())
}

/// `memidx remove`.
pub async fn run_remove(config: &Config, path: &str) -> Result<()> {
    let key = Path::new(path)
        .canonicalize()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string());

    let (database, indexer) = open_indexer(config).await?;
    let removed = indexer.remove_file(&key).await;
    database.close().await;

    if removed? {
        println!("removed {}", key);
    } else {
        println!("not indexed: {}", key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::embedding::HashProvider;
    use memory_indexer_core::store::memory::InMemoryStore;

    fn indexer(size: usize, overlap: usize) -> Indexer {
        let config = parse_config(&format!(
            "[db]\npath = \"unused\"\n[chunking]\nsize_words = {}\noverlap_words = {}\n",
            size, overlap
        ))
        .unwrap();
        Indexer::new(
            &config,
            Arc::new(InMemoryStore::default()),
            Arc::new(HashProvider::new(32)),
        )
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn test_thousand_words_make_three_chunks() {
        let ix = indexer(400, 80);
        let n = ix.index_file("/m/topics/a.md", &words(1000), false).await.unwrap();
        assert_eq!(n, 3);

        let chunks = ix.store().chunks_for_file("/m/topics/a.md").await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.document_class == DocumentClass::Topic));
        assert_eq!(chunks[2].approx_token_count, 360);
    }

    #[tokio::test]
    async fn test_unchanged_is_skipped_and_force_rewrites() {
        let ix = indexer(10, 2);
        assert_eq!(ix.index_file("/a.md", &words(25), false).await.unwrap(), 3);
        assert_eq!(ix.index_file("/a.md", &words(25), false).await.unwrap(), 0);
        assert_eq!(ix.index_file("/a.md", &words(25), true).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_text_tracks_file_with_no_chunks() {
        let ix = indexer(10, 2);
        assert_eq!(ix.index_file("/empty.md", "   ", false).await.unwrap(), 0);
        let file = ix.store().get_indexed_file("/empty.md").await.unwrap().unwrap();
        assert_eq!(file.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_emptied_file_is_indexed_not_unchanged() {
        let ix = indexer(10, 2);
        assert_eq!(
            ix.index("/a.md", &words(25), false).await.unwrap(),
            IndexOutcome::Indexed { chunks: 3 }
        );
        assert_eq!(
            ix.index("/a.md", "", false).await.unwrap(),
            IndexOutcome::Indexed { chunks: 0 }
        );
        assert!(ix.store().chunks_for_file("/a.md").await.unwrap().is_empty());
        assert_eq!(
            ix.index("/a.md", "", false).await.unwrap(),
            IndexOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn test_path_locks_are_released() {
        let ix = indexer(10, 2);
        ix.index_file("/a.md", "one two three", false).await.unwrap();
        ix.index_file("/b.md", "four five", false).await.unwrap();
        assert_eq!(ix.tracked_locks(), 0);

        ix.remove_file("/a.md").await.unwrap();
        ix.remove_file("/never-indexed.md").await.unwrap();
        assert_eq!(ix.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_empty_path_is_malformed() {
        let ix = indexer(10, 2);
        let err = ix.index_file("", "text", false).await.unwrap_err();
        assert!(matches!(err, IndexError::MalformedInput { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_malformed() {
        let ix = indexer(10, 2);
        let err = ix
            .index_path(Path::new("/definitely/not/here.md"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::MalformedInput { .. }));
    }

    #[tokio::test]
    async fn test_remove_file() {
        let ix = indexer(10, 2);
        ix.index_file("/a.md", "some words here", false).await.unwrap();
        assert!(ix.remove_file("/a.md").await.unwrap());
        assert!(!ix.remove_file("/a.md").await.unwrap());
        assert!(ix.store().chunks_for_file("/a.md").await.unwrap().is_empty());
    }
}

//! Query façade: lexical, vector and hybrid search plus recent-chunk retrieval.
//!
//! [`MemorySearch`] owns the storage and embedding handles. It embeds the
//! query only when the chosen mode needs a vector, verifies the corpus model
//! pin before any vector lookup, and delegates ranking to
//! [`memory_indexer_core::search`].
//!
//! `recent` is a plain time-window filter with no scoring.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use memory_indexer_core::embedding::EmbeddingProvider;
use memory_indexer_core::models::{Chunk, DocumentClass, SearchResult};
use memory_indexer_core::search::{search, SearchMode, SearchParams, SearchRequest};
use memory_indexer_core::store::{check_model_pin, ModelPin, Store};

use crate::config::{Config, RetrievalConfig};
use crate::db;
use crate::embedding::{create_provider, embed_query};
use crate::sqlite_store::SqliteStore;

const SECONDS_PER_DAY: i64 = 86_400;

/// Caller-supplied overrides for one query.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub top_k: Option<usize>,
    pub class: Option<DocumentClass>,
    pub lexical_weight: Option<f64>,
    pub vector_weight: Option<f64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            top_k: None,
            class: None,
            lexical_weight: None,
            vector_weight: None,
        }
    }
}

pub struct MemorySearch {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    retrieval: RetrievalConfig,
    embedding_enabled: bool,
}

impl MemorySearch {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
        retrieval: RetrievalConfig,
        embedding_enabled: bool,
    ) -> Self {
        Self {
            store,
            provider,
            retrieval,
            embedding_enabled,
        }
    }

    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let params = SearchParams {
            top_k: opts.top_k.unwrap_or(self.retrieval.default_top_k),
            lexical_weight: opts.lexical_weight.unwrap_or(self.retrieval.lexical_weight),
            vector_weight: opts.vector_weight.unwrap_or(self.retrieval.vector_weight),
            candidate_multiplier: self.retrieval.candidate_multiplier,
        };
        if params.lexical_weight < 0.0 || params.vector_weight < 0.0 {
            bail!("search weights must be >= 0");
        }
        if opts.mode == SearchMode::Hybrid
            && params.lexical_weight == 0.0
            && params.vector_weight == 0.0
        {
            bail!("lexical and vector weights cannot both be 0");
        }
        let mut req = SearchRequest {
            query,
            query_vec: None,
            mode: opts.mode,
            class: opts.class,
            params,
        };

        let query_vec = if req.needs_query_vector() {
            if !self.embedding_enabled {
                bail!(
                    "Mode '{}' requires embeddings. Set [embedding] provider in config.",
                    opts.mode
                );
            }
            self.verify_model_pin().await?;
            Some(embed_query(self.provider.as_ref(), query).await?)
        } else {
            None
        };
        req.query_vec = query_vec.as_deref();

        let results = search(self.store.as_ref(), &req).await?;
        tracing::debug!(mode = %opts.mode, results = results.len(), "search complete");
        Ok(results)
    }

    async fn verify_model_pin(&self) -> Result<()> {
        let model = self.provider.model_name();
        let dims = self.provider.dims();
        if let ModelPin::Mismatch {
            model: pinned,
            dims: pinned_dims,
        } = check_model_pin(self.store.as_ref(), model, dims).await?
        {
            bail!(
                "index was built with {} ({} dims) but provider is {} ({} dims); rebuild required",
                pinned,
                pinned_dims,
                model,
                dims
            );
        }
        Ok(())
    }

    /// Chunks created within the last `days` days, newest first.
    pub async fn recent(&self, days: u32) -> Result<Vec<Chunk>> {
        self.recent_at(days, Utc::now().timestamp()).await
    }

    /// [`recent`](Self::recent) relative to a fixed `now`.
    pub async fn recent_at(&self, days: u32, now: i64) -> Result<Vec<Chunk>> {
        let since = now - i64::from(days) * SECONDS_PER_DAY;
        self.store.recent_chunks(since, now).await
    }
}

/// Open the database and build a façade from configuration.
pub async fn open_search(config: &Config) -> Result<(db::Database, MemorySearch)> {
    let database = db::open(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&database));
    let provider = create_provider(&config.embedding)?;
    let search = MemorySearch::new(
        store,
        provider,
        config.retrieval.clone(),
        config.embedding.is_enabled(),
    );
    Ok((database, search))
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat.to_string(),
    }
}

fn format_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// `memidx search`.
pub async fn run_search(config: &Config, query: &str, opts: &SearchOptions, json: bool) -> Result<()> {
    let (database, search) = open_search(config).await?;
    let results = search.search(query, opts).await;
    database.close().await;
    let results = results?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for result in &results {
        println!(
            "{}. [{:.3}] {} ({})",
            result.rank, result.score, result.source_path, result.document_class
        );
        println!("    chunk: {}", result.ordinal);
        println!("    excerpt: \"{}\"", excerpt(&result.text, 200));
        println!("    id: {}", result.chunk_id);
        println!();
    }
    Ok(())
}

#[derive(Serialize)]
struct RecentChunk<'a> {
    chunk_id: &'a str,
    source_path: &'a str,
    document_class: DocumentClass,
    ordinal: i64,
    created_at: i64,
    text: &'a str,
}

/// `memidx recent`.
pub async fn run_recent(config: &Config, days: u32, json: bool) -> Result<()> {
    let (database, search) = open_search(config).await?;
    let chunks = search.recent(days).await;
    database.close().await;
    let chunks = chunks?;

    if json {
        let out: Vec<RecentChunk> = chunks
            .iter()
            .map(|c| RecentChunk {
                chunk_id: &c.chunk_id,
                source_path: &c.source_path,
                document_class: c.document_class,
                ordinal: c.ordinal,
                created_at: c.created_at,
                text: &c.text,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if chunks.is_empty() {
        println!("No chunks indexed in the last {} day(s).", days);
        return Ok(());
    }

    for chunk in &chunks {
        println!(
            "{}  {} #{} ({})",
            format_date(chunk.created_at),
            chunk.source_path,
            chunk.ordinal,
            chunk.document_class
        );
        println!("    excerpt: \"{}\"", excerpt(&chunk.text, 160));
        println!("    id: {}", chunk.chunk_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{DisabledProvider, HashProvider};
    use memory_indexer_core::models::Chunk;
    use memory_indexer_core::models::IndexedFile;
    use memory_indexer_core::store::memory::InMemoryStore;
    use memory_indexer_core::store::pin_model;

    fn chunk(path: &str, ordinal: i64, text: &str, created_at: i64, embedding: Vec<f32>) -> Chunk {
        Chunk {
            chunk_id: format!("{}#{}", path, ordinal),
            source_path: path.to_string(),
            document_class: DocumentClass::from_path(path),
            text: text.to_string(),
            ordinal,
            approx_token_count: text.split_whitespace().count() as i64,
            created_at,
            embedding,
        }
    }

    async fn seeded(chunks: Vec<Chunk>) -> Arc<dyn Store> {
        let store = InMemoryStore::default();
        let path = chunks[0].source_path.clone();
        let file = IndexedFile {
            path,
            content_digest: "d".to_string(),
            chunk_count: chunks.len() as i64,
            last_indexed_at: 0,
        };
        store.replace_file(&file, &chunks).await.unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("héllo wörld", 4), "héll…");
        assert_eq!(excerpt("short\ntext", 50), "short text");
    }

    #[tokio::test]
    async fn test_recent_window() {
        let now = 1_000_000;
        let store = seeded(vec![
            chunk("/m/a.md", 0, "new", now - 100, vec![1.0]),
            chunk("/m/a.md", 1, "edge", now - 2 * SECONDS_PER_DAY, vec![1.0]),
            chunk("/m/a.md", 2, "old", now - 3 * SECONDS_PER_DAY, vec![1.0]),
        ])
        .await;
        let search = MemorySearch::new(
            store,
            Arc::new(DisabledProvider),
            RetrievalConfig::default(),
            false,
        );

        let recent = search.recent_at(2, now).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "edge"]);
    }

    #[tokio::test]
    async fn test_vector_mode_requires_enabled_provider() {
        let store = seeded(vec![chunk("/m/a.md", 0, "alpha", 0, vec![1.0])]).await;
        let search = MemorySearch::new(
            store,
            Arc::new(DisabledProvider),
            RetrievalConfig::default(),
            false,
        );
        let opts = SearchOptions::default();
        assert!(search.search("alpha", &opts).await.is_err());

        let lexical = SearchOptions {
            mode: SearchMode::Lexical,
            ..SearchOptions::default()
        };
        let results = search.search("alpha", &lexical).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rank, 1);
    }

    #[tokio::test]
    async fn test_weight_overrides_are_validated() {
        let store = seeded(vec![chunk("/m/a.md", 0, "alpha", 0, vec![1.0])]).await;
        let search = MemorySearch::new(
            store,
            Arc::new(DisabledProvider),
            RetrievalConfig::default(),
            false,
        );

        let both_zero = SearchOptions {
            lexical_weight: Some(0.0),
            vector_weight: Some(0.0),
            ..SearchOptions::default()
        };
        let err = search.search("alpha", &both_zero).await.unwrap_err();
        assert!(err.to_string().contains("cannot both be 0"));

        let negative = SearchOptions {
            mode: SearchMode::Lexical,
            lexical_weight: Some(-1.0),
            ..SearchOptions::default()
        };
        assert!(search.search("alpha", &negative).await.is_err());

        // lexical-only hybrid needs no embeddings
        let lexical_only = SearchOptions {
            lexical_weight: Some(1.0),
            vector_weight: Some(0.0),
            ..SearchOptions::default()
        };
        assert_eq!(search.search("alpha", &lexical_only).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_model_pin_mismatch_blocks_vector_search() {
        let provider = HashProvider::new(8);
        let v = provider.embed(&["alpha".to_string()]).await.unwrap().remove(0);
        let store = seeded(vec![chunk("/m/a.md", 0, "alpha", 0, v)]).await;
        pin_model(store.as_ref(), "other-model", 8).await.unwrap();

        let search = MemorySearch::new(
            store,
            Arc::new(provider),
            RetrievalConfig::default(),
            true,
        );
        let err = search
            .search("alpha", &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rebuild required"));
    }

    #[tokio::test]
    async fn test_hybrid_search_with_hash_provider() {
        let provider = HashProvider::new(64);
        let texts = ["coffee with sam in the morning", "tax paperwork due friday"];
        let vectors = provider
            .embed(&texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
            .await
            .unwrap();
        let store = seeded(vec![
            chunk("/m/daily/d.md", 0, texts[0], 0, vectors[0].clone()),
            chunk("/m/daily/d.md", 1, texts[1], 0, vectors[1].clone()),
        ])
        .await;

        let search = MemorySearch::new(
            store,
            Arc::new(provider),
            RetrievalConfig::default(),
            true,
        );
        let results = search
            .search("morning coffee", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results[0].text, texts[0]);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[0].document_class, DocumentClass::Daily);
    }
}

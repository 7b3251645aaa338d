//! Core data models used throughout the memory indexer.
//!
//! A [`Chunk`] is the atomic retrievable unit; an [`IndexedFile`] tracks the
//! digest of the content its chunk set was built from; a [`SearchResult`] is
//! the ephemeral output of a ranking pass.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Coarse document category derived from a source path.
///
/// Used for post-hoc filtering of search results, never for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentClass {
    /// The assistant's core identity file (`soul.md`).
    Soul,
    /// Long-term distilled memory (`memory.md`).
    Memory,
    /// The user's profile (`user.md`).
    User,
    /// Daily log under a `/daily/` directory.
    Daily,
    /// Topic note under a `/topics/` directory.
    Topic,
    Other,
}

impl DocumentClass {
    /// Derive the class from a path. Core profile files win over directories.
    pub fn from_path(path: &str) -> Self {
        if path.contains("soul.md") {
            DocumentClass::Soul
        } else if path.contains("memory.md") {
            DocumentClass::Memory
        } else if path.contains("user.md") {
            DocumentClass::User
        } else if path.contains("/daily/") {
            DocumentClass::Daily
        } else if path.contains("/topics/") {
            DocumentClass::Topic
        } else {
            DocumentClass::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentClass::Soul => "soul",
            DocumentClass::Memory => "memory",
            DocumentClass::User => "user",
            DocumentClass::Daily => "daily",
            DocumentClass::Topic => "topic",
            DocumentClass::Other => "other",
        }
    }
}

impl fmt::Display for DocumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "soul" => Ok(DocumentClass::Soul),
            "memory" => Ok(DocumentClass::Memory),
            "user" => Ok(DocumentClass::User),
            "daily" => Ok(DocumentClass::Daily),
            "topic" => Ok(DocumentClass::Topic),
            "other" => Ok(DocumentClass::Other),
            other => bail!(
                "Unknown document class: '{}'. Use soul, memory, user, daily, topic, or other.",
                other
            ),
        }
    }
}

/// A bounded, overlapping window of a source document.
///
/// Chunks are created only by the indexing pipeline, in a batch with their
/// siblings, and are destroyed only when their file is re-indexed or removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// UUID assigned at creation.
    pub chunk_id: String,
    /// Path of the owning document.
    pub source_path: String,
    pub document_class: DocumentClass,
    /// Window words joined by single spaces. Never empty.
    pub text: String,
    /// Zero-based position within the source document.
    pub ordinal: i64,
    /// Word count of `text`.
    pub approx_token_count: i64,
    /// Unix seconds at which the owning file was last indexed.
    pub created_at: i64,
    /// Fixed-length embedding; same dimensionality across the corpus.
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
}

/// Tracking row for one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedFile {
    pub path: String,
    /// Lowercase hex SHA-256 of the content the current chunk set came from.
    pub content_digest: String,
    pub chunk_count: i64,
    /// Unix seconds.
    pub last_indexed_at: i64,
}

/// A ranked search hit.
///
/// `score` depends on the producing mode: raw BM25 statistic (lexical),
/// cosine similarity (vector), or the fused weighted sum (hybrid).
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub source_path: String,
    pub document_class: DocumentClass,
    pub text: String,
    pub ordinal: i64,
    pub score: f64,
    /// 1-based rank assigned by the producing ranking pass.
    pub rank: usize,
    /// Normalized lexical component (hybrid mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f64>,
    /// Normalized vector component (hybrid mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
}

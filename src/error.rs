//! Typed failures of the indexing pipeline.
//!
//! Every variant names the file and the pipeline stage that failed, so a
//! caller can decide whether to retry or alert. A failed index never leaves
//! a partially applied chunk set behind.

use std::fmt;

use thiserror::Error;

/// Pipeline stage at which an index operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStage {
    Read,
    LoadState,
    Chunk,
    Embed,
    Persist,
    Remove,
}

impl fmt::Display for IndexStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexStage::Read => "read",
            IndexStage::LoadState => "load-state",
            IndexStage::Chunk => "chunk",
            IndexStage::Embed => "embed",
            IndexStage::Persist => "persist",
            IndexStage::Remove => "remove",
        })
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// Rejected before any storage mutation.
    #[error("malformed input for '{path}': {reason}")]
    MalformedInput { path: String, reason: String },

    /// The embedding provider failed; prior indexed state is untouched.
    #[error("embedding provider failed for '{path}' during {stage}")]
    Provider {
        path: String,
        stage: IndexStage,
        #[source]
        source: anyhow::Error,
    },

    /// The database could not be read or written.
    #[error("storage failed for '{path}' during {stage}")]
    Storage {
        path: String,
        stage: IndexStage,
        #[source]
        source: anyhow::Error,
    },
}

impl IndexError {
    pub fn malformed(path: &str, reason: impl Into<String>) -> Self {
        IndexError::MalformedInput {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn provider(path: &str, stage: IndexStage, source: anyhow::Error) -> Self {
        IndexError::Provider {
            path: path.to_string(),
            stage,
            source,
        }
    }

    pub fn storage(path: &str, stage: IndexStage, source: anyhow::Error) -> Self {
        IndexError::Storage {
            path: path.to_string(),
            stage,
            source,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            IndexError::MalformedInput { path, .. }
            | IndexError::Provider { path, .. }
            | IndexError::Storage { path, .. } => path,
        }
    }

    /// Stage at which the failure happened, if it got past input checks.
    pub fn stage(&self) -> Option<IndexStage> {
        match self {
            IndexError::MalformedInput { .. } => None,
            IndexError::Provider { stage, .. } | IndexError::Storage { stage, .. } => Some(*stage),
        }
    }

    /// Transient provider failures may succeed on the next trigger.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Provider { .. })
    }
}

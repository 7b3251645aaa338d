//! # memory-indexer core
//!
//! Shared, I/O-free logic for the semantic memory indexer: data models,
//! word-window chunking, content digests, the BM25 lexical scorer, the
//! [`store::Store`] abstraction, and the hybrid ranker.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Storage backends
//! and embedding providers live in the `memory-indexer` application crate.

pub mod chunk;
pub mod digest;
pub mod embedding;
pub mod lexical;
pub mod models;
pub mod search;
pub mod store;

//! # memory-indexer
//!
//! A local semantic memory indexer for markdown notes.
//!
//! Notes are split into overlapping word windows, embedded, and stored in
//! SQLite alongside an FTS5 index. Queries run lexical (BM25), vector
//! (cosine) or hybrid (weighted fusion of normalized scores) ranking.
//! Re-indexing is incremental: a file whose content digest is unchanged is
//! skipped without calling the embedding provider.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │  Scanner    │──▶│   Indexer    │──▶│   SQLite   │
//! │ walk+globs  │   │ chunk+embed  │   │ FTS5 + vec │
//! └─────────────┘   └──────────────┘   └─────┬──────┘
//!                                            │
//!                                      ┌─────▼──────┐
//!                                      │   Search   │
//!                                      │ lex/vec/hy │
//!                                      └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! memidx init                          # create database
//! memidx index                         # scan [corpus] and index
//! memidx search "coffee with sam"      # hybrid search
//! memidx recent --days 2               # newest chunks
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Connection and vector backend selection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `Store` implementation |
//! | [`embedding`] | Embedding providers |
//! | [`ingest`] | Indexing pipeline |
//! | [`scan`] | Corpus scanning |
//! | [`search`] | Query façade |
//! | [`error`] | Indexing error taxonomy |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod scan;
pub mod search;
pub mod sqlite_store;
pub mod stats;

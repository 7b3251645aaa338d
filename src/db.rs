//! SQLite connection and vector-capability selection.
//!
//! The vector backend is chosen once, at connect time, from `[vector]`:
//! a pool that loaded the native extension ranks in SQL, otherwise the
//! store scans every embedding in Rust. Both paths sit behind the same
//! [`Store`](memory_indexer_core::store::Store) implementation.

use anyhow::{bail, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::fmt;
use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;

use crate::config::{Config, VectorBackend};
use crate::migrate;

static NATIVE_FALLBACK_WARNING: Once = Once::new();

/// How vector similarity is computed for this connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorIndex {
    /// `vec_distance_cosine` from a loaded SQLite extension.
    Native { extension: String },
    /// Cosine similarity over every stored embedding, computed in Rust.
    LinearScan,
}

impl fmt::Display for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorIndex::Native { extension } => write!(f, "native ({})", extension),
            VectorIndex::LinearScan => f.write_str("linear scan"),
        }
    }
}

/// An open, migrated database.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
    pub vector: VectorIndex,
}

impl Database {
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn base_options(config: &Config) -> Result<SqliteConnectOptions> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }

    Ok(
        SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5)),
    )
}

async fn open_pool(options: SqliteConnectOptions) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

async fn connect_native(config: &Config) -> Result<SqlitePool> {
    let options = base_options(config)?.extension(config.vector.extension.clone());
    let pool = open_pool(options)
        .await
        .with_context(|| format!("failed to load SQLite extension '{}'", config.vector.extension))?;

    // The function must actually be callable, not merely the library loadable.
    let probe: Result<String, sqlx::Error> = sqlx::query_scalar("SELECT vec_version()")
        .fetch_one(&pool)
        .await;
    if let Err(e) = probe {
        pool.close().await;
        bail!(
            "extension '{}' does not provide vector functions: {}",
            config.vector.extension,
            e
        );
    }
    Ok(pool)
}

/// Open the database without running migrations.
pub async fn connect(config: &Config) -> Result<Database> {
    match config.vector.backend {
        VectorBackend::Linear => Ok(Database {
            pool: open_pool(base_options(config)?).await?,
            vector: VectorIndex::LinearScan,
        }),
        VectorBackend::Native => {
            let pool = connect_native(config).await?;
            Ok(Database {
                pool,
                vector: VectorIndex::Native {
                    extension: config.vector.extension.clone(),
                },
            })
        }
        VectorBackend::Auto => match connect_native(config).await {
            Ok(pool) => {
                tracing::debug!(extension = %config.vector.extension, "native vector search enabled");
                Ok(Database {
                    pool,
                    vector: VectorIndex::Native {
                        extension: config.vector.extension.clone(),
                    },
                })
            }
            Err(e) => {
                NATIVE_FALLBACK_WARNING.call_once(|| {
                    tracing::warn!(
                        backend = "linear",
                        error = %format!("{:#}", e),
                        "native vector extension unavailable, using linear-scan similarity"
                    );
                });
                Ok(Database {
                    pool: open_pool(base_options(config)?).await?,
                    vector: VectorIndex::LinearScan,
                })
            }
        },
    }
}

/// Open the database and bring its schema up to date.
pub async fn open(config: &Config) -> Result<Database> {
    let db = connect(config).await?;
    migrate::migrate(&db.pool).await?;
    Ok(db)
}

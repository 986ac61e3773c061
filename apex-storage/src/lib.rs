#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

//! # APEX Storage
//!
//! libSQL storage backend for the APEX pattern-knowledge service.
//!
//! This crate provides:
//! - Connection management for local and in-memory databases
//! - SQL schema creation including the FTS5 index over patterns
//! - CRUD and query operations for patterns and their auxiliary tables
//! - Task, evidence, reflection, and audit persistence
//! - The single-transaction reflection apply
//!
//! ## Example
//!
//! ```no_run
//! use apex_storage::ApexStorage;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = ApexStorage::open("apex.db").await?;
//! storage.initialize_schema().await?;
//! # Ok(())
//! # }
//! ```

use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{debug, info};

use apex_core::error::{Error, Result};

mod audit;
mod metadata;
mod patterns;
mod reflections;
mod schema;
mod tasks;

pub use audit::AntiCandidate;
pub use patterns::{AggregateStats, PatternFilter, PatternOrder, SearchHit};
pub use reflections::{ReflectionApply, TrustWrite, claims_content_hash};
pub use tasks::{TaskQuery, new_task};

/// libSQL storage backend for patterns, tasks, reflections, and audit data.
pub struct ApexStorage {
    #[allow(dead_code, reason = "keeps the Database alive for the life of `conn`")]
    db: Arc<Database>,
    /// A single long-lived connection, shared by every call to
    /// [`ApexStorage::connect`]. For on-disk databases, opening a fresh
    /// connection per call would also work, but for `:memory:` databases
    /// every `sqlite3_open_v2` call gets its own empty database, so the
    /// connection must be kept alive and reused for state to persist.
    conn: Connection,
}

impl ApexStorage {
    /// Open (creating if needed) a local database file.
    pub async fn open(path: &str) -> Result<Self> {
        info!("Opening APEX database at {path}");
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| Error::Storage(format!("failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| Error::Storage(format!("failed to connect: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Open an in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| Error::Storage(format!("failed to open in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| Error::Storage(format!("failed to connect: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get a connection to the database.
    pub(crate) fn connect(&self) -> Result<Connection> {
        Ok(self.conn.clone())
    }

    /// Create all tables, indexes, and the FTS index with its triggers.
    ///
    /// Idempotent: every statement uses IF NOT EXISTS.
    pub async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing APEX schema");
        let conn = self.connect()?;
        for statement in schema::ALL_STATEMENTS {
            conn.execute(statement, ())
                .await
                .map_err(|e| Error::Storage(format!("schema statement failed: {e}")))?;
        }
        conn.execute_batch(schema::CREATE_PATTERNS_FTS_TRIGGERS)
            .await
            .map_err(|e| Error::Storage(format!("fts trigger creation failed: {e}")))?;
        info!("APEX schema ready");
        Ok(())
    }
}

/// Convert an epoch-seconds column into a UTC timestamp.
pub(crate) fn timestamp_from_epoch(epoch: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(epoch, 0).unwrap_or_default()
}

/// Map a libsql error into a storage error.
pub(crate) fn storage_err(context: &str, error: libsql::Error) -> Error {
    Error::Storage(format!("{context}: {error}"))
}

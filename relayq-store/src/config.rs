use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{MessageStore, Result, backends::MemoryStore, backends::SqliteStore};

/// Configuration for the message store.
///
/// SQLite in RON config:
/// ```ron
/// Relayq (
///     store: (
///         type: "Sqlite",
///         path: "/var/lib/relayq/queue.db",
///     ),
/// )
/// ```
///
/// Memory-backed store, for testing:
/// ```ron
/// Relayq (
///     store: (type: "Memory"),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    Sqlite {
        #[serde(default = "default_path")]
        path: PathBuf,
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
    Memory,
}

fn default_path() -> PathBuf {
    PathBuf::from("/var/lib/relayq/queue.db")
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialised.
    pub async fn open(&self) -> Result<Arc<dyn MessageStore>> {
        match self {
            Self::Sqlite {
                path,
                busy_timeout_ms,
            } => Ok(Arc::new(SqliteStore::open(path, *busy_timeout_ms).await?)),
            Self::Memory => Ok(Arc::new(MemoryStore::new())),
        }
    }
}

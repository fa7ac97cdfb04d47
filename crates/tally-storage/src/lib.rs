use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tally_core::{ErrorKind, InventoryError, DEFAULT_UOM};
use thiserror::Error;

mod catalog;
mod counts;
mod labels;
mod rows;
mod scans;
mod variances;

pub const INVENTORY_SCHEMA_VERSION: i64 = 2;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

impl StorageError {
    /// Category of a domain rejection; `None` for infrastructure failures.
    pub fn inventory_kind(&self) -> Option<ErrorKind> {
        match self {
            StorageError::Inventory(err) => Some(err.kind()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Unit stored for imported SKUs whose row has none.
    pub default_uom: String,
    /// Carry reviewer reasons onto variances regenerated for the same
    /// location and SKU when a count is closed again.
    pub keep_variance_reasons: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            default_uom: DEFAULT_UOM.to_string(),
            keep_variance_reasons: false,
        }
    }
}

/// SQLite-backed inventory catalog and count ledger. Every multi-row
/// mutation runs inside one transaction; an early return rolls it back.
pub struct InventoryStore {
    conn: Connection,
    options: StoreOptions,
}

impl InventoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::init(conn, options)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open_in_memory_with(StoreOptions::default())
    }

    pub fn open_in_memory_with(options: StoreOptions) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, options)
    }

    fn init(conn: Connection, options: StoreOptions) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self { conn, options };
        store.migrate()?;
        Ok(store)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let mut current = self.schema_version()?;
        if current > INVENTORY_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: INVENTORY_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_catalog.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
            current = 1;
        }

        if current < 2 {
            let sql = include_str!("../migrations/0002_counts.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 2", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }
}

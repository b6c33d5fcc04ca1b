
use serde::{Deserialize, Serialize};
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Identifier for a column within a table schema.
/// Examples:
/// - `let id_col: ColumnId = 1; // maps to "id"`
/// - `let price_col: ColumnId = 5; // maps to "price"`
pub type ColumnId = u16;

/// Logical page number inside one file.
/// Examples:
/// - `let header_page = PageId(0);`
/// - `let node_page = PageId(42);`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Null pointer value used by on-disk page references.
    pub const NONE: PageId = PageId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Handle for a file registered with the page cache.
/// Examples:
/// - `let users = FileId(1);`
/// - `let users_by_name = FileId(2);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

/// Address of one fixed-size record slot: (page, slot).
/// Examples:
/// - `let rid = RecordId::new(0, 3);`
/// - `let rid = RecordId { page_id: PageId(12), slot: 0 };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u32,
}

impl RecordId {
    pub fn new(page: u32, slot: u32) -> Self {
        Self {
            page_id: PageId(page),
            slot,
        }
    }

    /// Position of this slot in the store-wide slot sequence.
    pub fn linear(self, slots_per_page: u32) -> u64 {
        self.page_id.0 as u64 * slots_per_page as u64 + self.slot as u64
    }

    pub fn from_linear(linear: u64, slots_per_page: u32) -> Self {
        let spp = slots_per_page as u64;
        Self::new((linear / spp) as u32, (linear % spp) as u32)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id.0, self.slot)
    }
}

/// Canonical error type shared across storage subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("buffer: {0}")]
    Buffer(String),
    #[error("index: {0}")]
    Index(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("capacity exceeded: {0}")]
    Capacity(String),
    #[error("config: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .buffer_pool_pages(512)
///     .leaf_order(64)
///     .build();
/// assert_eq!(config.internal_order, None);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where table and index files live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Number of pages the page cache keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// Fan-out target for leaves of newly created indexes. `None` uses the
    /// largest capacity the page allows.
    pub leaf_order: Option<u32>,
    /// Fan-out target for internal nodes of newly created indexes.
    pub internal_order: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            buffer_pool_pages: 256,
            leaf_order: None,
            internal_order: None,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{ColumnId, Config, DbError, DbResult, FileId, PageId, RecordId};
    pub use types::{CmpOp, SqlType, Value};
}

//! Isolated database contexts for tests.
//!
//! Each context owns a temporary directory and a [`Database`] rooted in it.
//! The directory and every file created through the context are removed
//! when the context is dropped.

use anyhow::Result;
use common::Config;
use database::Database;
use std::path::Path;
use tempfile::TempDir;

/// A database over its own temporary directory.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
/// use record::StoreOptions;
///
/// let ctx = TestContext::new().unwrap();
/// let mut table = ctx
///     .db()
///     .create_table("t.tbl", StoreOptions::builder().record_length(4).build())
///     .unwrap();
/// table.insert(&[1, 2, 3, 4]).unwrap();
/// ```
pub struct TestContext {
    _temp_dir: TempDir,
    db: Database,
}

impl TestContext {
    /// Create a context with a small page cache so tests exercise eviction.
    pub fn new() -> Result<Self> {
        Self::with_orders(None, None)
    }

    /// Create a context whose new indexes default to the given orders.
    pub fn with_orders(leaf_order: Option<u32>, internal_order: Option<u32>) -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let config = Config::builder()
            .data_dir(temp_dir.path().to_path_buf())
            .buffer_pool_pages(8)
            .maybe_leaf_order(leaf_order)
            .maybe_internal_order(internal_order)
            .build();
        Ok(Self {
            db: Database::open(config)?,
            _temp_dir: temp_dir,
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn data_dir(&self) -> &Path {
        self.db.data_dir()
    }

    /// Drop the current database and open a fresh one over the same directory.
    ///
    /// Stores and indexes opened before the call keep using the old page cache
    /// and must be dropped first.
    pub fn reopen(&mut self) -> Result<()> {
        self.db.flush()?;
        let config = self.db.config().clone();
        self.db = Database::open(config)?;
        Ok(())
    }
}

//! Entry point tying a page cache to the record stores and indexes that share it.
//!
//! A [`Database`] owns the [`Config`] and one [`SharedPager`]. Every table and
//! index opened through it reads and writes pages through that pager, so a
//! single [`Database::flush`] makes all of them durable.
//!
//! ```no_run
//! use database::Database;
//! use common::Config;
//! use record::StoreOptions;
//!
//! let db = Database::open(Config::builder().data_dir("./db_data".into()).build()).unwrap();
//! let mut users = db
//!     .create_table("users.tbl", StoreOptions::builder().record_length(64).build())
//!     .unwrap();
//! let rid = users.insert(b"alice").unwrap();
//! db.flush().unwrap();
//! # let _ = rid;
//! ```

use anyhow::{Context, Result};
use btree::{IndexOptions, IndexTree};
use buffer::{FilePager, Pager, SharedPager, shared};
use common::{Config, FileId};
use record::{RecordStore, StoreOptions};
use std::path::Path;
use tracing::debug;

pub use btree::TreeStats;

/// Page cache plus the configuration that new stores and indexes are created with.
pub struct Database {
    config: Config,
    pager: SharedPager<FilePager>,
}

impl Database {
    /// Open the data directory named by `config`, creating it if needed.
    pub fn open(config: Config) -> Result<Self> {
        let pager = FilePager::from_config(&config).with_context(|| {
            format!(
                "failed to open data directory {}",
                config.data_dir.display()
            )
        })?;
        debug!(
            dir = %config.data_dir.display(),
            pages = config.buffer_pool_pages,
            "database opened"
        );
        Ok(Self {
            config,
            pager: shared(pager),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Handle to the shared page cache.
    pub fn pager(&self) -> SharedPager<FilePager> {
        self.pager.clone()
    }

    /// Create an empty record store, replacing any file called `name`.
    pub fn create_table(&self, name: &str, options: StoreOptions) -> Result<RecordStore> {
        RecordStore::create(self.pager(), name, options)
            .with_context(|| format!("failed to create table file {name}"))
    }

    pub fn open_table(&self, name: &str) -> Result<RecordStore> {
        RecordStore::open(self.pager(), name)
            .with_context(|| format!("failed to open table file {name}"))
    }

    /// Create an empty index, replacing any file called `name`.
    ///
    /// Orders left unset in `options` fall back to the ones in the config.
    pub fn create_index(&self, name: &str, mut options: IndexOptions) -> Result<IndexTree> {
        options.leaf_order = options.leaf_order.or(self.config.leaf_order);
        options.internal_order = options.internal_order.or(self.config.internal_order);
        IndexTree::create(self.pager(), name, options)
            .with_context(|| format!("failed to create index file {name}"))
    }

    pub fn open_index(&self, name: &str) -> Result<IndexTree> {
        IndexTree::open(self.pager(), name)
            .with_context(|| format!("failed to open index file {name}"))
    }

    /// Write back one file's dirty pages and drop it from the cache.
    ///
    /// Stores and indexes still holding `file` fail on their next access.
    pub fn close_file(&self, file: FileId) -> Result<()> {
        self.pager
            .borrow_mut()
            .close_file(file)
            .with_context(|| format!("failed to close file {}", file.0))
    }

    /// Write every dirty page to disk.
    pub fn flush(&self) -> Result<()> {
        self.pager
            .borrow_mut()
            .flush()
            .context("failed to flush page cache")
    }
}

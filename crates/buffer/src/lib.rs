//! Page cache sitting between the record/index layers and the page files.
//!
//! The cache provides:
//! - LRU-based in-memory page residency
//! - Lazy loading and eviction with write-back of dirty pages
//! - A registry of named files under one base directory
//!
//! Pages are handed out as `&mut Page` borrows. A borrow ends before the next
//! cache call, so a caller can never write through a handle whose page has
//! been evicted in the meantime.
//!
//! # Example
//!
//! ```no_run
//! use buffer::{FilePager, Pager};
//!
//! let mut pager = FilePager::new("/tmp/db", 100);
//! let file = pager.open_file("users.tbl").unwrap();
//!
//! let page_id = pager.allocate_page(file).unwrap();
//! pager
//!     .update_page(file, page_id, |page| {
//!         page.data[0] = 42;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! pager.flush().unwrap();
//! ```


use common::{Config, DbError, DbResult, FileId, PageId};
use hashbrown::{HashMap, HashSet};
use lru::LruCache;
use std::{cell::RefCell, num::NonZeroUsize, path::PathBuf, rc::Rc};
use storage::{Page, PageFile};
use tracing::{debug, trace};

/// Pager handle shared by every store and index opened on it.
///
/// Access is single-threaded; each page operation borrows the pager for the
/// duration of one call only.
pub type SharedPager<P = FilePager> = Rc<RefCell<P>>;

pub fn shared<P: Pager>(pager: P) -> SharedPager<P> {
    Rc::new(RefCell::new(pager))
}

/// Abstraction for fetching, allocating, and flushing pages.
///
/// Implementors manage the lifecycle of pages, including:
/// - Loading pages from persistent storage into memory
/// - Evicting pages when the cache is full
/// - Tracking dirty pages and flushing them to disk
pub trait Pager {
    /// Open a file by name, creating it when it does not exist.
    fn open_file(&mut self, name: &str) -> DbResult<FileId>;

    /// Create a file by name, discarding any previous content.
    fn create_file(&mut self, name: &str) -> DbResult<FileId>;

    /// Write back the file's dirty pages and forget it.
    fn close_file(&mut self, file: FileId) -> DbResult<()>;

    /// Fetch a page from the cache or load it from disk.
    ///
    /// Marks the page as recently used. The page is not marked dirty.
    fn fetch_page(&mut self, file: FileId, pid: PageId) -> DbResult<&mut Page>;

    /// Record that a cached page differs from its on-disk copy.
    fn mark_dirty(&mut self, file: FileId, pid: PageId);

    /// Append a zeroed page to the file and return its number.
    fn allocate_page(&mut self, file: FileId) -> DbResult<PageId>;

    /// Number of pages currently in the file.
    fn num_pages(&self, file: FileId) -> DbResult<u32>;

    /// Flush all dirty pages to disk.
    ///
    /// After flushing, all pages are marked as clean.
    fn flush(&mut self) -> DbResult<()>;

    /// Run `f` against a page without modifying it.
    fn read_page<R>(
        &mut self,
        file: FileId,
        pid: PageId,
        f: impl FnOnce(&Page) -> DbResult<R>,
    ) -> DbResult<R>
    where
        Self: Sized,
    {
        let page = self.fetch_page(file, pid)?;
        f(page)
    }

    /// Run `f` against a page and mark it dirty.
    ///
    /// The page is marked even when `f` fails, since `f` may have changed it
    /// before failing.
    fn update_page<R>(
        &mut self,
        file: FileId,
        pid: PageId,
        f: impl FnOnce(&mut Page) -> DbResult<R>,
    ) -> DbResult<R>
    where
        Self: Sized,
    {
        let page = self.fetch_page(file, pid)?;
        let out = f(page);
        self.mark_dirty(file, pid);
        out
    }
}

/// File-backed page cache with LRU eviction.
///
/// Dirty pages are written back on eviction, on `close_file`, or on an
/// explicit `flush`; never implicitly otherwise.
#[derive(Debug)]
pub struct FilePager {
    base_dir: PathBuf,
    max_pages: usize,
    cache: LruCache<(FileId, PageId), Page>,
    dirty: HashSet<(FileId, PageId)>,
    files: HashMap<FileId, PageFile>,
    names: HashMap<String, FileId>,
    next_file_id: u32,
}

impl FilePager {
    /// Create a new file-backed pager.
    ///
    /// # Arguments
    ///
    /// * `base_dir` - Directory holding the files opened through this pager
    /// * `max_pages` - Maximum number of pages to cache in memory
    ///
    /// # Panics
    ///
    /// Panics if `max_pages` is 0.
    pub fn new(base_dir: impl Into<PathBuf>, max_pages: usize) -> Self {
        let capacity = NonZeroUsize::new(max_pages).expect("max_pages must be > 0");
        Self {
            base_dir: base_dir.into(),
            max_pages,
            cache: LruCache::new(capacity),
            dirty: HashSet::new(),
            files: HashMap::new(),
            names: HashMap::new(),
            next_file_id: 1,
        }
    }

    pub fn from_config(config: &Config) -> DbResult<Self> {
        if config.buffer_pool_pages == 0 {
            return Err(DbError::Config("buffer_pool_pages must be > 0".into()));
        }
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self::new(&config.data_dir, config.buffer_pool_pages))
    }

    /// Number of pages currently resident.
    pub fn resident_pages(&self) -> usize {
        self.cache.len()
    }

    pub fn is_dirty(&self, file: FileId, pid: PageId) -> bool {
        self.dirty.contains(&(file, pid))
    }

    fn register(&mut self, name: &str, page_file: PageFile) -> FileId {
        let id = FileId(self.next_file_id);
        self.next_file_id += 1;
        self.files.insert(id, page_file);
        self.names.insert(name.to_string(), id);
        id
    }

    fn file_mut(&mut self, file: FileId) -> DbResult<&mut PageFile> {
        self.files
            .get_mut(&file)
            .ok_or_else(|| DbError::Buffer(format!("file {} is not open", file.0)))
    }

    fn write_back(&mut self, file: FileId, page: &Page) -> DbResult<()> {
        self.file_mut(file)?.write_page(page)
    }

    /// Evict the least recently used page if the cache is full.
    ///
    /// If the evicted page is dirty, it is flushed to disk first.
    fn evict_if_needed(&mut self) -> DbResult<()> {
        if self.cache.len() < self.max_pages {
            return Ok(());
        }

        if let Some(((file, pid), page)) = self.cache.pop_lru()
            && self.dirty.remove(&(file, pid))
        {
            debug!(file = file.0, page = pid.0, "evicting dirty page");
            self.write_back(file, &page)?;
        }

        Ok(())
    }
}

impl Pager for FilePager {
    fn open_file(&mut self, name: &str) -> DbResult<FileId> {
        if let Some(id) = self.names.get(name) {
            return Ok(*id);
        }
        let path = self.base_dir.join(name);
        let page_file = if path.exists() {
            PageFile::open(&path)?
        } else {
            PageFile::create(&path)?
        };
        Ok(self.register(name, page_file))
    }

    fn create_file(&mut self, name: &str) -> DbResult<FileId> {
        if let Some(id) = self.names.get(name).copied() {
            self.close_file(id)?;
        }
        let page_file = PageFile::create(&self.base_dir.join(name))?;
        Ok(self.register(name, page_file))
    }

    fn close_file(&mut self, file: FileId) -> DbResult<()> {
        let cached: Vec<PageId> = self
            .cache
            .iter()
            .filter(|((f, _), _)| *f == file)
            .map(|((_, pid), _)| *pid)
            .collect();
        for pid in cached {
            if let Some(page) = self.cache.pop(&(file, pid))
                && self.dirty.remove(&(file, pid))
            {
                self.write_back(file, &page)?;
            }
        }
        if let Some(mut page_file) = self.files.remove(&file) {
            page_file.sync()?;
        }
        self.names.retain(|_, id| *id != file);
        Ok(())
    }

    fn fetch_page(&mut self, file: FileId, pid: PageId) -> DbResult<&mut Page> {
        let key = (file, pid);
        if !self.cache.contains(&key) {
            let page = self.file_mut(file)?.read_page(pid)?;
            self.evict_if_needed()?;
            trace!(file = file.0, page = pid.0, "page loaded");
            self.cache.push(key, page);
        }

        // LruCache::get_mut updates LRU order
        self.cache
            .get_mut(&key)
            .ok_or_else(|| DbError::Buffer(format!("page {} vanished from cache", pid.0)))
    }

    fn mark_dirty(&mut self, file: FileId, pid: PageId) {
        self.dirty.insert((file, pid));
    }

    fn allocate_page(&mut self, file: FileId) -> DbResult<PageId> {
        // Write page to disk immediately to extend the file
        let pid = self.file_mut(file)?.allocate_page()?;

        self.evict_if_needed()?;
        self.cache.push((file, pid), Page::new(pid));

        Ok(pid)
    }

    fn num_pages(&self, file: FileId) -> DbResult<u32> {
        self.files
            .get(&file)
            .map(PageFile::num_pages)
            .ok_or_else(|| DbError::Buffer(format!("file {} is not open", file.0)))
    }

    fn flush(&mut self) -> DbResult<()> {
        let dirty_keys: Vec<_> = self.dirty.iter().copied().collect();

        for key in &dirty_keys {
            if let Some(page) = self.cache.peek(key) {
                let page_file = self
                    .files
                    .get_mut(&key.0)
                    .ok_or_else(|| DbError::Buffer(format!("file {} is not open", key.0.0)))?;
                page_file.write_page(page)?;
            }
            self.dirty.remove(key);
        }
        for page_file in self.files.values_mut() {
            page_file.sync()?;
        }
        debug!(pages = dirty_keys.len(), "flushed dirty pages");

        Ok(())
    }
}

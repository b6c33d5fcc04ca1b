//! Fixed-size pages and the files that hold them.
//!
//! Everything above this crate addresses storage as `(file, page number)`.
//! Byte layouts inside a page are handled by the pure helpers in [`codec`].

pub mod codec;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use common::{DbError, DbResult, PageId};

pub const PAGE_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            data: vec![0u8; PAGE_SIZE],
        }
    }

    /// Borrow `len` bytes starting at `offset`, bounds checked.
    pub fn bytes(&self, offset: usize, len: usize) -> DbResult<&[u8]> {
        codec::slice(&self.data, offset, len)
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> DbResult<&mut [u8]> {
        codec::slice_mut(&mut self.data, offset, len)
    }
}

/// A file made of `PAGE_SIZE` pages addressed by page number.
#[derive(Debug)]
pub struct PageFile {
    file: File,
    path: PathBuf,
    num_pages: u32,
}

impl PageFile {
    /// Create a new empty file, truncating any previous content.
    pub fn create(path: &Path) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            num_pages: 0,
        })
    }

    /// Open an existing file.
    pub fn open(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Err(DbError::Storage(format!(
                "file does not exist: {}",
                path.display()
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(DbError::Storage(format!(
                "{} is {len} bytes, not a whole number of pages",
                path.display()
            )));
        }
        Ok(Self {
            file,
            path: path.to_path_buf(),
            num_pages: (len / PAGE_SIZE as u64) as u32,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Read a whole page. Pages past the end of the file read as zeroes.
    pub fn read_page(&mut self, pid: PageId) -> DbResult<Page> {
        let mut page = Page::new(pid);
        if pid.0 >= self.num_pages {
            return Ok(page);
        }
        self.file
            .seek(SeekFrom::Start(pid.0 as u64 * PAGE_SIZE as u64))?;
        self.file.read_exact(&mut page.data)?;
        Ok(page)
    }

    /// Write a whole page, extending the file when the page lies past its end.
    pub fn write_page(&mut self, page: &Page) -> DbResult<()> {
        if page.data.len() != PAGE_SIZE {
            return Err(DbError::Storage(format!(
                "page {} has {} bytes, expected {PAGE_SIZE}",
                page.id.0,
                page.data.len()
            )));
        }
        if page.id.0 > self.num_pages {
            // Keep the file dense so page numbers map to offsets.
            for gap in self.num_pages..page.id.0 {
                self.write_page(&Page::new(PageId(gap)))?;
            }
        }
        self.file
            .seek(SeekFrom::Start(page.id.0 as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&page.data)?;
        self.num_pages = self.num_pages.max(page.id.0 + 1);
        Ok(())
    }

    /// Append a zeroed page and return its number.
    pub fn allocate_page(&mut self) -> DbResult<PageId> {
        let pid = PageId(self.num_pages);
        self.write_page(&Page::new(pid))?;
        Ok(pid)
    }

    pub fn sync(&mut self) -> DbResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

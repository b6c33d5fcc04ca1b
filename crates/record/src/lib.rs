//! Fixed-length record storage over pages.
//!
//! A store keeps one table's records in equal-sized slots. Page 0 of the
//! store's file holds the [`RecordHeader`] followed directly by the occupancy
//! bitmap; record page `p` lives at file page `p + 1`, slot `s` at byte
//! `s * record_length` of that page.

pub mod bitmap;

use buffer::{FilePager, Pager, SharedPager};
use common::{DbError, DbResult, FileId, PageId, RecordId};
use serde::{Deserialize, Serialize};
use storage::{PAGE_SIZE, codec};
use tracing::{debug, trace};

/// Size of the encoded [`RecordHeader`].
pub const HEADER_BYTES: usize = 20;
/// Byte offset of the occupancy bitmap on the header page.
pub const BITMAP_OFFSET: usize = HEADER_BYTES;
/// Number of slots the header page's bitmap can track.
pub const BITMAP_CAPACITY: u64 = ((PAGE_SIZE - HEADER_BYTES) * 8) as u64;

const HEADER_PAGE: PageId = PageId(0);

/// Per-store metadata persisted at the front of page 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub record_length: u32,
    pub slots_per_page: u32,
    pub live_records: u32,
    /// One past the highest slot ever handed out and not reclaimed.
    pub exploited_slots: u32,
    /// Bit `i` set when column `i` is nullable.
    pub null_mask: u32,
}

impl RecordHeader {
    pub fn encode(&self, buf: &mut [u8]) -> DbResult<()> {
        let written = codec::encode_fixed(self, codec::slice_mut(buf, 0, HEADER_BYTES)?)?;
        debug_assert_eq!(written, HEADER_BYTES);
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> DbResult<Self> {
        let header: RecordHeader = codec::decode_fixed(codec::slice(buf, 0, HEADER_BYTES)?)?;
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> DbResult<()> {
        let fits = (self.record_length as usize)
            .checked_mul(self.slots_per_page as usize)
            .is_some_and(|bytes| bytes <= PAGE_SIZE);
        if self.record_length == 0 || self.slots_per_page == 0 || !fits {
            return Err(DbError::Storage(format!(
                "invalid record layout: {} slots of {} bytes",
                self.slots_per_page, self.record_length
            )));
        }
        if self.live_records > self.exploited_slots
            || self.exploited_slots as u64 > BITMAP_CAPACITY
        {
            return Err(DbError::Storage(format!(
                "inconsistent slot counts: {} live, {} exploited",
                self.live_records, self.exploited_slots
            )));
        }
        Ok(())
    }
}

/// Layout of a new store.
#[derive(Clone, Debug, bon::Builder)]
pub struct StoreOptions {
    pub record_length: u32,
    /// Defaults to as many slots as fit in one page.
    pub slots_per_page: Option<u32>,
    #[builder(default)]
    pub null_mask: u32,
}

/// A copy of one record's bytes, tagged with where it lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub rid: RecordId,
    pub data: Vec<u8>,
}

/// One table's records in fixed-length slots.
///
/// The store does not grow past [`BITMAP_CAPACITY`] slots; inserting into a
/// full store fails with [`DbError::Capacity`].
pub struct RecordStore<P: Pager = FilePager> {
    pager: SharedPager<P>,
    file: FileId,
    header: RecordHeader,
}

impl<P: Pager> RecordStore<P> {
    /// Create a store in a fresh file, replacing any file of the same name.
    pub fn create(pager: SharedPager<P>, name: &str, options: StoreOptions) -> DbResult<Self> {
        let record_length = options.record_length;
        if record_length == 0 || record_length as usize > PAGE_SIZE {
            return Err(DbError::Config(format!(
                "record length {record_length} must be within 1..={PAGE_SIZE}"
            )));
        }
        let max_slots = (PAGE_SIZE / record_length as usize) as u32;
        let slots_per_page = options.slots_per_page.unwrap_or(max_slots);
        if slots_per_page == 0 || slots_per_page > max_slots {
            return Err(DbError::Config(format!(
                "{slots_per_page} slots of {record_length} bytes do not fit in a page"
            )));
        }

        let header = RecordHeader {
            record_length,
            slots_per_page,
            live_records: 0,
            exploited_slots: 0,
            null_mask: options.null_mask,
        };
        let file = {
            let mut guard = pager.borrow_mut();
            let file = guard.create_file(name)?;
            guard.allocate_page(file)?;
            file
        };
        let store = Self {
            pager,
            file,
            header,
        };
        store.write_header()?;
        debug!(name, record_length, slots_per_page, "record store created");
        Ok(store)
    }

    /// Open an existing store.
    pub fn open(pager: SharedPager<P>, name: &str) -> DbResult<Self> {
        let (file, header) = {
            let mut guard = pager.borrow_mut();
            let file = guard.open_file(name)?;
            if guard.num_pages(file)? == 0 {
                return Err(DbError::Storage(format!("{name} is not a record store")));
            }
            let header = guard.read_page(file, HEADER_PAGE, |p| RecordHeader::decode(&p.data))?;
            (file, header)
        };
        Ok(Self {
            pager,
            file,
            header,
        })
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn record_length(&self) -> usize {
        self.header.record_length as usize
    }

    pub fn slots_per_page(&self) -> u32 {
        self.header.slots_per_page
    }

    /// Number of live records.
    pub fn len(&self) -> u32 {
        self.header.live_records
    }

    pub fn is_empty(&self) -> bool {
        self.header.live_records == 0
    }

    pub fn exploited_slots(&self) -> u32 {
        self.header.exploited_slots
    }

    pub fn pager(&self) -> &SharedPager<P> {
        &self.pager
    }

    /// Copy the record stored at `rid`.
    pub fn get(&self, rid: RecordId) -> DbResult<Record> {
        self.check_in_range(rid)?;
        let offset = self.slot_offset(rid);
        let len = self.record_length();
        let data = self
            .pager
            .borrow_mut()
            .read_page(self.file, data_page(rid), |p| Ok(p.bytes(offset, len)?.to_vec()))?;
        Ok(Record { rid, data })
    }

    /// Store `data` in the first free slot. Shorter input is zero padded.
    pub fn insert(&mut self, data: &[u8]) -> DbResult<RecordId> {
        self.check_length(data)?;
        let limit = (self.header.exploited_slots as u64 + 1).min(BITMAP_CAPACITY);
        let linear = self
            .pager
            .borrow_mut()
            .read_page(self.file, HEADER_PAGE, |p| {
                Ok(bitmap::first_clear(&p.data[BITMAP_OFFSET..], limit))
            })?
            .ok_or_else(|| {
                DbError::Capacity(format!("record store is full ({BITMAP_CAPACITY} slots)"))
            })?;

        let rid = RecordId::from_linear(linear, self.header.slots_per_page);
        self.ensure_data_page(rid)?;
        self.write_slot(rid, data)?;

        let mut header = self.header;
        header.live_records += 1;
        if linear >= header.exploited_slots as u64 {
            header.exploited_slots = linear as u32 + 1;
        }
        self.pager
            .borrow_mut()
            .update_page(self.file, HEADER_PAGE, |p| {
                bitmap::set(&mut p.data[BITMAP_OFFSET..], linear);
                header.encode(&mut p.data)
            })?;
        self.header = header;
        trace!(%rid, "record inserted");
        Ok(rid)
    }

    /// Free the slot at `rid`. Returns false when the slot was not occupied.
    ///
    /// Only the single topmost slot is reclaimed from the exploited range;
    /// free slots below it are left for reuse.
    pub fn delete(&mut self, rid: RecordId) -> DbResult<bool> {
        if rid.slot >= self.header.slots_per_page {
            return Ok(false);
        }
        let linear = rid.linear(self.header.slots_per_page);
        if linear >= self.header.exploited_slots as u64 || !self.is_occupied(rid)? {
            return Ok(false);
        }

        let mut header = self.header;
        header.live_records -= 1;
        if linear + 1 == header.exploited_slots as u64 {
            header.exploited_slots -= 1;
        }
        self.pager
            .borrow_mut()
            .update_page(self.file, HEADER_PAGE, |p| {
                bitmap::clear(&mut p.data[BITMAP_OFFSET..], linear);
                header.encode(&mut p.data)
            })?;
        self.header = header;
        trace!(%rid, "record deleted");
        Ok(true)
    }

    /// Overwrite the record at `rid` in place.
    pub fn update(&mut self, rid: RecordId, data: &[u8]) -> DbResult<()> {
        self.check_length(data)?;
        self.check_in_range(rid)?;
        self.write_slot(rid, data)
    }

    pub fn is_occupied(&self, rid: RecordId) -> DbResult<bool> {
        let linear = rid.linear(self.header.slots_per_page);
        if rid.slot >= self.header.slots_per_page || linear >= self.header.exploited_slots as u64 {
            return Ok(false);
        }
        self.pager
            .borrow_mut()
            .read_page(self.file, HEADER_PAGE, |p| {
                Ok(bitmap::is_set(&p.data[BITMAP_OFFSET..], linear))
            })
    }

    /// Move `rid` to the first occupied slot at or after its current position.
    ///
    /// Returns false when no occupied slot remains; `rid` is then unchanged.
    pub fn next_record(&self, rid: &mut RecordId) -> DbResult<bool> {
        let spp = self.header.slots_per_page;
        let from = rid.page_id.0 as u64 * spp as u64 + (rid.slot.min(spp)) as u64;
        let limit = self.header.exploited_slots as u64;
        let hit = self
            .pager
            .borrow_mut()
            .read_page(self.file, HEADER_PAGE, |p| {
                Ok(bitmap::next_set(&p.data[BITMAP_OFFSET..], from, limit))
            })?;
        match hit {
            Some(linear) => {
                *rid = RecordId::from_linear(linear, spp);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Iterate over live records in slot order.
    pub fn scan(&self) -> Scan<'_, P> {
        self.scan_from(RecordId::new(0, 0))
    }

    pub fn scan_from(&self, start: RecordId) -> Scan<'_, P> {
        Scan {
            store: self,
            cursor: Some(start),
        }
    }

    pub fn flush(&self) -> DbResult<()> {
        self.pager.borrow_mut().flush()
    }

    /// Verify that the bitmap agrees with the header counts.
    pub fn check_invariants(&self) -> DbResult<()> {
        let exploited = self.header.exploited_slots as u64;
        let (below, above) = self
            .pager
            .borrow_mut()
            .read_page(self.file, HEADER_PAGE, |p| {
                let bits = &p.data[BITMAP_OFFSET..];
                Ok((
                    bitmap::count_set(bits, exploited),
                    bitmap::next_set(bits, exploited, BITMAP_CAPACITY),
                ))
            })?;
        if below != self.header.live_records as u64 {
            return Err(DbError::Storage(format!(
                "bitmap has {below} occupied slots, header counts {}",
                self.header.live_records
            )));
        }
        if let Some(stray) = above {
            return Err(DbError::Storage(format!(
                "slot {stray} is occupied beyond the exploited boundary {exploited}"
            )));
        }
        Ok(())
    }

    fn write_header(&self) -> DbResult<()> {
        let header = self.header;
        self.pager
            .borrow_mut()
            .update_page(self.file, HEADER_PAGE, |p| header.encode(&mut p.data))
    }

    fn write_slot(&self, rid: RecordId, data: &[u8]) -> DbResult<()> {
        let offset = self.slot_offset(rid);
        let len = self.record_length();
        self.pager
            .borrow_mut()
            .update_page(self.file, data_page(rid), |p| {
                let slot = p.bytes_mut(offset, len)?;
                slot[..data.len()].copy_from_slice(data);
                slot[data.len()..].fill(0);
                Ok(())
            })
    }

    /// Extend the file until the page holding `rid` exists.
    fn ensure_data_page(&self, rid: RecordId) -> DbResult<()> {
        let needed = data_page(rid).0 + 1;
        let mut pager = self.pager.borrow_mut();
        while pager.num_pages(self.file)? < needed {
            let pid = pager.allocate_page(self.file)?;
            debug!(file = self.file.0, page = pid.0, "record store grew");
        }
        Ok(())
    }

    fn slot_offset(&self, rid: RecordId) -> usize {
        rid.slot as usize * self.record_length()
    }

    fn check_length(&self, data: &[u8]) -> DbResult<()> {
        if data.len() > self.record_length() {
            return Err(DbError::Storage(format!(
                "record of {} bytes exceeds slot length {}",
                data.len(),
                self.record_length()
            )));
        }
        Ok(())
    }

    fn check_in_range(&self, rid: RecordId) -> DbResult<()> {
        if rid.slot >= self.header.slots_per_page
            || rid.linear(self.header.slots_per_page) >= self.header.exploited_slots as u64
        {
            return Err(DbError::Storage(format!("record {rid} is out of range")));
        }
        Ok(())
    }
}

fn data_page(rid: RecordId) -> PageId {
    PageId(rid.page_id.0 + 1)
}

/// Forward scan over a store's live records.
pub struct Scan<'a, P: Pager> {
    store: &'a RecordStore<P>,
    cursor: Option<RecordId>,
}

impl<P: Pager> Iterator for Scan<'_, P> {
    type Item = DbResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rid = self.cursor?;
        match self.store.next_record(&mut rid) {
            Ok(true) => {
                let spp = self.store.slots_per_page();
                self.cursor = Some(RecordId::from_linear(rid.linear(spp) + 1, spp));
                Some(self.store.get(rid))
            }
            Ok(false) => {
                self.cursor = None;
                None
            }
            Err(err) => {
                self.cursor = None;
                Some(Err(err))
            }
        }
    }
}

//! Reference-counted heap for values kept across frames.
//!
//! [`MarkedHeap`] hands out runs of slots from a first-fit free list. The
//! list is intrusive: each free block stores `(next, len)` in the first slot
//! of the block itself, so the heap needs no side allocation to track free
//! space. Blocks are kept in address order.
//!
//! Every slot has a one-byte reference count in a side array; only the head
//! slot of an object carries a meaningful count and every other slot reads
//! [`DEAD`]. Dropping a count to zero does not free anything. The object is
//! queued in a retire buffer, and [`MarkedHeap::flush_retired`] (called once
//! per frame) sorts the queue, drops entries that were marked again in the
//! meantime, and merges the rest into the free list, coalescing neighbours
//! that share a page.

use std::panic::Location;

use mathpool_core::{MathError, Pool};
use smallvec::SmallVec;

use crate::page::{copy_between, split, Page, PAGE_SLOTS};

/// Count value of a slot that holds no object.
pub const DEAD: u8 = u8::MAX;

/// Highest reference count a marked object can reach.
pub const MAX_REFCOUNT: u8 = DEAD - 1;

/// Free-list terminator.
const NIL: u32 = u32::MAX;

/// Retire entries kept inline before the buffer spills to the heap.
const RETIRE_INLINE: usize = 64;

/// Where an object was created, as reported by `#[track_caller]`.
pub type MarkSite = &'static Location<'static>;

/// Per-page side data: reference counts and creation sites.
struct PageMeta {
    counts: Vec<u8>,
    sites: Vec<Option<MarkSite>>,
}

impl PageMeta {
    fn new() -> Self {
        Self {
            counts: vec![DEAD; PAGE_SLOTS],
            sites: vec![None; PAGE_SLOTS],
        }
    }

    fn memory_bytes(&self) -> usize {
        self.counts.len() + self.sites.len() * std::mem::size_of::<Option<MarkSite>>()
    }
}

/// An object whose count reached zero, waiting for the next flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Retired {
    slot: u32,
    len: u32,
}

/// A live object in the marked heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkedEntry {
    /// Head slot of the object.
    pub slot: u32,
    /// Current reference count (0 while queued for reclamation).
    pub count: u8,
    /// Source location of the `mark`/`clone`/`premark` that created it.
    pub site: Option<MarkSite>,
}

/// Reference-counted slot heap with deferred, coalescing reclamation.
pub struct MarkedHeap {
    pages: Vec<Page>,
    meta: Vec<PageMeta>,
    max_pages: usize,
    /// Head slot of the free list, or `NIL`.
    free_head: u32,
    /// Objects whose count dropped to zero since the last flush.
    retired: SmallVec<[Retired; RETIRE_INLINE]>,
    /// Outstanding marks: +1 per allocation or re-mark, -1 per release.
    marks: u32,
    /// Slots owned by objects that have not been reclaimed.
    slots_in_use: u32,
}

impl MarkedHeap {
    /// Create an empty heap that may grow to `max_pages` pages.
    pub fn new(max_pages: u32) -> Self {
        Self {
            pages: Vec::new(),
            meta: Vec::new(),
            max_pages: max_pages as usize,
            free_head: NIL,
            retired: SmallVec::new(),
            marks: 0,
            slots_in_use: 0,
        }
    }

    fn node(&self, slot: u32) -> (u32, u32) {
        let (page, s) = split(slot);
        let header = self.pages[page].floats(s, 2);
        (header[0].to_bits(), header[1].to_bits())
    }

    fn set_node(&mut self, slot: u32, next: u32, len: u32) {
        let (page, s) = split(slot);
        let header = self.pages[page].floats_mut(s, 2);
        header[0] = f32::from_bits(next);
        header[1] = f32::from_bits(len);
    }

    fn set_next(&mut self, slot: u32, next: u32) {
        let (_, len) = self.node(slot);
        self.set_node(slot, next, len);
    }

    /// Append a fresh page as one free block; returns its first slot.
    fn grow(&mut self, requested: u32) -> Result<u32, MathError> {
        if self.pages.len() >= self.max_pages {
            return Err(MathError::CapacityExceeded {
                pool: Pool::Marked,
                requested: requested as usize,
                available: self.free_slots(),
            });
        }
        let page = self.pages.len();
        log::debug!("marked: allocating page {page}");
        self.pages.push(Page::new());
        self.meta.push(PageMeta::new());
        let slot = (page * PAGE_SLOTS) as u32;
        self.set_node(slot, NIL, PAGE_SLOTS as u32);
        Ok(slot)
    }

    /// Take `len` slots from the free list, growing a page if nothing fits.
    ///
    /// Blocks larger than the request are split from the tail so the block
    /// header stays where it is.
    fn take(&mut self, len: u32) -> Result<u32, MathError> {
        if len as usize > PAGE_SLOTS {
            return Err(MathError::CapacityExceeded {
                pool: Pool::Marked,
                requested: len as usize,
                available: PAGE_SLOTS,
            });
        }
        let mut prev = NIL;
        let mut cur = self.free_head;
        loop {
            if cur == NIL {
                cur = self.grow(len)?;
                if prev == NIL {
                    self.free_head = cur;
                } else {
                    self.set_next(prev, cur);
                }
            }
            let (next, size) = self.node(cur);
            if size < len {
                prev = cur;
                cur = next;
            } else if size == len {
                if prev == NIL {
                    self.free_head = next;
                } else {
                    self.set_next(prev, next);
                }
                return Ok(cur);
            } else {
                self.set_node(cur, next, size - len);
                return Ok(cur + size - len);
            }
        }
    }

    /// Allocate an object of `len` slots with the given initial count.
    ///
    /// A count of 0 queues the object for reclamation right away; it
    /// survives only if it is retained before the next flush. The storage
    /// is not cleared.
    pub fn allocate(&mut self, len: u32, count: u8, site: MarkSite) -> Result<u32, MathError> {
        debug_assert!(count <= MAX_REFCOUNT);
        let slot = self.take(len)?;
        let (page, s) = split(slot);
        self.meta[page].counts[s] = count;
        self.meta[page].sites[s] = Some(site);
        self.slots_in_use += len;
        if count == 0 {
            self.retired.push(Retired { slot, len });
        } else {
            self.marks += 1;
        }
        Ok(slot)
    }

    /// Reference count of the object headed at `slot`, or [`DEAD`].
    pub fn count(&self, slot: u32) -> u8 {
        let (page, s) = split(slot);
        self.meta.get(page).map_or(DEAD, |m| m.counts[s])
    }

    /// Whether `slot` heads an object that has not been reclaimed.
    pub fn is_live(&self, slot: u32) -> bool {
        self.count(slot) != DEAD
    }

    /// Add one reference to the object at `slot`.
    ///
    /// # Panics
    ///
    /// Panics if the slot holds no object.
    pub fn retain(&mut self, slot: u32) -> Result<u8, MathError> {
        let (page, s) = split(slot);
        let count = &mut self.meta[page].counts[s];
        assert!(*count != DEAD, "mark of released slot {slot}");
        if *count >= MAX_REFCOUNT {
            log::warn!("marked: reference count of slot {slot} saturated");
            return Err(MathError::RefCountSaturated { count: *count });
        }
        *count += 1;
        self.marks += 1;
        Ok(*count)
    }

    /// Drop one reference to the `len`-slot object at `slot`.
    ///
    /// Returns the remaining count. When it reaches zero the object is
    /// queued for the next [`flush_retired`](MarkedHeap::flush_retired).
    pub fn release(&mut self, slot: u32, len: u32) -> Result<u8, MathError> {
        let (page, s) = split(slot);
        let count = match self.meta.get_mut(page) {
            Some(meta) => &mut meta.counts[s],
            None => return Err(MathError::AlreadyReleased),
        };
        match *count {
            0 | DEAD => Err(MathError::AlreadyReleased),
            c => {
                *count = c - 1;
                self.marks = self.marks.saturating_sub(1);
                if c == 1 {
                    self.retired.push(Retired { slot, len });
                }
                Ok(c - 1)
            }
        }
    }

    /// Return every queued object whose count is still zero to the free
    /// list, coalescing adjacent blocks on the same page.
    pub fn flush_retired(&mut self) {
        if self.retired.is_empty() {
            return;
        }
        self.retired.sort_unstable();

        // Keep one entry per slot, and only slots nobody marked again.
        let mut kept = 0;
        let mut last = NIL;
        for i in 0..self.retired.len() {
            let r = self.retired[i];
            if r.slot == last {
                continue;
            }
            last = r.slot;
            let (page, s) = split(r.slot);
            let meta = &mut self.meta[page];
            if meta.counts[s] != 0 {
                continue;
            }
            meta.counts[s] = DEAD;
            meta.sites[s] = None;
            self.slots_in_use -= r.len;
            self.retired[kept] = r;
            kept += 1;
        }
        self.retired.truncate(kept);
        if kept == 0 {
            return;
        }

        // Merge the sorted retirees with the address-ordered free list.
        let mut old = self.free_head;
        let mut head = NIL;
        let mut tail = NIL;
        let mut block: Option<(u32, u32)> = None;
        let mut blocks = 0usize;
        let mut i = 0;
        loop {
            let piece = if old != NIL && (i >= kept || old < self.retired[i].slot) {
                let (next, len) = self.node(old);
                let piece = (old, len);
                old = next;
                piece
            } else if i < kept {
                let r = self.retired[i];
                i += 1;
                (r.slot, r.len)
            } else {
                break;
            };
            block = match block {
                Some((start, len)) if start + len == piece.0 && split(start).0 == split(piece.0).0 => {
                    Some((start, len + piece.1))
                }
                Some(done) => {
                    self.emit(done, &mut head, &mut tail);
                    blocks += 1;
                    Some(piece)
                }
                None => Some(piece),
            };
        }
        if let Some(done) = block {
            self.emit(done, &mut head, &mut tail);
            blocks += 1;
        }
        self.free_head = head;
        self.retired.clear();
        log::debug!("marked: reclaimed {kept} objects, free list has {blocks} blocks");
    }

    /// Write `block` as a free-list node and link it after `tail`.
    fn emit(&mut self, (start, len): (u32, u32), head: &mut u32, tail: &mut u32) {
        self.set_node(start, NIL, len);
        if *tail == NIL {
            *head = start;
        } else {
            self.set_next(*tail, start);
        }
        *tail = start;
    }

    /// Shared view of `floats` floats starting at `slot`.
    pub fn floats(&self, slot: u32, floats: usize) -> &[f32] {
        let (page, s) = split(slot);
        self.pages[page].floats(s, floats)
    }

    /// Mutable view of `floats` floats starting at `slot`.
    pub fn floats_mut(&mut self, slot: u32, floats: usize) -> &mut [f32] {
        let (page, s) = split(slot);
        self.pages[page].floats_mut(s, floats)
    }

    /// Copy `floats` floats from `src` to `dst` (non-overlapping).
    pub fn copy(&mut self, src: u32, dst: u32, floats: usize) {
        copy_between(&mut self.pages, src, dst, floats);
    }

    /// Iterate over every object that has not been reclaimed.
    pub fn entries(&self) -> impl Iterator<Item = MarkedEntry> + '_ {
        self.meta.iter().enumerate().flat_map(|(page, meta)| {
            meta.counts
                .iter()
                .enumerate()
                .filter(|&(_, &count)| count != DEAD)
                .map(move |(s, &count)| MarkedEntry {
                    slot: (page * PAGE_SLOTS + s) as u32,
                    count,
                    site: meta.sites[s],
                })
        })
    }

    /// Outstanding marks across all objects.
    pub fn marks(&self) -> u32 {
        self.marks
    }

    /// Slots owned by objects that have not been reclaimed.
    pub fn slots_in_use(&self) -> u32 {
        self.slots_in_use
    }

    /// Number of pages grown so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of objects waiting for the next flush.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    fn free_blocks(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let mut cur = self.free_head;
        std::iter::from_fn(move || {
            if cur == NIL {
                return None;
            }
            let (next, len) = self.node(cur);
            let block = (cur, len);
            cur = next;
            Some(block)
        })
    }

    /// Number of blocks on the free list.
    pub fn free_block_count(&self) -> usize {
        self.free_blocks().count()
    }

    /// Total slots on the free list.
    pub fn free_slots(&self) -> usize {
        self.free_blocks().map(|(_, len)| len as usize).sum()
    }

    /// Memory usage of pages, side arrays and the spilled retire buffer.
    pub fn memory_bytes(&self) -> usize {
        let pages: usize = self.pages.iter().map(Page::memory_bytes).sum();
        let meta: usize = self.meta.iter().map(PageMeta::memory_bytes).sum();
        let retired = if self.retired.spilled() {
            self.retired.capacity() * std::mem::size_of::<Retired>()
        } else {
            0
        };
        pages + meta + retired
    }
}

//! Per-frame ring allocator for scratch values.
//!
//! [`TransientArena`] bump-allocates slots with a monotonically advancing
//! cursor over a logical ring of `max_pages * PAGE_SLOTS` slots. Nothing is
//! ever freed explicitly: at each frame boundary the arena remembers where
//! the previous epoch's allocations began and ended, and the cursor may
//! wrap back to page 0 as long as it never runs into that window.
//!
//! ```text
//!           top            base            cursor
//!  ... dead | previous epoch | current epoch  | free ...
//! ```
//!
//! Pages that fall entirely outside the live window after a frame are
//! returned to a spare pool and handed back out when the cursor reaches
//! an empty page again.

use mathpool_core::{MathError, Pool};

use crate::page::{split, Page, PAGE_SLOTS, SLOT_FLOATS};

/// A saved cursor position. See [`TransientArena::recover`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Checkpoint(pub(crate) u32);

/// Whether `index` lies in the circular window `[start, end)`.
fn in_window(start: u32, end: u32, index: u32) -> bool {
    if start <= end {
        start <= index && index < end
    } else {
        index >= start || index < end
    }
}

/// Ring allocator backing transient values and external-reference records.
pub struct TransientArena {
    /// One entry per ring page; `None` once released to `spare`.
    pages: Vec<Option<Page>>,
    /// Released pages waiting to be reused.
    spare: Vec<Page>,
    /// Next slot to hand out.
    cursor: u32,
    /// Start of the current epoch's allocations.
    base: u32,
    /// Start of the previous epoch's allocations (its end is `base`).
    top: u32,
}

impl TransientArena {
    /// Create an empty ring of `max_pages` pages. No page is allocated
    /// until the cursor reaches it.
    pub fn new(max_pages: u32) -> Self {
        let mut pages = Vec::with_capacity(max_pages as usize);
        pages.resize_with(max_pages as usize, || None);
        Self {
            pages,
            spare: Vec::new(),
            cursor: 0,
            base: 0,
            top: 0,
        }
    }

    fn capacity(&self) -> u32 {
        (self.pages.len() * PAGE_SLOTS) as u32
    }

    /// Circular distance from `from` forward to `to`.
    fn distance(&self, from: u32, to: u32) -> u32 {
        if to >= from {
            to - from
        } else {
            to + self.capacity() - from
        }
    }

    /// Allocate `len` contiguous slots and return the first slot index.
    ///
    /// The allocation never straddles a page: if it would, the cursor skips
    /// to the start of the next page. When the cursor runs off the last page
    /// it wraps to page 0. The returned storage is not cleared.
    ///
    /// Returns `Err(CapacityExceeded)` if the request is larger than a page
    /// or if placing it would overwrite slots that are still live in the
    /// current or previous epoch. The cursor is unchanged on error.
    pub fn alloc(&mut self, len: u32) -> Result<u32, MathError> {
        debug_assert!(len > 0, "zero-length transient allocation");
        if len as usize > PAGE_SLOTS {
            return Err(MathError::CapacityExceeded {
                pool: Pool::Transient,
                requested: len as usize,
                available: PAGE_SLOTS,
            });
        }

        let mut start = self.cursor;
        let mut wrapped = start < self.top;
        let mut page = start as usize / PAGE_SLOTS;
        let last_page = (start + len - 1) as usize / PAGE_SLOTS;
        if last_page != page {
            page = last_page;
            start = (page * PAGE_SLOTS) as u32;
        }
        if !wrapped && page >= self.pages.len() {
            page = 0;
            start = 0;
            wrapped = true;
        }
        let end = start + len;
        if wrapped && end >= self.top {
            return Err(MathError::CapacityExceeded {
                pool: Pool::Transient,
                requested: len as usize,
                available: (self.capacity() - self.distance(self.top, self.cursor)) as usize,
            });
        }

        if self.pages[page].is_none() {
            let fresh = match self.spare.pop() {
                Some(reused) => reused,
                None => {
                    log::debug!("transient: allocating page {page}");
                    Page::new()
                }
            };
            self.pages[page] = Some(fresh);
        }

        self.cursor = end;
        Ok(start)
    }

    /// Close the current epoch.
    ///
    /// The current window becomes the previous window, the old previous
    /// window is dropped, and pages beyond the cursor that hold no live
    /// slot are released to the spare pool.
    pub fn advance(&mut self) {
        self.top = self.base;
        self.base = self.cursor;

        let first = self.cursor as usize / PAGE_SLOTS + 1;
        let mut released = 0usize;
        for page in first..self.pages.len() {
            if self.page_is_live(page) {
                continue;
            }
            if let Some(p) = self.pages[page].take() {
                self.spare.push(p);
                released += 1;
            }
        }
        if released > 0 {
            log::debug!("transient: released {released} pages to spare pool");
        }
    }

    fn page_is_live(&self, page: usize) -> bool {
        let lo = (page * PAGE_SLOTS) as u32;
        let hi = lo + PAGE_SLOTS as u32;
        if self.top <= self.cursor {
            lo < self.cursor && hi > self.top
        } else {
            hi > self.top || lo < self.cursor
        }
    }

    /// Capture the current cursor.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.cursor)
    }

    /// Rewind the cursor to `cp`, discarding everything allocated since.
    ///
    /// # Panics
    ///
    /// Panics if `cp` lies outside the current epoch's window, i.e. it was
    /// taken before the last frame boundary or after the current cursor.
    pub fn recover(&mut self, cp: Checkpoint) {
        assert!(
            self.distance(self.base, self.cursor) >= self.distance(self.base, cp.0),
            "recover past the retained window (checkpoint {}, base {}, cursor {})",
            cp.0,
            self.base,
            self.cursor
        );
        self.cursor = cp.0;
    }

    /// Whether `index` was allocated in the current epoch.
    pub fn in_current(&self, index: u32) -> bool {
        in_window(self.base, self.cursor, index)
    }

    /// Whether `index` was allocated in the previous epoch.
    pub fn in_previous(&self, index: u32) -> bool {
        in_window(self.top, self.base, index)
    }

    /// Whether `index` is live in either retained epoch.
    pub fn is_live(&self, index: u32) -> bool {
        self.in_current(index) || self.in_previous(index)
    }

    /// Slots allocated in the current epoch.
    pub fn used(&self) -> u32 {
        self.distance(self.base, self.cursor)
    }

    /// Slots allocated in the previous epoch.
    pub fn previous_used(&self) -> u32 {
        self.distance(self.top, self.base)
    }

    /// Shared view of `floats` floats starting at slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if the slot's page has been released, which only happens for
    /// handles whose epoch has expired.
    pub fn floats(&self, index: u32, floats: usize) -> &[f32] {
        let (page, slot) = split(index);
        match &self.pages[page] {
            Some(p) => p.floats(slot, floats),
            None => panic!("transient slot {index} is on a released page"),
        }
    }

    /// Mutable view of `floats` floats starting at slot `index`.
    pub fn floats_mut(&mut self, index: u32, floats: usize) -> &mut [f32] {
        let (page, slot) = split(index);
        match &mut self.pages[page] {
            Some(p) => p.floats_mut(slot, floats),
            None => panic!("transient slot {index} is on a released page"),
        }
    }

    /// Copy `floats` floats from slot `src` to slot `dst`.
    ///
    /// The ranges must not overlap.
    pub fn copy(&mut self, src: u32, dst: u32, floats: usize) {
        let mut chunk = [0.0f32; SLOT_FLOATS];
        for (k, off) in (0..floats).step_by(SLOT_FLOATS).enumerate() {
            let n = (floats - off).min(SLOT_FLOATS);
            chunk[..n].copy_from_slice(self.floats(src + k as u32, n));
            self.floats_mut(dst + k as u32, n).copy_from_slice(&chunk[..n]);
        }
    }

    /// Number of ring pages currently holding storage.
    pub fn page_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_some()).count()
    }

    /// Number of released pages waiting for reuse.
    pub fn spare_count(&self) -> usize {
        self.spare.len()
    }

    /// Memory usage of all transient pages (in the ring and spare) in bytes.
    pub fn memory_bytes(&self) -> usize {
        let pages: usize = self.pages.iter().flatten().map(Page::memory_bytes).sum();
        let spare: usize = self.spare.iter().map(Page::memory_bytes).sum();
        pages + spare
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS: u32 = PAGE_SLOTS as u32;

    #[test]
    fn sequential_allocs_are_contiguous() {
        let mut ring = TransientArena::new(2);
        assert_eq!(ring.alloc(1).unwrap(), 0);
        assert_eq!(ring.alloc(4).unwrap(), 1);
        assert_eq!(ring.alloc(1).unwrap(), 5);
        assert_eq!(ring.used(), 6);
        assert_eq!(ring.page_count(), 1);
    }

    #[test]
    fn alloc_never_straddles_a_page() {
        let mut ring = TransientArena::new(2);
        ring.alloc(PS - 2).unwrap();
        // Four slots would cross into page 1, so the cursor skips ahead.
        assert_eq!(ring.alloc(4).unwrap(), PS);
        assert_eq!(ring.page_count(), 2);
    }

    #[test]
    fn oversized_alloc_returns_error_not_panic() {
        let mut ring = TransientArena::new(4);
        let result = ring.alloc(PS + 1);
        assert!(matches!(
            result,
            Err(MathError::CapacityExceeded {
                pool: Pool::Transient,
                ..
            })
        ));
        assert_eq!(ring.used(), 0);
    }

    #[test]
    fn exactly_one_page_alloc_succeeds() {
        let mut ring = TransientArena::new(1);
        assert_eq!(ring.alloc(PS).unwrap(), 0);
    }

    #[test]
    fn wrap_into_live_data_is_rejected() {
        let mut ring = TransientArena::new(1);
        ring.alloc(PS).unwrap();
        // The only page is still live in the current epoch.
        assert!(ring.alloc(1).is_err());
        ring.advance();
        // ...and in the previous epoch after one boundary.
        assert!(ring.alloc(1).is_err());
        ring.advance();
        // Two boundaries later the page is free again.
        assert_eq!(ring.alloc(1).unwrap(), 0);
    }

    #[test]
    fn wrap_reuses_page_zero_once_vacated() {
        let mut ring = TransientArena::new(2);
        ring.alloc(PS).unwrap();
        ring.advance();
        ring.alloc(PS).unwrap();
        ring.advance();
        // Page 0 held the epoch before last; page 1 is still previous.
        assert_eq!(ring.alloc(10).unwrap(), 0);
        assert!(ring.in_current(5));
        assert!(ring.in_previous(PS + 5));
        assert!(!ring.in_current(PS + 5));
    }

    #[test]
    fn windows_track_epochs() {
        let mut ring = TransientArena::new(2);
        let a = ring.alloc(1).unwrap();
        assert!(ring.in_current(a));
        ring.advance();
        let b = ring.alloc(1).unwrap();
        assert!(ring.in_previous(a));
        assert!(ring.in_current(b));
        ring.advance();
        assert!(!ring.is_live(a));
        assert!(ring.in_previous(b));
        assert_eq!(ring.previous_used(), 1);
    }

    #[test]
    fn advance_releases_idle_pages_to_spare() {
        let mut ring = TransientArena::new(4);
        ring.alloc(PS).unwrap();
        ring.alloc(PS).unwrap();
        ring.alloc(PS).unwrap();
        assert_eq!(ring.page_count(), 3);
        ring.advance();
        ring.advance();
        // Fill page 3, then wrap onto page 0 and stop early there.
        ring.alloc(PS).unwrap();
        ring.alloc(1).unwrap();
        ring.advance();
        // Pages 1 and 2 are past the cursor and outside the live window.
        assert_eq!(ring.spare_count(), 2);
        assert_eq!(ring.page_count(), 2);
        // A later allocation reuses a spare page instead of allocating.
        ring.alloc(PS).unwrap();
        assert_eq!(ring.spare_count(), 1);
    }

    #[test]
    #[should_panic(expected = "is on a released page")]
    fn read_from_released_page_panics() {
        let mut ring = TransientArena::new(4);
        ring.alloc(PS).unwrap();
        let dead = ring.alloc(4).unwrap();
        ring.alloc(PS).unwrap();
        ring.advance();
        ring.advance();
        ring.alloc(PS).unwrap();
        ring.alloc(1).unwrap();
        ring.advance();
        assert!(!ring.is_live(dead));
        let _ = ring.floats(dead, 16);
    }

    #[test]
    fn recover_to_fresh_checkpoint_is_noop() {
        let mut ring = TransientArena::new(1);
        ring.alloc(3).unwrap();
        let cp = ring.checkpoint();
        ring.recover(cp);
        assert_eq!(ring.used(), 3);
    }

    #[test]
    fn recover_discards_later_allocations() {
        let mut ring = TransientArena::new(1);
        let keep = ring.alloc(1).unwrap();
        let cp = ring.checkpoint();
        let scratch = ring.alloc(10).unwrap();
        ring.recover(cp);
        assert!(ring.in_current(keep));
        assert!(!ring.in_current(scratch));
        assert_eq!(ring.alloc(1).unwrap(), scratch);
    }

    #[test]
    #[should_panic(expected = "recover past the retained window")]
    fn recover_before_frame_boundary_panics() {
        let mut ring = TransientArena::new(1);
        ring.alloc(1).unwrap();
        let cp = ring.checkpoint();
        ring.alloc(5).unwrap();
        ring.advance();
        ring.alloc(1).unwrap();
        ring.recover(cp);
    }

    #[test]
    fn copy_moves_multi_slot_values() {
        let mut ring = TransientArena::new(1);
        let src = ring.alloc(4).unwrap();
        let dst = ring.alloc(4).unwrap();
        for (i, v) in ring.floats_mut(src, 16).iter_mut().enumerate() {
            *v = i as f32;
        }
        ring.copy(src, dst, 16);
        assert_eq!(ring.floats(dst, 16)[15], 15.0);
        assert_eq!(ring.floats(dst, 16)[0], 0.0);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn live_allocations_never_overlap(
                frames in proptest::collection::vec(
                    proptest::collection::vec(1u32..64, 0..20),
                    1..12,
                ),
            ) {
                let mut ring = TransientArena::new(2);
                // (start, len) of every allocation in the previous and current epoch.
                let mut previous: Vec<(u32, u32)> = Vec::new();
                for sizes in &frames {
                    let mut current: Vec<(u32, u32)> = Vec::new();
                    for &len in sizes {
                        if let Ok(start) = ring.alloc(len) {
                            prop_assert!(crate::page::fits_in_page(start, len));
                            for &(s, l) in previous.iter().chain(current.iter()) {
                                prop_assert!(start + len <= s || s + l <= start);
                            }
                            current.push((start, len));
                        }
                    }
                    ring.advance();
                    previous = current;
                }
            }
        }
    }
}

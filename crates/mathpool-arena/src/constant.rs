//! Append-only pool of interned values.
//!
//! Interning scans every slot offset already written for a bitwise-equal
//! run before appending, so equal values share one offset. A run never
//! straddles a page: if the current page cannot hold it, the tail of that
//! page is skipped and the run starts the next page.

use mathpool_core::{MathError, Pool};

use crate::handle::MAX_INDEX;
use crate::page::{fits_in_page, split, Page, PAGE_SLOTS, SLOT_FLOATS};

/// Interned values, never freed until the context drops.
pub struct ConstantPool {
    pages: Vec<Page>,
    /// Slots consumed so far, including skipped page tails.
    len: u32,
    max_pages: usize,
    /// Slots occupied by interned data.
    stored: u32,
    /// Handles store `offset + 1`, so a run must end at or below this.
    index_limit: u32,
}

impl ConstantPool {
    /// Create an empty pool that may grow to `max_pages` pages.
    pub fn new(max_pages: u32) -> Self {
        Self {
            pages: Vec::new(),
            len: 0,
            max_pages: max_pages as usize,
            stored: 0,
            index_limit: MAX_INDEX,
        }
    }

    #[cfg(test)]
    fn with_index_limit(max_pages: u32, index_limit: u32) -> Self {
        Self {
            index_limit,
            ..Self::new(max_pages)
        }
    }

    /// Find `values` in the pool, bit for bit.
    fn find(&self, values: &[f32], slots: u32) -> Option<u32> {
        if self.len < slots {
            return None;
        }
        (0..=self.len - slots)
            .filter(|&offset| fits_in_page(offset, slots))
            .find(|&offset| {
                self.floats(offset, values.len())
                    .iter()
                    .zip(values)
                    .all(|(a, b)| a.to_bits() == b.to_bits())
            })
    }

    /// Intern `values` (a whole number of slots) and return its offset.
    ///
    /// Equal values return the offset of the earlier copy.
    pub fn intern(&mut self, values: &[f32]) -> Result<u32, MathError> {
        debug_assert_eq!(values.len() % SLOT_FLOATS, 0);
        let slots = (values.len() / SLOT_FLOATS) as u32;
        if let Some(offset) = self.find(values, slots) {
            return Ok(offset);
        }

        let mut offset = self.len;
        if !fits_in_page(offset, slots) {
            offset = (split(offset).0 * PAGE_SLOTS) as u32 + PAGE_SLOTS as u32;
        }
        let page = split(offset).0;
        let last_page = split(offset + slots - 1).0;
        let past_handle_range =
            u64::from(offset) + u64::from(slots) > u64::from(self.index_limit);
        if slots as usize > PAGE_SLOTS || last_page >= self.max_pages || past_handle_range {
            let limit = (self.max_pages * PAGE_SLOTS).min(self.index_limit as usize);
            let used = (self.len as usize).min(limit);
            return Err(MathError::CapacityExceeded {
                pool: Pool::Constant,
                requested: slots as usize,
                available: limit - used,
            });
        }
        while self.pages.len() <= page {
            log::debug!("constant: allocating page {}", self.pages.len());
            self.pages.push(Page::new());
        }
        let (_, slot) = split(offset);
        self.pages[page]
            .floats_mut(slot, values.len())
            .copy_from_slice(values);
        self.len = offset + slots;
        self.stored += slots;
        Ok(offset)
    }

    /// Shared view of `floats` floats starting at `offset`.
    pub fn floats(&self, offset: u32, floats: usize) -> &[f32] {
        let (page, slot) = split(offset);
        self.pages[page].floats(slot, floats)
    }

    /// Whether a run of `slots` slots at `offset` lies inside written data.
    pub fn contains(&self, offset: u32, slots: u32) -> bool {
        offset
            .checked_add(slots)
            .is_some_and(|end| end <= self.len)
    }

    /// Slots occupied by interned data.
    pub fn slots(&self) -> u32 {
        self.stored
    }

    /// Memory usage of the pool's pages.
    pub fn memory_bytes(&self) -> usize {
        self.pages.iter().map(Page::memory_bytes).sum()
    }
}

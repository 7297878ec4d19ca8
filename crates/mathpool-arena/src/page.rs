//! Fixed-size pages of 4-float slots.
//!
//! A [`Page`] is the unit every pool grows by: [`PAGE_SLOTS`] slots of
//! [`SLOT_FLOATS`] floats in one contiguous `Vec<f32>`. Pools address slots
//! with a global index `page * PAGE_SLOTS + slot`; an object never straddles
//! two pages, so any object resolves to a single slice.

/// Number of slots in one page.
pub const PAGE_SLOTS: usize = 2048;

/// Number of floats in one slot.
pub const SLOT_FLOATS: usize = 4;

/// Split a global slot index into `(page, slot within page)`.
pub(crate) fn split(index: u32) -> (usize, usize) {
    let index = index as usize;
    (index / PAGE_SLOTS, index % PAGE_SLOTS)
}

/// Whether `len` slots starting at `index` stay within one page.
pub(crate) fn fits_in_page(index: u32, len: u32) -> bool {
    let (_, slot) = split(index);
    slot + len as usize <= PAGE_SLOTS
}

/// One page of slot storage, zero-initialised at creation.
pub struct Page {
    data: Vec<f32>,
}

impl Page {
    /// Allocate a zeroed page.
    pub fn new() -> Self {
        Self {
            data: vec![0.0; PAGE_SLOTS * SLOT_FLOATS],
        }
    }

    /// Shared view of `floats` floats starting at `slot`.
    pub(crate) fn floats(&self, slot: usize, floats: usize) -> &[f32] {
        let start = slot * SLOT_FLOATS;
        &self.data[start..start + floats]
    }

    /// Mutable view of `floats` floats starting at `slot`.
    pub(crate) fn floats_mut(&mut self, slot: usize, floats: usize) -> &mut [f32] {
        let start = slot * SLOT_FLOATS;
        &mut self.data[start..start + floats]
    }

    /// Copy `floats` floats from slot `src` to slot `dst` within this page.
    pub(crate) fn copy_within(&mut self, src: usize, dst: usize, floats: usize) {
        let start = src * SLOT_FLOATS;
        self.data
            .copy_within(start..start + floats, dst * SLOT_FLOATS);
    }

    /// Memory usage of the backing storage in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `floats` floats between two slots that may sit on different pages
/// of the same pool.
pub(crate) fn copy_between(pages: &mut [Page], src: u32, dst: u32, floats: usize) {
    let (src_page, src_slot) = split(src);
    let (dst_page, dst_slot) = split(dst);
    if src_page == dst_page {
        pages[src_page].copy_within(src_slot, dst_slot, floats);
    } else if src_page < dst_page {
        let (lo, hi) = pages.split_at_mut(dst_page);
        hi[0]
            .floats_mut(dst_slot, floats)
            .copy_from_slice(lo[src_page].floats(src_slot, floats));
    } else {
        let (lo, hi) = pages.split_at_mut(src_page);
        lo[dst_page]
            .floats_mut(dst_slot, floats)
            .copy_from_slice(hi[0].floats(src_slot, floats));
    }
}

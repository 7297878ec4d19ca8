//! Side table of external references.
//!
//! An external reference is a transient handle whose payload lives in
//! memory the caller owns. The handle itself carries only its transient
//! slot; the pointer lives here, keyed by that slot. A handle that was
//! forged with [`MathId::from_raw`](crate::MathId::from_raw) or that
//! outlived its window finds no entry, so it can never be turned into a
//! pointer.

use std::ptr::NonNull;

use indexmap::IndexMap;
use mathpool_core::MathType;

use crate::raw::borrowed_floats;

/// Pointer, element type and element count of one external reference.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ExternalRef {
    ptr: NonNull<f32>,
    ty: MathType,
    count: u32,
}

impl ExternalRef {
    pub(crate) fn new(ptr: NonNull<f32>, ty: MathType, count: u32) -> Self {
        debug_assert!(ty.is_value());
        Self { ptr, ty, count }
    }

    /// Element type of the referenced data.
    pub(crate) fn ty(&self) -> MathType {
        self.ty
    }

    /// Element count of the referenced data.
    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    /// The referenced floats.
    ///
    /// Valid as long as the registering caller keeps its promise from
    /// [`MathContext::reference`](crate::MathContext::reference), which
    /// covers every frame in which the handle is live.
    pub(crate) fn floats(&self) -> &[f32] {
        let len = self.ty.floats_per_element() * self.count as usize;
        // SAFETY: the registering caller guaranteed `len` readable, unaliased
        // floats at `ptr` while the handle is live; entries are pruned before
        // their handle leaves the live window.
        #[allow(unsafe_code)]
        let floats = unsafe { borrowed_floats(self.ptr, len) };
        floats
    }
}

/// External references keyed by transient slot, in registration order.
#[derive(Default)]
pub(crate) struct ExternalRefs {
    refs: IndexMap<u32, ExternalRef>,
}

impl ExternalRefs {
    pub(crate) fn insert(&mut self, slot: u32, r: ExternalRef) {
        self.refs.insert(slot, r);
    }

    pub(crate) fn get(&self, slot: u32) -> Option<&ExternalRef> {
        self.refs.get(&slot)
    }

    /// The floats behind the reference at `slot`: the whole buffer, or one
    /// element of it.
    ///
    /// # Panics
    ///
    /// Panics if no record exists for `slot` or `element` is out of bounds.
    pub(crate) fn floats(&self, slot: u32, element: Option<u32>) -> &[f32] {
        let Some(r) = self.get(slot) else {
            panic!("no external reference recorded at transient slot {slot}");
        };
        let floats = r.floats();
        match element {
            None => floats,
            Some(e) => {
                assert!(
                    e < r.count,
                    "reference element {e} out of bounds for {} elements",
                    r.count
                );
                let width = r.ty.floats_per_element();
                let start = e as usize * width;
                &floats[start..start + width]
            }
        }
    }

    /// Drop every entry whose slot `live` rejects.
    pub(crate) fn retain_live(&mut self, mut live: impl FnMut(u32) -> bool) {
        let before = self.refs.len();
        self.refs.retain(|&slot, _| live(slot));
        let dropped = before - self.refs.len();
        if dropped > 0 {
            log::debug!("refs: pruned {dropped} expired external references");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.refs.len()
    }

    pub(crate) fn memory_bytes(&self) -> usize {
        self.refs.capacity() * (std::mem::size_of::<u32>() + std::mem::size_of::<ExternalRef>())
    }
}

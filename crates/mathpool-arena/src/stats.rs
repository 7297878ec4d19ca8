//! Allocator counters and leak reporting.

use std::fmt;

use indexmap::IndexMap;

use crate::marked::MarkSite;

/// Snapshot of a context's allocation counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MathStats {
    /// Page budget per pool.
    pub max_pages: u32,
    /// Current epoch.
    pub frame: u32,
    /// Transient slots allocated in the current epoch.
    pub transient_slots: u32,
    /// Transient slots still retained from the previous epoch.
    pub previous_transient_slots: u32,
    /// Outstanding marks across all marked objects.
    pub marked_objects: u32,
    /// Marked-heap slots owned by objects not yet reclaimed.
    pub marked_slots: u32,
    /// Slots occupied by interned constants.
    pub constant_slots: u32,
    /// Handle-owning objects reported by the binding layer.
    pub binding_refs: i64,
}

impl fmt::Display for MathStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} | transient {} (+{} prev) | marked {} objects / {} slots | constant {} | refs {}",
            self.frame,
            self.transient_slots,
            self.previous_transient_slots,
            self.marked_objects,
            self.marked_slots,
            self.constant_slots,
            self.binding_refs,
        )
    }
}

/// Live marked objects grouped by the call site that created them.
///
/// Sites appear in the order their first object sits in the heap.
pub type LeakReport = IndexMap<MarkSite, usize>;

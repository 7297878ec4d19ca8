//! The allocator context.
//!
//! [`MathContext`] owns every pool and the epoch counters, and is the only
//! way to create or resolve a [`MathId`]. The lifecycle per frame is:
//!
//! 1. `import()` / `vec4()` / `matrix()`: scratch values in the transient ring
//! 2. `mark()` / `clone_value()`: promote what must survive into the marked heap
//! 3. `constant()`: intern immutable values, usually at setup time
//! 4. `frame()`: advance the epoch, expire old scratch, reclaim unmarked objects
//!
//! Transient values stay readable for the frame they were created in and the
//! one after it. Marked values live until their count drops to zero and the
//! next `frame()` runs. Constants live as long as the context.

use std::fmt;
use std::panic::Location;
use std::ptr::NonNull;

use mathpool_core::{MathError, MathFlags, MathType};
use smallvec::SmallVec;

use crate::config::MathConfig;
use crate::constant::ConstantPool;
use crate::display::ValueDisplay;
use crate::handle::{MathId, MathLocation, MAX_COUNT, MAX_FRAME, VIEW_FRAME_BASE};
use crate::marked::{MarkSite, MarkedEntry, MarkedHeap};
use crate::reference::{ExternalRef, ExternalRefs};
use crate::stats::{LeakReport, MathStats};
use crate::transient::{Checkpoint, TransientArena};

/// Where a handle's floats are stored.
#[derive(Clone, Copy, Debug)]
enum Storage {
    Identity(MathType),
    Constant(u32),
    Transient(u32),
    External { slot: u32, element: Option<u32> },
    /// First slot of the addressed data; views are already offset.
    Marked(u32),
}

fn check_count(count: u32) {
    assert!(
        (1..=MAX_COUNT).contains(&count),
        "element count {count} out of range 1..={MAX_COUNT}"
    );
}

fn bits_eq(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Owner of all math value storage.
///
/// A context is single-threaded: every operation takes `&self` or
/// `&mut self`, and handles from one context mean nothing to another.
///
/// # Pools
///
/// ```text
/// transient: TransientArena  ←── ring, reclaimed by epoch
/// marked:    MarkedHeap      ←── refcounted, reclaimed at frame()
/// constants: ConstantPool    ←── append-only, deduplicated
/// refs:      ExternalRefs    ←── caller-owned buffers, transient lifetime
/// ```
pub struct MathContext {
    config: MathConfig,
    /// Current epoch.
    frame: u32,
    /// Epoch before `frame`, still readable.
    last_frame: u32,
    transient: TransientArena,
    marked: MarkedHeap,
    constants: ConstantPool,
    refs: ExternalRefs,
    flags: MathFlags,
    /// Counter maintained by the binding layer.
    binding_refs: i64,
}

impl MathContext {
    /// Create a context. No page is allocated until first use.
    ///
    /// Returns `Err(InvalidConfig)` if `config.max_pages` is too large for
    /// handle indices.
    pub fn new(config: MathConfig) -> Result<Self, MathError> {
        let config = config.validated()?;
        log::debug!("context: created with {} pages per pool", config.max_pages);
        Ok(Self {
            frame: 0,
            last_frame: MAX_FRAME,
            transient: TransientArena::new(config.max_pages),
            marked: MarkedHeap::new(config.max_pages),
            constants: ConstantPool::new(config.max_pages),
            refs: ExternalRefs::default(),
            flags: MathFlags::new(),
            binding_refs: 0,
            config,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &MathConfig {
        &self.config
    }

    /// Current epoch.
    pub fn current_frame(&self) -> u32 {
        self.frame
    }

    // ── Allocation ──────────────────────────────────────────────

    /// Allocate `count` elements of `ty` in the transient ring.
    ///
    /// With `Some(values)` the storage is filled from `values`, which must
    /// hold exactly `count` elements; with `None` it is zeroed. Importing
    /// [`MathType::Null`] returns [`MathId::NULL`].
    ///
    /// # Panics
    ///
    /// Panics if `count` is outside `1..=MAX_COUNT`, if `ty` is
    /// [`MathType::Ref`], or if `values` has the wrong length.
    pub fn import(
        &mut self,
        values: Option<&[f32]>,
        ty: MathType,
        count: u32,
    ) -> Result<MathId, MathError> {
        check_count(count);
        if ty == MathType::Null {
            return Ok(MathId::NULL);
        }
        assert!(ty.is_value(), "cannot import values of type {ty}");
        let floats = ty.floats_per_element() * count as usize;
        if let Some(v) = values {
            assert_eq!(
                v.len(),
                floats,
                "import of {count} {ty} needs {floats} floats, got {}",
                v.len()
            );
        }
        let index = self.transient.alloc(ty.slots_per_element() * count)?;
        let dst = self.transient.floats_mut(index, floats);
        match values {
            Some(v) => dst.copy_from_slice(v),
            None => dst.fill(0.0),
        }
        Ok(MathId::transient(ty, self.frame, index, count))
    }

    /// Import one column-major 4×4 matrix.
    pub fn matrix(&mut self, m: &[f32; 16]) -> Result<MathId, MathError> {
        self.import(Some(m), MathType::Matrix, 1)
    }

    /// Import one 4-vector.
    pub fn vec4(&mut self, v: &[f32; 4]) -> Result<MathId, MathError> {
        self.import(Some(v), MathType::Vec4, 1)
    }

    /// Import one quaternion `(x, y, z, w)`.
    pub fn quat(&mut self, q: &[f32; 4]) -> Result<MathId, MathError> {
        self.import(Some(q), MathType::Quat, 1)
    }

    /// Wrap `count` caller-owned elements of `ty` at `ptr` in a handle.
    ///
    /// The handle has transient lifetime: it is valid this frame and the
    /// next, and reads go straight to the caller's buffer. It reserves one
    /// transient slot.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null, aligned, and valid for reads of
    /// `count * ty.floats_per_element()` floats. The buffer must stay
    /// allocated and unmodified until the handle is no longer
    /// [`valid`](MathContext::valid), i.e. until the second `frame()` after
    /// this call or a `recover()` to an earlier checkpoint.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is not a value type, if `count` is outside
    /// `1..MAX_COUNT`, or if `ptr` is null.
    #[allow(unsafe_code)]
    pub unsafe fn reference(
        &mut self,
        ptr: *const f32,
        ty: MathType,
        count: u32,
    ) -> Result<MathId, MathError> {
        assert!(ty.is_value(), "cannot reference values of type {ty}");
        // Element N of a reference is stored as N + 1 in the size field.
        assert!(
            (1..MAX_COUNT).contains(&count),
            "reference count {count} out of range 1..{MAX_COUNT}"
        );
        let Some(ptr) = NonNull::new(ptr.cast_mut()) else {
            panic!("external reference to a null pointer");
        };
        let index = self.transient.alloc(1)?;
        self.refs.insert(index, ExternalRef::new(ptr, ty, count));
        Ok(MathId::reference(self.frame, index))
    }

    // ── Access ──────────────────────────────────────────────────

    fn storage(&self, id: MathId) -> (Storage, usize) {
        let ty = id.raw_type();
        let floats = ty.floats_per_element() * (id.size_field() as usize + 1);
        match id.location() {
            MathLocation::Identity => (Storage::Identity(ty), ty.identity_value().len()),
            MathLocation::Constant { offset } => (Storage::Constant(offset), floats),
            MathLocation::Transient { index, .. } if ty == MathType::Ref => {
                let element = id.size_field().checked_sub(1);
                let len = self.refs.floats(index, element).len();
                (
                    Storage::External {
                        slot: index,
                        element,
                    },
                    len,
                )
            }
            MathLocation::Transient { index, .. } => (Storage::Transient(index), floats),
            MathLocation::Marked { slot } => (Storage::Marked(slot), floats),
            MathLocation::View { slot, element } => (
                Storage::Marked(slot + element * ty.slots_per_element()),
                ty.floats_per_element(),
            ),
        }
    }

    fn read(&self, src: Storage, floats: usize) -> &[f32] {
        match src {
            Storage::Identity(ty) => ty.identity_value(),
            Storage::Constant(offset) => self.constants.floats(offset, floats),
            Storage::Transient(index) => self.transient.floats(index, floats),
            Storage::External { slot, element } => self.refs.floats(slot, element),
            Storage::Marked(slot) => self.marked.floats(slot, floats),
        }
    }

    /// The floats behind `id`: `size_of(id)` elements of `type_of(id)`.
    ///
    /// The slice borrows the context, so it cannot be held across a
    /// `frame()` or `recover()`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is an external reference whose record has expired,
    /// or a dead transient handle whose page was released to the spare
    /// pool. Reading any other dead handle is a debug assertion; release
    /// builds return whatever the slot now holds.
    pub fn value(&self, id: MathId) -> &[f32] {
        debug_assert!(self.valid(id), "read of dead handle {id:?}");
        let (src, floats) = self.storage(id);
        self.read(src, floats)
    }

    /// Like [`value`](MathContext::value), but `None` for a dead handle.
    pub fn try_value(&self, id: MathId) -> Option<&[f32]> {
        self.valid(id).then(|| self.value(id))
    }

    /// Mutable storage of a transient value or a directly marked value.
    ///
    /// # Panics
    ///
    /// Panics if `id` is a constant, an identity, an element view or an
    /// external reference.
    pub fn init(&mut self, id: MathId) -> &mut [f32] {
        debug_assert!(self.valid(id), "init of dead handle {id:?}");
        let floats = id.raw_type().floats_per_element() * (id.size_field() as usize + 1);
        match id.location() {
            MathLocation::Transient { .. } if id.is_ref() => {
                panic!("init on external reference {id:?}")
            }
            MathLocation::Transient { index, .. } => self.transient.floats_mut(index, floats),
            MathLocation::Marked { slot } => self.marked.floats_mut(slot, floats),
            _ => panic!("init on immutable handle {id:?}"),
        }
    }

    // ── Lifetime transitions ───────────────────────────────────

    fn copy_to_marked(&mut self, src: Storage, floats: usize, dst: u32) {
        match src {
            Storage::Marked(slot) => self.marked.copy(slot, dst, floats),
            Storage::Identity(ty) => self
                .marked
                .floats_mut(dst, floats)
                .copy_from_slice(ty.identity_value()),
            Storage::Constant(offset) => self
                .marked
                .floats_mut(dst, floats)
                .copy_from_slice(self.constants.floats(offset, floats)),
            Storage::Transient(index) => self
                .marked
                .floats_mut(dst, floats)
                .copy_from_slice(self.transient.floats(index, floats)),
            Storage::External { slot, element } => self
                .marked
                .floats_mut(dst, floats)
                .copy_from_slice(self.refs.floats(slot, element)),
        }
    }

    fn copy_to_transient(&mut self, src: Storage, floats: usize, dst: u32) {
        match src {
            Storage::Transient(index) => self.transient.copy(index, dst, floats),
            Storage::Identity(ty) => self
                .transient
                .floats_mut(dst, floats)
                .copy_from_slice(ty.identity_value()),
            Storage::Constant(offset) => self
                .transient
                .floats_mut(dst, floats)
                .copy_from_slice(self.constants.floats(offset, floats)),
            Storage::Marked(slot) => self
                .transient
                .floats_mut(dst, floats)
                .copy_from_slice(self.marked.floats(slot, floats)),
            Storage::External { slot, element } => self
                .transient
                .floats_mut(dst, floats)
                .copy_from_slice(self.refs.floats(slot, element)),
        }
    }

    /// Copy the value of `id` into a fresh marked object with count 1.
    fn promote(&mut self, id: MathId, site: MarkSite) -> Result<MathId, MathError> {
        debug_assert!(self.valid(id), "mark of dead handle {id:?}");
        let ty = self.type_of(id);
        assert!(ty.is_value(), "cannot mark a {ty} handle");
        let count = self.size_of(id);
        let (src, floats) = self.storage(id);
        let slot = self
            .marked
            .allocate(ty.slots_per_element() * count, 1, site)?;
        self.copy_to_marked(src, floats, slot);
        Ok(MathId::marked(ty, slot, count))
    }

    /// Keep `id` alive across frames.
    ///
    /// - marked handle: bumps its count and returns the same handle
    /// - transient value, external reference or element view: copies the
    ///   value into a new marked object with count 1
    /// - constant or identity: returned unchanged
    ///
    /// Returns `Err(RefCountSaturated)` if a marked handle is already at
    /// [`MAX_REFCOUNT`](crate::marked::MAX_REFCOUNT), and
    /// `Err(CapacityExceeded)` if the marked heap is full.
    #[track_caller]
    pub fn mark(&mut self, id: MathId) -> Result<MathId, MathError> {
        match id.location() {
            MathLocation::Identity | MathLocation::Constant { .. } => Ok(id),
            MathLocation::Marked { slot } => {
                self.marked.retain(slot)?;
                Ok(id)
            }
            MathLocation::Transient { .. } | MathLocation::View { .. } => {
                self.promote(id, Location::caller())
            }
        }
    }

    /// Copy `id` into a new, independent marked object with count 1.
    ///
    /// Constants are immutable and returned unchanged.
    #[track_caller]
    pub fn clone_value(&mut self, id: MathId) -> Result<MathId, MathError> {
        if id.is_constant() {
            return Ok(id);
        }
        self.promote(id, Location::caller())
    }

    /// Allocate a zeroed marked object with count 0.
    ///
    /// The object is writable through [`init`](MathContext::init) and is
    /// reclaimed at the next `frame()` unless something marks it first.
    #[track_caller]
    pub fn premark(&mut self, ty: MathType, count: u32) -> Result<MathId, MathError> {
        assert!(ty.is_value(), "cannot premark type {ty}");
        check_count(count);
        let slot = self
            .marked
            .allocate(ty.slots_per_element() * count, 0, Location::caller())?;
        self.marked
            .floats_mut(slot, ty.floats_per_element() * count as usize)
            .fill(0.0);
        Ok(MathId::marked(ty, slot, count))
    }

    /// Drop one reference to a marked value and return the remaining count.
    ///
    /// At zero the object is queued and reclaimed by the next `frame()`;
    /// marking it again before then keeps it. Constants return `Ok(0)`.
    ///
    /// Returns `Err(NotMarked)` for transient handles and element views,
    /// and `Err(AlreadyReleased)` if the count is already zero.
    pub fn unmark(&mut self, id: MathId) -> Result<u32, MathError> {
        match id.location() {
            MathLocation::Identity | MathLocation::Constant { .. } => Ok(0),
            MathLocation::Transient { .. } | MathLocation::View { .. } => {
                Err(MathError::NotMarked)
            }
            MathLocation::Marked { slot } => {
                let slots = id.raw_type().slots_per_element() * (id.size_field() + 1);
                self.marked.release(slot, slots).map(u32::from)
            }
        }
    }

    /// Intern the value of `id` in the constant pool.
    ///
    /// Constants are returned unchanged. A single element equal to its
    /// type's identity becomes [`MathId::identity`]. Otherwise the pool is
    /// searched for a bit-identical value before appending.
    pub fn constant(&mut self, id: MathId) -> Result<MathId, MathError> {
        if id.is_constant() {
            return Ok(id);
        }
        let ty = self.type_of(id);
        let count = self.size_of(id);
        let values: SmallVec<[f32; 16]> = SmallVec::from_slice(self.value(id));
        if count == 1 && bits_eq(&values, ty.identity_value()) {
            return Ok(MathId::identity(ty));
        }
        let offset = self.constants.intern(&values)?;
        Ok(MathId::constant(ty, offset, count))
    }

    /// Handle to element `i` of an array value, without copying.
    ///
    /// - transient or constant array: a handle to the element's slots
    /// - marked array: an element view sharing the parent's count; it must
    ///   not be used after the parent is unmarked and reclaimed
    /// - external reference: the reference narrowed to one element
    ///
    /// # Panics
    ///
    /// Panics if `i >= size_of(id)` or if `id` is an already narrowed
    /// external reference.
    pub fn element(&self, id: MathId, i: u32) -> MathId {
        let size = self.size_of(id);
        assert!(i < size, "element {i} out of bounds for array of {size}");
        match id.location() {
            MathLocation::Transient { .. } if id.is_ref() => {
                assert!(id.size_field() == 0, "element of narrowed reference {id:?}");
                id.with_size_field(i + 1)
            }
            MathLocation::Marked { .. } => id.with_size_field(0).with_frame(VIEW_FRAME_BASE + i),
            MathLocation::View { .. } | MathLocation::Identity => id,
            MathLocation::Transient { .. } | MathLocation::Constant { .. } => id
                .with_size_field(0)
                .with_index(id.index() + i * id.raw_type().slots_per_element()),
        }
    }

    /// Copy a value forward so it survives another frame.
    ///
    /// Transient handles of the current epoch and constants are returned
    /// unchanged; anything else is copied into a new transient value.
    pub fn live(&mut self, id: MathId) -> Result<MathId, MathError> {
        match id.location() {
            MathLocation::Transient { epoch, .. } if epoch == self.frame => return Ok(id),
            MathLocation::Identity | MathLocation::Constant { .. } => return Ok(id),
            _ => {}
        }
        debug_assert!(self.valid(id), "live of dead handle {id:?}");
        let ty = self.type_of(id);
        let count = self.size_of(id);
        let (src, floats) = self.storage(id);
        let index = self.transient.alloc(ty.slots_per_element() * count)?;
        self.copy_to_transient(src, floats, index);
        Ok(MathId::transient(ty, self.frame, index, count))
    }

    // ── Frames ──────────────────────────────────────────────────

    /// Advance the epoch.
    ///
    /// Values of the epoch before the previous one expire, idle transient
    /// pages go back to the spare pool, expired external references are
    /// dropped, and marked objects whose count is still zero are reclaimed.
    pub fn frame(&mut self) {
        self.last_frame = self.frame;
        if self.frame == MAX_FRAME {
            log::debug!("context: epoch counter wrapped");
            self.frame = 0;
        } else {
            self.frame += 1;
        }
        self.transient.advance();
        let transient = &self.transient;
        self.refs.retain_live(|slot| transient.is_live(slot));
        self.marked.flush_retired();
        log::trace!(
            "context: frame {} ({} marked slots)",
            self.frame,
            self.marked.slots_in_use()
        );
    }

    /// Capture the transient cursor.
    pub fn checkpoint(&self) -> Checkpoint {
        self.transient.checkpoint()
    }

    /// Rewind the transient cursor to `cp`. Every transient handle created
    /// after the checkpoint becomes invalid.
    ///
    /// # Panics
    ///
    /// Panics if `cp` was taken before the last `frame()`.
    pub fn recover(&mut self, cp: Checkpoint) {
        self.transient.recover(cp);
        let transient = &self.transient;
        self.refs.retain_live(|slot| transient.is_live(slot));
    }

    // ── Queries ─────────────────────────────────────────────────

    fn transient_alive(&self, epoch: u32, index: u32) -> bool {
        (epoch == self.frame && self.transient.in_current(index))
            || (epoch == self.last_frame && self.transient.in_previous(index))
    }

    /// Whether `id` can still be read.
    ///
    /// Transient handles are valid in their own epoch and the next one, as
    /// long as no `recover()` discarded them. Marked handles and views are
    /// valid until their object is reclaimed. Constants are always valid.
    pub fn valid(&self, id: MathId) -> bool {
        match id.location() {
            MathLocation::Identity => true,
            MathLocation::Constant { offset } => self.constants.contains(
                offset,
                id.raw_type().slots_per_element() * (id.size_field() + 1),
            ),
            MathLocation::Transient { epoch, index } => {
                self.transient_alive(epoch, index) && (!id.is_ref() || self.refs.get(index).is_some())
            }
            MathLocation::Marked { slot } | MathLocation::View { slot, .. } => {
                self.marked.is_live(slot)
            }
        }
    }

    /// Whether `id` is a direct marked handle with a non-zero count.
    pub fn is_marked(&self, id: MathId) -> bool {
        match id.location() {
            MathLocation::Marked { slot } => {
                let count = self.marked.count(slot);
                count != crate::marked::DEAD && count > 0
            }
            _ => false,
        }
    }

    /// Element type of `id`, seeing through external references.
    ///
    /// An external reference whose record expired reports
    /// [`MathType::Null`].
    pub fn type_of(&self, id: MathId) -> MathType {
        match id.location() {
            MathLocation::Transient { index, .. } if id.is_ref() => {
                self.refs.get(index).map_or(MathType::Null, ExternalRef::ty)
            }
            _ => id.raw_type(),
        }
    }

    /// Element count of `id`, seeing through external references.
    ///
    /// A narrowed reference has one element; an expired one has none.
    pub fn size_of(&self, id: MathId) -> u32 {
        match id.location() {
            MathLocation::Transient { index, .. } if id.is_ref() => {
                if id.size_field() > 0 {
                    1
                } else {
                    self.refs.get(index).map_or(0, ExternalRef::count)
                }
            }
            _ => id.size_field() + 1,
        }
    }

    pub(crate) fn marked_count(&self, slot: u32) -> u8 {
        self.marked.count(slot)
    }

    // ── Flags and counters ──────────────────────────────────────

    /// Set flag `id` (see [`MathFlags`]).
    pub fn set_flag(&mut self, id: u8, on: bool) {
        self.flags.set(id, on);
    }

    /// Read flag `id`.
    pub fn flag(&self, id: u8) -> bool {
        self.flags.get(id)
    }

    /// The whole flag word.
    pub fn flags(&self) -> MathFlags {
        self.flags
    }

    /// Adjust the binding layer's object counter by `delta`.
    pub fn adjust_binding_refs(&mut self, delta: i64) {
        self.binding_refs += delta;
    }

    /// Current allocation counters.
    pub fn stats(&self) -> MathStats {
        MathStats {
            max_pages: self.config.max_pages,
            frame: self.frame,
            transient_slots: self.transient.used(),
            previous_transient_slots: self.transient.previous_used(),
            marked_objects: self.marked.marks(),
            marked_slots: self.marked.slots_in_use(),
            constant_slots: self.constants.slots(),
            binding_refs: self.binding_refs,
        }
    }

    /// Bytes held by the context and all of its pools.
    pub fn memory_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.transient.memory_bytes()
            + self.marked.memory_bytes()
            + self.constants.memory_bytes()
            + self.refs.memory_bytes()
    }

    /// Every marked object not yet reclaimed, in slot order.
    pub fn marked_entries(&self) -> impl Iterator<Item = MarkedEntry> + '_ {
        self.marked.entries()
    }

    /// Count of marked objects with a non-zero count, by creation site.
    pub fn leak_report(&self) -> LeakReport {
        let mut report = LeakReport::new();
        for entry in self.marked.entries().filter(|e| e.count > 0) {
            if let Some(site) = entry.site {
                *report.entry(site).or_insert(0) += 1;
            }
        }
        report
    }

    /// A [`Display`](fmt::Display) adapter printing `id` and its value.
    pub fn display(&self, id: MathId) -> ValueDisplay<'_> {
        ValueDisplay::new(self, id)
    }
}

impl fmt::Debug for MathContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MathContext")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl Drop for MathContext {
    fn drop(&mut self) {
        let marks = self.marked.marks();
        if marks > 0 {
            log::debug!("context: dropped with {marks} outstanding marks");
        }
    }
}

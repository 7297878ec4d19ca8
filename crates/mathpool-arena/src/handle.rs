//! Bit-packed value handles and their decoded locations.
//!
//! A [`MathId`] is a single `u64` that names a value, its shape and its
//! lifetime class. It is `Copy`, compares in O(1), and can be handed to a
//! scripting layer as an opaque word. The packing is:
//!
//! ```text
//!  63   62..60  59 ........ 32  31 .... 20  19 ....... 0
//! [tr] [ type ] [    index    ] [   size  ] [   frame   ]
//! ```
//!
//! - `tr`: 1 for transient values (and external references), 0 for
//!   marked values and constants.
//! - `frame`: transient: allocation epoch. Otherwise 0 for constants,
//!   1 for a marked slot, `2 + i` for a view of element `i` of a marked array.
//! - `index`: slot offset in the pool selected by `tr`/`frame`. Constants
//!   store `offset + 1` so that 0 can mean "the identity value".
//! - `size`: element count minus one. External references reuse it as a
//!   sub-index: 0 for the whole buffer, `n + 1` for element `n`.

use std::fmt;

use mathpool_core::MathType;

const FRAME_BITS: u32 = 20;
const SIZE_BITS: u32 = 12;
const INDEX_BITS: u32 = 28;

const SIZE_SHIFT: u32 = FRAME_BITS;
const INDEX_SHIFT: u32 = 32;
const TYPE_SHIFT: u32 = 60;
const TRANSIENT_SHIFT: u32 = 63;

/// Largest epoch number a handle can carry. The epoch counter wraps to 0
/// after this value.
pub const MAX_FRAME: u32 = (1 << FRAME_BITS) - 1;

/// Largest array length a handle can describe.
pub const MAX_COUNT: u32 = 1 << SIZE_BITS;

/// Largest slot index a handle can carry.
pub const MAX_INDEX: u32 = (1 << INDEX_BITS) - 1;

/// Frame value marking a direct reference to a marked slot.
pub(crate) const MARKED_FRAME: u32 = 1;

/// First frame value used for element views; view of element `i` is
/// `VIEW_FRAME_BASE + i`.
pub(crate) const VIEW_FRAME_BASE: u32 = 2;

/// Opaque handle to a math value owned by a [`MathContext`](crate::MathContext).
///
/// Handles are only meaningful to the context that produced them. They are
/// never dereferenced directly; resolve them with
/// [`MathContext::value`](crate::MathContext::value).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct MathId(u64);

impl MathId {
    /// The null handle. Also the identity of [`MathType::Null`].
    pub const NULL: MathId = MathId(0);

    /// The zero-storage identity value of `ty`.
    ///
    /// Bit-identical to a constant handle with index 0, so comparing a
    /// constant against the identity is a plain integer comparison.
    pub const fn identity(ty: MathType) -> Self {
        Self((ty as u64) << TYPE_SHIFT)
    }

    fn pack(transient: bool, ty: MathType, frame: u32, index: u32, size: u32) -> Self {
        debug_assert!(frame <= MAX_FRAME, "frame {frame} overflows handle");
        debug_assert!(index <= MAX_INDEX, "index {index} overflows handle");
        debug_assert!(size < MAX_COUNT, "size {size} overflows handle");
        Self(
            (transient as u64) << TRANSIENT_SHIFT
                | (ty as u64) << TYPE_SHIFT
                | (index as u64) << INDEX_SHIFT
                | (size as u64) << SIZE_SHIFT
                | frame as u64,
        )
    }

    /// Handle to `count` elements of `ty` at transient slot `index`.
    pub(crate) fn transient(ty: MathType, epoch: u32, index: u32, count: u32) -> Self {
        Self::pack(true, ty, epoch, index, count - 1)
    }

    /// Handle to an external-reference record at transient slot `index`.
    pub(crate) fn reference(epoch: u32, index: u32) -> Self {
        Self::pack(true, MathType::Ref, epoch, index, 0)
    }

    /// Handle to a marked object whose head is `slot`.
    pub(crate) fn marked(ty: MathType, slot: u32, count: u32) -> Self {
        Self::pack(false, ty, MARKED_FRAME, slot, count - 1)
    }

    /// Handle to a constant stored at pool `offset`.
    pub(crate) fn constant(ty: MathType, offset: u32, count: u32) -> Self {
        Self::pack(false, ty, 0, offset + 1, count - 1)
    }

    /// Rebuild a handle from a word produced by [`MathId::to_raw`].
    ///
    /// Returns `None` if the type tag is not a known [`MathType`]. A word
    /// that decodes is not necessarily valid for any context; check with
    /// [`MathContext::valid`](crate::MathContext::valid).
    pub fn from_raw(bits: u64) -> Option<Self> {
        let tag = ((bits >> TYPE_SHIFT) & 0b111) as u8;
        MathType::from_bits(tag).map(|_| Self(bits))
    }

    /// The raw 64-bit word, for passing through opaque channels.
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// The stored type tag. For external references this is
    /// [`MathType::Ref`]; use [`MathContext::type_of`](crate::MathContext::type_of)
    /// to see through the indirection.
    pub fn raw_type(self) -> MathType {
        let tag = ((self.0 >> TYPE_SHIFT) & 0b111) as u8;
        // Construction paths only admit known tags.
        MathType::from_bits(tag).unwrap_or(MathType::Null)
    }

    pub(crate) fn frame(self) -> u32 {
        (self.0 & MAX_FRAME as u64) as u32
    }

    pub(crate) fn size_field(self) -> u32 {
        ((self.0 >> SIZE_SHIFT) & (MAX_COUNT as u64 - 1)) as u32
    }

    pub(crate) fn index(self) -> u32 {
        ((self.0 >> INDEX_SHIFT) & MAX_INDEX as u64) as u32
    }

    pub(crate) fn with_frame(self, frame: u32) -> Self {
        Self::pack(
            self.is_transient(),
            self.raw_type(),
            frame,
            self.index(),
            self.size_field(),
        )
    }

    pub(crate) fn with_size_field(self, size: u32) -> Self {
        Self::pack(
            self.is_transient(),
            self.raw_type(),
            self.frame(),
            self.index(),
            size,
        )
    }

    pub(crate) fn with_index(self, index: u32) -> Self {
        Self::pack(
            self.is_transient(),
            self.raw_type(),
            self.frame(),
            index,
            self.size_field(),
        )
    }

    /// Whether this handle lives in the transient ring.
    pub fn is_transient(self) -> bool {
        self.0 >> TRANSIENT_SHIFT != 0
    }

    /// Whether this is [`MathId::NULL`].
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// Whether this is the zero-storage identity of its type.
    pub fn is_identity(self) -> bool {
        !self.is_transient() && self.frame() == 0 && self.index() == 0
    }

    /// Whether this is a constant (including identities and null).
    pub fn is_constant(self) -> bool {
        !self.is_transient() && self.frame() == 0
    }

    /// Whether this is an external reference.
    pub fn is_ref(self) -> bool {
        self.raw_type() == MathType::Ref
    }

    /// Whether this is an element view into a marked array.
    pub fn is_view(self) -> bool {
        !self.is_transient() && self.frame() >= VIEW_FRAME_BASE
    }

    /// Decode where this handle's storage lives.
    pub fn location(self) -> MathLocation {
        let index = self.index();
        if self.is_transient() {
            return MathLocation::Transient {
                epoch: self.frame(),
                index,
            };
        }
        match self.frame() {
            0 if index == 0 => MathLocation::Identity,
            0 => MathLocation::Constant { offset: index - 1 },
            MARKED_FRAME => MathLocation::Marked { slot: index },
            frame => MathLocation::View {
                slot: index,
                element: frame - VIEW_FRAME_BASE,
            },
        }
    }
}

impl Default for MathId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for MathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MathId({:#018x}, {}, size={}, {:?})",
            self.0,
            self.raw_type(),
            self.size_field(),
            self.location()
        )
    }
}

/// Decoded storage location of a [`MathId`].
///
/// The resolve path dispatches on this to pick a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathLocation {
    /// The built-in identity of the handle's type (or null). No storage.
    Identity,
    /// In the constant pool.
    Constant {
        /// Slot offset within the pool.
        offset: u32,
    },
    /// In the transient ring (also used for external-reference records).
    Transient {
        /// Epoch in which the value was allocated.
        epoch: u32,
        /// Slot index within the ring.
        index: u32,
    },
    /// A marked object, addressed through its head slot.
    Marked {
        /// Head slot of the object in the marked heap.
        slot: u32,
    },
    /// One element of a marked array, sharing the array's reference count.
    View {
        /// Head slot of the parent array.
        slot: u32,
        /// Element index within the parent.
        element: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_identity_and_constant() {
        assert!(MathId::NULL.is_null());
        assert!(MathId::NULL.is_identity());
        assert!(MathId::NULL.is_constant());
        assert_eq!(MathId::NULL, MathId::identity(MathType::Null));
        assert_eq!(MathId::NULL.to_raw(), 0);
    }

    #[test]
    fn identity_is_bit_equal_to_constant_encoding() {
        let id = MathId::identity(MathType::Matrix);
        assert_eq!(id.to_raw(), 1u64 << 60);
        assert!(id.is_identity());
        assert!(id.is_constant());
        assert!(!id.is_null());
        assert_eq!(id.location(), MathLocation::Identity);
        assert_eq!(id.raw_type(), MathType::Matrix);
    }

    #[test]
    fn transient_fields_round_trip() {
        let id = MathId::transient(MathType::Quat, 77, 4095, 3);
        assert!(id.is_transient());
        assert!(!id.is_constant());
        assert_eq!(id.raw_type(), MathType::Quat);
        assert_eq!(id.size_field(), 2);
        assert_eq!(
            id.location(),
            MathLocation::Transient {
                epoch: 77,
                index: 4095
            }
        );
    }

    #[test]
    fn transient_bit_is_top_bit() {
        let id = MathId::transient(MathType::Vec4, 0, 0, 1);
        assert_eq!(id.to_raw() >> 63, 1);
        // Epoch 0 transient is still distinguishable from a constant.
        assert!(!id.is_identity());
    }

    #[test]
    fn constant_index_is_one_based() {
        let id = MathId::constant(MathType::Vec4, 0, 1);
        assert_eq!(id.index(), 1);
        assert!(!id.is_identity());
        assert_eq!(id.location(), MathLocation::Constant { offset: 0 });
    }

    #[test]
    fn marked_and_view_locations() {
        let id = MathId::marked(MathType::Matrix, 300, 5);
        assert_eq!(id.location(), MathLocation::Marked { slot: 300 });
        assert!(!id.is_view());

        let view = id.with_size_field(0).with_frame(VIEW_FRAME_BASE + 3);
        assert!(view.is_view());
        assert_eq!(
            view.location(),
            MathLocation::View {
                slot: 300,
                element: 3
            }
        );
    }

    #[test]
    fn from_raw_rejects_unknown_type_tags() {
        assert!(MathId::from_raw(5u64 << 60).is_none());
        assert!(MathId::from_raw(7u64 << 60).is_none());
        let id = MathId::reference(12, 34);
        assert_eq!(MathId::from_raw(id.to_raw()), Some(id));
        assert!(id.is_ref());
    }

    #[test]
    fn extreme_fields_do_not_bleed() {
        let id = MathId::transient(MathType::Matrix, MAX_FRAME, MAX_INDEX, MAX_COUNT);
        assert_eq!(id.frame(), MAX_FRAME);
        assert_eq!(id.index(), MAX_INDEX);
        assert_eq!(id.size_field(), MAX_COUNT - 1);
        assert_eq!(id.raw_type(), MathType::Matrix);
        assert!(id.is_transient());
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn any_type() -> impl Strategy<Value = MathType> {
            prop_oneof![
                Just(MathType::Matrix),
                Just(MathType::Vec4),
                Just(MathType::Quat),
            ]
        }

        proptest! {
            #[test]
            fn transient_pack_unpack(
                ty in any_type(),
                epoch in 0..=MAX_FRAME,
                index in 0..=MAX_INDEX,
                count in 1..=MAX_COUNT,
            ) {
                let id = MathId::transient(ty, epoch, index, count);
                prop_assert_eq!(id.raw_type(), ty);
                prop_assert_eq!(id.frame(), epoch);
                prop_assert_eq!(id.index(), index);
                prop_assert_eq!(id.size_field() + 1, count);
                prop_assert_eq!(MathId::from_raw(id.to_raw()), Some(id));
            }

            #[test]
            fn rewriting_one_field_keeps_the_others(
                ty in any_type(),
                slot in 0..=MAX_INDEX,
                count in 1..=MAX_COUNT,
                element in 0..MAX_COUNT,
            ) {
                let id = MathId::marked(ty, slot, count);
                let view = id.with_size_field(0).with_frame(VIEW_FRAME_BASE + element);
                prop_assert_eq!(view.raw_type(), ty);
                prop_assert_eq!(view.index(), slot);
                prop_assert!(!view.is_transient());
                prop_assert_eq!(view.location(), MathLocation::View { slot, element });
            }
        }
    }
}

//! Per-context boolean flags.
//!
//! The allocator never reads these itself. They ride along on the context
//! so the numeric layer can keep projection conventions next to the values
//! it computes with.

/// A 32-bit word of independent boolean flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MathFlags(u32);

impl MathFlags {
    /// Projection matrices map depth to `[-1, 1]` instead of `[0, 1]`.
    pub const HOMOGENEOUS_DEPTH: u8 = 0;

    /// Screen-space origin is the bottom-left corner.
    pub const ORIGIN_BOTTOM_LEFT: u8 = 1;

    /// Number of addressable flags.
    pub const COUNT: u8 = 32;

    /// All flags cleared.
    pub fn new() -> Self {
        Self(0)
    }

    /// Set or clear flag `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id >= 32`.
    pub fn set(&mut self, id: u8, on: bool) {
        assert!(id < Self::COUNT, "flag id {id} out of range");
        if on {
            self.0 |= 1 << id;
        } else {
            self.0 &= !(1 << id);
        }
    }

    /// Read flag `id`. Out-of-range ids read as unset.
    pub fn get(&self, id: u8) -> bool {
        id < Self::COUNT && self.0 & (1 << id) != 0
    }

    /// The raw flag word.
    pub fn bits(&self) -> u32 {
        self.0
    }
}

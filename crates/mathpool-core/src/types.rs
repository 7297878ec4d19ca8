//! Value shapes stored by the allocator.

use std::fmt;

/// Identity matrix, column-major.
pub const IDENTITY_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Identity for both 4-vectors and quaternions: `(0, 0, 0, 1)`.
pub const IDENTITY_VEC4: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// The element shape a handle refers to.
///
/// The discriminants are the 3-bit type tags stored in a handle and are
/// stable: `Null` must stay 0 so that the all-zero handle is null.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MathType {
    /// No value. The all-zero handle.
    Null = 0,
    /// 4×4 matrix (16 floats, four slots per element).
    Matrix = 1,
    /// 4-component vector (one slot per element).
    Vec4 = 2,
    /// Quaternion (one slot per element).
    Quat = 3,
    /// Indirection to a caller-owned buffer of one of the other shapes.
    Ref = 4,
}

impl MathType {
    /// Decode a 3-bit type tag. Returns `None` for the unused tags 5..=7.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Null),
            1 => Some(Self::Matrix),
            2 => Some(Self::Vec4),
            3 => Some(Self::Quat),
            4 => Some(Self::Ref),
            _ => None,
        }
    }

    /// The 3-bit tag for this type.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Short lowercase name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Matrix => "mat",
            Self::Vec4 => "v4",
            Self::Quat => "quat",
            Self::Ref => "ref",
        }
    }

    /// Number of 4-float slots one element occupies.
    ///
    /// `Ref` occupies a single slot for its indirection record.
    pub fn slots_per_element(self) -> u32 {
        match self {
            Self::Matrix => 4,
            Self::Vec4 | Self::Quat | Self::Ref => 1,
            Self::Null => 0,
        }
    }

    /// Number of floats in one element.
    pub fn floats_per_element(self) -> usize {
        match self {
            Self::Matrix => 16,
            Self::Vec4 | Self::Quat => 4,
            Self::Null | Self::Ref => 0,
        }
    }

    /// Whether values of this type live in arena storage.
    ///
    /// True for the three concrete shapes; false for `Null` and `Ref`.
    pub fn is_value(self) -> bool {
        matches!(self, Self::Matrix | Self::Vec4 | Self::Quat)
    }

    /// The identity value for this type, or an empty slice for `Null`/`Ref`.
    pub fn identity_value(self) -> &'static [f32] {
        match self {
            Self::Matrix => &IDENTITY_MATRIX,
            Self::Vec4 | Self::Quat => &IDENTITY_VEC4,
            Self::Null | Self::Ref => &[],
        }
    }
}

impl fmt::Display for MathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

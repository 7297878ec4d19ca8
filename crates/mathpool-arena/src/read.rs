//! Read access for the numeric layer.
//!
//! Numeric code (vector, matrix and quaternion arithmetic) only ever needs
//! to look values up. [`ValueReader`] is that boundary, so the numeric
//! layer can be written against a trait and tested with a mock.

use mathpool_core::MathType;

use crate::context::MathContext;
use crate::handle::MathId;

/// Read-only access to the values behind handles.
pub trait ValueReader {
    /// The floats behind `id`: `size_of(id)` elements of `type_of(id)`.
    fn read(&self, id: MathId) -> &[f32];

    /// Element type of `id`, seeing through indirections.
    fn type_of(&self, id: MathId) -> MathType;

    /// Element count of `id`, seeing through indirections.
    fn size_of(&self, id: MathId) -> u32;
}

impl ValueReader for MathContext {
    fn read(&self, id: MathId) -> &[f32] {
        self.value(id)
    }

    fn type_of(&self, id: MathId) -> MathType {
        MathContext::type_of(self, id)
    }

    fn size_of(&self, id: MathId) -> u32 {
        MathContext::size_of(self, id)
    }
}

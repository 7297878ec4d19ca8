//! Test utilities and mock types for mathpool development.
//!
//! Provides a mock implementation of [`ValueReader`] for testing numeric
//! code without a context, plus value [`fixtures`] shared by the
//! integration tests and benchmarks.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::HashMap;

use mathpool_arena::{MathId, ValueReader};
use mathpool_core::MathType;

/// Mock implementation of [`ValueReader`].
///
/// Backed by a `HashMap<MathId, (MathType, Vec<f32>)>`. Values added with
/// [`add`](MockValueReader::add) get fresh, distinct handles whose raw type
/// tag matches the value.
pub struct MockValueReader {
    values: HashMap<MathId, (MathType, Vec<f32>)>,
    next: u32,
}

impl MockValueReader {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            next: 0,
        }
    }

    /// Store `data` as a value of type `ty` and return its handle.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not a whole number of `ty` elements.
    pub fn add(&mut self, ty: MathType, data: Vec<f32>) -> MathId {
        let width = ty.floats_per_element();
        assert!(
            width > 0 && !data.is_empty() && data.len() % width == 0,
            "{} floats is not a whole number of {ty} elements",
            data.len()
        );
        let raw = 1u64 << 63 | u64::from(ty.bits()) << 60 | u64::from(self.next) << 32;
        self.next += 1;
        let id = MathId::from_raw(raw).expect("value types have valid tags");
        self.values.insert(id, (ty, data));
        id
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for MockValueReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueReader for MockValueReader {
    fn read(&self, id: MathId) -> &[f32] {
        self.values
            .get(&id)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    fn type_of(&self, id: MathId) -> MathType {
        self.values.get(&id).map_or(MathType::Null, |(ty, _)| *ty)
    }

    fn size_of(&self, id: MathId) -> u32 {
        self.values
            .get(&id)
            .map_or(0, |(ty, v)| (v.len() / ty.floats_per_element()) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_hands_out_distinct_typed_handles() {
        let mut reader = MockValueReader::new();
        let a = reader.add(MathType::Vec4, vec![1.0, 2.0, 3.0, 4.0]);
        let b = reader.add(MathType::Matrix, vec![0.0; 32]);
        assert_ne!(a, b);
        assert_eq!(a.raw_type(), MathType::Vec4);
        assert_eq!(reader.type_of(b), MathType::Matrix);
        assert_eq!(reader.size_of(b), 2);
        assert_eq!(reader.read(a), &[1.0, 2.0, 3.0, 4.0]);
        assert!(reader.read(MathId::NULL).is_empty());
        assert_eq!(reader.len(), 2);
    }
}

//! Borrowed views over caller-owned memory.
//!
//! The unsafe primitives of `mathpool-arena` live here, each with a
//! `// SAFETY:` contract. They back [`MathContext::reference`](crate::MathContext::reference),
//! which lets a handle point at floats the context does not own.

#![allow(unsafe_code)]

use std::ptr::NonNull;

/// View `len` floats at `ptr` as a slice.
///
/// # Safety
///
/// `ptr` must be valid for reads of `len` floats, suitably aligned, and the
/// memory must not be mutated for the lifetime `'a`.
pub(crate) unsafe fn borrowed_floats<'a>(ptr: NonNull<f32>, len: usize) -> &'a [f32] {
    // SAFETY: forwarded from the caller contract above.
    unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) }
}

//! Core types and errors for the mathpool handle allocator.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the value shapes the allocator knows about, the per-context flag word
//! consumed by the numeric layer, and the error types shared by the
//! arena crates.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod flags;
pub mod types;

pub use error::{MathError, Pool};
pub use flags::MathFlags;
pub use types::{MathType, IDENTITY_MATRIX, IDENTITY_VEC4};

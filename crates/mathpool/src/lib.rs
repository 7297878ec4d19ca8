//! mathpool: a frame-scoped handle allocator for fixed-shape math values.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the mathpool sub-crates. For most users, adding `mathpool` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use mathpool::prelude::*;
//!
//! let mut ctx = MathContext::new(MathConfig::default()).unwrap();
//!
//! // Scratch values live for this frame and the next.
//! let v = ctx.vec4(&[1.0, 2.0, 3.0, 4.0]).unwrap();
//!
//! // Marked values live until unmarked.
//! let kept = ctx.mark(v).unwrap();
//! ctx.frame();
//! ctx.frame();
//! assert!(!ctx.valid(v));
//! assert_eq!(ctx.value(kept), &[1.0, 2.0, 3.0, 4.0]);
//!
//! // The identity needs no storage.
//! let m = ctx.matrix(&mathpool::types::IDENTITY_MATRIX).unwrap();
//! assert_eq!(ctx.constant(m).unwrap(), MathId::identity(MathType::Matrix));
//!
//! assert_eq!(ctx.unmark(kept), Ok(0));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `mathpool-arena` | Context, pools, handles, statistics |
//! | [`types`] | `mathpool-core` | Value types, flags, errors |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Context, pools and handles (`mathpool-arena`).
///
/// Most users only need [`arena::MathContext`] and [`arena::MathId`],
/// both also in the [`prelude`].
pub use mathpool_arena as arena;

/// Value types, flags and errors (`mathpool-core`).
pub use mathpool_core as types;

/// Common imports for typical mathpool usage.
///
/// ```rust
/// use mathpool::prelude::*;
/// ```
pub mod prelude {
    // Context and handles
    pub use mathpool_arena::{Checkpoint, MathConfig, MathContext, MathId, ValueReader};

    // Types and errors
    pub use mathpool_core::{MathError, MathFlags, MathType};
}

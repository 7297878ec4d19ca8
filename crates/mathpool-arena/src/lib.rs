//! Epoch-based handle allocator for fixed-shape math values.
//!
//! Hands out copyable 64-bit [`MathId`] handles to 4-vectors, quaternions
//! and 4×4 matrices without per-value heap allocation and without a
//! tracing collector. Values live under one of three lifetime classes:
//!
//! - **Transient:** bump-allocated in a ring, readable for the frame they
//!   were created in and the next one, then silently expired.
//! - **Marked:** copied into a reference-counted heap by `mark()`, kept
//!   until unmarked, reclaimed in batches at `frame()`.
//! - **Constant:** interned once, deduplicated bit for bit, kept forever.
//!   Each type's identity value needs no storage at all.
//!
//! # Architecture
//!
//! ```text
//! MathContext (owner, epoch counters, flags)
//! ├── TransientArena   ring of pages, cursor + two epoch windows
//! ├── MarkedHeap       pages + u8 counts, intrusive coalescing free list
//! ├── ConstantPool     append-only pages, linear dedup scan
//! └── ExternalRefs     slot → caller buffer, pruned with the ring
//! ```
//!
//! All pools grow in pages of [`PAGE_SLOTS`](page::PAGE_SLOTS) four-float
//! slots, bounded by [`MathConfig::max_pages`].
//!
//! # Safety
//!
//! The only `unsafe` is the external-reference path:
//! [`MathContext::reference`] is an `unsafe fn` whose caller vouches for
//! the buffer, and `raw.rs` turns the stored pointer back into a slice.
//! Handles cannot be turned into pointers: a reference handle resolves
//! through a side table keyed by its slot, so a stale or forged handle
//! finds no entry.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod config;
pub mod constant;
pub mod context;
pub mod display;
pub mod handle;
pub mod marked;
pub mod page;
mod raw;
pub mod read;
mod reference;
pub mod stats;
pub mod transient;

// Public re-exports for the primary API surface.
pub use config::MathConfig;
pub use context::MathContext;
pub use display::ValueDisplay;
pub use handle::{MathId, MathLocation};
pub use marked::MarkedEntry;
pub use read::ValueReader;
pub use stats::{LeakReport, MathStats};
pub use transient::Checkpoint;

pub use mathpool_core::{MathError, MathFlags, MathType, Pool};

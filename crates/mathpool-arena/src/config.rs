//! Allocator configuration parameters.

use mathpool_core::MathError;

use crate::handle::MAX_INDEX;
use crate::page::PAGE_SLOTS;

/// Configuration for a [`MathContext`](crate::MathContext).
///
/// `max_pages` bounds every pool independently: the transient ring, the
/// marked heap and the constant pool may each grow to `max_pages` pages of
/// [`PAGE_SLOTS`] slots. Validated at construction; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MathConfig {
    /// Maximum number of pages per pool.
    ///
    /// Default: 256 (512K slots, 8MB of floats per pool). Zero selects
    /// the default.
    pub max_pages: u32,
}

impl MathConfig {
    /// Default page budget per pool.
    pub const DEFAULT_MAX_PAGES: u32 = 256;

    /// Largest page budget whose slot indices still fit in a handle.
    pub const MAX_PAGES: u32 = (MAX_INDEX + 1) / PAGE_SLOTS as u32;

    /// Create a config with the given page budget.
    pub fn new(max_pages: u32) -> Self {
        Self { max_pages }
    }

    /// Check the config and substitute defaults.
    pub(crate) fn validated(mut self) -> Result<Self, MathError> {
        if self.max_pages == 0 {
            self.max_pages = Self::DEFAULT_MAX_PAGES;
        }
        if self.max_pages > Self::MAX_PAGES {
            return Err(MathError::InvalidConfig {
                reason: format!(
                    "max_pages must be <= {} (got {})",
                    Self::MAX_PAGES,
                    self.max_pages
                ),
            });
        }
        Ok(self)
    }

    /// Number of slots in one full pool.
    pub fn pool_slots(&self) -> usize {
        self.max_pages as usize * PAGE_SLOTS
    }
}

impl Default for MathConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_PAGES)
    }
}

// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Deferred TLB invalidation.
//!
//! Mapping operations touch many PTEs in a loop; invalidating the TLB after
//! every single one would be wasteful. Instead callers accumulate the
//! touched range into a [`Flush`] and invalidate once at the end.

use crate::{VirtualAddress, arch};
use core::range::Range;

/// A deferred TLB invalidation for a single address space.
///
/// Must be consumed with [`Flush::flush`] (or explicitly discarded via
/// [`Flush::ignore`]) once the caller is done mutating page tables --
/// dropping it silently would leave stale translations live.
#[must_use]
pub struct Flush {
    asid: usize,
    range: Option<Range<VirtualAddress>>,
}

impl Flush {
    /// A flush set that has not accumulated any range yet.
    pub fn empty(asid: usize) -> Self {
        Self { asid, range: None }
    }

    /// Extends the pending invalidation to also cover `range`.
    pub(crate) fn extend_range(
        &mut self,
        asid: usize,
        range: Range<VirtualAddress>,
    ) -> crate::Result<()> {
        debug_assert_eq!(
            self.asid, asid,
            "Flush::extend_range called with mismatched address space"
        );

        self.range = Some(match self.range.take() {
            Some(existing) => {
                let start = existing.start.min(range.start);
                let end = existing.end.max(range.end);
                Range::from(start..end)
            }
            None => range,
        });

        Ok(())
    }

    /// Performs the accumulated invalidation.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying architecture-specific
    /// invalidation failed.
    pub fn flush(self) -> crate::Result<()> {
        if let Some(range) = self.range {
            arch::invalidate_range(self.asid, range)?;
        }
        Ok(())
    }

    /// Discards the pending invalidation without performing it.
    ///
    /// Only valid when the caller independently knows the affected range
    /// was never live in any TLB (e.g. a fresh, not-yet-activated address
    /// space).
    pub fn ignore(self) {}
}

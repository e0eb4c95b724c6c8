// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A one-bit park/unpark primitive.
//!
//! Grounded on the per-task parking idiom in `util::parking_spot`, stripped
//! down to the single-waiter case each [`crate::task::Task`] needs: one
//! `Parker` per task, parked and unparked only by that task and whoever
//! queues it, never shared across a registry of addresses the way
//! `ParkingSpot` is.

use core::sync::atomic::{AtomicU8, Ordering};

const EMPTY: u8 = 0;
const NOTIFIED: u8 = 1;
const PARKED: u8 = 2;

pub struct Parker {
    state: AtomicU8,
}

impl Default for Parker {
    fn default() -> Self {
        Self::new()
    }
}

impl Parker {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
        }
    }

    /// Blocks the calling executor (via `hlt`) until [`Self::unpark`] is
    /// called, or returns immediately if a notification is already pending.
    pub fn park(&self) {
        if self
            .state
            .compare_exchange(NOTIFIED, EMPTY, Ordering::Acquire, Ordering::Acquire)
            .is_ok()
        {
            return;
        }

        if self
            .state
            .compare_exchange(EMPTY, PARKED, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            // A notification raced us in; consume it and return.
            self.state.store(EMPTY, Ordering::Release);
            return;
        }

        loop {
            // Safety: halting only suspends this core until the next interrupt; the
            // unpark side always follows with an IPI or is this same core re-entering.
            unsafe { crate::arch::wait_for_interrupt() };

            if self
                .state
                .compare_exchange(NOTIFIED, EMPTY, Ordering::Acquire, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Wakes a parked waiter, or arms a pending notification if nobody is
    /// parked yet.
    pub fn unpark(&self) {
        match self.state.swap(NOTIFIED, Ordering::Release) {
            EMPTY | NOTIFIED => {}
            PARKED => crate::arch::send_wakeup_ipi(),
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpark_before_park_is_remembered() {
        let p = Parker::new();
        p.unpark();
        assert_eq!(p.state.load(Ordering::Relaxed), NOTIFIED);
    }
}

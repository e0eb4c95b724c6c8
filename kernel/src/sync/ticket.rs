// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A ticket (FIFO-fair) spinlock.
//!
//! `spin::Mutex` is test-and-CAS: under contention, whichever spinner wins
//! the next compare-exchange gets the lock, with no ordering guarantee. The
//! scheduler's ready-queue lock needs FIFO fairness instead, so this is a
//! separate primitive: every locker takes a ticket and spins until it is
//! being served, same spin/backoff style as `spin::Mutex` otherwise.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Backoff;

pub struct TicketLock<T: ?Sized> {
    next_ticket: AtomicUsize,
    now_serving: AtomicUsize,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for TicketLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for TicketLock<T> {}

#[clippy::has_significant_drop]
#[must_use = "if unused the TicketLock will immediately unlock"]
pub struct TicketGuard<'a, T: ?Sized> {
    lock: &'a TicketLock<T>,
    ticket: usize,
}

impl<T> TicketLock<T> {
    pub const fn new(val: T) -> Self {
        Self {
            next_ticket: AtomicUsize::new(0),
            now_serving: AtomicUsize::new(0),
            data: UnsafeCell::new(val),
        }
    }
}

impl<T: ?Sized> TicketLock<T> {
    pub fn lock(&self) -> TicketGuard<'_, T> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        let mut boff = Backoff::default();
        while self.now_serving.load(Ordering::Acquire) != ticket {
            boff.spin();
        }

        TicketGuard { lock: self, ticket }
    }

    pub fn is_locked(&self) -> bool {
        self.next_ticket.load(Ordering::Relaxed) != self.now_serving.load(Ordering::Relaxed)
    }
}

impl<T: ?Sized> Deref for TicketGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: holding the ticket currently being served grants exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for TicketGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding the ticket currently being served grants exclusive access.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for TicketGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.now_serving.store(self.ticket.wrapping_add(1), Ordering::Release);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for TicketLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_debug_lock() {
            Some(guard) => f.debug_struct("TicketLock").field("data", &&*guard).finish(),
            None => f.debug_struct("TicketLock").field("data", &"<locked>").finish(),
        }
    }
}

impl<T: ?Sized> TicketLock<T> {
    fn try_debug_lock(&self) -> Option<TicketGuard<'_, T>> {
        if self.is_locked() {
            None
        } else {
            Some(self.lock())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use alloc::sync::Arc;

    extern crate alloc;

    #[ktest::test]
    fn mutual_exclusion() {
        let lock = Arc::new(TicketLock::new(0usize));
        let mut guard = lock.lock();
        *guard += 1;
        drop(guard);
        assert_eq!(*lock.lock(), 1);
    }

    #[ktest::test]
    fn tickets_serve_in_order() {
        let lock = TicketLock::new(Vec::<usize>::new());
        for i in 0..8 {
            lock.lock().push(i);
        }
        assert_eq!(*lock.lock(), (0..8).collect::<Vec<_>>());
    }
}

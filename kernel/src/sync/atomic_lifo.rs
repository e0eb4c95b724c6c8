// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An intrusive, lock-free, singly-linked LIFO stack (a Treiber stack).
//!
//! Used as the inbox for [`crate::cleanup`]'s TaskCleanupService: any task
//! can push a handle to be cleaned up from any context, including an
//! interrupt handler, without taking a lock. Hand-rolled rather than reused
//! from an MPSC-queue crate because this stack is intrusive over the same
//! node type the cleanup service already owns, and a LIFO pop order is fine
//! here -- cleanup order between unrelated tasks carries no meaning.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

/// A node that can be linked into an [`AtomicLifo`].
///
/// # Safety
///
/// Implementors must guarantee `next_ptr` returns a pointer to a field that
/// is exclusively owned by the stack for as long as the node is linked in.
pub unsafe trait Node {
    fn next_ptr(&self) -> *const AtomicPtr<Self>;
}

pub struct AtomicLifo<T: Node> {
    head: AtomicPtr<T>,
}

impl<T: Node> Default for AtomicLifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Node> AtomicLifo<T> {
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Pushes `node` onto the stack.
    ///
    /// # Safety
    ///
    /// `node` must remain valid until it is popped back off by
    /// [`Self::pop_all`].
    pub unsafe fn push(&self, node: *mut T) {
        let next = unsafe { &*(*node).next_ptr() };
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    /// Atomically takes the whole stack, leaving it empty, and returns an
    /// iterator over its nodes in LIFO (most-recently-pushed-first) order.
    pub fn pop_all(&self) -> PopAll<T> {
        let head = self.head.swap(ptr::null_mut(), Ordering::Acquire);
        PopAll { next: head }
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_null()
    }
}

pub struct PopAll<T: Node> {
    next: *mut T,
}

impl<T: Node> Iterator for PopAll<T> {
    type Item = *mut T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next;
        if node.is_null() {
            return None;
        }

        // Safety: `node` was pushed via `AtomicLifo::push`, which guarantees
        // it stays valid until popped, which is happening right now.
        let next = unsafe { &*(*node).next_ptr() };
        self.next = next.load(Ordering::Relaxed);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::UnsafeCell;

    struct Entry {
        value: usize,
        next: UnsafeCell<AtomicPtr<Entry>>,
    }

    // Safety: single-threaded test, no concurrent pushers.
    unsafe impl Node for Entry {
        fn next_ptr(&self) -> *const AtomicPtr<Self> {
            self.next.get()
        }
    }

    #[test]
    fn pushes_pop_in_lifo_order() {
        let a = Entry { value: 1, next: UnsafeCell::new(AtomicPtr::new(ptr::null_mut())) };
        let b = Entry { value: 2, next: UnsafeCell::new(AtomicPtr::new(ptr::null_mut())) };
        let c = Entry { value: 3, next: UnsafeCell::new(AtomicPtr::new(ptr::null_mut())) };

        let stack: AtomicLifo<Entry> = AtomicLifo::new();
        // Safety: `a`, `b`, `c` outlive the stack.
        unsafe {
            stack.push(ptr::from_ref(&a).cast_mut());
            stack.push(ptr::from_ref(&b).cast_mut());
            stack.push(ptr::from_ref(&c).cast_mut());
        }

        let values: alloc::vec::Vec<usize> =
            stack.pop_all().map(|p| unsafe { (*p).value }).collect();
        assert_eq!(values, alloc::vec![3, 2, 1]);
        assert!(stack.is_empty());
    }
}

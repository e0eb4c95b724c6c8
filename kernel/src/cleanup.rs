// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The task cleanup service (§4.6).
//!
//! A dedicated kernel task that owns the other end of every task's last
//! breath: once a [`crate::task::TaskRef`]'s reference count reaches zero,
//! its `Drop` impl pushes the task's raw pointer onto [`INBOX`] and unparks
//! this service, which pops the whole inbox, re-removes each task from the
//! global registry under its write lock, and drops the `Box` that owns it
//! -- freeing its [`crate::task::Stack`] in the process.
//!
//! The inbox is [`crate::sync::atomic_lifo::AtomicLifo`], a lock-free
//! Treiber stack, rather than anything taking a lock: a task's refcount can
//! hit zero from inside an interrupt handler (the last `TaskRef` to a task
//! blocked waiting on it going away), where taking a sleeping lock is not
//! an option.

use crate::sync::atomic_lifo::AtomicLifo;
use crate::sync::parker::Parker;
use crate::task::Task;

static INBOX: AtomicLifo<Task> = AtomicLifo::new();
static PARKER: Parker = Parker::new();

/// Pushes `task` onto the cleanup inbox and wakes the cleanup task.
///
/// # Safety
///
/// `task` must not be reachable through any other path once this returns:
/// the cleanup service takes exclusive ownership of it from here on.
pub(crate) unsafe fn queue_for_cleanup(task: *mut Task) {
    // Safety: caller's contract; the node stays valid until `pop_all` below
    // yields it back.
    unsafe { INBOX.push(task) };
    PARKER.unpark();
}

/// Spawns the cleanup task. Must be called once, after
/// [`crate::scheduler::init`].
pub fn init() {
    crate::scheduler::spawn_kernel("task-cleanup", cleanup_loop, 0).expect("failed to spawn task-cleanup service");
}

extern "C" fn cleanup_loop(_arg: usize) -> ! {
    loop {
        PARKER.park();

        for ptr in INBOX.pop_all() {
            // Safety: every node here was queued by `queue_for_cleanup`,
            // whose contract hands this service sole ownership; nothing
            // else dereferences `ptr` once it's in the inbox.
            unsafe { reclaim(ptr) };
        }
    }
}

/// # Safety
///
/// `ptr` must have come from [`queue_for_cleanup`] and not already have
/// been reclaimed.
unsafe fn reclaim(ptr: *mut Task) {
    // Safety: caller's contract; the task is still registered (registry
    // removal, below, is the only thing that frees it) so reading its id
    // through the pointer is sound.
    let id = unsafe { (*ptr).id() };

    let mut registry = crate::task::registry().write();
    let Some(task) = registry.remove(&id) else {
        return;
    };

    debug_assert!(
        matches!(&*task.state().read(), crate::task::TaskState::Dropped { .. }),
        "task reached the cleanup service without going through TaskRef::drop"
    );

    drop(task); // frees the Box, unmapping and releasing its Stack's arena slot
}

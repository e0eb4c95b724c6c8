// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An executor's idle task: `{ acquire lock; if the ready queue is
//! non-empty, hand off to it; else unlock and `hlt` }`, repeated forever.

use crate::task::TaskState;

use super::{before_switch_task, Executor, READY_QUEUE};

/// The idle task's entry point. `executor_ptr` is the `&'static Executor`
/// this idle task belongs to, passed through as a `usize` because
/// [`crate::arch::init_stack`]'s entry signature is `extern "C" fn(usize)`.
pub(super) extern "C" fn idle_entry(executor_ptr: usize) -> ! {
    // Safety: `run` primed this task's stack with exactly this executor's
    // address, and the executor outlives every task that runs on it.
    let executor = unsafe { &*(executor_ptr as *const Executor) };

    loop {
        let mut queue = READY_QUEUE.lock();
        let Some(next) = queue.pop_front() else {
            drop(queue);
            // Safety: interrupts are enabled once boot completes; the
            // scheduler IPI (or any other interrupt) wakes this back up.
            unsafe { crate::arch::wait_for_interrupt() };
            continue;
        };

        *next.state().write() = TaskState::Running(executor);
        executor.set_current(next.clone());
        drop(queue);

        before_switch_task(executor.idle_task(), &next);

        let new_sp = next.stack().read().sp().as_raw();
        // Safety: `next` came off the ready queue, so its stack is either
        // freshly primed or holds a previously-saved, resumable context.
        // Idle's own context is never resumed from this exact point: the
        // next time anything switches into idle it re-primes this stack
        // from scratch (see `run`/`yield_now`'s empty-queue path), so there
        // is nothing here worth saving.
        unsafe { crate::arch::switch_task_no_save(new_sp) }
    }
}

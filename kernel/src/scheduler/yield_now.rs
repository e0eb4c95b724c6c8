// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Voluntary and preemptive yielding off the running task.

use crate::task::TaskState;

use super::{before_switch_task, executor, READY_QUEUE};

/// Gives up the running core to the next ready task, or to idle if the
/// ready queue is empty. Returns once something switches back into the
/// calling task.
///
/// Must not be called from the idle task itself (idle hands off to ready
/// tasks through its own loop in [`super::idle`], using
/// [`crate::arch::switch_task_no_save`] instead, since its context is never
/// worth resuming).
pub fn yield_now() {
    let executor = executor();
    let current = executor.current();
    debug_assert!(
        !executor.is_idle(&current),
        "idle task must not call yield_now; it hands off through its own loop"
    );

    let mut queue = READY_QUEUE.lock();
    let next = queue.pop_front();

    let Some(next) = next else {
        // Nothing else is ready. Re-prime idle's stack and switch into it
        // fresh; `current` keeps running once idle (or whatever idle later
        // hands off to) switches back into it.
        drop(queue);
        switch_to_idle(executor, &current);
        return;
    };

    queue.push_back(current.clone());
    *next.state().write() = TaskState::Running(executor);
    executor.set_current(next.clone());
    drop(queue);

    before_switch_task(&current, &next);

    let old_sp_ptr = current.stack().write().sp_ptr();
    let new_sp = next.stack().read().sp().as_raw();
    // Safety: `old_sp_ptr` points at `current`'s own `Stack::sp` field,
    // which stays allocated (and exclusively owned by this switch) for as
    // long as `current` is borrowed here; `next`'s stack is either freshly
    // primed or holds a context previously saved by this same function.
    unsafe { crate::arch::switch_task(old_sp_ptr, new_sp) };
}

fn switch_to_idle(executor: &'static super::Executor, current: &crate::task::TaskRef) {
    {
        let mut istack = executor.idle_task().stack().write();
        crate::arch::init_stack(&mut istack, super::idle::idle_entry, executor as *const _ as usize);
    }
    *executor.idle_task().state().write() = TaskState::Running(executor);
    executor.set_current(executor.idle_task().clone());

    before_switch_task(current, executor.idle_task());

    let old_sp_ptr = current.stack().write().sp_ptr();
    let new_sp = executor.idle_task().stack().read().sp().as_raw();
    // Safety: same as `yield_now`'s switch above.
    unsafe { crate::arch::switch_task(old_sp_ptr, new_sp) };
}

/// Called from the `scheduler` interrupt vector (§4.3): yields the running
/// task if it is currently safe to preempt (no spinlock held, no nested
/// interrupt-disable section beyond the one this trap itself opened) and
/// something else is actually ready to run.
pub fn maybe_preempt() {
    let executor = executor();
    let current = executor.current();

    if executor.is_idle(&current) {
        return;
    }
    if current.interrupt_disable_count() > 1 {
        return;
    }
    if READY_QUEUE.lock().is_empty() {
        return;
    }

    yield_now();
}

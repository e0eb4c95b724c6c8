// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The task scheduler (§4.5).
//!
//! One global, ticket-spinlocked intrusive FIFO ready queue shared by every
//! executor, plus one [`Executor`] per core tracking which task is
//! currently running there and that core's dedicated idle task.
//!
//! Unlike the teacher's original futures/work-stealing executor (one
//! `Core`/`Remote` pair per worker thread, an MPSC injector queue, idle
//! tasks parked on a condvar waiting for a `Waker`), every task here owns a
//! real kernel stack and is switched to directly; there is nothing to
//! poll. The run queue is a single lock instead of per-core queues with
//! work-stealing because nothing yet justifies the complexity of stealing
//! with only one executor actually running (see [`crate::start`]).
//!
//! Two simplifications from a literal reading of the design this is
//! grounded on, both recorded here because they are load-bearing for the
//! rest of this module:
//!
//! - The scheduler lock is released *before* switching stacks, never held
//!   across one. Every piece of shared-state bookkeeping a switch needs
//!   (dequeue the next task, requeue the old one, update `Executor::current`)
//!   happens first, under the lock; only after the guard is dropped does
//!   the actual register switch happen. This avoids needing a lock
//!   primitive that can be released from a different stack than the one
//!   that acquired it.
//! - The idle task is never resumed from a saved context. Whatever switches
//!   *into* it first re-primes its stack with [`crate::arch::init_stack`],
//!   so every entry into idle starts its loop from the top; handing off
//!   *out* of idle to a freshly-picked task uses
//!   [`crate::arch::switch_task_no_save`], since there is nothing about
//!   idle's call stack worth preserving.

mod idle;
mod yield_now;

pub use yield_now::{maybe_preempt, yield_now};

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use spin::Once;

use crate::cpu_set::LogicalCpuId;
use crate::sync::ticket::TicketLock;
use crate::task::{StackError, Task, TaskId, TaskRef, TaskState};

static READY_QUEUE: TicketLock<linked_list::List<Task>> = TicketLock::new(linked_list::List::new());

/// Queues `task` onto the global ready FIFO and marks it `Ready`.
pub fn queue_task(task: TaskRef) {
    *task.state().write() = TaskState::Ready;
    READY_QUEUE.lock().push_back(task);
}

/// Per-core scheduler state: which task is running here right now, and the
/// core's dedicated idle task.
pub struct Executor {
    id: LogicalCpuId,
    idle_task: TaskRef,
    current: TicketLock<Option<TaskRef>>,
}

impl Executor {
    pub fn id(&self) -> LogicalCpuId {
        self.id
    }

    pub fn idle_task(&self) -> &TaskRef {
        &self.idle_task
    }

    pub fn is_idle(&self, task: &TaskRef) -> bool {
        task.id() == self.idle_task.id()
    }

    pub fn current(&self) -> TaskRef {
        self.current
            .lock()
            .clone()
            .expect("executor has no current task before scheduler::run")
    }

    fn set_current(&self, task: TaskRef) {
        *self.current.lock() = Some(task);
    }
}

static EXECUTORS: Once<Vec<Executor>> = Once::new();

/// Brings up the scheduler: one [`Executor`] and one idle task per core.
///
/// # Panics
///
/// Panics if called more than once, or if allocating any of the idle
/// tasks' stacks fails.
pub fn init(num_cpus: usize) {
    EXECUTORS.call_once(|| {
        (0..num_cpus)
            .map(|cpu| {
                let idle_task =
                    TaskRef::new_kernel(format!("idle/{cpu}"), true).expect("failed to allocate idle task stack");
                Executor {
                    id: LogicalCpuId::new(cpu),
                    idle_task,
                    current: TicketLock::new(None),
                }
            })
            .collect()
    });
}

/// Returns the [`Executor`] for the running core.
///
/// # Panics
///
/// Panics if [`init`] has not been called yet.
pub fn executor() -> &'static Executor {
    let id = crate::state::cpu_local().id.get();
    &EXECUTORS.get().expect("scheduler not initialized")[id]
}

/// Hands the running core off to its idle task and never returns. Called
/// once, at the end of boot, in place of the old halt loop in
/// [`crate::kmain`].
pub fn run() -> ! {
    switch_to_idle_no_save(self::executor())
}

/// Toggles whatever the outgoing/incoming task pair needs toggled around a
/// context switch: the page table if either side is a user task, and the
/// SMAP override bit to match the incoming task.
///
/// Both task types are kernel-only for now ([`crate::task::TaskType::User`]
/// has no address space yet), so in practice this only ever handles the
/// kernel-to-kernel case, which is a no-op; the branch exists so the other
/// three fall out for free once user tasks exist.
pub(crate) fn before_switch_task(from: &TaskRef, to: &TaskRef) {
    if from.is_user() || to.is_user() {
        // Safety: neither side actually runs user code yet; this stands in
        // for the CR3 swap a real user task would need here.
        unsafe { crate::arch::set_user_mem_access(false) };
    }
}

/// Allocates a new kernel task whose stack is primed to start at `entry`
/// (called with `arg`), and queues it ready to run.
///
/// # Errors
///
/// Returns an error if the task's stack cannot be allocated.
pub fn spawn_kernel(
    name: impl Into<String>,
    entry: extern "C" fn(usize) -> !,
    arg: usize,
) -> Result<TaskRef, StackError> {
    let task = TaskRef::new_kernel(name, false)?;
    {
        let mut stack = task.stack().write();
        crate::arch::init_stack(&mut stack, entry, arg);
    }
    queue_task(task.clone());
    Ok(task)
}

pub(crate) fn task_id_running_on(executor: &Executor) -> Option<TaskId> {
    executor.current.lock().as_ref().map(|t| t.id())
}

/// Returns the running core's current task, or `None` before
/// [`init`]/[`run`] have brought the scheduler up (the window between
/// [`crate::interrupt::init`] enabling interrupts and `kmain` starting the
/// scheduler).
pub fn try_current() -> Option<TaskRef> {
    let id = crate::state::try_cpu_local()?.id.get();
    EXECUTORS.get()?.get(id)?.current.lock().clone()
}

/// Re-primes `executor`'s idle task and switches into it without saving the
/// caller's context. Used by [`exit_current`], where the caller's stack is
/// about to be torn down and there is nothing to resume.
fn switch_to_idle_no_save(executor: &'static Executor) -> ! {
    {
        let mut istack = executor.idle_task().stack().write();
        crate::arch::init_stack(&mut istack, idle::idle_entry, executor as *const Executor as usize);
    }
    *executor.idle_task().state().write() = TaskState::Running(executor);
    executor.set_current(executor.idle_task().clone());

    let new_sp = executor.idle_task().stack().read().sp().as_raw();
    // Safety: idle's stack was just re-primed above; the caller guarantees
    // its own context does not need preserving past this call.
    unsafe { crate::arch::switch_task_no_save(new_sp) }
}

/// Ends the running task for good (§4.4's `setTaskEntry` epilogue): drops
/// this executor's reference to it (the task's entry function having
/// already returned means nothing else keeps it `Running`), then diverges
/// into the next ready task, or idle if none is ready.
///
/// Never returns; the caller's stack is abandoned at this point, reclaimed
/// later by [`crate::cleanup`] once the task's reference count reaches
/// zero.
pub fn exit_current() -> ! {
    let executor = executor();
    let finished = executor
        .current
        .lock()
        .take()
        .expect("exit_current called with no current task");
    drop(finished);

    let mut queue = READY_QUEUE.lock();
    if let Some(next) = queue.pop_front() {
        *next.state().write() = TaskState::Running(executor);
        executor.set_current(next.clone());
        drop(queue);

        let new_sp = next.stack().read().sp().as_raw();
        // Safety: `next` either holds a freshly primed stack or one saved
        // by a prior `yield_now`; the caller (the task that just exited)
        // has no context left worth preserving.
        unsafe { crate::arch::switch_task_no_save(new_sp) }
    } else {
        drop(queue);
        switch_to_idle_no_save(executor)
    }
}

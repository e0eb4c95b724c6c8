// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Kernel tasks: stackful, preemptible units of execution.
//!
//! Grounded on the teacher's original [`TaskRef`]/`Header` pattern (same
//! `NonNull`-newtype-with-refcounted-Clone/Drop shape, same
//! `offset_of!`-based intrusive-link implementations) but built around a
//! plain kernel stack instead of a polled future: a task here is a
//! [`Stack`] plus the bookkeeping the [`crate::scheduler`] and
//! [`crate::cleanup`] need to run and reclaim it.
//!
//! A task participates in three separate intrusive collections at once,
//! each through its own field and its own unsafe trait impl:
//! [`scheduler_links`](Task::scheduler_links) for the scheduler's ready
//! FIFO ([`linked_list::List`]), [`registry_links`](Task::registry_links)
//! for the global task registry ([`wavltree::WAVLTree`] keyed by
//! [`TaskId`]), and [`cleanup_next`](Task::cleanup_next) for
//! [`crate::cleanup`]'s inbox ([`crate::sync::atomic_lifo::AtomicLifo`]).

mod stack;

pub use stack::{Error as StackError, Stack};

use alloc::boxed::Box;
use alloc::string::String;
use core::mem::offset_of;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use spin::{Once, RwLock};

use crate::scheduler::Executor;
use crate::sync::atomic_lifo;

/// Identifies a task in the global registry. Monotonically increasing, so
/// it doubles as the registry's sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Whether a task runs kernel code with kernel privileges, or (eventually)
/// user code under its own page table.
#[derive(Debug)]
pub enum TaskType {
    Kernel,
    /// Placeholder: no user-mode address space or entry mechanism exists
    /// yet. Carried so [`Task::on_interrupt_entry`] and
    /// [`crate::scheduler::before_switch_task`] already branch on the
    /// right condition once one does.
    User,
}

/// A task's run state. `Running` records which executor it is running on
/// so [`Task::on_interrupt_entry`] can read it back out without a lock.
#[derive(Debug)]
pub enum TaskState {
    Ready,
    Running(&'static Executor),
    Blocked,
    /// The task has left the ready/running/blocked cycle for good.
    /// `queued_for_cleanup` is the CAS guard [`TaskRef`]'s `Drop` uses to
    /// push onto the cleanup inbox exactly once.
    Dropped { queued_for_cleanup: AtomicBool },
}

/// A stackful kernel task.
///
/// Lives behind a [`TaskRef`]; never constructed or moved directly once
/// registered, since its address is load-bearing for all three intrusive
/// links.
pub struct Task {
    name: String,
    ty: TaskType,
    is_scheduler_task: bool,
    ref_count: AtomicUsize,
    state: RwLock<TaskState>,
    stack: RwLock<Stack>,

    /// Incremented on interrupt entry, decremented on exit; nonzero means
    /// this task must not be preempted or migrated right now. Fresh tasks
    /// start at 1 (see [`Task::new`]), matching a task's first "interrupt"
    /// being the switch that starts it running.
    interrupt_disable_count: AtomicU32,
    /// Snapshotted and zeroed by [`Task::on_interrupt_entry`], restored by
    /// [`Task::on_interrupt_exit`]: a page fault taken while this task was
    /// mid-access to user memory must not see interrupts nested under it
    /// also think SMAP is already relaxed.
    user_mem_access_count: AtomicU32,
    spinlocks_held: AtomicU32,
    scheduler_locked: AtomicBool,

    scheduler_links: linked_list::Links<Task>,
    registry_links: wavltree::Links<Task>,
    cleanup_next: AtomicPtr<Task>,
    id: TaskId,
}

// Safety: every field that is not itself `Sync` (the intrusive link types,
// which hold raw pointers) is only ever mutated while the collection that
// field belongs to holds the relevant lock (the scheduler's ready-queue
// lock, the registry's `RwLock`); the rest of `Task`'s state is behind
// atomics or its own `RwLock`.
unsafe impl Send for Task {}
unsafe impl Sync for Task {}

impl core::fmt::Debug for Task {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ref_count", &self.ref_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Task {
    fn new(name: String, ty: TaskType, is_scheduler_task: bool, stack: Stack) -> Self {
        Self {
            name,
            ty,
            is_scheduler_task,
            ref_count: AtomicUsize::new(1),
            state: RwLock::new(TaskState::Ready),
            stack: RwLock::new(stack),
            interrupt_disable_count: AtomicU32::new(1),
            user_mem_access_count: AtomicU32::new(0),
            spinlocks_held: AtomicU32::new(1),
            scheduler_locked: AtomicBool::new(true),
            scheduler_links: linked_list::Links::new(),
            registry_links: wavltree::Links::new(),
            cleanup_next: AtomicPtr::new(core::ptr::null_mut()),
            id: TaskId::next(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_scheduler_task(&self) -> bool {
        self.is_scheduler_task
    }

    pub fn is_user(&self) -> bool {
        matches!(self.ty, TaskType::User)
    }

    pub fn stack(&self) -> &RwLock<Stack> {
        &self.stack
    }

    pub fn state(&self) -> &RwLock<TaskState> {
        &self.state
    }

    pub fn scheduler_locked(&self) -> bool {
        self.scheduler_locked.load(Ordering::Acquire)
    }

    pub fn set_scheduler_locked(&self, locked: bool) {
        self.scheduler_locked.store(locked, Ordering::Release);
    }

    /// Called by [`crate::interrupt::dispatch`] as the first thing it does
    /// on every trap taken while this task was running (§4.3): bumps the
    /// reentrancy count and snapshots+clears the user-memory-access count,
    /// returning the snapshot for [`Task::on_interrupt_exit`] to restore
    /// and the executor this task was running on when the trap landed.
    pub fn on_interrupt_entry(&self) -> (u32, Option<&'static Executor>) {
        self.interrupt_disable_count.fetch_add(1, Ordering::AcqRel);
        let saved_user_access = self.user_mem_access_count.swap(0, Ordering::AcqRel);
        let executor = match &*self.state.read() {
            TaskState::Running(executor) => Some(*executor),
            _ => None,
        };
        (saved_user_access, executor)
    }

    /// Undoes [`Task::on_interrupt_entry`]: restores the user-access count
    /// and decrements the reentrancy count back down.
    pub fn on_interrupt_exit(&self, saved_user_access: u32) {
        self.user_mem_access_count.store(saved_user_access, Ordering::Release);
        self.interrupt_disable_count.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn interrupt_disable_count(&self) -> u32 {
        self.interrupt_disable_count.load(Ordering::Acquire)
    }
}

/// A strong, ref-counted handle to a [`Task`].
///
/// `Clone` increments the task's reference count; `Drop` decrements it,
/// and on the 1-to-0 transition pushes the task's raw pointer onto
/// [`crate::cleanup`]'s inbox rather than freeing it inline -- the task
/// may be the one currently running (dropping its own last handle from
/// its own stack), so the actual deallocation has to happen from
/// somewhere else's stack.
pub struct TaskRef(NonNull<Task>);

// Safety: `Task` is only ever reached through `TaskRef`/raw pointers guarded
// by its own internal locks; nothing about a `Task` is thread-confined.
unsafe impl Send for TaskRef {}
unsafe impl Sync for TaskRef {}

impl TaskRef {
    /// Allocates a stack and a fresh [`Task`] for it, registers the task,
    /// and returns a handle to it. The task starts `Ready` and unqueued;
    /// the caller (normally [`crate::scheduler::queue_task`]) still has to
    /// queue it.
    pub fn new_kernel(name: impl Into<String>, is_scheduler_task: bool) -> Result<Self, StackError> {
        let stack = Stack::alloc()?;
        let task = Box::new(Task::new(name.into(), TaskType::Kernel, is_scheduler_task, stack));
        let ptr = NonNull::from(&*task);
        registry().write().insert(task);
        Ok(Self(ptr))
    }

    pub fn as_ptr(&self) -> *mut Task {
        self.0.as_ptr()
    }

    /// # Safety
    ///
    /// `ptr` must have been obtained from [`TaskRef::as_ptr`] (or
    /// `into_ptr`) and must still be a live, registered task.
    pub unsafe fn from_raw(ptr: *mut Task) -> Self {
        Self(NonNull::new(ptr).expect("null task pointer"))
    }
}

impl core::ops::Deref for TaskRef {
    type Target = Task;
    fn deref(&self) -> &Task {
        // Safety: a live `TaskRef` always holds a strong reference keeping
        // the task allocated.
        unsafe { self.0.as_ref() }
    }
}

impl Clone for TaskRef {
    fn clone(&self) -> Self {
        let task = self.deref();
        let prev = task.ref_count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "cloned a task that had already reached refcount 0");
        Self(self.0)
    }
}

impl Drop for TaskRef {
    fn drop(&mut self) {
        let task = self.deref();
        if task.ref_count.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        // We were the last strong reference. Transition to `Dropped` and
        // hand the raw pointer to the cleanup service; it alone is now
        // responsible for this task's memory.
        let queued_for_cleanup = {
            let mut state = task.state.write();
            *state = TaskState::Dropped {
                queued_for_cleanup: AtomicBool::new(false),
            };
            match &*state {
                TaskState::Dropped { queued_for_cleanup } => queued_for_cleanup as *const AtomicBool,
                _ => unreachable!(),
            }
        };
        // Safety: `queued_for_cleanup` lives inside `task`, which is still
        // allocated (we have not pushed it to cleanup yet).
        let already_queued = unsafe { &*queued_for_cleanup }.swap(true, Ordering::AcqRel);
        debug_assert!(!already_queued, "a task can only reach refcount 0 once");

        let ptr = self.0.as_ptr();
        // Safety: `ptr` is valid until the cleanup service pops and
        // destroys it, which cannot race this push (it only just became
        // reachable from the inbox).
        unsafe { crate::cleanup::queue_for_cleanup(ptr) };
    }
}

// Safety: `links` reads back exactly the field `push`/the accessor wrote
// into, via a stable byte offset into `Task`.
unsafe impl atomic_lifo::Node for Task {
    fn next_ptr(&self) -> *const AtomicPtr<Self> {
        &self.cleanup_next
    }
}

// Safety: `scheduler_links` is only touched while the scheduler's run-queue
// lock is held, and a `Task` is never moved once boxed and registered.
unsafe impl linked_list::Linked for Task {
    type Handle = TaskRef;

    fn into_ptr(handle: Self::Handle) -> NonNull<Self> {
        let ptr = handle.0;
        core::mem::forget(handle);
        ptr
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        TaskRef(ptr)
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<linked_list::Links<Self>> {
        ptr.map_addr(|addr| {
            let offset = offset_of!(Self, scheduler_links);
            addr.checked_add(offset).unwrap()
        })
        .cast()
    }
}

// Safety: same reasoning as the `linked_list::Linked` impl above, over the
// registry's own link field.
unsafe impl wavltree::Linked for Task {
    type Handle = Box<Task>;
    type Key = TaskId;

    fn into_ptr(handle: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(handle))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        // Safety: caller's contract (see trait docs): `ptr` came from a
        // `Box` via `into_ptr` and is being handed back exclusively.
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<wavltree::Links<Self>> {
        ptr.map_addr(|addr| {
            let offset = offset_of!(Self, registry_links);
            addr.checked_add(offset).unwrap()
        })
        .cast()
    }

    fn get_key(&self) -> &Self::Key {
        &self.id
    }
}

/// The global registry of every live kernel task, keyed by [`TaskId`].
/// [`crate::cleanup`]'s TaskCleanupService removes a task's entry (and so
/// drops its owning `Box`, freeing its [`Stack`]) once its reference count
/// has reached zero and stays there under this lock.
static REGISTRY: Once<RwLock<wavltree::WAVLTree<Task>>> = Once::new();

pub fn registry() -> &'static RwLock<wavltree::WAVLTree<Task>> {
    REGISTRY.call_once(|| RwLock::new(wavltree::WAVLTree::new()))
}

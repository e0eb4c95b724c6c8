// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod switch;

use spin::Once;
use x86::LocalApic;

use crate::sync::ticket::TicketLock;

pub use switch::{init_stack, switch_task, switch_task_no_save};

/// The per-core local APIC, mapped during [`init_local_apic`].
static LOCAL_APIC: Once<TicketLock<Option<LocalApic>>> = Once::new();

/// Maps and enables the running core's local APIC.
///
/// `mmio_base` must be the virtual address the APIC's physical register page
/// (`LocalApic::physical_base()`) is mapped at, one-to-one or through the
/// direct map, by the caller.
///
/// # Safety
///
/// Must be called at most once per core, after paging is live and the
/// register page is mapped, and before interrupts are enabled.
pub unsafe fn init_local_apic(mmio_base: *mut u32) {
    let lock = LOCAL_APIC.call_once(|| TicketLock::new(None));
    // Safety: caller's contract.
    let apic = unsafe { LocalApic::new(mmio_base) };
    // Safety: caller's contract.
    unsafe { apic.enable() };
    *lock.lock() = Some(apic);
}

/// Signals end-of-interrupt on the running core's local APIC.
///
/// # Panics
///
/// Panics if [`init_local_apic`] has not been called on this core yet.
pub fn end_of_interrupt() {
    let guard = LOCAL_APIC.get().expect("local APIC not initialized").lock();
    guard.as_ref().expect("local APIC not initialized").end_of_interrupt();
}

/// Sends the `scheduler` IPI (see [`x86::IdtVector::Scheduler`]) to the core
/// whose local APIC id is `destination`.
///
/// # Panics
///
/// Panics if [`init_local_apic`] has not been called on this core yet.
pub fn send_wakeup_ipi_to(destination: u32) {
    let guard = LOCAL_APIC.get().expect("local APIC not initialized").lock();
    guard
        .as_ref()
        .expect("local APIC not initialized")
        .send_ipi(destination, x86::IdtVector::Scheduler as u8);
}

/// Sends the `scheduler` IPI to every other executor, used to wake one out
/// of [`crate::sync::parker::Parker::park`]'s `hlt` loop.
///
/// This broadcasts rather than targeting the specific parked core: the
/// scheduler re-checks its own wake condition on every `scheduler` IPI
/// regardless of which core sent it, so an extra spurious wakeup on an
/// uninvolved core is harmless, and tracking "who is parked where" would
/// need its own synchronization for no benefit yet.
pub fn send_wakeup_ipi() {
    send_wakeup_ipi_to(0xFF);
}

/// Sends an NMI to every other core. Called once by the panic handler so
/// every sibling core stops as soon as one of them panics.
///
/// If the local APIC has not been initialized yet (a panic during very
/// early boot, before any other core is up), this is a no-op.
pub fn notify_panic_to_other_cores() {
    if let Some(lock) = LOCAL_APIC.get() {
        if let Some(apic) = lock.lock().as_ref() {
            apic.send_nmi_to_others();
        }
    }
}

/// Halts the running core until the next interrupt.
///
/// # Safety
///
/// Interrupts must be enabled, or this never returns.
pub unsafe fn wait_for_interrupt() {
    // Safety: caller's contract; `hlt` resumes at the instruction after it
    // once any interrupt, maskable or not, is serviced.
    unsafe {
        core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
    }
}

/// Sets EFLAGS.AC (the SMAP override), used around accesses to user memory
/// from kernel code. Tracked per task by
/// [`crate::task::Task::on_interrupt_entry`] and
/// [`crate::scheduler::before_switch_task`] so it is never left set across a
/// switch into a task that did not ask for it.
///
/// # Safety
///
/// Must only be set while actually dereferencing user memory the caller has
/// validated belongs to the running task's address space.
pub unsafe fn set_user_mem_access(enabled: bool) {
    // Safety: `stac`/`clac` only affect implicit supervisor-mode access
    // checks; they have no other side effect.
    unsafe {
        if enabled {
            core::arch::asm!("stac", options(nomem, nostack, preserves_flags));
        } else {
            core::arch::asm!("clac", options(nomem, nostack, preserves_flags));
        }
    }
}

#[inline]
/// Returns the current stack pointer.
pub fn get_stack_pointer() -> usize {
    let stack_pointer: usize;
    unsafe {
        core::arch::asm!(
        "mov {}, rsp",
        out(reg) stack_pointer,
        options(nostack,nomem),
        );
    }
    stack_pointer
}

/// Retrieves the next older program counter and stack pointer from the current frame pointer.
pub unsafe fn get_next_older_pc_from_fp(fp: usize) -> usize {
    // The calling convention always pushes the return pointer (aka the PC of
    // the next older frame) just before this frame.
    *(fp as *mut usize).offset(1)
}

/// The current frame pointer points to the next older frame pointer.
pub const NEXT_OLDER_FP_FROM_FP_OFFSET: usize = 0;

/// Asserts that the frame pointer is sufficiently aligned for the platform.
pub fn assert_fp_is_aligned(fp: usize) {
    assert_eq!(fp % 16, 0, "stack should always be aligned to 16");
}

// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Fixed handlers for the exceptions and interrupts the kernel cares about.

use core::arch::asm;
use core::sync::atomic::Ordering;

use x86::{InterruptFrame, PageFaultErrorCode};

pub fn page_fault(frame: &mut InterruptFrame) {
    let cr2: u64;
    // Safety: reading CR2 has no side effects.
    unsafe {
        asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }
    let code = PageFaultErrorCode::from_bits_truncate(frame.error_code);

    log::error!(
        "page fault at {:#x} (rip={:#x}): present={} write={} user={} instruction_fetch={}",
        cr2,
        frame.rip,
        code.contains(PageFaultErrorCode::PRESENT),
        code.contains(PageFaultErrorCode::WRITE),
        code.contains(PageFaultErrorCode::USER),
        code.contains(PageFaultErrorCode::INSTRUCTION),
    );

    panic!("unhandled page fault");
}

pub fn double_fault(frame: &mut InterruptFrame) {
    panic!("double fault at rip={:#x}", frame.rip);
}

/// Either a genuine non-maskable interrupt, or the way the panic handler
/// tells every other core to stop: re-check [`crate::panic::PANICKED`] and
/// halt if it's set, otherwise this was a real NMI with nothing to do yet.
pub fn non_maskable_interrupt(_frame: &mut InterruptFrame) {
    if crate::panic::PANICKED.load(Ordering::SeqCst) {
        crate::panic::abort();
    }
}

/// The IPI vector the scheduler uses to ask a core to re-examine its run
/// queue, sent by [`crate::sync::parker::Parker::unpark`] and by anything
/// that queues a task onto an idle core.
pub fn scheduler_ipi(_frame: &mut InterruptFrame) {
    crate::arch::end_of_interrupt();
    if crate::scheduler::try_current().is_some() {
        crate::scheduler::maybe_preempt();
    }
}

pub fn unhandled_exception(frame: &mut InterruptFrame) {
    panic!(
        "unhandled exception vector={} rip={:#x} error_code={:#x}",
        frame.vector_number(),
        frame.rip,
        frame.error_code
    );
}

pub fn unhandled_interrupt(frame: &mut InterruptFrame) {
    log::warn!("unhandled interrupt vector={}", frame.vector_number());
    crate::arch::end_of_interrupt();
}

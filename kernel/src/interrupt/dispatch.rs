// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The single entry point every trampoline calls into.
//!
//! Declared `extern "C"` and referenced by name from [`x86::trampoline`]'s
//! `global_asm!`-generated table; this is the only symbol that crate needs
//! the kernel binary to provide.
//!
//! Brackets every handler invocation with the per-task save/restore
//! sequence from §4.3: before the handler runs, tell the running task (if
//! the scheduler is up yet -- see [`crate::scheduler::try_current`]) that
//! it has been interrupted, so it stops counting on its own
//! `user_mem_access_count` nesting correctly across the trap; after the
//! handler returns, restore it.

use x86::{IdtVector, InterruptFrame};

use super::exceptions;

#[unsafe(no_mangle)]
extern "C" fn interrupt_dispatch(frame: *mut InterruptFrame) {
    // Safety: the trampoline always hands us a pointer to a fully
    // initialized frame on its own stack.
    let frame = unsafe { &mut *frame };
    let vector = frame.vector_number();

    let current = crate::scheduler::try_current();
    let saved_user_access = current.as_ref().map(|task| task.on_interrupt_entry().0);

    match vector {
        v if v == IdtVector::PageFault as u8 => exceptions::page_fault(frame),
        v if v == IdtVector::NonMaskableInterrupt as u8 => exceptions::non_maskable_interrupt(frame),
        v if v == IdtVector::DoubleFault as u8 => exceptions::double_fault(frame),
        v if v == IdtVector::Scheduler as u8 => exceptions::scheduler_ipi(frame),
        v if v == IdtVector::SpuriousInterrupt as u8 => {}
        v if IdtVector::is_exception(v) => exceptions::unhandled_exception(frame),
        _ => exceptions::unhandled_interrupt(frame),
    }

    if let (Some(task), Some(saved)) = (current, saved_user_access) {
        task.on_interrupt_exit(saved);
    }
}

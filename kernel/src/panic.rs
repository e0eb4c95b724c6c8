// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The kernel panic handler.
//!
//! There is no unwinding: a panic logs its location and message, marks the
//! core as panicked so the NMI handler can tell every other core to stop,
//! and halts. Backtrace/symbolication machinery isn't worth carrying for an
//! abort-only strategy.

use core::sync::atomic::{AtomicBool, Ordering};

/// Set by [`begin_panic_handler`] before it does anything else; read by the
/// `#NMI` handler to distinguish "a sibling core panicked" from a spurious
/// or hardware-raised NMI.
pub static PANICKED: AtomicBool = AtomicBool::new(false);

#[panic_handler]
fn begin_panic_handler(info: &core::panic::PanicInfo<'_>) -> ! {
    x86::interrupt_disable();

    if !PANICKED.swap(true, Ordering::SeqCst) {
        let loc = info.location();
        let msg = info.message();
        match loc {
            Some(loc) => log::error!("panicked at {loc}:\n{msg}"),
            None => log::error!("panicked:\n{msg}"),
        }

        crate::arch::notify_panic_to_other_cores();
    }

    abort()
}

/// Halts the running core permanently. Never returns.
pub fn abort() -> ! {
    loop {
        // Safety: a permanent halt loop needs no enabled-interrupts precondition beyond
        // "this core stops here", which is exactly what we want.
        unsafe { crate::arch::wait_for_interrupt() };
    }
}

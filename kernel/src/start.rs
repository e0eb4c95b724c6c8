// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The boot entry point.
//!
//! Brings up, in order: the console logger (so everything after this can
//! log), the bootstrap allocator and kernel heap, the global frame
//! allocator, the kernel address space, and interrupt/exception handling.
//! Once all of that is live it hands off to [`crate::kmain`].

use mmu::frame_alloc::BootstrapAllocator;

use crate::{allocator, boot_info, frame_alloc, interrupt, kconfig, logger, state, vm};

/// The kernel's entry point.
///
/// `info` must describe memory that is actually free, mapped one-to-one
/// through `info.physical_address_offset`, and not otherwise referenced by
/// any other running core yet.
///
/// # Safety
///
/// Must be called exactly once, by the bootstrap core, before anything else
/// in the kernel runs.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start(info: crate::boot_info::BootInfo) -> ! {
    logger::init(kconfig::LOG_LEVEL.to_level_filter());

    let info = boot_info::init(info);
    log::info!(
        "booting: {} cpu(s), kernel at {:#x}..{:#x}",
        info.cpus,
        info.kernel_phys.start.as_raw(),
        info.kernel_phys.end.as_raw()
    );

    let mut boot_alloc = BootstrapAllocator::new(&info.memories);
    boot_alloc.set_phys_offset(info.physical_address_offset);

    allocator::init(&mut boot_alloc, info.physical_address_offset);

    // Safety: `free_regions` only yields memory the bootstrap allocator
    // itself never handed out, and no other collaborator has touched it.
    unsafe {
        frame_alloc::init(boot_alloc.free_regions(), info.physical_address_offset);
    }

    vm::init(info.physical_address_offset);

    // Safety: the heap and kernel address space are both live now, and this
    // is the only core running so far.
    unsafe {
        interrupt::init();
    }

    state::init_global(state::Global { cpu_count: info.cpus });
    state::init_cpu_local(state::CpuLocal {
        id: crate::cpu_set::LogicalCpuId::new(0),
    });

    log::info!("boot complete");

    crate::kmain()
}

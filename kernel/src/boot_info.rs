// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The boot-time handoff from the loader.
//!
//! Memory-map ingestion, ACPI table parsing and firmware image layout are
//! external collaborators this crate does not implement; this is the
//! minimal struct describing what the kernel needs out of that handoff to
//! bring up paging and the frame allocator. A real loader fills these
//! fields in before jumping to `kmain`; nothing here parses a device tree
//! or ACPI table itself.

use core::ops::Range;

use arrayvec::ArrayVec;
use mmu::{PhysicalAddress, VirtualAddress};
use spin::Once;

pub static BOOT_INFO: Once<BootInfo> = Once::new();

#[derive(Debug)]
pub struct BootInfo {
    /// Number of executors (CPU cores) the loader brought up or reserved.
    pub cpus: usize,
    /// Physical memory ranges free for the frame allocator to manage.
    pub memories: ArrayVec<Range<PhysicalAddress>, 16>,
    /// Physical range occupied by the kernel image itself (for panic
    /// backtraces and symbolization).
    pub kernel_phys: Range<PhysicalAddress>,
    /// Virtual range the kernel image is mapped at.
    pub kernel_virt: Range<VirtualAddress>,
    /// Offset added to a physical address to reach its direct-mapped
    /// virtual alias.
    pub physical_address_offset: VirtualAddress,
}

/// Records the boot info handed off by the loader. Must be called at most
/// once, before any other subsystem that reads [`BOOT_INFO`].
pub fn init(info: BootInfo) -> &'static BootInfo {
    BOOT_INFO.call_once(|| info)
}

pub fn get() -> &'static BootInfo {
    BOOT_INFO.get().expect("boot info not initialized")
}

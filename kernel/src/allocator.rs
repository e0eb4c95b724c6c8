// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The kernel heap.
//!
//! A static arena of [`kconfig::HEAP_SIZE_PAGES`] pages, carved once out of
//! the bootstrap frame allocator and handed to `talc` as the sole backing
//! store for the `#[global_allocator]`. There is no growth path: once the
//! arena is exhausted, allocation fails the way any other `no_std` target
//! would.

use core::alloc::Layout;

use mmu::frame_alloc::{BootstrapAllocator, FrameAllocator};
use mmu::VirtualAddress;
use talc::{ErrOnOom, Span, Talc, Talck};

use crate::kconfig;

#[global_allocator]
static KERNEL_ALLOCATOR: Talck<spin::RawMutex, ErrOnOom> = Talc::new(ErrOnOom).lock();

/// Carves the kernel heap out of `boot_alloc` and hands it to the global
/// allocator.
///
/// # Panics
///
/// Panics if the bootstrap allocator cannot satisfy the heap's size and
/// alignment requirements.
pub fn init(boot_alloc: &mut BootstrapAllocator, phys_offset: VirtualAddress) {
    let layout =
        Layout::from_size_align(kconfig::HEAP_SIZE_PAGES * kconfig::PAGE_SIZE, kconfig::PAGE_SIZE)
            .unwrap();

    let phys = boot_alloc
        .allocate_contiguous(layout)
        .expect("not enough free memory for the kernel heap");

    let start = VirtualAddress::from_phys(phys, phys_offset);
    log::debug!("kernel heap: {:#x}..{:#x} ({} pages)", start.as_raw(), start.as_raw() + layout.size(), kconfig::HEAP_SIZE_PAGES);

    let span = Span::from_base_size(start.as_raw() as *mut u8, layout.size());

    let mut alloc = KERNEL_ALLOCATOR.lock();
    // Safety: `phys` was just allocated by `boot_alloc` and is mapped
    // one-to-one through `phys_offset`; nothing else owns this range yet.
    unsafe {
        let heap = alloc.claim(span).unwrap();
        alloc.extend(heap, span);
    }
}

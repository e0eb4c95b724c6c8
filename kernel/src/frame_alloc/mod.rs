//! Physical frame allocation.
//!
//! The physical frame allocator itself is an external collaborator (see
//! `mmu::frame_alloc::BuddyAllocator`); this module only wires it up as a
//! single global instance the rest of the kernel can reach for through a
//! lock, and hands a [`mmu::frame_alloc::FrameAllocator`] impl to
//! `AddressSpace` operations.

use core::ops::Range;

use mmu::frame_alloc::BuddyAllocator;
use mmu::{PhysicalAddress, VirtualAddress};
use spin::{Mutex, Once};

static GLOBAL: Once<Mutex<BuddyAllocator>> = Once::new();

/// Initializes the global frame allocator from the physical memory regions
/// the boot collaborator reports as free.
///
/// # Safety
///
/// `regions` must describe physical memory that is actually free and not
/// already owned by the kernel image, boot structures, or reserved regions.
pub unsafe fn init(regions: impl IntoIterator<Item = Range<PhysicalAddress>>, phys_offset: VirtualAddress) {
    GLOBAL.call_once(|| {
        // Safety: caller's contract.
        let alloc = unsafe { BuddyAllocator::from_iter(regions, phys_offset) };
        Mutex::new(alloc)
    });
}

/// Returns the global frame allocator, locked for the duration of the
/// returned guard.
///
/// # Panics
///
/// Panics if [`init`] has not been called yet.
pub fn global() -> spin::MutexGuard<'static, BuddyAllocator> {
    GLOBAL.get().expect("frame allocator not initialized").lock()
}

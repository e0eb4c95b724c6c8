// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The kernel's own address space.
//!
//! `mmu::AddressSpace` does the actual page-table walking; this module just
//! owns the one instance describing the kernel's half of the address space,
//! wires it to [`crate::frame_alloc`]'s global [`mmu::frame_alloc::BuddyAllocator`],
//! and exposes the handful of range operations `start`/the task subsystem
//! need (map/unmap a range, switch the active page table on a context
//! switch, grow the kernel heap's page-table coverage).

use core::fmt;
use core::num::NonZeroUsize;
use core::ops::Range;

use mmu::{AddressSpace as ArchAddressSpace, Flags, PhysicalAddress, VirtualAddress};
use spin::{Mutex, Once};

use crate::frame_alloc;

pub const KERNEL_ASID: usize = 0;

static KERNEL_ASPACE: Once<Mutex<AddressSpace>> = Once::new();

#[derive(Debug)]
pub enum Error {
    Mmu(mmu::Error),
    /// A range passed to a mapping operation was not page aligned.
    Misaligned,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Mmu(err) => write!(f, "{err}"),
            Error::Misaligned => write!(f, "range is not page aligned"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::Mmu(err) => Some(err),
            Error::Misaligned => None,
        }
    }
}

impl From<mmu::Error> for Error {
    fn from(err: mmu::Error) -> Self {
        Error::Mmu(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// A single kernel address space: the hardware page table plus the
/// bookkeeping needed to map, unmap, and re-activate it.
pub struct AddressSpace {
    arch: ArchAddressSpace,
}

impl AddressSpace {
    /// Adopts the hardware page table that is active right now (the one the
    /// loader set up) as the kernel address space.
    pub fn from_active(phys_offset: VirtualAddress) -> Self {
        let (arch, flush) = ArchAddressSpace::from_active(KERNEL_ASID, phys_offset);
        flush.ignore();
        Self { arch }
    }

    /// Maps `len` bytes of freshly allocated, zeroed physical frames at
    /// `virt`, picking the largest page size the allocator can satisfy for
    /// each step (see [`mmu::AddressSpace::map_contiguous`]'s callers in the
    /// upstream crate for the same allocate-as-you-map pattern).
    ///
    /// # Errors
    ///
    /// Returns an error if `virt` or `len` are not page aligned, or if the
    /// frame allocator or page-table walk fails partway through.
    pub fn map_range(&mut self, virt: VirtualAddress, len: usize, flags: Flags) -> Result<()> {
        if !virt.is_aligned(mmu::arch::PAGE_SIZE) || len % mmu::arch::PAGE_SIZE != 0 {
            return Err(Error::Misaligned);
        }

        let mut flush = self.arch.new_flush();
        let mut remaining = len;
        let mut at = virt;
        let mut alloc = frame_alloc::global();

        while remaining > 0 {
            let step = NonZeroUsize::new(mmu::arch::PAGE_SIZE).unwrap();
            let phys = alloc.allocate_one_zeroed().ok_or(mmu::Error::NoMemory)?;
            // Safety: `at` is page aligned and was just verified unmapped by
            // construction (the caller owns this range exclusively).
            unsafe {
                self.arch.map_contiguous(&mut *alloc, at, phys, step, flags, &mut flush)?;
            }
            at = at.add(mmu::arch::PAGE_SIZE);
            remaining -= mmu::arch::PAGE_SIZE;
        }

        flush.flush()?;
        Ok(())
    }

    /// Unmaps `range`, returning its frames to the global frame allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if `range` is not page aligned or not fully mapped.
    pub fn unmap_range(&mut self, range: Range<VirtualAddress>) -> Result<()> {
        let len = range.end.as_raw().saturating_sub(range.start.as_raw());
        if !range.start.is_aligned(mmu::arch::PAGE_SIZE) || len % mmu::arch::PAGE_SIZE != 0 {
            return Err(Error::Misaligned);
        }

        let mut flush = self.arch.new_flush();
        // Safety: the caller guarantees `range` belongs to this address
        // space and is not concurrently accessed.
        unsafe {
            self.arch
                .unmap(range.start, NonZeroUsize::new(len).unwrap(), &mut flush)?;
        }
        flush.flush()?;
        Ok(())
    }

    /// Loads this address space's page table into the running core's paging
    /// hardware.
    ///
    /// # Safety
    ///
    /// The caller must ensure every currently-mapped kernel address this
    /// core still depends on (its own stack, the code it is executing) is
    /// also mapped the same way in `self`.
    pub unsafe fn switch_to(&self) {
        // Safety: caller's contract.
        unsafe { self.arch.activate() };
    }

    pub fn root_pgtable(&self) -> PhysicalAddress {
        self.arch.root_pgtable()
    }
}

/// Adopts the loader's page table as the kernel address space. Must be
/// called once, early in boot, before any other subsystem maps kernel
/// memory.
pub fn init(phys_offset: VirtualAddress) {
    KERNEL_ASPACE.call_once(|| Mutex::new(AddressSpace::from_active(phys_offset)));
}

/// Returns the kernel address space, locked for the duration of the
/// returned guard.
///
/// # Panics
///
/// Panics if [`init`] has not been called yet.
pub fn kernel_aspace() -> spin::MutexGuard<'static, AddressSpace> {
    KERNEL_ASPACE.get().expect("kernel address space not initialized").lock()
}

// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A task's kernel stack.
//!
//! Stacks come from a fixed-size arena within [`kconfig::KERNEL_STACKS_BASE`]:
//! `kconfig::PREALLOCATED_TASKS` slots, each `STACK_SIZE_PAGES + 1` pages, the
//! extra page a guard that is never mapped. A slot's usable range is mapped
//! lazily on [`Stack::alloc`] and unmapped again when the `Stack` is dropped.

use core::fmt;
use core::mem::size_of;
use core::ops::Range;

use mmu::{Flags, VirtualAddress};
use spin::Mutex;

use crate::{kconfig, vm};

const SLOT_PAGES: usize = kconfig::STACK_SIZE_PAGES as usize + 1;
const SLOT_BYTES: usize = SLOT_PAGES * kconfig::PAGE_SIZE;

#[derive(Debug)]
pub enum Error {
    /// A push ran into the guard page below the usable range.
    StackOverflow,
    /// Every preallocated slot is in use.
    NoSlots,
    Map(vm::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StackOverflow => write!(f, "stack overflow"),
            Error::NoSlots => write!(f, "no preallocated stack slots left"),
            Error::Map(err) => write!(f, "{err}"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::Map(err) => Some(err),
            _ => None,
        }
    }
}

impl From<vm::Error> for Error {
    fn from(err: vm::Error) -> Self {
        Error::Map(err)
    }
}

struct Arena {
    used: Mutex<[bool; kconfig::PREALLOCATED_TASKS]>,
}

static ARENA: Arena = Arena {
    used: Mutex::new([false; kconfig::PREALLOCATED_TASKS]),
};

impl Arena {
    fn alloc(&self) -> Result<usize, Error> {
        let mut used = self.used.lock();
        let idx = used.iter().position(|slot| !slot).ok_or(Error::NoSlots)?;
        used[idx] = true;
        Ok(idx)
    }

    fn free(&self, idx: usize) {
        self.used.lock()[idx] = false;
    }
}

/// A task's kernel stack: the full slot (guard page included), the usable
/// sub-range actually mapped, and the current and initial stack pointers.
#[derive(Debug)]
pub struct Stack {
    slot: usize,
    usable_range: Range<VirtualAddress>,
    sp: VirtualAddress,
    top_sp: VirtualAddress,
}

impl Stack {
    /// Claims a slot from the arena and maps its usable range read/write.
    ///
    /// # Errors
    ///
    /// Returns an error if every slot is in use or the mapping fails.
    pub fn alloc() -> Result<Self, Error> {
        let slot = ARENA.alloc()?;
        let base = VirtualAddress::new(kconfig::KERNEL_STACKS_BASE + slot * SLOT_BYTES);
        let usable_start = base.add(kconfig::PAGE_SIZE);
        let usable_end = base.add(SLOT_BYTES);

        if let Err(err) =
            vm::kernel_aspace().map_range(usable_start, SLOT_BYTES - kconfig::PAGE_SIZE, Flags::READ | Flags::WRITE)
        {
            ARENA.free(slot);
            return Err(err.into());
        }

        let mut stack = Self {
            slot,
            usable_range: usable_start..usable_end,
            sp: usable_end,
            top_sp: usable_end,
        };
        stack.reset();
        Ok(stack)
    }

    pub fn top(&self) -> VirtualAddress {
        self.top_sp
    }

    pub fn sp(&self) -> VirtualAddress {
        self.sp
    }

    /// A raw pointer to this stack's `sp` field, for
    /// [`crate::arch::switch_task`] to write the hardware stack pointer
    /// back into directly from its own asm body.
    ///
    /// `VirtualAddress` is `#[repr(transparent)]` over a `usize`, so a
    /// pointer to one may be cast to `*mut usize` and written through
    /// directly.
    pub fn sp_ptr(&mut self) -> *mut usize {
        core::ptr::addr_of_mut!(self.sp).cast()
    }

    /// Pushes a single `usize` word, moving `sp` down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the push would cross into the
    /// guard page.
    pub fn push(&mut self, value: usize) -> Result<(), Error> {
        let new_sp = self.sp.sub(size_of::<usize>());
        if new_sp < self.usable_range.start {
            return Err(Error::StackOverflow);
        }
        // Safety: `new_sp` was just checked to lie within the mapped usable
        // range, and `Stack` is the sole owner of that range.
        unsafe {
            (new_sp.as_raw() as *mut usize).write(value);
        }
        self.sp = new_sp;
        Ok(())
    }

    /// Resets `sp` to the top of the usable range and pushes a zero return
    /// address sentinel, so a backtrace (or a switch into this stack before
    /// it has ever run) terminates there instead of reading garbage.
    pub fn reset(&mut self) {
        self.sp = self.top_sp;
        self.push(0).expect("a freshly reset stack always has room for one word");
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let _ = vm::kernel_aspace().unmap_range(self.usable_range.clone());
        ARENA.free(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[ktest::test]
    fn push_exactly_to_guard_succeeds_then_overflows() {
        let mut stack = Stack::alloc().unwrap();
        stack.sp = stack.usable_range.start.add(size_of::<usize>());
        stack.push(0).unwrap();
        assert_eq!(stack.sp, stack.usable_range.start);
        assert!(matches!(stack.push(0), Err(Error::StackOverflow)));
    }
}

//! Compile-time kernel tunables.
//!
//! The teacher generates these through a build-time `kconfig_declare` proc
//! macro reading an external TOML file; none of these constants are meant to
//! vary per build here, so they are plain `pub const` items instead.

/// The log level for the kernel
pub const LOG_LEVEL: log::Level = log::Level::Trace;

/// The size of a kernel task's stack in pages
pub const STACK_SIZE_PAGES: u32 = 128;

/// The size of the trap/IST handler stack in pages
pub const TRAP_STACK_SIZE_PAGES: usize = 16;

/// The size of the kernel heap in pages
pub const HEAP_SIZE_PAGES: usize = 8192; // 32 MiB

/// Number of kernel tasks preallocated at boot
pub const PREALLOCATED_TASKS: usize = 16;

pub const PAGE_SIZE: usize = mmu::arch::PAGE_SIZE;

/// Base virtual address of the kernel-stacks region: a fixed window, never
/// touched by the direct physical map, carved into one
/// `STACK_SIZE_PAGES + 1`-page slot per preallocated task. The extra page
/// per slot is the low guard page and is never mapped.
pub const KERNEL_STACKS_BASE: usize = 0xFFFF_FF00_0000_0000;

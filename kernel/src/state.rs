// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Global and per-core kernel state.
//!
//! `CpuLocal` is a plain [`Once`]-guarded static rather than true per-core
//! storage: bringing up `cpu_local`'s `#[thread_local]` segments needs each
//! core's `IA32_FS_BASE` MSR pointed at its own TLS block, which the boot
//! path doesn't set up yet (single executor for now). Once secondary-core
//! bring-up exists this becomes a `cpu_local!` the way [`crate::arch`]'s
//! other per-core state is, one `CpuLocal` per core instead of one total.

use spin::Once;

use crate::cpu_set::LogicalCpuId;

static GLOBAL: Once<Global> = Once::new();
static CPU_LOCAL: Once<CpuLocal> = Once::new();

#[derive(Debug)]
pub struct Global {
    pub cpu_count: usize,
}

#[derive(Debug)]
pub struct CpuLocal {
    pub id: LogicalCpuId,
}

pub fn init_global(state: Global) {
    GLOBAL.call_once(|| state);
}

pub fn init_cpu_local(state: CpuLocal) {
    CPU_LOCAL.call_once(|| state);
}

pub fn global() -> &'static Global {
    GLOBAL.get().expect("global state not initialized")
}

pub fn cpu_local() -> &'static CpuLocal {
    CPU_LOCAL.get().expect("cpu local state not initialized")
}

/// Like [`cpu_local`], but `None` instead of panicking before
/// [`init_cpu_local`] has run. Interrupts are enabled during
/// [`crate::interrupt::init`], before this state exists, so anything that
/// might run inside an interrupt handler that early needs this instead.
pub fn try_cpu_local() -> Option<&'static CpuLocal> {
    CPU_LOCAL.get()
}

#![cfg_attr(not(test), no_std)]

#[unsafe(no_mangle)]
#[inline(never)]
pub fn abort() -> ! {
    cfg_if::cfg_if! {
        if #[cfg(not(target_os = "none"))] {
            extern crate std;
            std::process::abort();
        } else if #[cfg(any(target_arch = "riscv64", target_arch = "riscv32"))] {
            riscv::abort();
        } else if #[cfg(target_arch = "x86_64")] {
            // Safety: halting the core has no preconditions.
            unsafe {
                loop {
                    core::arch::asm!("cli", "hlt", options(nomem, nostack));
                }
            }
        } else {
            compile_error!("unsupported target architecture")
        }
    }
}

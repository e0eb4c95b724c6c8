#![allow(unused)]

pub use mmu::arch::*;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::*;
    } else {
        compile_error!("Unsupported target architecture");
    }
}

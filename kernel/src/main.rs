#![no_std]
#![no_main]

// Bring the `#[panic_handler]` and `#[global_allocator]` into scope; the
// actual entry point is `kernel::start::_start`, installed by the linker
// script, not a `fn main` here.
extern crate kernel as _;

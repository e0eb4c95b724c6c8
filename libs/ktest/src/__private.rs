#[allow(unreachable_code)]
pub fn exit(code: i32) -> ! {
    #[cfg(target_os = "none")]
    {
        log::info!("test harness exiting with code {code}");
        abort::abort();
    }

    #[cfg(not(target_os = "none"))]
    ::std::process::exit(code);
}

#[allow(unused)]
pub fn print(str: &str) {
    #[cfg(target_os = "none")]
    {
        use core::fmt::Write;
        let _ = x86::serial::SerialPort::new(x86::serial::COM1_BASE).write_str(str);
    }

    #[cfg(not(target_os = "none"))]
    {
        use ::std::io::Write;
        let _ = ::std::io::stdout().write(str.as_bytes());
    }
}

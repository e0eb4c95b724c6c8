// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The kernel console logger.
//!
//! A [`log::Log`] impl writing to the COM1 serial port, guarded by a
//! [`TicketLock`] so lines from different executors don't interleave.

use core::fmt::Write;

use log::{LevelFilter, Metadata, Record};
use x86::serial::SerialPort;

use crate::sync::ticket::TicketLock;

const COM1: u16 = 0x3F8;

static CONSOLE: TicketLock<SerialPort> = TicketLock::new(SerialPort::new(COM1));

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Installs the console logger and sets the max log level.
///
/// # Panics
///
/// Panics if a logger has already been installed.
pub fn init(lvl: LevelFilter) {
    log::set_logger(&LOGGER).expect("logger already initialized");
    log::set_max_level(lvl);
}

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut port = CONSOLE.lock();
        let _ = write!(
            port,
            "[{:<5} {}] {}\n",
            record.level(),
            record.module_path_static().unwrap_or_default(),
            record.args()
        );
    }

    fn flush(&self) {}
}

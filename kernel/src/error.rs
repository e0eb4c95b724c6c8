//! Top-level kernel error type.
//!
//! Per-subsystem errors (`vm::Error`, `task::Error`) are their own enums;
//! this type composes them at the points where `kmain` and other top-level
//! call sites need a single `Result` to propagate with `?`.

use core::fmt;

#[derive(Debug)]
pub enum Error {
    Vm(crate::vm::Error),
    AccessDenied,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Vm(err) => write!(f, "virtual memory error: {err}"),
            Error::AccessDenied => write!(f, "access to a resource was denied"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::Vm(err) => Some(err),
            Error::AccessDenied => None,
        }
    }
}

impl From<crate::vm::Error> for Error {
    fn from(err: crate::vm::Error) -> Self {
        Error::Vm(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

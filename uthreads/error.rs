// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the library's error type and the two reporting channels
//! required of it.
//!
//! Errors come in two kinds. Caller mistakes (bad thread id, bad quantum
//! length, blocking the main thread, and so on) are reported by printing
//! a line prefixed `thread library error:` to stderr and returning the
//! error to the caller; library state is never changed on these paths.
//! Failed system calls leave the library unable to keep its scheduling
//! promises, so they print a `system error:` line and end the process
//! with exit code 1.

use crate::thread::ThreadId;
use core::fmt;
use std::process;

/// Describes a failed thread library operation.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The library has already been initialised.
    AlreadyInitialised,

    /// The library has not been initialised yet.
    NotInitialised,

    /// The quantum length passed to `init` was not
    /// strictly positive.
    InvalidQuantum,

    /// The number of sleep quantums was not strictly
    /// positive.
    InvalidSleep,

    /// Spawning would exceed [`MAX_THREADS`](crate::MAX_THREADS)
    /// concurrent threads.
    TooManyThreads,

    /// No thread exists with the given id.
    NoSuchThread(ThreadId),

    /// The main thread cannot be blocked.
    BlockedMain,

    /// The main thread cannot sleep.
    SleepingMain,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::AlreadyInitialised => write!(f, "library already initialised"),
            Error::NotInitialised => write!(f, "library not initialised"),
            Error::InvalidQuantum => write!(f, "quantum length must be positive"),
            Error::InvalidSleep => write!(f, "sleep length must be positive"),
            Error::TooManyThreads => write!(f, "thread limit exceeded"),
            Error::NoSuchThread(id) => write!(f, "no thread with id {}", id),
            Error::BlockedMain => write!(f, "cannot block the main thread"),
            Error::SleepingMain => write!(f, "the main thread cannot sleep"),
        }
    }
}

/// Reports a failed library operation on stderr and
/// returns it, ready to be handed to the caller.
///
pub(crate) fn fail<T>(err: Error) -> Result<T, Error> {
    eprintln!("thread library error: {}", err);
    Err(err)
}

/// Reports a failed system call on stderr and ends the
/// process with exit code 1.
///
/// Once a system call underpinning the timer or the
/// signal mask has failed, the library can no longer
/// guarantee its scheduling behaviour, so there is no
/// path back to the caller.
///
pub(crate) fn system_failure(what: &str) -> ! {
    eprintln!("system error: {} failed", what);
    process::exit(1);
}

// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the functionality to describe and subdivide the quantum of
//! virtual CPU time given to threads when they are scheduled.
//!
//! A [`Quantum`] is a fixed length of virtual time, expressed in
//! microseconds. The interval timer that drives preemption takes its
//! intervals as a whole-seconds part plus a sub-second microseconds part,
//! so `Quantum` knows how to split itself accordingly.

#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]

/// The number of microseconds in one second.
///
pub const MICROS_PER_SECOND: u64 = 1_000_000;

/// Describes the length of a single scheduling quantum.
///
/// A quantum is always strictly positive; use [`Quantum::from_micros`]
/// to validate an untrusted length.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Quantum(u64);

impl Quantum {
    /// Returns the quantum with the given length in microseconds,
    /// or `None` if the length is not strictly positive.
    ///
    pub fn from_micros(micros: i32) -> Option<Self> {
        if micros <= 0 {
            None
        } else {
            Some(Quantum(micros as u64))
        }
    }

    /// Returns the quantum's length in microseconds.
    ///
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Returns the whole-seconds part of the quantum's length.
    ///
    pub const fn seconds(self) -> u64 {
        self.0 / MICROS_PER_SECOND
    }

    /// Returns the sub-second part of the quantum's length, in
    /// microseconds.
    ///
    pub const fn subsec_micros(self) -> u64 {
        self.0 % MICROS_PER_SECOND
    }
}

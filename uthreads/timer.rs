// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the virtual-time interval timer that drives preemption.
//!
//! The timer counts down only while the process is executing on the CPU
//! and raises [`SIGVTALRM`](libc::SIGVTALRM) each time a quantum expires.
//! It is armed with the quantum length as both the initial and the
//! recurring interval, and re-armed after every dispatch so that a newly
//! scheduled thread always receives a full quantum.

use crate::error::system_failure;
use core::ptr;
use quantum::Quantum;

/// Arms the virtual interval timer to expire every
/// `quantum`, starting a full quantum from now.
///
pub(crate) fn arm(quantum: Quantum) {
    let interval = libc::timeval {
        tv_sec: quantum.seconds() as libc::time_t,
        tv_usec: quantum.subsec_micros() as libc::suseconds_t,
    };

    let timer = libc::itimerval {
        it_interval: interval,
        it_value: interval,
    };

    if unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &timer, ptr::null_mut()) } != 0 {
        system_failure("setitimer");
    }
}

// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the critical section that protects all scheduler state.
//!
//! Scheduling is driven by [`SIGVTALRM`](libc::SIGVTALRM), delivered by
//! the virtual interval timer. Any code that touches scheduler state must
//! hold the signal masked, or the preemption handler could run mid-update
//! and switch away from a half-mutated scheduler. Every public library
//! operation therefore calls [`enter`] on the way in and [`leave`] on the
//! way out.
//!
//! A context switch crosses the critical section: the outgoing thread
//! entered it in one call, and the incoming thread leaves it in another.
//! Each resumption path unmasks the signal on its own side — the API
//! wrapper's `leave`, the signal trampoline's return for a thread resumed
//! inside the preemption handler, or the entry trampoline for a thread
//! running for the first time.

use crate::error::system_failure;
use core::mem;
use core::ptr;
use lazy_static::lazy_static;

lazy_static! {
    /// The singleton signal set {SIGVTALRM}, masked and
    /// unmasked around every library operation.
    ///
    static ref PREEMPT_SET: SignalSet = SignalSet::preempt();
}

/// Wraps the C signal set so it can live in a static.
///
struct SignalSet(libc::sigset_t);

// sigset_t is a plain bit set with no interior pointers,
// so sharing it between signal contexts is sound.
//
unsafe impl Send for SignalSet {}
unsafe impl Sync for SignalSet {}

impl SignalSet {
    /// Returns the signal set containing only the
    /// preemption signal.
    ///
    fn preempt() -> Self {
        unsafe {
            let mut set = mem::zeroed::<libc::sigset_t>();
            if libc::sigemptyset(&mut set) != 0 {
                system_failure("sigemptyset");
            }

            if libc::sigaddset(&mut set, libc::SIGVTALRM) != 0 {
                system_failure("sigaddset");
            }

            SignalSet(set)
        }
    }
}

/// Enters the critical section by masking the preemption
/// signal.
///
/// Entries do not nest: library operations never call one
/// another.
///
pub(crate) fn enter() {
    if unsafe { libc::sigprocmask(libc::SIG_BLOCK, &PREEMPT_SET.0, ptr::null_mut()) } != 0 {
        system_failure("sigprocmask");
    }
}

/// Leaves the critical section by unmasking the preemption
/// signal.
///
pub(crate) fn leave() {
    if unsafe { libc::sigprocmask(libc::SIG_UNBLOCK, &PREEMPT_SET.0, ptr::null_mut()) } != 0 {
        system_failure("sigprocmask");
    }
}

/// Installs `handler` for the preemption signal.
///
/// The handler runs with the preemption signal masked, so
/// it is implicitly inside the critical section for its
/// whole run.
///
pub(crate) fn install_handler(handler: extern "C" fn(libc::c_int)) {
    unsafe {
        let mut action = mem::zeroed::<libc::sigaction>();
        action.sa_sigaction = handler as usize;
        action.sa_mask = PREEMPT_SET.0;
        action.sa_flags = 0;

        if libc::sigaction(libc::SIGVTALRM, &action, ptr::null_mut()) != 0 {
            system_failure("sigaction");
        }
    }
}

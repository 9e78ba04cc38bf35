// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Terminating a sleeping thread cancels its wake-up.
//!
//! The sleeper's body must never continue past the sleep: its record
//! and its pending wake-up are both destroyed, and waiting well past
//! the original wake quantum changes nothing.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use uthreads::{Error, ThreadId};

const SLEEP_QUANTUMS: i32 = 5;

static ASLEEP_AT: AtomicUsize = AtomicUsize::new(0);
static CONTINUED: AtomicUsize = AtomicUsize::new(0);

fn sleeper() {
    let me = uthreads::current_thread_id();
    ASLEEP_AT.store(uthreads::total_quantums(), Ordering::SeqCst);
    uthreads::sleep(SLEEP_QUANTUMS).unwrap();
    CONTINUED.store(1, Ordering::SeqCst);
    uthreads::terminate(me).unwrap();
}

fn main() {
    uthreads::init(10_000).unwrap();

    let sleeper_id = uthreads::spawn(sleeper).unwrap();

    // Let the sleeper run and fall asleep.
    common::pass_quantums(1);
    assert_eq!(ASLEEP_AT.load(Ordering::SeqCst), 2);

    // Kill it mid-sleep.
    assert_eq!(uthreads::terminate(sleeper_id), Ok(()));
    assert_eq!(
        uthreads::resume(sleeper_id),
        Err(Error::NoSuchThread(sleeper_id))
    );

    // Wait well past the quantum it would have woken
    // in; the body must never have continued.
    common::pass_quantums(2 + SLEEP_QUANTUMS as usize);
    assert_eq!(CONTINUED.load(Ordering::SeqCst), 0);

    uthreads::terminate(ThreadId::MAIN).unwrap();
    unreachable!("terminating the main thread ends the process");
}

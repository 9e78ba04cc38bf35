// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Round-robin execution order under self-blocking and resuming.
//!
//! Two workers each block themselves every time they run; the main
//! thread resumes both at the top of each of its own quantums. Every
//! thread records which quantum it ran in, and the trace must come out
//! as 0, 1, 2, 0, 2, 1, 0, 2, 1, 0, 2, 1, 0: after the first round the
//! resume order (2 before 1) dictates the queue order.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use uthreads::ThreadId;

const TRACE_LEN: usize = 16;

const EMPTY_SLOT: AtomicUsize = AtomicUsize::new(usize::MAX);
static TRACE: [AtomicUsize; TRACE_LEN] = [EMPTY_SLOT; TRACE_LEN];

/// Records that the current quantum belongs to the
/// calling thread.
///
fn record_slot() {
    let total = uthreads::total_quantums();
    assert!(total < TRACE_LEN, "test ran for too many quantums");
    TRACE[total].store(
        uthreads::current_thread_id().as_usize(),
        Ordering::SeqCst,
    );
}

fn worker() {
    let me = uthreads::current_thread_id();
    for turn in 1..=4 {
        assert_eq!(uthreads::quantums(me), Ok(turn));
        record_slot();
        uthreads::block(me).unwrap();
    }

    uthreads::terminate(me).unwrap();
}

fn main() {
    uthreads::init(100_000).unwrap();

    let first = uthreads::spawn(worker).unwrap();
    let second = uthreads::spawn(worker).unwrap();
    assert_eq!(first.as_usize(), 1);
    assert_eq!(second.as_usize(), 2);

    for round in 1..=4 {
        assert_eq!(uthreads::current_thread_id(), ThreadId::MAIN);

        // In the first round both workers are still
        // ready, so these are no-ops and the spawn
        // order stands; afterwards they dictate that 2
        // runs before 1.
        uthreads::resume(second).unwrap();
        uthreads::resume(first).unwrap();

        assert_eq!(uthreads::quantums(ThreadId::MAIN), Ok(round));
        record_slot();
        common::pass_quantums(1);
    }

    record_slot();
    assert_eq!(uthreads::total_quantums(), 13);

    let expected: [usize; 13] = [0, 1, 2, 0, 2, 1, 0, 2, 1, 0, 2, 1, 0];
    for (offset, want) in expected.iter().enumerate() {
        let quantum = offset + 1;
        assert_eq!(
            TRACE[quantum].load(Ordering::SeqCst),
            *want,
            "wrong thread ran during quantum {}",
            quantum
        );
    }

    uthreads::terminate(ThreadId::MAIN).unwrap();
    unreachable!("terminating the main thread ends the process");
}

// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Thread-limit saturation and id reuse.
//!
//! Spawns up to the thread limit, checks that the next spawn fails,
//! terminates a third of the threads in arbitrary order, and verifies
//! that respawning hands the freed ids back smallest-first.
//!
//! Runs with a one-second quantum: the campers never get the CPU, so
//! the whole scenario is a deterministic exercise of the thread table.

use uthreads::{Error, ThreadId, MAX_THREADS};

fn camper() {
    loop {
        std::hint::spin_loop();
    }
}

fn main() {
    uthreads::init(1_000_000).unwrap();

    // Fill every slot; ids count up from 1.
    let mut ids = vec![ThreadId::MAIN];
    for want in 1..MAX_THREADS {
        let id = uthreads::spawn(camper).unwrap();
        assert_eq!(id.as_usize(), want);
        ids.push(id);
    }

    // The table is full.
    assert_eq!(uthreads::spawn(camper), Err(Error::TooManyThreads));

    // Terminate every third thread, highest id first so
    // release order and reuse order differ.
    let doomed: Vec<usize> = (1..MAX_THREADS).filter(|id| id % 3 == 0).collect();
    for id in doomed.iter().rev() {
        assert_eq!(uthreads::terminate(ids[*id]), Ok(()));
    }

    // Respawning hands the freed ids back in ascending
    // order.
    for want in &doomed {
        let id = uthreads::spawn(camper).unwrap();
        assert_eq!(id.as_usize(), *want);
    }

    // And the table is full once more.
    assert_eq!(uthreads::spawn(camper), Err(Error::TooManyThreads));

    uthreads::terminate(ThreadId::MAIN).unwrap();
    unreachable!("terminating the main thread ends the process");
}

// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Helpers shared by the scenario tests.

#![allow(dead_code)]

/// Busy-waits until the calling thread has started `n`
/// further quantums of its own.
///
/// Unlike [`uthreads::sleep`], this works for the main
/// thread too: the thread stays runnable and simply
/// burns its own CPU time, so from its point of view its
/// quantum count advances by one each time it is
/// dispatched.
///
pub fn pass_quantums(n: usize) {
    let me = uthreads::current_thread_id();
    let end = uthreads::quantums(me).expect("calling thread exists") + n;
    while uthreads::quantums(me).expect("calling thread exists") != end {}
}

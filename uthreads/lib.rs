// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements preemptive multitasking in user space, multiplexing many
//! logical threads onto a single OS thread.
//!
//! The library schedules threads round robin, driven by a virtual-time
//! interval timer: a thread runs for one quantum of CPU time and is then
//! preempted in favour of the next ready thread. Threads can also hand
//! the CPU over early by blocking themselves, sleeping for a number of
//! quantums, or terminating.
//!
//! ## Initialisation
//!
//! [`init`] must be called exactly once, before any other operation. It
//! adopts the calling flow of execution as the main thread (id 0),
//! which runs on the process's own stack and can neither block nor
//! sleep. Terminating the main thread tears the library down and ends
//! the process.
//!
//! ## Manipulating threads
//!
//! Threads are created with [`spawn`], which returns the smallest
//! thread id not in use. A thread may be paused with [`block`] and made
//! runnable again with [`resume`]; a thread may put itself to sleep for
//! a fixed number of quantums with [`sleep`]. Sleeping and blocking are
//! independent: a thread that is both blocked and sleeping must both
//! finish its sleep and be resumed before it will run again, and
//! resuming a thread mid-sleep does not shorten the sleep.
//!
//! ## Example
//!
//! ```no_run
//! fn worker() {
//!     let me = uthreads::current_thread_id();
//!     println!("worker {} running", me);
//!     uthreads::terminate(me).unwrap();
//! }
//!
//! fn main() {
//!     uthreads::init(100_000).unwrap(); // 100ms quantum.
//!     uthreads::spawn(worker).unwrap();
//!
//!     // ... the worker runs when the main thread's quantum expires.
//!
//!     uthreads::terminate(uthreads::ThreadId::MAIN).unwrap();
//! }
//! ```

#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]

mod context;
mod critical;
mod error;
mod scheduler;
mod thread;
mod timer;

pub use crate::error::Error;
pub use crate::thread::ThreadId;

/// The maximum number of threads the library will host
/// at once, the main thread included.
///
pub const MAX_THREADS: usize = 100;

/// The number of bytes in each thread's stack.
///
pub const STACK_SIZE: usize = 64 * 1024;

/// Initialises the thread library.
///
/// The calling flow of execution becomes the main thread
/// (id 0), running and inside the first quantum, so
/// [`total_quantums`] returns 1 immediately after `init`.
/// `quantum_usecs` is the quantum length in microseconds
/// of virtual (CPU) time and must be strictly positive.
///
/// `init` must be called exactly once per process; a
/// second call fails with [`Error::AlreadyInitialised`].
///
pub fn init(quantum_usecs: i32) -> Result<(), Error> {
    critical::enter();
    let result = scheduler::init(quantum_usecs);
    critical::leave();

    result
}

/// Creates a new thread that will execute `entry`, and
/// returns its id.
///
/// The new thread receives the smallest id not currently
/// in use and joins the tail of the ready queue; spawning
/// never yields the CPU. If `entry` returns, the thread
/// is terminated as though it had terminated itself.
///
/// Fails with [`Error::TooManyThreads`] if the library
/// already hosts [`MAX_THREADS`] threads.
///
pub fn spawn(entry: fn()) -> Result<ThreadId, Error> {
    critical::enter();
    let result = scheduler::spawn(entry);
    critical::leave();

    result
}

/// Terminates the thread with the given id and releases
/// its resources.
///
/// Terminating the main thread releases every thread and
/// ends the process with exit code 0. A thread may
/// terminate itself, in which case `terminate` does not
/// return. Any thread may be terminated from any state:
/// a blocked or sleeping thread simply never runs again.
///
pub fn terminate(id: ThreadId) -> Result<(), Error> {
    critical::enter();
    let result = scheduler::terminate(id);
    critical::leave();

    result
}

/// Blocks the thread with the given id until it is
/// resumed.
///
/// Blocking an already-blocked thread has no effect and
/// is not an error. A thread blocking itself yields the
/// CPU immediately; the call returns once the thread has
/// been resumed and scheduled again. The main thread
/// cannot be blocked.
///
pub fn block(id: ThreadId) -> Result<(), Error> {
    critical::enter();
    let result = scheduler::block(id);
    critical::leave();

    result
}

/// Makes the blocked thread with the given id runnable
/// again.
///
/// Resuming a thread that is running or ready has no
/// effect and is not an error. Resuming a thread that is
/// still mid-sleep does not shorten the sleep: the
/// thread runs once its wake quantum arrives.
///
pub fn resume(id: ThreadId) -> Result<(), Error> {
    critical::enter();
    let result = scheduler::resume(id);
    critical::leave();

    result
}

/// Puts the calling thread to sleep for `num_quantums`
/// quantums and yields the CPU.
///
/// The quantum in which `sleep` is called does not count
/// towards the sleep. The call returns once the sleep
/// has expired and the thread has been scheduled again.
/// The main thread cannot sleep, and `num_quantums` must
/// be strictly positive.
///
pub fn sleep(num_quantums: i32) -> Result<(), Error> {
    critical::enter();
    let result = scheduler::sleep(num_quantums);
    critical::leave();

    result
}

/// Returns the id of the calling thread.
///
/// # Panics
///
/// `current_thread_id` panics if the library has not
/// been initialised.
///
pub fn current_thread_id() -> ThreadId {
    critical::enter();
    let id = scheduler::current_thread_id();
    critical::leave();

    id
}

/// Returns the total number of quantums started since
/// the library was initialised, including the current
/// one.
///
/// Every switch starts a new quantum, whether it was
/// forced by the timer or volunteered by the running
/// thread, so this value grows by one at every
/// scheduling decision.
///
/// # Panics
///
/// `total_quantums` panics if the library has not been
/// initialised.
///
pub fn total_quantums() -> usize {
    critical::enter();
    let total = scheduler::total_quantums();
    critical::leave();

    total
}

/// Returns the number of quantums the thread with the
/// given id has started, including the current one if it
/// is running.
///
/// A thread that has never run has started 0 quantums;
/// the count becomes 1 the first time it is dispatched.
///
pub fn quantums(id: ThreadId) -> Result<usize, Error> {
    critical::enter();
    let result = scheduler::quantums(id);
    critical::leave();

    result
}

/// Logs the id, state and quantum count of every living
/// thread at debug level.
///
pub fn debug() {
    critical::enter();
    scheduler::debug();
    critical::leave();
}

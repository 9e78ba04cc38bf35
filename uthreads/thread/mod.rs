// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the per-thread record and the table that owns every
//! thread.
//!
//! A [`Thread`] bundles a thread's scheduling state, its saved execution
//! context, its stack, and its quantum count. The [`ThreadTable`] is the
//! sole owner of every `Thread`; the scheduler's other structures (the
//! ready queue, the blocked set, the sleep queue) refer to threads by
//! [`ThreadId`] only.

pub(crate) mod stacks;

use crate::context::Context;
use crate::thread::stacks::Stack;
use crate::MAX_THREADS;
use core::fmt;
use std::collections::BTreeMap;

/// Uniquely identifies a thread for the lifetime of the
/// thread.
///
/// Ids are small integers below [`MAX_THREADS`] and are
/// reused: once a thread has been terminated, its id is
/// available to the next spawn, and spawns always take
/// the smallest id available.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ThreadId(usize);

impl ThreadId {
    /// MAIN is the unique thread id for the main thread,
    /// which exists from initialisation and runs on the
    /// process's own stack.
    ///
    pub const MAIN: Self = ThreadId(0);

    /// Returns a numerical representation for the thread
    /// id.
    ///
    pub const fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Describes the scheduling state of a thread.
///
/// Sleeping is not a state: it is an orthogonal
/// attribute, tracked by the scheduler's sleep queue. A
/// sleeping thread is `Ready` (but parked off the ready
/// queue until its wake quantum) or `Blocked` (and then
/// also needs a resume before it can run again).
///
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum ThreadState {
    /// The thread is executing now.
    Running,

    /// The thread is able to run.
    Ready,

    /// The thread has been blocked and will not run
    /// until it is resumed.
    Blocked,
}

/// Contains the metadata for a thread of execution.
///
#[derive(Debug)]
pub(crate) struct Thread {
    // This thread's unique id.
    id: ThreadId,

    // The thread's current state.
    state: ThreadState,

    // The thread's saved execution context. While the
    // thread is executing, this value is stale; it is
    // written when the thread is switched out.
    context: Context,

    // The thread's stack. The main thread runs on the
    // process's own stack and owns none.
    stack: Option<Stack>,

    // The number of quantums this thread has started,
    // including the current one if it is running.
    quantums: usize,
}

impl Thread {
    /// Returns the record for the main thread, which
    /// adopts the process's existing flow of execution.
    ///
    /// The main thread is created running and inside its
    /// first quantum. Its context is filled the first
    /// time it is switched out.
    ///
    pub(crate) fn new_main() -> Thread {
        Thread {
            id: ThreadId::MAIN,
            state: ThreadState::Running,
            context: Context::empty(),
            stack: None,
            quantums: 1,
        }
    }

    /// Returns a new thread that will begin executing
    /// `entry` on a freshly allocated stack when it is
    /// first dispatched.
    ///
    pub(crate) fn new(id: ThreadId, entry: fn()) -> Thread {
        let stack = stacks::allocate();
        let mut context = Context::empty();
        context.prime(stack.top(), entry);

        Thread {
            id,
            state: ThreadState::Ready,
            context,
            stack: Some(stack),
            quantums: 0,
        }
    }

    /// Returns the thread's unique id.
    ///
    pub(crate) fn id(&self) -> ThreadId {
        self.id
    }

    /// Returns the thread's current scheduling state.
    ///
    pub(crate) fn state(&self) -> ThreadState {
        self.state
    }

    /// Updates the thread's scheduling state.
    ///
    pub(crate) fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    /// Returns the number of quantums the thread has
    /// started.
    ///
    pub(crate) fn quantums(&self) -> usize {
        self.quantums
    }

    /// Records that the thread is starting another
    /// quantum.
    ///
    pub(crate) fn begin_quantum(&mut self) {
        self.quantums += 1;
    }

    /// Returns a pointer to the thread's saved context,
    /// for the context-switch primitive.
    ///
    pub(crate) fn context_ptr(&mut self) -> *mut Context {
        &mut self.context
    }

    /// Consumes the thread, returning its stack so it
    /// can be reused. The main thread yields `None`.
    ///
    pub(crate) fn into_stack(self) -> Option<Stack> {
        self.stack
    }
}

/// Owns every living thread, indexed by id.
///
pub(crate) struct ThreadTable {
    threads: BTreeMap<ThreadId, Thread>,
}

impl ThreadTable {
    /// Returns an empty thread table.
    ///
    pub(crate) fn new() -> ThreadTable {
        ThreadTable {
            threads: BTreeMap::new(),
        }
    }

    /// Returns the smallest id not currently in use, or
    /// `None` if all [`MAX_THREADS`] ids are taken.
    ///
    pub(crate) fn alloc_id(&self) -> Option<ThreadId> {
        (0..MAX_THREADS)
            .map(ThreadId)
            .find(|id| !self.threads.contains_key(id))
    }

    /// Adds the given thread to the table.
    ///
    /// # Panics
    ///
    /// `insert` panics if the thread's id is already in
    /// use, as that means thread ids have been corrupted.
    ///
    pub(crate) fn insert(&mut self, thread: Thread) {
        let id = thread.id();
        if self.threads.insert(id, thread).is_some() {
            panic!("thread id {} inserted twice", id);
        }
    }

    /// Looks up a thread by id.
    ///
    pub(crate) fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id)
    }

    /// Looks up a thread by id, mutably.
    ///
    pub(crate) fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(&id)
    }

    /// Returns whether a thread with the given id exists.
    ///
    pub(crate) fn contains(&self, id: ThreadId) -> bool {
        self.threads.contains_key(&id)
    }

    /// Removes and returns the thread with the given id.
    ///
    pub(crate) fn remove(&mut self, id: ThreadId) -> Option<Thread> {
        self.threads.remove(&id)
    }

    /// Iterates over the living threads in id order.
    ///
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() {}

    #[test]
    fn id_allocation() {
        let mut table = ThreadTable::new();
        table.insert(Thread::new_main());

        // Ids are handed out smallest-first.
        for want in 1..10 {
            let id = table.alloc_id().unwrap();
            assert_eq!(id.as_usize(), want);
            table.insert(Thread::new(id, entry));
        }

        // Terminated ids are reused immediately, in
        // ascending order regardless of the order they
        // were released in.
        for dead in &[9usize, 3, 7] {
            table.remove(ThreadId(*dead)).unwrap();
        }

        for want in &[3usize, 7, 9] {
            let id = table.alloc_id().unwrap();
            assert_eq!(id.as_usize(), *want);
            table.insert(Thread::new(id, entry));
        }
    }

    #[test]
    fn id_exhaustion() {
        let mut table = ThreadTable::new();
        table.insert(Thread::new_main());

        for _ in 1..MAX_THREADS {
            let id = table.alloc_id().unwrap();
            table.insert(Thread::new(id, entry));
        }

        assert_eq!(table.alloc_id(), None);

        // Freeing any thread makes its id available
        // again.
        table.remove(ThreadId(42)).unwrap();
        assert_eq!(table.alloc_id(), Some(ThreadId(42)));
    }

    #[test]
    fn quantum_accounting() {
        let mut thread = Thread::new(ThreadId(1), entry);
        assert_eq!(thread.quantums(), 0);

        thread.begin_quantum();
        assert_eq!(thread.quantums(), 1);

        let main = Thread::new_main();
        assert_eq!(main.quantums(), 1);
        assert!(main.into_stack().is_none());
    }
}

// Copyright 2023 The Uthreads Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the round robin scheduler at the heart of the library.
//!
//! ## State
//!
//! The scheduler is a process-wide singleton, created by [`init`] and
//! destroyed when the main thread is terminated. It owns the thread
//! table and tracks which thread is running, which are ready (a FIFO
//! queue), which are blocked, and which are sleeping. Everything outside
//! the thread table refers to threads by id.
//!
//! ## Quantum boundaries
//!
//! Every switch, voluntary or preemptive, is a quantum boundary: the
//! global quantum counter advances, expired sleepers are woken, and the
//! head of the ready queue is dispatched with a freshly armed timer.
//! Woken sleepers enqueue before a preempted thread does, so a thread
//! whose sleep expires at a given quantum runs in that quantum if the
//! ready queue is otherwise empty.
//!
//! ## Signal safety
//!
//! Every function here runs with the preemption signal masked, either
//! under an API wrapper's critical section or inside the signal handler
//! itself. The dispatch path never allocates: all queues reserve their
//! worst-case capacity up front, so a tick that interrupts arbitrary
//! user code cannot re-enter the allocator.

pub(crate) mod sleepers;

use crate::context::{self, Context};
use crate::critical;
use crate::error::{fail, Error};
use crate::scheduler::sleepers::Sleepers;
use crate::thread::{stacks, Thread, ThreadId, ThreadState, ThreadTable};
use crate::timer;
use crate::MAX_THREADS;
use core::mem;
use core::ptr;
use quantum::Quantum;
use spin::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::process;

/// SCHEDULER is the process-wide scheduler singleton.
///
/// The lock is only ever taken with the preemption signal masked, so
/// the signal handler can never find it held on this, the only OS
/// thread.
///
static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);

/// Describes what becomes of the running thread when it
/// hands over the CPU.
///
enum Outgoing {
    /// Preempted: the thread stays runnable and rejoins
    /// the tail of the ready queue.
    Requeue,

    /// Blocked or sleeping: the thread has already been
    /// parked elsewhere and must not rejoin the queue.
    Suspend,

    /// Terminated: the thread's context is not saved and
    /// its record is waiting in the graveyard.
    Discard,
}

/// Scheduler tracks every thread and decides which one
/// runs next.
///
struct Scheduler {
    /// The owner of every living thread.
    table: ThreadTable,

    /// The FIFO queue of threads ready to run.
    ready: VecDeque<ThreadId>,

    /// The set of blocked threads.
    blocked: BTreeSet<ThreadId>,

    /// The queue of sleeping threads, by wake quantum.
    sleepers: Sleepers,

    /// The thread executing now.
    running: ThreadId,

    /// The total number of quantums started since
    /// initialisation, including the current one.
    total_quantums: usize,

    /// The configured quantum length.
    quantum: Quantum,

    /// A terminated thread awaiting reclamation. A
    /// thread that terminates itself is still executing
    /// on its own stack when the scheduler switches
    /// away, so the record is parked here and reclaimed
    /// by the next thread to resume.
    graveyard: Option<Thread>,
}

impl Scheduler {
    /// Moves every sleeper whose wake quantum has
    /// arrived out of the sleep queue. Woken threads
    /// join the ready queue unless they are blocked, in
    /// which case they additionally need a resume.
    ///
    fn wake_expired(&mut self) {
        while let Some(id) = self.sleepers.pop_expired(self.total_quantums) {
            if !self.blocked.contains(&id) {
                self.ready.push_back(id);
            }
        }
    }
}

/// Runs `f` on the scheduler, or reports that the
/// library has not been initialised.
///
fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> Result<R, Error> {
    match SCHEDULER.lock().as_mut() {
        Some(sched) => Ok(f(sched)),
        None => fail(Error::NotInitialised),
    }
}

/// Initialises the scheduler: adopts the calling flow of
/// execution as the main thread, installs the preemption
/// handler, and starts the virtual timer.
///
pub(crate) fn init(quantum_usecs: i32) -> Result<(), Error> {
    let quantum = match Quantum::from_micros(quantum_usecs) {
        Some(quantum) => quantum,
        None => return fail(Error::InvalidQuantum),
    };

    {
        let mut slot = SCHEDULER.lock();
        if slot.is_some() {
            drop(slot);
            return fail(Error::AlreadyInitialised);
        }

        let mut table = ThreadTable::new();
        table.insert(Thread::new_main());
        stacks::reserve(MAX_THREADS);

        *slot = Some(Scheduler {
            table,
            ready: VecDeque::with_capacity(MAX_THREADS),
            blocked: BTreeSet::new(),
            sleepers: Sleepers::with_capacity(MAX_THREADS),
            running: ThreadId::MAIN,
            total_quantums: 1,
            quantum,
            graveyard: None,
        });
    }

    critical::install_handler(handle_preemption);
    timer::arm(quantum);
    log::info!(
        "thread library initialised with a quantum of {}µs",
        quantum.as_micros()
    );

    Ok(())
}

/// Creates a new thread in the ready state and returns
/// its id, the smallest not in use. Spawning never
/// yields the CPU.
///
pub(crate) fn spawn(entry: fn()) -> Result<ThreadId, Error> {
    with_scheduler(|sched| {
        let id = match sched.table.alloc_id() {
            Some(id) => id,
            None => return fail(Error::TooManyThreads),
        };

        sched.table.insert(Thread::new(id, entry));
        sched.ready.push_back(id);
        log::debug!("spawned thread {}", id);

        Ok(id)
    })?
}

/// What terminate decided while the scheduler was
/// locked; the actions that never return run after the
/// lock is released.
///
enum Terminated {
    /// The main thread: tear everything down and end
    /// the process.
    Shutdown,

    /// The running thread: switch away, never to return.
    SwitchAway,

    /// Any other thread: already cleaned up.
    Done,
}

/// Terminates the thread with the given id.
///
/// Terminating the main thread tears down the library
/// and ends the process with exit code 0. A thread
/// terminating itself never returns.
///
pub(crate) fn terminate(id: ThreadId) -> Result<(), Error> {
    let decision = with_scheduler(|sched| {
        if !sched.table.contains(id) {
            return fail(Error::NoSuchThread(id));
        }

        if id == ThreadId::MAIN {
            return Ok(Terminated::Shutdown);
        }

        if id == sched.running {
            // Still executing on the dying thread's
            // stack; park the record for whoever runs
            // next to reclaim.
            let dying = sched.table.remove(id).expect("running thread not in table");
            debug_assert!(sched.graveyard.is_none());
            sched.graveyard = Some(dying);
            return Ok(Terminated::SwitchAway);
        }

        let dead = sched.table.remove(id).expect("thread vanished from table");
        sched.ready.retain(|other| *other != id);
        sched.blocked.remove(&id);
        sched.sleepers.cancel(id);
        if let Some(stack) = dead.into_stack() {
            stacks::release(stack);
        }

        log::debug!("terminated thread {}", id);
        Ok(Terminated::Done)
    })??;

    match decision {
        Terminated::Shutdown => shutdown(),
        Terminated::SwitchAway => {
            switch_to_next(Outgoing::Discard);
            unreachable!("terminated thread {} was resumed", id);
        }
        Terminated::Done => Ok(()),
    }
}

/// Blocks the thread with the given id. Blocking an
/// already-blocked thread has no effect; a thread
/// blocking itself yields the CPU.
///
pub(crate) fn block(id: ThreadId) -> Result<(), Error> {
    if id == ThreadId::MAIN {
        return fail(Error::BlockedMain);
    }

    let yields = with_scheduler(|sched| {
        let state = match sched.table.get(id) {
            Some(thread) => thread.state(),
            None => return fail(Error::NoSuchThread(id)),
        };

        match state {
            ThreadState::Blocked => Ok(false),
            ThreadState::Ready => {
                // May be parked in the sleep queue
                // rather than the ready queue; blocking
                // affects neither its sleep nor its
                // wake quantum.
                sched.ready.retain(|other| *other != id);
                sched.blocked.insert(id);
                sched.table.get_mut(id).expect("thread vanished").set_state(ThreadState::Blocked);
                Ok(false)
            }
            ThreadState::Running => {
                sched.blocked.insert(id);
                sched.table.get_mut(id).expect("thread vanished").set_state(ThreadState::Blocked);
                Ok(true)
            }
        }
    })??;

    if yields {
        switch_to_next(Outgoing::Suspend);
    }

    Ok(())
}

/// Resumes the thread with the given id. Resuming a
/// thread that is not blocked has no effect.
///
pub(crate) fn resume(id: ThreadId) -> Result<(), Error> {
    with_scheduler(|sched| {
        let state = match sched.table.get(id) {
            Some(thread) => thread.state(),
            None => return fail(Error::NoSuchThread(id)),
        };

        if state == ThreadState::Blocked {
            sched.blocked.remove(&id);
            sched.table.get_mut(id).expect("thread vanished").set_state(ThreadState::Ready);

            // A thread that is still mid-sleep stays
            // parked; the sleep queue will enqueue it
            // when its wake quantum arrives.
            if !sched.sleepers.contains(id) {
                sched.ready.push_back(id);
            }

            log::debug!("resumed thread {}", id);
        }

        Ok(())
    })?
}

/// Puts the running thread to sleep for `num_quantums`
/// whole quantums beyond the current one, then yields
/// the CPU.
///
pub(crate) fn sleep(num_quantums: i32) -> Result<(), Error> {
    if num_quantums <= 0 {
        return fail(Error::InvalidSleep);
    }

    with_scheduler(|sched| {
        let current = sched.running;
        if current == ThreadId::MAIN {
            return fail(Error::SleepingMain);
        }

        // The quantum in which sleep was called does not
        // count towards the sleep, hence one extra.
        let wake_quantum = sched.total_quantums + num_quantums as usize + 1;
        sched.sleepers.add(current, wake_quantum);
        sched.table.get_mut(current).expect("running thread not in table").set_state(ThreadState::Ready);
        log::debug!("thread {} sleeping until quantum {}", current, wake_quantum);

        Ok(())
    })??;

    switch_to_next(Outgoing::Suspend);
    Ok(())
}

/// Returns the id of the running thread.
///
/// # Panics
///
/// `current_thread_id` panics if the library has not
/// been initialised.
///
pub(crate) fn current_thread_id() -> ThreadId {
    SCHEDULER
        .lock()
        .as_ref()
        .expect("thread library not initialised")
        .running
}

/// Returns the total number of quantums started since
/// initialisation.
///
/// # Panics
///
/// `total_quantums` panics if the library has not been
/// initialised.
///
pub(crate) fn total_quantums() -> usize {
    SCHEDULER
        .lock()
        .as_ref()
        .expect("thread library not initialised")
        .total_quantums
}

/// Returns the number of quantums the thread with the
/// given id has started.
///
pub(crate) fn quantums(id: ThreadId) -> Result<usize, Error> {
    with_scheduler(|sched| match sched.table.get(id) {
        Some(thread) => Ok(thread.quantums()),
        None => fail(Error::NoSuchThread(id)),
    })?
}

/// Logs the scheduling state of every living thread.
///
pub(crate) fn debug() {
    let _ = with_scheduler(|sched| {
        for thread in sched.table.iter() {
            log::debug!(
                "thread {}: {:?}, {} quantums{}{}",
                thread.id(),
                thread.state(),
                thread.quantums(),
                if thread.id() == sched.running { ", running now" } else { "" },
                if sched.sleepers.contains(thread.id()) { ", sleeping" } else { "" },
            );
        }
    });
}

/// The handler for the preemption signal.
///
/// The signal is masked for the duration of the handler,
/// so the whole tick runs inside the critical section.
/// A thread that is switched out here resumes inside
/// this frame later, finishes the handler, and unmasks
/// the signal on its way out through the kernel's signal
/// return path.
///
extern "C" fn handle_preemption(_signal: libc::c_int) {
    // A stray tick after teardown finds no scheduler
    // and is ignored by switch_to_next.
    switch_to_next(Outgoing::Requeue);
}

/// Ends the running thread's quantum and dispatches the
/// next ready thread.
///
/// Must be called with the preemption signal masked and
/// the scheduler lock released. Returns when the calling
/// thread is next dispatched; never returns for
/// [`Outgoing::Discard`].
///
fn switch_to_next(outgoing: Outgoing) {
    let mut prev_context: *mut Context = ptr::null_mut();
    let next_context: *const Context;

    {
        let mut slot = SCHEDULER.lock();
        let sched = match slot.as_mut() {
            Some(sched) => sched,
            None => return,
        };

        let quantum = sched.quantum;

        // A new quantum starts now, whatever the reason
        // for the switch.
        sched.total_quantums += 1;

        // Sleepers whose quantum this is join the queue
        // ahead of the outgoing thread.
        sched.wake_expired();

        let prev = sched.running;
        if let Outgoing::Requeue = outgoing {
            if sched.ready.is_empty() {
                // Nothing else can run; the thread keeps
                // the CPU and starts its next quantum in
                // place.
                sched
                    .table
                    .get_mut(prev)
                    .expect("running thread not in table")
                    .begin_quantum();
                return;
            }

            let thread = sched.table.get_mut(prev).expect("running thread not in table");
            thread.set_state(ThreadState::Ready);
            sched.ready.push_back(prev);
        }

        let next = sched
            .ready
            .pop_front()
            .expect("no runnable thread: the main thread is unaccounted for");

        sched.running = next;
        let thread = sched.table.get_mut(next).expect("ready thread not in table");
        thread.set_state(ThreadState::Running);
        thread.begin_quantum();
        next_context = thread.context_ptr();

        // The incoming thread gets a whole quantum, not
        // whatever was left of the outgoing one.
        timer::arm(quantum);

        if !matches!(outgoing, Outgoing::Discard) {
            prev_context = sched
                .table
                .get_mut(prev)
                .expect("outgoing thread not in table")
                .context_ptr();
        }
    }

    // The lock is released, but the signal is still
    // masked: nothing can touch the scheduler between
    // here and the switch completing on the other side.
    if prev_context.is_null() {
        unsafe { context::restore(next_context) };
    }

    unsafe { context::switch(prev_context, next_context) };

    // The thread has been dispatched again.
    finish_switch();
}

/// Completes a context switch from the incoming thread's
/// side: reclaims any thread that terminated itself and
/// left its record in the graveyard.
///
/// Runs on the incoming thread's stack, which is why the
/// graveyard thread's stack can be released here but not
/// any earlier.
///
fn finish_switch() {
    let reclaimed = match SCHEDULER.lock().as_mut() {
        Some(sched) => sched.graveyard.take(),
        None => None,
    };

    // No logging here: this can run inside the
    // preemption handler's frame.
    if let Some(dead) = reclaimed {
        if let Some(stack) = dead.into_stack() {
            stacks::release(stack);
        }
    }
}

/// The first code every new thread runs, entered from
/// the thread-start trampoline in context.s.
///
/// Completes the switch that dispatched this thread,
/// leaves the critical section the switch crossed, and
/// calls the entry point. An entry point that returns
/// terminates its thread.
///
#[no_mangle]
extern "sysv64" fn uthreads_thread_main(entry: usize) -> ! {
    finish_switch();
    critical::leave();

    let entry: fn() = unsafe { mem::transmute::<usize, fn()>(entry) };
    entry();

    // The entry point returned: the thread terminates
    // itself.
    critical::enter();
    let id = current_thread_id();
    let _ = terminate(id);
    unreachable!("thread {} outlived its own termination", id);
}

/// Tears down the library and ends the process with exit
/// code 0. Every thread's resources are released.
///
fn shutdown() -> ! {
    let state = SCHEDULER.lock().take();
    if let Some(mut sched) = state {
        // When a non-main thread terminates the main
        // thread, the caller is still executing on a
        // stack the table owns. That one stack is
        // deliberately leaked: the process is about to
        // exit, and freeing it here would pull the stack
        // out from under this very code.
        if sched.running != ThreadId::MAIN {
            if let Some(own) = sched.table.remove(sched.running) {
                mem::forget(own);
            }
        }

        drop(sched);
    }

    log::info!("thread library shut down");
    process::exit(0);
}

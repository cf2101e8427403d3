// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements user-level threads, multiplexed onto a single OS thread and
//! preempted by a virtual interval timer.
//!
//! ## Initialisation
//!
//! [`init`] turns the calling flow of execution into the main thread (id
//! 0) and starts its first quantum. From then on, the virtual timer
//! preempts the running thread whenever its quantum expires, handing the
//! CPU to the next ready thread in round robin order.
//!
//! ## Manipulating threads
//!
//! Threads are created with [`spawn`], which allocates a private stack and
//! queues the new thread. A thread can be paused with [`block`] and made
//! ready again with [`resume`]. A thread ends when its entry point returns
//! or when it is passed to [`terminate`]. Terminating the main thread ends
//! the whole process.
//!
//! Each thread's priority picks the length of its quantum from the table
//! given to [`init`]. Priorities never reorder the ready queue.
//!
//! ## Shared state
//!
//! The scheduler lives in the crate root, in a slot that is only ever
//! locked with the preemption signal blocked. Every public function holds
//! a [`Gate`] for its whole duration, so the timer can never observe the
//! scheduler part way through an operation. Code that must not be
//! preempted, such as code that allocates or prints while other threads
//! may do the same, can use [`without_preemption`].
//!
//! ## Errors
//!
//! Misuse of the API returns an [`Error`] and changes nothing. A failure
//! of the environment, described by [`SystemError`], is reported and ends
//! the process with status 1.

#![deny(clippy::float_arithmetic)]
#![deny(clippy::inline_asm_x86_att_syntax)]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]
#![allow(unsafe_code)]

mod error;
pub mod ffi;
mod scheduler;
mod switch;
mod thread;

pub use crate::error::{Error, SystemError};
pub use crate::thread::{ThreadId, ThreadState};

use crate::error::{fatal, settle, Fault};
use crate::scheduler::{QuantumTable, Scheduler, Termination};
use crate::thread::Entry;
use libc::c_int;
use log::debug;
use preemption::{signal, timer, Gate};
use spin::Mutex;
use std::process;

/// The number of threads that can exist at once,
/// including the main thread.
///
pub const MAX_THREADS: usize = 100;

/// The number of bytes in each spawned thread's stack.
///
pub const STACK_SIZE: usize = 64 * 1024; // 64 KiB.

// State shared throughout the crate.

/// SCHEDULER is the thread scheduler, or `None` before
/// [`init`] and after the process starts shutting down.
///
/// It is only ever locked with the preemption signal
/// blocked, so a failure to lock it means the scheduler
/// has been re-entered, which we never wait out.
///
static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);

/// Blocks preemption until the returned gate is dropped.
///
fn close_gate() -> Gate {
    match Gate::close() {
        Ok(gate) => gate,
        Err(err) => fatal(SystemError::SignalMask(err)),
    }
}

/// Provides access to the scheduler.
///
/// The caller must hold a closed [`Gate`].
///
fn with_scheduler<F, R>(f: F) -> Result<R, Fault>
where
    F: FnOnce(&mut Scheduler) -> Result<R, Fault>,
{
    let mut slot = SCHEDULER.try_lock().ok_or(SystemError::Reentered)?;
    let scheduler = slot.as_mut().ok_or(Error::NotInitialised)?;
    f(scheduler)
}

/// Reads from the scheduler, returning `None` if the
/// library has not been initialised.
///
/// The caller must hold a closed [`Gate`].
///
fn inspect<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Scheduler) -> R,
{
    match SCHEDULER.try_lock() {
        Some(slot) => slot.as_ref().map(f),
        None => fatal(SystemError::Reentered),
    }
}

/// Handles the preemption signal, by handing the CPU to
/// the next ready thread.
///
/// This may interrupt any code outside a gate, so it
/// neither allocates nor logs.
///
extern "C" fn on_timer(_signal: c_int) {
    signal::preserving_errno(|| {
        let handoff = match SCHEDULER.try_lock() {
            Some(mut slot) => match slot.as_mut() {
                Some(scheduler) => scheduler.preempt(),
                None => return,
            },
            None => return,
        };

        match handoff {
            Ok(handoff) => switch::hand_over(handoff),
            Err(err) => fatal(err),
        }
    })
}

/// Initialises the thread library.
///
/// The caller becomes the main thread, with id 0 and
/// priority 0, and starts its first quantum. Each entry
/// in `quantum_usecs` is the length of the quantum, in
/// microseconds, given to threads with that priority.
///
/// The table must be non-empty and every entry must be
/// positive.
///
pub fn init(quantum_usecs: &[u32]) -> Result<(), Error> {
    let _gate = close_gate();
    settle(init_scheduler(quantum_usecs))?;
    debug!("initialised with {} priorities", quantum_usecs.len());

    Ok(())
}

fn init_scheduler(quantum_usecs: &[u32]) -> Result<(), Fault> {
    let mut slot = SCHEDULER.try_lock().ok_or(SystemError::Reentered)?;
    if slot.is_some() {
        return Err(Error::AlreadyInitialised.into());
    }

    let quanta = QuantumTable::from_micros(quantum_usecs)?;
    let scheduler = Scheduler::new(quanta);
    let quantum = scheduler.current_quantum()?;
    signal::install(on_timer).map_err(SystemError::SignalHandler)?;
    *slot = Some(scheduler);
    drop(slot);

    timer::arm(quantum).map_err(SystemError::Timer)?;

    Ok(())
}

/// Creates a new thread, which will run `entry` with
/// the given priority, and returns its id.
///
/// The new thread is given the lowest free id, and
/// joins the back of the ready queue. The caller keeps
/// running.
///
pub fn spawn(entry: fn(), priority: usize) -> Result<ThreadId, Error> {
    spawn_entry(Entry::Rust(entry), priority)
}

pub(crate) fn spawn_entry(entry: Entry, priority: usize) -> Result<ThreadId, Error> {
    let _gate = close_gate();
    let id = settle(with_scheduler(|scheduler| scheduler.spawn(entry, priority)))?;
    debug!("spawned thread {id} with priority {priority}");

    Ok(id)
}

/// Changes the thread's priority.
///
/// If the thread is running, it keeps the rest of its
/// current quantum, and the new priority applies from
/// its next quantum.
///
pub fn change_priority(id: ThreadId, priority: usize) -> Result<(), Error> {
    let _gate = close_gate();
    settle(with_scheduler(|scheduler| {
        Ok(scheduler.change_priority(id, priority)?)
    }))?;
    debug!("thread {id} now has priority {priority}");

    Ok(())
}

/// Terminates the thread.
///
/// If `id` is the calling thread, `terminate` does not
/// return. If `id` is the main thread, every thread is
/// freed and the process exits with status 0.
///
pub fn terminate(id: ThreadId) -> Result<(), Error> {
    let gate = close_gate();
    let termination = settle(with_scheduler(|scheduler| scheduler.terminate(id)))?;
    match termination {
        Termination::Removed => {
            debug!("terminated thread {id}");
            Ok(())
        }
        Termination::Switch(handoff) => {
            debug!("thread {id} terminated itself, handing over to thread {}", handoff.thread());

            // Our gate lives on the stack being abandoned, so
            // it is never dropped. The incoming thread
            // re-enables preemption for itself.
            switch::hand_over(handoff);
            fatal(SystemError::Inconsistent("a terminated thread was resumed"))
        }
        Termination::Process => shutdown(gate),
    }
}

/// Frees every thread and ends the process.
///
fn shutdown(_gate: Gate) -> ! {
    let scheduler = match SCHEDULER.try_lock() {
        Some(mut slot) => slot.take(),
        None => fatal(SystemError::Reentered),
    };

    if let Err(err) = timer::disarm() {
        fatal(SystemError::Timer(err));
    }

    if let Err(err) = signal::ignore() {
        fatal(SystemError::SignalHandler(err));
    }

    if let Some(scheduler) = scheduler {
        let freed = scheduler.shutdown();
        debug!("shut down, freeing {freed} threads");
    }

    process::exit(0);
}

/// Blocks the thread until it is resumed.
///
/// If `id` is the calling thread, `block` returns once
/// another thread has resumed it and it has been
/// dispatched again. Blocking a blocked thread has no
/// effect. The main thread cannot be blocked.
///
pub fn block(id: ThreadId) -> Result<(), Error> {
    let _gate = close_gate();
    let handoff = settle(with_scheduler(|scheduler| scheduler.block(id)))?;
    debug!("blocked thread {id}");
    if let Some(handoff) = handoff {
        switch::hand_over(handoff);
    }

    Ok(())
}

/// Moves a blocked thread to the back of the ready
/// queue.
///
/// Resuming a thread that is not blocked has no effect.
///
pub fn resume(id: ThreadId) -> Result<(), Error> {
    let _gate = close_gate();
    settle(with_scheduler(|scheduler| Ok(scheduler.resume(id)?)))?;
    debug!("resumed thread {id}");

    Ok(())
}

/// Returns the id of the calling thread.
///
/// Before initialisation, this is the main thread.
///
pub fn current_thread_id() -> ThreadId {
    let _gate = close_gate();
    inspect(Scheduler::running).unwrap_or(ThreadId::MAIN)
}

/// Returns the number of quanta started since the
/// library was initialised, including the current one.
///
/// Before initialisation, this is 0.
///
pub fn total_quantums() -> u64 {
    let _gate = close_gate();
    inspect(Scheduler::total_quantums).unwrap_or(0)
}

/// Returns the number of quanta the thread has started,
/// including the current one if it is running.
///
pub fn quantums(id: ThreadId) -> Result<u64, Error> {
    let _gate = close_gate();
    settle(with_scheduler(|scheduler| Ok(scheduler.quantums(id)?)))
}

/// Returns the thread's scheduling state.
///
pub fn thread_state(id: ThreadId) -> Result<ThreadState, Error> {
    let _gate = close_gate();
    settle(with_scheduler(|scheduler| Ok(scheduler.state(id)?)))
}

/// Calls `f` with preemption disabled.
///
/// Calls nest, and any of the library's functions can
/// be called from `f`. A quantum that expires while `f`
/// runs ends as soon as `f` returns.
///
pub fn without_preemption<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _gate = close_gate();
    f()
}

// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! switch contains the functionality to switch between threads.
//!
//! Switching happens after the scheduler has been released, with the
//! preemption signal blocked, either by a gate or because we are inside
//! the signal's handler. The signal stays blocked across the switch: the
//! incoming thread unblocks it itself, by dropping its own gate, by
//! returning from its own signal handler, or (for a new thread) in the
//! start routine below.

use crate::error::{fatal, SystemError};
use crate::scheduler::Handoff;
use crate::thread::Entry;
use crate::{current_thread_id, terminate};
use context::{ExecutionContext, StartRoutine};
use preemption::{gate, signal, timer};
use std::mem;

/// Arms the timer for the incoming thread's quantum and
/// transfers control to it.
///
/// If the outgoing thread is still alive, its execution
/// is saved first and `hand_over` returns once it is
/// dispatched again. If it has been terminated, its
/// execution is abandoned and `hand_over` never returns.
///
pub(crate) fn hand_over(handoff: Handoff) {
    // A quantum that expired while the outgoing thread
    // held the signal off belongs to that thread. Once
    // the timer is stopped, nothing new can be raised,
    // so we drop any stale signal before starting the
    // incoming thread's quantum.
    if let Err(err) = timer::disarm() {
        fatal(SystemError::Timer(err));
    }
    if let Err(err) = signal::discard_pending() {
        fatal(SystemError::StaleSignal(err));
    }
    if let Err(err) = timer::arm(handoff.quantum()) {
        fatal(SystemError::Timer(err));
    }

    let to = handoff.to();
    match handoff.from() {
        Some(from) if from as *const ExecutionContext == to => {
            // The thread has been given a new quantum, with
            // nobody else to run in between.
        }
        Some(from) => {
            // Both contexts belong to boxed threads owned by
            // the scheduler. The outgoing thread cannot be
            // freed until it has been resumed, as only a live
            // thread can terminate it.
            unsafe {
                ExecutionContext::checkpoint(from, move |_| ExecutionContext::jump_into(to));
            }
        }
        None => {
            // The outgoing thread is in the pending list, so
            // its stack outlives this jump.
            unsafe { ExecutionContext::jump_into(to) }
        }
    }
}

/// Returns the start routine and argument that make a
/// fresh context call `entry`.
///
pub(crate) fn start_routine(entry: Entry) -> (StartRoutine, usize) {
    match entry {
        Entry::Rust(entry) => (start_rust_thread, entry as *const () as usize),
        Entry::Foreign(entry) => (start_foreign_thread, entry as *const () as usize),
    }
}

/// start_rust_thread is the first code run by a thread
/// spawned with a Rust entry point.
///
extern "C" fn start_rust_thread(entry: usize) -> ! {
    // The argument was made from a `fn()` in
    // start_routine.
    let entry = unsafe { mem::transmute::<usize, fn()>(entry) };
    run_thread(entry)
}

/// start_foreign_thread is the first code run by a
/// thread spawned through the C interface.
///
extern "C" fn start_foreign_thread(entry: usize) -> ! {
    // The argument was made from an `extern "C" fn()`
    // in start_routine.
    let entry = unsafe { mem::transmute::<usize, extern "C" fn()>(entry) };
    run_thread(|| entry())
}

/// Enables preemption, runs the thread's entry point,
/// then terminates the thread if the entry point returns.
///
fn run_thread<F>(entry: F) -> !
where
    F: FnOnce(),
{
    if let Err(err) = gate::open() {
        fatal(SystemError::SignalMask(err));
    }

    entry();

    // The thread has finished its work, so it ends
    // just as if it had terminated itself.
    match terminate(current_thread_id()) {
        Ok(()) => fatal(SystemError::Inconsistent("a terminated thread was resumed")),
        Err(_) => fatal(SystemError::Inconsistent("a finished thread could not terminate")),
    }
}

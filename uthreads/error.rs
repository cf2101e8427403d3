// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Describes the two tiers of failure.
//!
//! A library [`Error`] is a misuse of the API, such as naming a thread
//! that does not exist. It is reported to the caller, who carries on
//! running, and no state has changed.
//!
//! A [`SystemError`] is a failure of the environment, such as running
//! out of memory for a stack. The scheduler's invariants can no longer be
//! relied upon, so it is reported and the process exits with status 1.

use crate::thread::ThreadId;
use log::{error, warn};
use std::io;
use std::process;
use thiserror::Error;

/// A recoverable misuse of the thread library.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The quantum table has no entries.
    #[error("the quantum table must have at least one entry")]
    EmptyQuantumTable,

    /// An entry in the quantum table is not positive.
    #[error("quantum {index} must be a positive number of microseconds")]
    InvalidQuantum { index: usize },

    /// The library has already been initialised.
    #[error("the library is already initialised")]
    AlreadyInitialised,

    /// The library has not been initialised yet.
    #[error("the library has not been initialised")]
    NotInitialised,

    /// No living thread has the given id.
    #[error("no thread has id {0}")]
    NoSuchThread(ThreadId),

    /// The number cannot be a thread id.
    #[error("{0} is not a valid thread id")]
    InvalidThreadId(i64),

    /// The priority has no entry in the quantum table.
    #[error("priority {0} has no quantum")]
    InvalidPriority(i64),

    /// The main thread can never be blocked.
    #[error("the main thread cannot be blocked")]
    BlockMain,

    /// Every thread id is in use.
    #[error("all {0} thread ids are in use")]
    TooManyThreads(usize),

    /// The entry point is a null function pointer.
    #[error("the entry point is null")]
    NullEntry,
}

impl Error {
    /// Returns the error for an out-of-range priority.
    ///
    pub(crate) fn invalid_priority(priority: usize) -> Self {
        Error::InvalidPriority(i64::try_from(priority).unwrap_or(i64::MAX))
    }
}

/// An unrecoverable failure of the environment or
/// of the scheduler's own bookkeeping.
///
#[derive(Debug, Error)]
pub enum SystemError {
    /// A thread's stack could not be allocated.
    #[error("failed to allocate {bytes} bytes for a thread stack")]
    OutOfMemory { bytes: usize },

    /// The preemption signal's handler could not be
    /// installed or removed.
    #[error("failed to set the preemption signal handler: {0}")]
    SignalHandler(#[source] io::Error),

    /// The signal mask could not be changed.
    #[error("failed to change the signal mask: {0}")]
    SignalMask(#[source] io::Error),

    /// The virtual timer could not be armed or disarmed.
    #[error("failed to set the virtual timer: {0}")]
    Timer(#[source] io::Error),

    /// A stale preemption signal could not be discarded.
    #[error("failed to discard a pending preemption signal: {0}")]
    StaleSignal(#[source] io::Error),

    /// The scheduler was entered while already in use.
    #[error("the scheduler was re-entered while in use")]
    Reentered,

    /// There was no thread to hand the CPU to.
    #[error("no thread is ready to run")]
    NoRunnableThread,

    /// The scheduler's bookkeeping contradicts itself.
    #[error("scheduler state is inconsistent: {0}")]
    Inconsistent(&'static str),
}

/// Either tier of failure, as returned inside the
/// scheduler before it is settled by the public API.
///
#[derive(Debug, Error)]
pub(crate) enum Fault {
    #[error(transparent)]
    Library(#[from] Error),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Reports a library error, returning it so it can
/// be passed on to the caller.
///
pub(crate) fn library(err: Error) -> Error {
    warn!("thread library error: {err}");
    err
}

/// Reports a system error and exits the process.
///
/// The report goes to standard error as well as the
/// logger, as nothing guarantees a logger is installed.
///
pub(crate) fn fatal(err: SystemError) -> ! {
    error!("system error: {err}");
    eprintln!("system error: {err}");
    process::exit(1);
}

/// Passes a library error back to the caller, or exits
/// the process on a system error.
///
pub(crate) fn settle<T>(result: Result<T, Fault>) -> Result<T, Error> {
    match result {
        Ok(value) => Ok(value),
        Err(Fault::Library(err)) => Err(library(err)),
        Err(Fault::System(err)) => fatal(err),
    }
}

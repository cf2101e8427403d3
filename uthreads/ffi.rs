// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Exposes the thread library to C callers.
//!
//! Each function mirrors one of the crate's Rust functions, using integer
//! conventions in place of [`Result`]: a failing call returns `-1` and
//! prints `thread library error: ` and a description to standard error. A
//! successful call returns `0`, or the id or count it was asked for.
//!
//! Thread ids and priorities are C integers, so these functions also
//! reject negative numbers and null entry points, which the Rust
//! interface makes impossible.

use crate::error::{library, Error};
use crate::thread::{Entry, ThreadId};
use crate::{
    block, change_priority, current_thread_id, init, quantums, resume, spawn_entry, terminate,
    total_quantums, without_preemption,
};
use libc::c_int;
use std::slice;

/// Converts a result into the C convention, reporting
/// any error.
///
fn status(result: Result<c_int, Error>) -> c_int {
    match result {
        Ok(value) => value,
        Err(err) => {
            without_preemption(|| eprintln!("thread library error: {err}"));
            -1
        }
    }
}

/// Reports an error found before reaching the scheduler.
///
fn reject<T>(err: Error) -> Result<T, Error> {
    Err(library(err))
}

/// Returns `value` as a C integer, saturating if it is
/// too large.
///
fn to_c<T: TryInto<c_int>>(value: T) -> c_int {
    value.try_into().unwrap_or(c_int::MAX)
}

fn thread_id(tid: c_int) -> Result<ThreadId, Error> {
    match usize::try_from(tid).ok().and_then(ThreadId::new) {
        Some(id) => Ok(id),
        None => reject(Error::InvalidThreadId(i64::from(tid))),
    }
}

fn priority(priority: c_int) -> Result<usize, Error> {
    match usize::try_from(priority) {
        Ok(priority) => Ok(priority),
        Err(_) => reject(Error::InvalidPriority(i64::from(priority))),
    }
}

/// Copies the quantum table out of a C array.
///
/// # Safety
///
/// Unless it is null, `quantum_usecs` must point to
/// `size` readable integers.
///
unsafe fn quantum_table(quantum_usecs: *const c_int, size: c_int) -> Result<Vec<u32>, Error> {
    let len = match usize::try_from(size) {
        Ok(len) if len > 0 && !quantum_usecs.is_null() => len,
        _ => return reject(Error::EmptyQuantumTable),
    };

    let raw = unsafe { slice::from_raw_parts(quantum_usecs, len) };
    let mut table = Vec::with_capacity(len);
    for (index, &usecs) in raw.iter().enumerate() {
        match u32::try_from(usecs) {
            Ok(usecs) => table.push(usecs),
            Err(_) => return reject(Error::InvalidQuantum { index }),
        }
    }

    Ok(table)
}

/// Initialises the thread library, with a quantum
/// table of `size` lengths in microseconds.
///
/// # Safety
///
/// `quantum_usecs` must point to `size` readable
/// integers.
///
#[no_mangle]
pub unsafe extern "C" fn uthread_init(quantum_usecs: *const c_int, size: c_int) -> c_int {
    status(without_preemption(|| {
        let table = unsafe { quantum_table(quantum_usecs, size)? };
        init(&table).map(|()| 0)
    }))
}

fn spawn_foreign(entry: Option<extern "C" fn()>, priority: c_int) -> Result<c_int, Error> {
    let entry = match entry {
        Some(entry) => entry,
        None => return reject(Error::NullEntry),
    };

    let priority = self::priority(priority)?;
    let id = spawn_entry(Entry::Foreign(entry), priority)?;

    Ok(to_c(id.as_usize()))
}

/// Creates a new thread that runs `entry` with the
/// given priority, returning its id.
///
#[no_mangle]
pub extern "C" fn uthread_spawn(entry: Option<extern "C" fn()>, priority: c_int) -> c_int {
    status(spawn_foreign(entry, priority))
}

fn change_priority_foreign(tid: c_int, priority: c_int) -> Result<c_int, Error> {
    let id = thread_id(tid)?;
    let priority = self::priority(priority)?;
    change_priority(id, priority)?;

    Ok(0)
}

/// Changes the thread's priority from its next quantum.
///
#[no_mangle]
pub extern "C" fn uthread_change_priority(tid: c_int, priority: c_int) -> c_int {
    status(change_priority_foreign(tid, priority))
}

/// Terminates the thread. Terminating thread 0 ends
/// the process.
///
#[no_mangle]
pub extern "C" fn uthread_terminate(tid: c_int) -> c_int {
    status(thread_id(tid).and_then(terminate).map(|()| 0))
}

/// Blocks the thread until it is resumed.
///
#[no_mangle]
pub extern "C" fn uthread_block(tid: c_int) -> c_int {
    status(thread_id(tid).and_then(block).map(|()| 0))
}

/// Makes a blocked thread ready.
///
#[no_mangle]
pub extern "C" fn uthread_resume(tid: c_int) -> c_int {
    status(thread_id(tid).and_then(resume).map(|()| 0))
}

/// Returns the calling thread's id.
///
#[no_mangle]
pub extern "C" fn uthread_get_tid() -> c_int {
    to_c(current_thread_id().as_usize())
}

/// Returns the number of quanta started since
/// initialisation.
///
#[no_mangle]
pub extern "C" fn uthread_get_total_quantums() -> c_int {
    to_c(total_quantums())
}

/// Returns the number of quanta the thread has started.
///
#[no_mangle]
pub extern "C" fn uthread_get_quantums(tid: c_int) -> c_int {
    status(thread_id(tid).and_then(quantums).map(to_c))
}

// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Installs and removes the handler for the preemption signal.

use crate::SIGNAL;
use libc::c_int;
use std::io;
use std::mem;
use std::ptr;

/// The signature of a preemption signal handler.
///
pub type Handler = extern "C" fn(c_int);

fn set_disposition(disposition: libc::sighandler_t, flags: c_int) -> io::Result<()> {
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = disposition;
    action.sa_flags = flags;
    unsafe { libc::sigemptyset(&mut action.sa_mask) };

    if unsafe { libc::sigaction(SIGNAL, &action, ptr::null_mut()) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Makes `handler` run each time the preemption signal is
/// delivered.
///
/// The kernel blocks the signal while the handler runs.
/// System calls interrupted by the signal are restarted.
///
pub fn install(handler: Handler) -> io::Result<()> {
    set_disposition(handler as *const () as libc::sighandler_t, libc::SA_RESTART)
}

/// Ignores the preemption signal from now on.
///
/// This is used when tearing down, so that a signal still
/// in flight cannot terminate the process.
///
pub fn ignore() -> io::Result<()> {
    set_disposition(libc::SIG_IGN, 0)
}

/// Discards the preemption signal if it is pending,
/// returning whether it was.
///
/// The signal must be blocked, or it would have been
/// delivered rather than left pending.
///
pub fn discard_pending() -> io::Result<bool> {
    let mut pending: libc::sigset_t = unsafe { mem::zeroed() };
    if unsafe { libc::sigpending(&mut pending) } != 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::sigismember(&pending, SIGNAL) } != 1 {
        return Ok(false);
    }

    let mut wanted: libc::sigset_t = unsafe { mem::zeroed() };
    unsafe {
        libc::sigemptyset(&mut wanted);
        libc::sigaddset(&mut wanted, SIGNAL);
    }

    let timeout = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    if unsafe { libc::sigtimedwait(&wanted, ptr::null_mut(), &timeout) } == SIGNAL {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        // Nothing was pending after all.
        Some(libc::EAGAIN) => Ok(false),
        _ => Err(err),
    }
}

/// Calls `f`, then restores `errno` to its value beforehand.
///
/// A signal handler must not change the `errno` seen by the
/// code it interrupted.
///
pub fn preserving_errno<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let saved = unsafe { *libc::__errno_location() };
    let result = f();
    unsafe { *libc::__errno_location() = saved };

    result
}

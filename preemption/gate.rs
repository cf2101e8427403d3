// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the gate that holds off preemption.
//!
//! The gate only ever touches the preemption signal's bit in the signal
//! mask. Other signals are left as the application configured them.

use crate::SIGNAL;
use libc::{c_int, sigset_t};
use std::io;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;

/// Returns a signal set containing only [`SIGNAL`].
///
fn preemption_set() -> sigset_t {
    let mut set = MaybeUninit::<sigset_t>::uninit();
    unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        libc::sigaddset(set.as_mut_ptr(), SIGNAL);
        set.assume_init()
    }
}

/// Applies `how` to [`SIGNAL`]'s bit in the signal mask,
/// returning the mask as it was beforehand.
///
fn change_mask(how: c_int) -> io::Result<sigset_t> {
    let set = preemption_set();
    let mut previous = MaybeUninit::<sigset_t>::uninit();
    if unsafe { libc::sigprocmask(how, &set, previous.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(unsafe { previous.assume_init() })
}

fn blocks_preemption(mask: &sigset_t) -> bool {
    unsafe { libc::sigismember(mask, SIGNAL) == 1 }
}

/// Returns whether the preemption signal can currently
/// be delivered.
///
pub fn is_open() -> io::Result<bool> {
    let mut current = MaybeUninit::<sigset_t>::uninit();
    if unsafe { libc::sigprocmask(libc::SIG_BLOCK, ptr::null(), current.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let current = unsafe { current.assume_init() };
    Ok(!blocks_preemption(&current))
}

/// Unblocks the preemption signal unconditionally.
///
/// This is used by code that starts running on a fresh
/// stack, which has no gate of its own to drop.
///
pub fn open() -> io::Result<()> {
    change_mask(libc::SIG_UNBLOCK).map(|_| ())
}

/// Holds off preemption until dropped.
///
/// Gates nest: dropping a gate only reopens it if it was
/// open when this gate was closed. This also makes gates
/// safe to use inside the preemption signal's handler,
/// where the kernel has already blocked the signal.
///
#[must_use = "the gate reopens as soon as it is dropped"]
#[derive(Debug)]
pub struct Gate {
    was_open: bool,

    // The signal mask belongs to the OS thread, so the
    // gate must be dropped on the thread that closed it.
    _not_send: PhantomData<*const ()>,
}

impl Gate {
    /// Blocks the preemption signal, returning a guard
    /// that restores its previous state when dropped.
    ///
    pub fn close() -> io::Result<Gate> {
        let previous = change_mask(libc::SIG_BLOCK)?;
        Ok(Gate {
            was_open: !blocks_preemption(&previous),
            _not_send: PhantomData,
        })
    }

    /// Returns whether preemption was enabled when the
    /// gate was closed.
    ///
    pub fn was_open(&self) -> bool {
        self.was_open
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        if self.was_open {
            // sigprocmask can only fail for an invalid `how`
            // or a bad pointer, neither of which we pass.
            let _ = change_mask(libc::SIG_UNBLOCK);
        }
    }
}

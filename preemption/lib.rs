// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Drives the preemption of user-level threads, using the process's virtual
//! interval timer and the signal it raises.
//!
//! ## The timer
//!
//! The [`timer`] module arms a one-shot countdown of user-mode CPU time.
//! When it expires, the kernel raises [`SIGNAL`], whose handler (installed
//! with [`signal::install`]) can switch to another thread.
//!
//! ## The gate
//!
//! Because only one logical thread ever runs, the only thing that can
//! interrupt a scheduler operation part way through is [`SIGNAL`] itself.
//! Closing a [`Gate`] blocks that one signal until the gate is dropped,
//! which makes everything done in between atomic with respect to the
//! timer. A signal raised while the gate is closed stays pending and is
//! delivered as soon as the gate reopens.

#![deny(clippy::float_arithmetic)]
#![deny(clippy::inline_asm_x86_att_syntax)]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]
#![allow(unsafe_code)]

pub mod gate;
pub mod signal;
pub mod timer;

pub use gate::Gate;

/// The signal raised when the virtual timer expires.
///
pub const SIGNAL: libc::c_int = libc::SIGVTALRM;

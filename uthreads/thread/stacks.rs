// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Allocates the private stacks used by spawned threads.
//!
//! The main thread keeps the stack it was started on. Every other thread
//! gets a [`Stack`] of [`STACK_SIZE`](crate::STACK_SIZE) bytes from the
//! heap, which is freed when the thread is.

use crate::error::SystemError;
use std::fmt;
use std::ops::Range;

/// A heap-allocated call stack, owned by one thread.
///
/// The stack grows downwards, from [`top`](Stack::top)
/// towards the start of its [`bounds`](Stack::bounds).
///
pub struct Stack {
    memory: Box<[u8]>,
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bounds = self.bounds();
        write!(f, "Stack({:#x}..{:#x})", bounds.start, bounds.end)
    }
}

impl Stack {
    /// Allocates a zeroed stack of `size` bytes.
    ///
    /// Allocation failure is reported rather than
    /// aborting the process.
    ///
    pub fn new(size: usize) -> Result<Self, SystemError> {
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(size)
            .map_err(|_| SystemError::OutOfMemory { bytes: size })?;
        memory.resize(size, 0u8);

        Ok(Stack {
            memory: memory.into_boxed_slice(),
        })
    }

    /// Returns the exclusive upper bound of the stack,
    /// where a fresh thread's stack pointer starts.
    ///
    pub fn top(&mut self) -> *mut u8 {
        self.memory.as_mut_ptr_range().end
    }

    /// Returns the range of addresses in the stack.
    ///
    pub fn bounds(&self) -> Range<usize> {
        let range = self.memory.as_ptr_range();
        range.start as usize..range.end as usize
    }

    /// Returns whether the stack includes the given
    /// address.
    ///
    pub fn contains(&self, addr: usize) -> bool {
        self.bounds().contains(&addr)
    }
}

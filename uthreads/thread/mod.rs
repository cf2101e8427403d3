// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements user-level threads, each with its own stack and execution
//! context.
//!
//! A [`Thread`] only tracks its own state. It moves between the
//! [`ThreadState`]s when the scheduler asks it to, and reports the
//! [`ExecutionContext`] that must be saved or resumed for each move. The
//! context switch itself happens later, once the scheduler has been
//! released.
//!
//! The main thread (id 0) is the flow of execution that initialised the
//! library. It runs on the process's original stack, so it has no
//! [`Stack`] of its own.

mod stacks;

pub use stacks::Stack;

use crate::error::SystemError;
use crate::switch::start_routine;
use crate::{MAX_THREADS, STACK_SIZE};
use context::ExecutionContext;
use std::cell::UnsafeCell;
use std::fmt;

/// Uniquely identifies a living thread.
///
/// Ids are reused: once a thread has been terminated,
/// its id can be given to a new thread. The main thread's
/// id is never reused.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(usize);

impl ThreadId {
    /// MAIN is the unique thread id for the thread
    /// that initialised the library.
    ///
    pub const MAIN: Self = ThreadId(0);

    /// Returns the thread id with the given number, or
    /// `None` if it is outside `[0, MAX_THREADS)`.
    ///
    pub const fn new(id: usize) -> Option<Self> {
        if id < MAX_THREADS {
            Some(ThreadId(id))
        } else {
            None
        }
    }

    /// Returns a numerical representation for the thread
    /// id.
    ///
    pub const fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Describes the scheduling state of a thread.
///
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ThreadState {
    /// The thread is waiting in the ready queue.
    Ready,

    /// The thread is executing.
    Running,

    /// The thread will not run until it is resumed.
    Blocked,
}

/// The code a spawned thread runs.
///
#[derive(Clone, Copy)]
pub enum Entry {
    /// A Rust function.
    Rust(fn()),

    /// A function called through the C interface.
    Foreign(extern "C" fn()),
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Entry::Rust(entry) => write!(f, "Rust({:#x})", *entry as *const () as usize),
            Entry::Foreign(entry) => write!(f, "Foreign({:#x})", *entry as *const () as usize),
        }
    }
}

/// A raw pointer to a thread's saved execution context.
///
/// Contexts live inside boxed threads, so the pointer
/// stays valid until the thread is freed.
///
pub type ContextPointer = *mut ExecutionContext;

/// Contains the metadata for a thread of execution.
///
#[derive(Debug)]
pub struct Thread {
    // This thread's unique id.
    id: ThreadId,

    // The thread's current state.
    state: ThreadState,

    // The index into the quantum table that decides
    // how long the thread runs once dispatched.
    priority: usize,

    // The number of times the thread has started
    // running.
    quantums: u64,

    // The thread's private stack. The main thread
    // runs on the process's stack, so has none.
    stack: Option<Stack>,

    // The thread's saved context. While the thread
    // is running, this is stale. It is written when
    // the thread is switched out, and read when it is
    // switched back in, so we hand out raw pointers
    // to it rather than references.
    context: UnsafeCell<ExecutionContext>,
}

impl Thread {
    /// Returns the main thread, which is already running
    /// its first quantum on the caller's stack.
    ///
    /// Its context is empty until it is first switched
    /// out.
    ///
    pub fn spawn_main() -> Box<Thread> {
        Box::new(Thread {
            id: ThreadId::MAIN,
            state: ThreadState::Running,
            priority: 0,
            quantums: 1,
            stack: None,
            context: UnsafeCell::new(ExecutionContext::new()),
        })
    }

    /// Creates a ready thread, allocating its stack.
    ///
    /// The thread's context is seeded so that, when it
    /// is first dispatched, it starts by re-enabling
    /// preemption and calling `entry` on the new stack.
    ///
    pub fn spawn_new(id: ThreadId, priority: usize, entry: Entry) -> Result<Box<Thread>, SystemError> {
        let mut stack = Stack::new(STACK_SIZE)?;
        let (start, arg) = start_routine(entry);

        // The stack has just been allocated, is larger
        // than the prepared frame, and moves into the
        // thread along with the context.
        let context = unsafe { ExecutionContext::prepare(stack.top(), start, arg) };
        debug_assert!(stack.contains(context.stack_pointer()));

        Ok(Box::new(Thread {
            id,
            state: ThreadState::Ready,
            priority,
            quantums: 0,
            stack: Some(stack),
            context: UnsafeCell::new(context),
        }))
    }

    /// Returns the thread's id.
    ///
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Returns the thread's current state.
    ///
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Returns the thread's priority.
    ///
    pub fn priority(&self) -> usize {
        self.priority
    }

    /// Changes the thread's priority. Any quantum already
    /// in progress keeps its length.
    ///
    pub fn set_priority(&mut self, priority: usize) {
        self.priority = priority;
    }

    /// Returns the number of quanta the thread has
    /// started.
    ///
    pub fn quantums(&self) -> u64 {
        self.quantums
    }

    fn context(&self) -> ContextPointer {
        self.context.get()
    }

    /// Moves a ready thread to running, counting a new
    /// quantum.
    ///
    /// Returns the context to jump into, or the thread's
    /// actual state if it was not ready.
    ///
    pub fn dispatch(&mut self) -> Result<ContextPointer, ThreadState> {
        if self.state != ThreadState::Ready {
            return Err(self.state);
        }

        self.state = ThreadState::Running;
        self.quantums += 1;

        // A spawned thread's saved execution always lives
        // on its own stack.
        if let Some(stack) = &self.stack {
            let saved = unsafe { (*self.context()).stack_pointer() };
            debug_assert!(stack.contains(saved));
        }

        Ok(self.context())
    }

    /// Moves a running thread back to ready.
    ///
    /// Returns the context to save the thread's execution
    /// into, or the thread's actual state if it was not
    /// running.
    ///
    pub fn preempt(&mut self) -> Result<ContextPointer, ThreadState> {
        if self.state != ThreadState::Running {
            return Err(self.state);
        }

        self.state = ThreadState::Ready;

        Ok(self.context())
    }

    /// Marks the thread as blocked.
    ///
    /// If the thread was running, it returns the context
    /// to save its execution into. Otherwise, there is
    /// nothing to save and `block` returns `None`.
    ///
    pub fn block(&mut self) -> Option<ContextPointer> {
        let was_running = self.state == ThreadState::Running;
        self.state = ThreadState::Blocked;

        if was_running {
            Some(self.context())
        } else {
            None
        }
    }

    /// Moves a blocked thread back to ready, returning
    /// the thread's actual state if it was not blocked.
    ///
    pub fn resume(&mut self) -> Result<(), ThreadState> {
        if self.state != ThreadState::Blocked {
            return Err(self.state);
        }

        self.state = ThreadState::Ready;

        Ok(())
    }
}

// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Saves and restores points of execution, so that many call stacks can
//! share a single OS thread.
//!
//! An [`ExecutionContext`] is an opaque capture of a suspended call stack.
//! While the stack is suspended, its callee-saved registers, flags, and
//! floating point control state live on the stack itself, so the context
//! only needs to remember the stack pointer.
//!
//! ## Checkpoint and resume
//!
//! [`ExecutionContext::checkpoint`] captures the current point of execution.
//! It has two distinct returns:
//!
//! - [`Outcome::Saved`] is handed to the caller's `pause` continuation,
//!   which runs straight away, further down the same stack. `pause` must
//!   transfer control to another context and never returns.
//! - [`Outcome::Resumed`] is returned from `checkpoint` itself, once some
//!   other code calls [`ExecutionContext::jump_into`] on the saved context.
//!   To the caller this looks like the original call returning.
//!
//! ## Fresh contexts
//!
//! A thread that has never run has nothing to resume. [`ExecutionContext::prepare`]
//! seeds a fresh stack with the same layout a checkpoint would leave behind,
//! so that the first jump into it calls a start routine on that stack.

#![deny(clippy::float_arithmetic)]
#![deny(clippy::inline_asm_x86_att_syntax)]
#![deny(clippy::missing_panics_doc)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(unused_crate_dependencies)]
#![allow(unsafe_code)]

#[cfg(not(all(target_arch = "x86_64", target_os = "linux")))]
compile_error!("execution contexts are only implemented for x86-64 Linux");

use core::arch::global_asm;
use core::mem::ManuallyDrop;
use core::ptr;
use std::process;

global_asm!(include_str!("switch.s"));

// The following functions are implemented in switch.s.
//
extern "C" {
    /// Pushes the callee-saved state, stores the stack pointer
    /// into `stack_pointer`, then calls `pause(data)`.
    ///
    /// Returns `1` once the saved stack pointer is passed to
    /// [`uthreads_context_jump`].
    ///
    fn uthreads_context_checkpoint(
        stack_pointer: *mut usize,
        pause: unsafe extern "C" fn(*mut u8) -> !,
        data: *mut u8,
    ) -> usize;

    /// Replaces the current stack with the one at `stack_pointer`
    /// and restores the state stored on it.
    ///
    fn uthreads_context_jump(stack_pointer: usize) -> !;

    /// The first code executed by a prepared context. Calls the
    /// start routine in R12 with the argument in R13.
    ///
    fn uthreads_context_start() -> !;
}

/// A routine that begins execution on a fresh stack.
///
/// It receives the argument given to [`ExecutionContext::prepare`]
/// and must never return.
///
pub type StartRoutine = extern "C" fn(usize) -> !;

/// DEFAULT_RFLAGS contains the reserved bits of the
/// RFLAGS register so we can include them when we
/// build a fresh context's stack.
///
/// Bit 1 is always set, as described in Figure 3-8
/// on page 78 of volume 1 of the Intel 64 manual.
///
const DEFAULT_RFLAGS: u64 = 0x2;

/// The MXCSR value at process start: all SSE exceptions
/// masked, rounding to nearest.
///
const DEFAULT_MXCSR: u64 = 0x1f80;

/// The x87 FPU control word at process start.
///
const DEFAULT_FPU_CONTROL: u64 = 0x037f;

/// The largest number of bytes [`ExecutionContext::prepare`]
/// writes below the top of a stack, including alignment.
///
pub const PREPARED_FRAME_SIZE: usize = 104;

/// Reports which of its two returns a checkpoint is making.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The context has just been saved. The caller is
    /// pausing and must hand the CPU to another context.
    Saved,

    /// Control has been transferred back into the saved
    /// context. The caller continues from the checkpoint.
    Resumed,
}

impl Outcome {
    fn from_raw(raw: usize) -> Self {
        if raw == 0 {
            Outcome::Saved
        } else {
            Outcome::Resumed
        }
    }
}

/// The resumable state of one suspended call stack.
///
/// The context is only meaningful while its stack is not
/// executing. Once a context is resumed, its saved stack
/// pointer is stale until the next checkpoint.
///
#[derive(Debug, Default)]
#[repr(C)]
pub struct ExecutionContext {
    stack_pointer: usize,
}

/// push_stack is used to build a fresh context's stack
/// without having to drop down to assembly. The values
/// are popped off in `uthreads_context_jump` when the
/// context is first resumed.
///
unsafe fn push_stack(mut rsp: *mut u64, value: u64) -> *mut u64 {
    // We move the stack pointer down by 8 bytes, write
    // the value to the new space, then return the updated
    // stack pointer.
    unsafe {
        rsp = rsp.sub(1);
        rsp.write(value);
    }

    rsp
}

/// Runs the `pause` continuation passed to [`ExecutionContext::checkpoint`].
///
/// `data` points to the continuation in the checkpoint's
/// stack frame, which stays intact while we run below it.
///
unsafe extern "C" fn call_pause<F>(data: *mut u8) -> !
where
    F: FnOnce(Outcome),
{
    let pause = unsafe { ptr::read(data.cast::<F>()) };
    pause(Outcome::Saved);

    // There is no caller to return to.
    process::abort()
}

impl ExecutionContext {
    /// Returns an empty context, which holds no saved
    /// point of execution.
    ///
    pub const fn new() -> Self {
        ExecutionContext { stack_pointer: 0 }
    }

    /// Returns whether the context holds a point of
    /// execution that can be jumped into.
    ///
    pub const fn is_saved(&self) -> bool {
        self.stack_pointer != 0
    }

    /// Returns the saved stack pointer.
    ///
    pub const fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    /// Returns a context that, when first jumped into, calls
    /// `start(arg)` on the stack ending at `stack_top`.
    ///
    /// The stack grows downwards from `stack_top`, which is
    /// rounded down to a 16-byte boundary.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the exclusive upper bound of a
    /// writable region of at least [`PREPARED_FRAME_SIZE`]
    /// bytes, which must stay allocated and unused by anything
    /// else for as long as the context may run.
    ///
    pub unsafe fn prepare(stack_top: *mut u8, start: StartRoutine, arg: usize) -> Self {
        let offset = (stack_top as usize) & 0xf;
        let rsp = unsafe {
            let mut rsp = stack_top.sub(offset).cast::<u64>();

            // The start routine is entered with a call from
            // uthreads_context_start, which leaves a return
            // address below this slot. It is never used.
            rsp = push_stack(rsp, 0);

            // Push uthreads_context_start and the initial
            // registers to be loaded by uthreads_context_jump.
            rsp = push_stack(rsp, uthreads_context_start as *const () as usize as u64); // RIP.
            rsp = push_stack(rsp, 0); // Initial RBP.
            rsp = push_stack(rsp, 0); // Initial RBX.
            rsp = push_stack(rsp, start as *const () as usize as u64); // Initial R12.
            rsp = push_stack(rsp, arg as u64); // Initial R13.
            rsp = push_stack(rsp, 0); // Initial R14.
            rsp = push_stack(rsp, 0); // Initial R15.
            rsp = push_stack(rsp, DEFAULT_RFLAGS); // RFLAGS.
            rsp = push_stack(rsp, 0); // Padding.
            rsp = push_stack(rsp, (DEFAULT_FPU_CONTROL << 32) | DEFAULT_MXCSR);

            rsp
        };

        ExecutionContext {
            stack_pointer: rsp as usize,
        }
    }

    /// Saves the current point of execution into `context`,
    /// then calls `pause` with [`Outcome::Saved`].
    ///
    /// `pause` runs on the current stack, below the saved
    /// state, and must transfer control to another context.
    /// If `pause` returns, the process is aborted.
    /// When `context` is later passed to [`jump_into`](Self::jump_into),
    /// `checkpoint` returns [`Outcome::Resumed`].
    ///
    /// # Safety
    ///
    /// `context` must be valid for writes now and remain valid
    /// until it is resumed. Nothing may jump into `context`
    /// after the current stack has been freed.
    ///
    pub unsafe fn checkpoint<F>(context: *mut ExecutionContext, pause: F) -> Outcome
    where
        F: FnOnce(Outcome),
    {
        // The continuation stays in this frame, which is
        // above the saved stack pointer. call_pause moves
        // it out, so we must not drop it here.
        let mut pause = ManuallyDrop::new(pause);
        let data = ptr::addr_of_mut!(pause).cast::<u8>();
        let raw = unsafe {
            uthreads_context_checkpoint(
                ptr::addr_of_mut!((*context).stack_pointer),
                call_pause::<F>,
                data,
            )
        };

        Outcome::from_raw(raw)
    }

    /// Makes `context` the active point of execution.
    ///
    /// The current stack is abandoned where it stands.
    ///
    /// # Safety
    ///
    /// `context` must hold a point of execution saved by
    /// [`checkpoint`](Self::checkpoint) or seeded by
    /// [`prepare`](Self::prepare), whose stack is still
    /// allocated and is not executing.
    ///
    pub unsafe fn jump_into(context: *const ExecutionContext) -> ! {
        let stack_pointer = unsafe { (*context).stack_pointer };
        debug_assert!(stack_pointer != 0, "jumped into an empty context");
        unsafe { uthreads_context_jump(stack_pointer) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK_SIZE: usize = 64 * 1024;

    struct PingPong {
        home: ExecutionContext,
        away: ExecutionContext,
        visits: usize,
    }

    extern "C" fn bounce(arg: usize) -> ! {
        let state = arg as *mut PingPong;
        loop {
            unsafe {
                (*state).visits += 1;
                let away = ptr::addr_of_mut!((*state).away);
                let home = ptr::addr_of!((*state).home);
                ExecutionContext::checkpoint(away, move |_| ExecutionContext::jump_into(home));
            }
        }
    }

    #[test]
    fn ping_pong() {
        let mut stack = vec![0u8; STACK_SIZE];
        let top = unsafe { stack.as_mut_ptr().add(STACK_SIZE) };
        let mut state = PingPong {
            home: ExecutionContext::new(),
            away: ExecutionContext::new(),
            visits: 0,
        };

        let raw: *mut PingPong = &mut state;
        unsafe { (*raw).away = ExecutionContext::prepare(top, bounce, raw as usize) };

        for round in 1..=5 {
            let home = unsafe { ptr::addr_of_mut!((*raw).home) };
            let away = unsafe { ptr::addr_of!((*raw).away) };
            let outcome =
                unsafe { ExecutionContext::checkpoint(home, move |_| ExecutionContext::jump_into(away)) };

            // Each round trip runs the other stack exactly once
            // and lands us back here with our locals intact.
            assert_eq!(outcome, Outcome::Resumed);
            assert_eq!(unsafe { (*raw).visits }, round);
        }
    }

    #[test]
    fn prepared_frame() {
        let mut stack = vec![0u8; 256];
        for misalignment in 0..16 {
            let top = unsafe { stack.as_mut_ptr().add(200 - misalignment) };
            let context = unsafe { ExecutionContext::prepare(top, bounce, 7) };
            assert!(context.is_saved());

            // Once the return address is popped, the start
            // stub sees the stack as if it had just been called.
            let used = top as usize - context.stack_pointer();
            assert_eq!(context.stack_pointer() % 16, 8);
            assert!(used <= PREPARED_FRAME_SIZE);
        }
    }

    #[test]
    fn outcomes() {
        assert!(!ExecutionContext::new().is_saved());
        assert_eq!(Outcome::from_raw(0), Outcome::Saved);
        assert_eq!(Outcome::from_raw(1), Outcome::Resumed);
    }
}

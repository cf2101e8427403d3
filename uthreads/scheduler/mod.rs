// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements a round robin scheduler for threads, with per-priority
//! quantum lengths.
//!
//! ## Policy
//!
//! Ready threads run in the order they became ready. A thread's priority
//! never reorders the queue: it only chooses how long the thread runs once
//! dispatched, by indexing into the [`QuantumTable`].
//!
//! ## Handoffs
//!
//! The [`Scheduler`] is a pure state machine. It never switches stacks
//! itself. Any operation that takes the CPU away from the running thread
//! returns a [`Handoff`], describing the context to save (if any), the
//! context to resume, and the quantum to grant. The caller performs the
//! switch once it has released the scheduler, so no borrow of the
//! scheduler is ever held by a suspended thread.
//!
//! ## Freeing threads
//!
//! A thread that terminates itself is still executing on its own stack,
//! so it cannot be freed straight away. Instead, it waits in a pending
//! list until [`Scheduler::reap`] is called by a later operation, which
//! is necessarily running on a different stack.

mod quantum;
mod queue;

pub use quantum::QuantumTable;
pub use queue::ReadyQueue;

use crate::error::{Error, Fault, SystemError};
use crate::thread::{ContextPointer, Entry, Thread, ThreadId, ThreadState};
use crate::MAX_THREADS;
use context::ExecutionContext;
use std::collections::BTreeMap;
use std::mem;
use std::time::Duration;

/// Describes a transfer of the CPU from one thread to
/// another.
///
#[derive(Debug)]
#[must_use = "the scheduler has already moved on, so the switch must happen"]
pub struct Handoff {
    from: Option<ContextPointer>,
    to: *const ExecutionContext,
    quantum: Duration,
    thread: ThreadId,
}

impl Handoff {
    /// Returns the context to save the outgoing thread
    /// into, or `None` if the outgoing thread has been
    /// terminated.
    ///
    pub fn from(&self) -> Option<ContextPointer> {
        self.from
    }

    /// Returns the context of the incoming thread.
    ///
    pub fn to(&self) -> *const ExecutionContext {
        self.to
    }

    /// Returns the length of the incoming thread's
    /// quantum.
    ///
    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    /// Returns the id of the incoming thread.
    ///
    pub fn thread(&self) -> ThreadId {
        self.thread
    }
}

/// Describes the result of terminating a thread.
///
#[derive(Debug)]
#[must_use]
pub enum Termination {
    /// The main thread was named, so the whole process
    /// must shut down.
    Process,

    /// The thread was not running and has been freed.
    Removed,

    /// The running thread terminated itself. The CPU
    /// must be handed over and it must never resume.
    Switch(Handoff),
}

/// Scheduler owns every thread and decides which of them
/// runs next.
///
#[derive(Debug)]
pub struct Scheduler {
    // Every living thread, including the main
    // thread.
    threads: BTreeMap<ThreadId, Box<Thread>>,

    // The threads in the ready state.
    ready: ReadyQueue,

    // The thread that owns the CPU.
    running: ThreadId,

    // The number of quanta started since the
    // scheduler was created.
    total_quantums: u64,

    // Threads that terminated themselves and
    // whose stacks may still be in use.
    pending_free: Vec<Box<Thread>>,

    quanta: QuantumTable,
}

impl Scheduler {
    /// Returns a scheduler whose only thread is the main
    /// thread, already running its first quantum.
    ///
    pub fn new(quanta: QuantumTable) -> Scheduler {
        let main = Thread::spawn_main();
        let mut threads = BTreeMap::new();
        threads.insert(main.id(), main);

        Scheduler {
            threads,
            ready: ReadyQueue::new(),
            running: ThreadId::MAIN,
            total_quantums: 1,
            pending_free: Vec::with_capacity(MAX_THREADS),
            quanta,
        }
    }

    /// Returns the running thread's id.
    ///
    pub fn running(&self) -> ThreadId {
        self.running
    }

    /// Returns the number of quanta started so far.
    ///
    pub fn total_quantums(&self) -> u64 {
        self.total_quantums
    }

    /// Returns the length of the running thread's
    /// quantum.
    ///
    pub fn current_quantum(&self) -> Result<Duration, SystemError> {
        let thread = self
            .threads
            .get(&self.running)
            .ok_or(SystemError::Inconsistent("the running thread does not exist"))?;

        self.quanta
            .get(thread.priority())
            .ok_or(SystemError::Inconsistent("a thread has an invalid priority"))
    }

    fn thread(&self, id: ThreadId) -> Result<&Thread, Error> {
        self.threads.get(&id).map(|thread| &**thread).ok_or(Error::NoSuchThread(id))
    }

    fn thread_mut(&mut self, id: ThreadId) -> Result<&mut Thread, Error> {
        self.threads
            .get_mut(&id)
            .map(|thread| &mut **thread)
            .ok_or(Error::NoSuchThread(id))
    }

    /// Returns the number of quanta the thread has
    /// started.
    ///
    pub fn quantums(&self, id: ThreadId) -> Result<u64, Error> {
        self.thread(id).map(Thread::quantums)
    }

    /// Returns the thread's scheduling state.
    ///
    pub fn state(&self, id: ThreadId) -> Result<ThreadState, Error> {
        self.thread(id).map(Thread::state)
    }

    /// Returns the lowest thread id not in use.
    ///
    fn free_id(&self) -> Option<ThreadId> {
        (1..MAX_THREADS)
            .filter_map(ThreadId::new)
            .find(|id| !self.threads.contains_key(id))
    }

    /// Frees the threads that terminated themselves.
    ///
    /// This must only be called by a living thread, so
    /// that none of the stacks being freed is in use.
    ///
    pub fn reap(&mut self) -> usize {
        let reaped = self.pending_free.len();
        self.pending_free.clear();

        reaped
    }

    /// Creates a new thread with the given priority, which
    /// is added to the back of the ready queue.
    ///
    pub fn spawn(&mut self, entry: Entry, priority: usize) -> Result<ThreadId, Fault> {
        self.reap();

        let id = self.free_id().ok_or(Error::TooManyThreads(MAX_THREADS))?;
        if !self.quanta.contains(priority) {
            return Err(Error::invalid_priority(priority).into());
        }

        let thread = Thread::spawn_new(id, priority, entry)?;
        self.threads.insert(id, thread);
        self.ready.add(id);

        Ok(id)
    }

    /// Changes the thread's priority. The new priority
    /// takes effect from the thread's next quantum.
    ///
    pub fn change_priority(&mut self, id: ThreadId, priority: usize) -> Result<(), Error> {
        if !self.quanta.contains(priority) {
            self.thread(id)?;
            return Err(Error::invalid_priority(priority));
        }

        self.thread_mut(id)?.set_priority(priority);

        Ok(())
    }

    /// Blocks the thread.
    ///
    /// If the thread was running, `block` returns the
    /// handoff to the next thread. Blocking a thread that
    /// is already blocked has no effect.
    ///
    pub fn block(&mut self, id: ThreadId) -> Result<Option<Handoff>, Fault> {
        if id == ThreadId::MAIN {
            return Err(Error::BlockMain.into());
        }

        let thread = self.thread_mut(id)?;
        match thread.state() {
            ThreadState::Blocked => Ok(None),
            ThreadState::Ready => {
                let context = thread.block();
                debug_assert!(context.is_none(), "a ready thread had a context to save");
                self.ready.remove(id);
                Ok(None)
            }
            ThreadState::Running => {
                let from = thread
                    .block()
                    .ok_or(SystemError::Inconsistent("a running thread had no context"))?;
                Ok(Some(self.dispatch(Some(from))?))
            }
        }
    }

    /// Moves a blocked thread to the back of the ready
    /// queue. Resuming a thread that is not blocked has
    /// no effect.
    ///
    pub fn resume(&mut self, id: ThreadId) -> Result<(), Error> {
        if self.thread_mut(id)?.resume().is_ok() {
            debug_assert!(!self.ready.contains(id));
            self.ready.add(id);
        }

        Ok(())
    }

    /// Terminates the thread.
    ///
    /// A thread that is not running is freed immediately.
    /// A running thread is freed by a later [`reap`](Self::reap),
    /// once it is no longer executing on its own stack.
    ///
    pub fn terminate(&mut self, id: ThreadId) -> Result<Termination, Fault> {
        if id == ThreadId::MAIN {
            return Ok(Termination::Process);
        }

        if !self.threads.contains_key(&id) {
            return Err(Error::NoSuchThread(id).into());
        }

        self.reap();
        self.ready.remove(id);
        let thread = self
            .threads
            .remove(&id)
            .ok_or(SystemError::Inconsistent("a thread vanished while terminating"))?;

        if id != self.running {
            drop(thread);
            return Ok(Termination::Removed);
        }

        self.pending_free.push(thread);
        let handoff = self.dispatch(None)?;

        Ok(Termination::Switch(handoff))
    }

    /// Ends the running thread's quantum, moving it to the
    /// back of the ready queue, and returns the handoff to
    /// the next thread.
    ///
    /// If no other thread is ready, the running thread is
    /// dispatched again into a new quantum.
    ///
    /// This is called from the preemption signal handler,
    /// so it must not allocate.
    ///
    pub fn preempt(&mut self) -> Result<Handoff, SystemError> {
        let running = self.running;
        let from = self
            .threads
            .get_mut(&running)
            .ok_or(SystemError::Inconsistent("the running thread does not exist"))?
            .preempt()
            .map_err(|_| SystemError::Inconsistent("preempted a thread that was not running"))?;

        // Every other thread may already be queued, but the
        // queue has room for them all.
        debug_assert!(self.ready.len() < MAX_THREADS);
        self.ready.add(running);
        self.dispatch(Some(from))
    }

    /// Dispatches the thread at the front of the ready
    /// queue, starting a new quantum.
    ///
    fn dispatch(&mut self, from: Option<ContextPointer>) -> Result<Handoff, SystemError> {
        let next = self.ready.next().ok_or(SystemError::NoRunnableThread)?;
        let thread = self
            .threads
            .get_mut(&next)
            .ok_or(SystemError::Inconsistent("a queued thread does not exist"))?;
        let quantum = self
            .quanta
            .get(thread.priority())
            .ok_or(SystemError::Inconsistent("a thread has an invalid priority"))?;
        let to = thread
            .dispatch()
            .map_err(|_| SystemError::Inconsistent("a queued thread was not ready"))?;

        self.running = next;
        self.total_quantums += 1;

        Ok(Handoff {
            from,
            to,
            quantum,
            thread: next,
        })
    }

    /// Frees every thread, returning how many were freed.
    ///
    /// The running thread's stack is still in use by the
    /// caller, so it is leaked instead. The process is
    /// expected to exit straight afterwards.
    ///
    pub fn shutdown(mut self) -> usize {
        let mut freed = self.reap();
        if let Some(running) = self.threads.remove(&self.running) {
            mem::forget(running);
        }

        freed += self.threads.len();
        drop(self);

        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nothing() {}

    fn id(n: usize) -> ThreadId {
        ThreadId::new(n).unwrap()
    }

    fn scheduler(usecs: &[u32]) -> Scheduler {
        Scheduler::new(QuantumTable::from_micros(usecs).unwrap())
    }

    fn spawn(scheduler: &mut Scheduler, priority: usize) -> ThreadId {
        scheduler.spawn(Entry::Rust(nothing), priority).unwrap()
    }

    fn library_error<T: std::fmt::Debug>(result: Result<T, Fault>) -> Error {
        match result {
            Err(Fault::Library(err)) => err,
            other => panic!("expected a library error, got {:?}", other),
        }
    }

    #[test]
    fn initial_state() {
        let scheduler = scheduler(&[100]);
        assert_eq!(scheduler.total_quantums(), 1);
        assert_eq!(scheduler.running(), ThreadId::MAIN);
        assert_eq!(scheduler.quantums(ThreadId::MAIN), Ok(1));
        assert_eq!(scheduler.state(ThreadId::MAIN), Ok(ThreadState::Running));
        assert_eq!(scheduler.current_quantum().unwrap(), Duration::from_micros(100));
        assert_eq!(scheduler.state(id(1)), Err(Error::NoSuchThread(id(1))));
    }

    #[test]
    fn spawning() {
        let mut scheduler = scheduler(&[100, 200]);
        assert_eq!(spawn(&mut scheduler, 0), id(1));
        assert_eq!(spawn(&mut scheduler, 1), id(2));
        assert_eq!(spawn(&mut scheduler, 0), id(3));
        assert_eq!(scheduler.state(id(2)), Ok(ThreadState::Ready));
        assert_eq!(scheduler.quantums(id(2)), Ok(0));
        assert_eq!(scheduler.ready.iter().collect::<Vec<_>>(), [id(1), id(2), id(3)]);

        // Spawning never takes the CPU away.
        assert_eq!(scheduler.running(), ThreadId::MAIN);
        assert_eq!(scheduler.total_quantums(), 1);

        // The lowest free id is reused.
        assert!(matches!(scheduler.terminate(id(2)), Ok(Termination::Removed)));
        assert_eq!(spawn(&mut scheduler, 0), id(2));
        assert_eq!(scheduler.ready.iter().collect::<Vec<_>>(), [id(1), id(3), id(2)]);
    }

    #[test]
    fn spawning_with_invalid_priority() {
        let mut scheduler = scheduler(&[100, 200]);
        let err = library_error(scheduler.spawn(Entry::Rust(nothing), 2));
        assert_eq!(err, Error::InvalidPriority(2));
        assert_eq!(scheduler.threads.len(), 1);
        assert_eq!(scheduler.ready.len(), 0);
    }

    #[test]
    fn round_robin() {
        let mut scheduler = scheduler(&[100]);
        for _ in 0..3 {
            spawn(&mut scheduler, 0);
        }

        // Every thread gets one quantum per round, in the
        // order the threads were spawned, and the main
        // thread takes its turn after them.
        let order: Vec<usize> = (0..8)
            .map(|_| scheduler.preempt().unwrap().thread().as_usize())
            .collect();
        assert_eq!(order, [1, 2, 3, 0, 1, 2, 3, 0]);
        assert_eq!(scheduler.total_quantums(), 9);
        assert_eq!(scheduler.quantums(ThreadId::MAIN), Ok(3));
        for n in 1..=3 {
            assert_eq!(scheduler.quantums(id(n)), Ok(2));
        }
    }

    #[test]
    fn handoff_contexts() {
        let mut scheduler = scheduler(&[100]);
        let thread = spawn(&mut scheduler, 0);

        let first = scheduler.preempt().unwrap();
        let second = scheduler.preempt().unwrap();
        assert_eq!(first.thread(), thread);
        assert_eq!(second.thread(), ThreadId::MAIN);

        // Each switch saves into the context the next
        // switch back resumes from.
        assert_eq!(first.from().map(|ctx| ctx as *const _), Some(second.to()));
        assert_eq!(second.from().map(|ctx| ctx as *const _), Some(first.to()));
    }

    #[test]
    fn preempting_a_lone_thread() {
        let mut scheduler = scheduler(&[100]);
        let handoff = scheduler.preempt().unwrap();

        // With nobody else ready, the main thread gets a
        // fresh quantum and resumes where it saved.
        assert_eq!(handoff.thread(), ThreadId::MAIN);
        assert_eq!(handoff.from().map(|ctx| ctx as *const _), Some(handoff.to()));
        assert_eq!(scheduler.total_quantums(), 2);
        assert_eq!(scheduler.quantums(ThreadId::MAIN), Ok(2));
        assert_eq!(scheduler.state(ThreadId::MAIN), Ok(ThreadState::Running));
    }

    #[test]
    fn main_cannot_block() {
        let mut scheduler = scheduler(&[100]);
        spawn(&mut scheduler, 0);
        assert_eq!(library_error(scheduler.block(ThreadId::MAIN)), Error::BlockMain);
        assert_eq!(scheduler.state(ThreadId::MAIN), Ok(ThreadState::Running));

        let _ = scheduler.preempt().unwrap();
        assert_eq!(library_error(scheduler.block(ThreadId::MAIN)), Error::BlockMain);
        assert_eq!(scheduler.state(ThreadId::MAIN), Ok(ThreadState::Ready));
        assert!(scheduler.ready.contains(ThreadId::MAIN));
    }

    #[test]
    fn blocking_unknown_threads() {
        let mut scheduler = scheduler(&[100]);
        assert_eq!(library_error(scheduler.block(id(4))), Error::NoSuchThread(id(4)));
        assert_eq!(scheduler.resume(id(4)), Err(Error::NoSuchThread(id(4))));
    }

    #[test]
    fn blocking_a_ready_thread() {
        let mut scheduler = scheduler(&[100]);
        let a = spawn(&mut scheduler, 0);
        let b = spawn(&mut scheduler, 0);

        assert!(scheduler.block(a).unwrap().is_none());
        assert_eq!(scheduler.state(a), Ok(ThreadState::Blocked));
        assert!(!scheduler.ready.contains(a));

        // Blocking again has no effect.
        assert!(scheduler.block(a).unwrap().is_none());
        assert_eq!(scheduler.state(a), Ok(ThreadState::Blocked));

        // The blocked thread is skipped.
        assert_eq!(scheduler.preempt().unwrap().thread(), b);
        assert_eq!(scheduler.preempt().unwrap().thread(), ThreadId::MAIN);
        assert_eq!(scheduler.quantums(a), Ok(0));

        // Once resumed, it joins the back of the queue.
        assert_eq!(scheduler.resume(a), Ok(()));
        assert_eq!(scheduler.state(a), Ok(ThreadState::Ready));
        assert_eq!(scheduler.ready.iter().collect::<Vec<_>>(), [b, a]);
        assert_eq!(scheduler.preempt().unwrap().thread(), b);
        assert_eq!(scheduler.preempt().unwrap().thread(), a);
        assert_eq!(scheduler.quantums(a), Ok(1));
    }

    #[test]
    fn blocking_the_running_thread() {
        let mut scheduler = scheduler(&[100]);
        let a = spawn(&mut scheduler, 0);
        let to_a = scheduler.preempt().unwrap();
        assert_eq!(scheduler.running(), a);

        let handoff = scheduler.block(a).unwrap().unwrap();
        assert_eq!(handoff.thread(), ThreadId::MAIN);
        assert_eq!(handoff.from().map(|ctx| ctx as *const _), Some(to_a.to()));
        assert_eq!(scheduler.running(), ThreadId::MAIN);
        assert_eq!(scheduler.state(a), Ok(ThreadState::Blocked));
        assert_eq!(scheduler.total_quantums(), 3);

        // The blocked thread stays off the CPU until it is
        // resumed.
        assert_eq!(scheduler.preempt().unwrap().thread(), ThreadId::MAIN);
        scheduler.resume(a).unwrap();
        assert_eq!(scheduler.preempt().unwrap().thread(), a);
    }

    #[test]
    fn resuming_threads_that_are_not_blocked() {
        let mut scheduler = scheduler(&[100]);
        let a = spawn(&mut scheduler, 0);
        let b = spawn(&mut scheduler, 0);

        assert_eq!(scheduler.resume(ThreadId::MAIN), Ok(()));
        assert_eq!(scheduler.resume(a), Ok(()));
        assert_eq!(scheduler.state(ThreadId::MAIN), Ok(ThreadState::Running));
        assert_eq!(scheduler.ready.iter().collect::<Vec<_>>(), [a, b]);
    }

    #[test]
    fn terminating_other_threads() {
        let mut scheduler = scheduler(&[100]);
        let a = spawn(&mut scheduler, 0);
        let b = spawn(&mut scheduler, 0);
        let c = spawn(&mut scheduler, 0);
        scheduler.block(c).unwrap();

        assert!(matches!(scheduler.terminate(a), Ok(Termination::Removed)));
        assert!(matches!(scheduler.terminate(c), Ok(Termination::Removed)));
        assert_eq!(scheduler.quantums(a), Err(Error::NoSuchThread(a)));
        assert_eq!(scheduler.state(c), Err(Error::NoSuchThread(c)));
        assert_eq!(scheduler.ready.iter().collect::<Vec<_>>(), [b]);
        assert!(scheduler.pending_free.is_empty());

        assert_eq!(library_error(scheduler.terminate(a)), Error::NoSuchThread(a));
    }

    #[test]
    fn terminating_the_running_thread() {
        let mut scheduler = scheduler(&[100]);
        let a = spawn(&mut scheduler, 0);
        let b = spawn(&mut scheduler, 0);
        let _ = scheduler.preempt().unwrap();
        assert_eq!(scheduler.running(), a);

        let handoff = match scheduler.terminate(a) {
            Ok(Termination::Switch(handoff)) => handoff,
            other => panic!("unexpected termination: {:?}", other),
        };

        // There is nothing to save for a dead thread, but
        // its stack must outlive the switch away from it.
        assert!(handoff.from().is_none());
        assert_eq!(handoff.thread(), b);
        assert_eq!(scheduler.running(), b);
        assert_eq!(scheduler.pending_free.len(), 1);
        assert_eq!(scheduler.quantums(a), Err(Error::NoSuchThread(a)));

        // The dead thread is reaped by the next spawn,
        // which can then reuse its id.
        assert_eq!(spawn(&mut scheduler, 0), a);
        assert!(scheduler.pending_free.is_empty());
    }

    #[test]
    fn terminating_the_main_thread() {
        let mut scheduler = scheduler(&[100]);
        spawn(&mut scheduler, 0);
        assert!(matches!(scheduler.terminate(ThreadId::MAIN), Ok(Termination::Process)));

        // Termination of the process is left to the
        // caller, so nothing has changed yet.
        assert_eq!(scheduler.threads.len(), 2);
        assert_eq!(scheduler.shutdown(), 1);
    }

    #[test]
    fn changing_priority() {
        let mut scheduler = scheduler(&[100, 300]);
        let a = spawn(&mut scheduler, 0);

        assert_eq!(scheduler.change_priority(a, 2), Err(Error::InvalidPriority(2)));
        assert_eq!(scheduler.change_priority(id(9), 1), Err(Error::NoSuchThread(id(9))));
        assert_eq!(scheduler.change_priority(id(9), 5), Err(Error::NoSuchThread(id(9))));

        let to_a = scheduler.preempt().unwrap();
        assert_eq!(to_a.quantum(), Duration::from_micros(100));

        // Changing the running thread's priority leaves
        // its current quantum alone, and only applies
        // from its next dispatch.
        assert_eq!(scheduler.change_priority(a, 1), Ok(()));
        assert_eq!(scheduler.running(), a);
        assert_eq!(scheduler.preempt().unwrap().quantum(), Duration::from_micros(100));
        assert_eq!(scheduler.preempt().unwrap().quantum(), Duration::from_micros(300));

        assert_eq!(scheduler.change_priority(ThreadId::MAIN, 1), Ok(()));
        let to_main = scheduler.preempt().unwrap();
        assert_eq!(to_main.thread(), ThreadId::MAIN);
        assert_eq!(to_main.quantum(), Duration::from_micros(300));
    }

    #[test]
    fn running_out_of_ids() {
        let mut scheduler = scheduler(&[100]);
        for n in 1..MAX_THREADS {
            assert_eq!(spawn(&mut scheduler, 0), id(n));
        }

        let queued = scheduler.ready.len();
        let err = library_error(scheduler.spawn(Entry::Rust(nothing), 0));
        assert_eq!(err, Error::TooManyThreads(MAX_THREADS));
        assert_eq!(scheduler.threads.len(), MAX_THREADS);
        assert_eq!(scheduler.ready.len(), queued);

        // The id check comes before the priority check.
        let err = library_error(scheduler.spawn(Entry::Rust(nothing), 7));
        assert_eq!(err, Error::TooManyThreads(MAX_THREADS));
    }

    #[test]
    fn quanta_add_up() {
        let mut scheduler = scheduler(&[100, 100]);
        let f = spawn(&mut scheduler, 0);
        let g = spawn(&mut scheduler, 1);
        assert_eq!((f, g), (id(1), id(2)));

        for _ in 0..3 {
            let _ = scheduler.preempt().unwrap();
        }

        assert_eq!(scheduler.total_quantums(), 4);
        assert!(matches!(scheduler.terminate(f), Ok(Termination::Removed)));
        assert_eq!(scheduler.quantums(f), Err(Error::NoSuchThread(f)));

        let total: u64 = [ThreadId::MAIN, g]
            .iter()
            .map(|&id| scheduler.quantums(id).unwrap())
            .sum();
        assert_eq!(total + 1, scheduler.total_quantums());
    }

    #[test]
    fn shutting_down() {
        let mut scheduler = scheduler(&[100]);
        let a = spawn(&mut scheduler, 0);
        spawn(&mut scheduler, 0);
        spawn(&mut scheduler, 0);
        let _ = scheduler.preempt().unwrap();
        let _ = scheduler.preempt().unwrap();
        let _ = scheduler.terminate(id(2)).unwrap();
        assert_eq!(scheduler.running(), id(3));
        assert_eq!(scheduler.state(a), Ok(ThreadState::Ready));

        // The reaped thread, main and `a` are freed. The
        // running thread is leaked.
        assert_eq!(scheduler.shutdown(), 3);
    }
}

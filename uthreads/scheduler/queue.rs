// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the ready queue.

use crate::thread::ThreadId;
use crate::MAX_THREADS;
use std::collections::VecDeque;

/// ReadyQueue holds the threads waiting to run, in the
/// order they became ready.
///
/// The queue has room for every possible thread from the
/// start, so adding to it never allocates.
///
#[derive(Debug)]
pub struct ReadyQueue {
    runnable: VecDeque<ThreadId>,
}

impl ReadyQueue {
    pub fn new() -> ReadyQueue {
        ReadyQueue {
            runnable: VecDeque::with_capacity(MAX_THREADS),
        }
    }

    /// add queues a thread onto the back of the queue.
    ///
    pub fn add(&mut self, thread: ThreadId) {
        self.runnable.push_back(thread);
    }

    /// next returns the next thread able to run.
    ///
    /// The thread is removed from the queue, so it must
    /// be added again afterwards if still able to run.
    ///
    pub fn next(&mut self) -> Option<ThreadId> {
        self.runnable.pop_front()
    }

    /// remove removes the thread from the queue.
    ///
    pub fn remove(&mut self, thread: ThreadId) {
        self.runnable.retain(|id| *id != thread);
    }

    /// contains returns whether the thread is queued.
    ///
    pub fn contains(&self, thread: ThreadId) -> bool {
        self.runnable.contains(&thread)
    }

    pub fn len(&self) -> usize {
        self.runnable.len()
    }

    /// iter returns the queued threads, from the next to
    /// run to the last.
    ///
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.runnable.iter().copied()
    }
}

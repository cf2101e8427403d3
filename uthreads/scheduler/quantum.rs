// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Implements the table of quantum lengths, indexed by priority.

use crate::error::Error;
use std::time::Duration;

/// QuantumTable maps each priority to the length of the
/// quantum a thread with that priority receives.
///
/// The table is fixed at initialisation. Every entry is
/// a positive duration.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantumTable {
    quanta: Vec<Duration>,
}

impl QuantumTable {
    /// Builds the table from quantum lengths in
    /// microseconds.
    ///
    /// The table must have at least one entry, and every
    /// entry must be positive.
    ///
    pub fn from_micros(usecs: &[u32]) -> Result<Self, Error> {
        if usecs.is_empty() {
            return Err(Error::EmptyQuantumTable);
        }

        if let Some(index) = usecs.iter().position(|&usec| usec == 0) {
            return Err(Error::InvalidQuantum { index });
        }

        let quanta = usecs
            .iter()
            .map(|&usec| Duration::from_micros(u64::from(usec)))
            .collect();

        Ok(QuantumTable { quanta })
    }

    /// Returns the quantum for the given priority.
    ///
    pub fn get(&self, priority: usize) -> Option<Duration> {
        self.quanta.get(priority).copied()
    }

    /// Returns whether the priority has a quantum.
    ///
    pub fn contains(&self, priority: usize) -> bool {
        priority < self.quanta.len()
    }
}

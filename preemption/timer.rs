// Copyright 2024 The Firefly Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Arms and disarms the process's virtual interval timer.
//!
//! The virtual timer only counts down while the process executes in user
//! mode, so a quantum measures the CPU time a thread actually received.
//! Each arming is one-shot: when the timer expires it raises
//! [`SIGNAL`](crate::SIGNAL) once and then stays disarmed until it is armed
//! again.

use libc::{c_int, itimerval, suseconds_t, time_t, timeval};
use std::io;
use std::ptr;
use std::time::Duration;

// libc does not export the interval timer calls for
// every target, so we declare them ourselves.
//
extern "C" {
    fn setitimer(which: c_int, new_value: *const itimerval, old_value: *mut itimerval) -> c_int;
    fn getitimer(which: c_int, curr_value: *mut itimerval) -> c_int;
}

/// The timer that counts down while the process runs
/// in user mode, as numbered by Linux.
///
const ITIMER_VIRTUAL: c_int = 1;

/// The number of microseconds in one second.
///
const MICROSECONDS_PER_SECOND: u128 = 1_000_000;

/// The number of nanoseconds in one microsecond.
///
const NANOSECONDS_PER_MICROSECOND: u128 = 1_000;

/// Returns the smallest `timeval` no shorter than `duration`.
///
/// Sub-microsecond remainders are rounded up, so a non-zero
/// duration never becomes a zero `timeval` (which would
/// disarm the timer instead).
///
pub fn timeval_from(duration: Duration) -> timeval {
    let micros = (duration.as_nanos() + (NANOSECONDS_PER_MICROSECOND - 1)) / NANOSECONDS_PER_MICROSECOND;
    let secs = micros / MICROSECONDS_PER_SECOND;
    let usecs = micros % MICROSECONDS_PER_SECOND;

    timeval {
        tv_sec: time_t::try_from(secs).unwrap_or(time_t::MAX),
        tv_usec: suseconds_t::try_from(usecs).unwrap_or(0),
    }
}

/// Returns the duration described by `value`.
///
pub fn duration_from(value: &timeval) -> Duration {
    let secs = u64::try_from(value.tv_sec).unwrap_or(0);
    let usecs = u64::try_from(value.tv_usec).unwrap_or(0);

    Duration::from_secs(secs) + Duration::from_micros(usecs)
}

fn set(value: timeval) -> io::Result<()> {
    let timer = itimerval {
        it_interval: timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        it_value: value,
    };

    if unsafe { setitimer(ITIMER_VIRTUAL, &timer, ptr::null_mut()) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Starts a new quantum, raising the preemption signal once
/// the process has spent `quantum` executing in user mode.
///
/// Any quantum already in progress is replaced.
///
pub fn arm(quantum: Duration) -> io::Result<()> {
    set(timeval_from(quantum))
}

/// Cancels the quantum in progress, if any.
///
pub fn disarm() -> io::Result<()> {
    set(timeval {
        tv_sec: 0,
        tv_usec: 0,
    })
}

/// Returns the time left before the current quantum
/// expires, or zero if the timer is disarmed.
///
pub fn remaining() -> io::Result<Duration> {
    let mut current = itimerval {
        it_interval: timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
        it_value: timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
    };

    if unsafe { getitimer(ITIMER_VIRTUAL, &mut current) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(duration_from(&current.it_value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        let value = timeval_from(Duration::from_micros(100));
        assert_eq!(value.tv_sec, 0);
        assert_eq!(value.tv_usec, 100);

        let value = timeval_from(Duration::from_micros(2_500_001));
        assert_eq!(value.tv_sec, 2);
        assert_eq!(value.tv_usec, 500_001);
        assert_eq!(duration_from(&value), Duration::from_micros(2_500_001));

        // Partial microseconds round up rather than
        // producing a zero timeval.
        let value = timeval_from(Duration::from_nanos(1));
        assert_eq!(value.tv_sec, 0);
        assert_eq!(value.tv_usec, 1);

        let value = timeval_from(Duration::ZERO);
        assert_eq!(value.tv_sec, 0);
        assert_eq!(value.tv_usec, 0);
    }

    #[test]
    fn arm_and_disarm() {
        // The quantum is far longer than this test could
        // ever run, so the signal is never raised.
        arm(Duration::from_secs(60)).unwrap();
        let left = remaining().unwrap();
        assert!(left > Duration::from_secs(50));

        // The kernel rounds the expiry up to its next
        // tick, so a little more than we asked for may
        // be reported.
        assert!(left <= Duration::from_secs(60) + Duration::from_millis(20));

        disarm().unwrap();
        assert_eq!(remaining().unwrap(), Duration::ZERO);
    }
}

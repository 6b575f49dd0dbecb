//! Runtime support for kiln-generated code.
//!
//! Generated functions call these symbols by name. The JIT maps them into the
//! execution engine; ahead-of-time objects link against this crate.
//!
//! # Clock
//!
//! [`kiln_start_clock`] records a reference epoch from the realtime clock the
//! first time it is called. [`kiln_current_time_ns`] returns nanoseconds
//! elapsed since that epoch. Before the clock is started the epoch is zero,
//! so readings are absolute realtime nanoseconds.

#![allow(unsafe_code)]

use std::sync::OnceLock;

/// Symbol name of [`kiln_start_clock`].
pub const START_CLOCK_SYMBOL: &str = "kiln_start_clock";
/// Symbol name of [`kiln_current_time_ns`].
pub const CURRENT_TIME_SYMBOL: &str = "kiln_current_time_ns";

/// Reference epoch as `(seconds, nanoseconds)`.
static EPOCH: OnceLock<(i64, i64)> = OnceLock::new();

#[cfg(target_os = "linux")]
fn realtime() -> (i64, i64) {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    unsafe {
        libc::syscall(
            libc::SYS_clock_gettime,
            libc::CLOCK_REALTIME,
            &mut ts as *mut libc::timespec,
        );
    }
    (i64::from(ts.tv_sec), i64::from(ts.tv_nsec))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn realtime() -> (i64, i64) {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts);
    }
    (i64::from(ts.tv_sec), i64::from(ts.tv_nsec))
}

#[cfg(not(unix))]
fn realtime() -> (i64, i64) {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs() as i64, i64::from(now.subsec_nanos()))
}

/// Record the reference epoch. Only the first call has an effect.
///
/// Always returns 0.
#[no_mangle]
pub extern "C" fn kiln_start_clock() -> i32 {
    EPOCH.get_or_init(|| {
        let epoch = realtime();
        tracing::debug!(sec = epoch.0, nsec = epoch.1, "reference clock started");
        epoch
    });
    0
}

/// Nanoseconds since the reference epoch.
#[no_mangle]
pub extern "C" fn kiln_current_time_ns() -> i64 {
    let (sec, nsec) = realtime();
    let (epoch_sec, epoch_nsec) = EPOCH.get().copied().unwrap_or((0, 0));
    (sec - epoch_sec) * 1_000_000_000 + (nsec - epoch_nsec)
}

/// Whether [`kiln_start_clock`] has been called in this process.
pub fn clock_started() -> bool {
    EPOCH.get().is_some()
}

/// `(symbol, address)` pairs for every runtime function, for JIT mapping.
pub fn symbols() -> [(&'static str, usize); 2] {
    [
        (START_CLOCK_SYMBOL, kiln_start_clock as *const () as usize),
        (CURRENT_TIME_SYMBOL, kiln_current_time_ns as *const () as usize),
    ]
}

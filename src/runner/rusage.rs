//! Per-child resource accounting.
//!
//! Every validator is reaped with `wait4(pid)`, which returns the rusage of
//! that one child (including the descendants it waited for itself). This
//! avoids sampling `RUSAGE_CHILDREN` before and after a job, which is global to
//! the harness and mixes in other workers' children when several jobs are
//! reaped close together.
//!
//! # Limitations
//!
//! - Descendants the validator forked but never waited for are not included.
//!   The harness kills them with the process group sweep, but their CPU time
//!   is lost to the accounting.
//! - `ru_maxrss` is the peak RSS of the largest single process in the tree,
//!   not the peak of their sum.

use super::types::JobUsage;
use anyhow::{Result, anyhow};
use std::io;
use std::time::Duration;

/// A reaped child: its raw wait status and accounted usage.
#[derive(Debug, Clone, Copy)]
pub struct Reaped {
    pub status: libc::c_int,
    pub usage: JobUsage,
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    let secs = if tv.tv_sec < 0 { 0 } else { tv.tv_sec as u64 };
    let usec = tv.tv_usec.clamp(0, 999_999) as u64;
    Duration::from_secs(secs) + Duration::from_micros(usec)
}

/// `ru_maxrss` is KiB on Linux and the BSDs, bytes on macOS.
fn maxrss_to_kb(ru_maxrss: libc::c_long) -> u64 {
    let rss = if ru_maxrss <= 0 { 0 } else { ru_maxrss as u64 };

    #[cfg(target_os = "macos")]
    {
        rss / 1024
    }

    #[cfg(not(target_os = "macos"))]
    {
        rss
    }
}

fn usage_from(ru: &libc::rusage) -> JobUsage {
    JobUsage {
        user_time: timeval_to_duration(ru.ru_utime),
        sys_time: timeval_to_duration(ru.ru_stime),
        peak_memory_kb: maxrss_to_kb(ru.ru_maxrss),
    }
}

/// Reaps `pid` if it has terminated. With `block` set, waits until it does.
///
/// Returns `Ok(None)` only in non-blocking mode while the child is running.
pub fn reap(pid: libc::pid_t, block: bool) -> Result<Option<Reaped>> {
    let flags = if block { 0 } else { libc::WNOHANG };
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: zeroed rusage is a valid out-parameter and both pointers
        // outlive the call.
        let (rc, ru) = unsafe {
            let mut ru: libc::rusage = std::mem::zeroed();
            let rc = libc::wait4(pid, &mut status, flags, &mut ru);
            (rc, ru)
        };

        if rc == pid {
            return Ok(Some(Reaped {
                status,
                usage: usage_from(&ru),
            }));
        }
        if rc == 0 {
            return Ok(None);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(anyhow!("wait4({pid}) failed: {err}"));
    }
}

/// Sends `signal` to every process in the group led by `pgid`.
///
/// Returns `false` when the group no longer exists.
pub fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> bool {
    // SAFETY: killpg has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pgid, signal) };
    rc == 0
}

//! Process reaping with OS resource accounting.
//!
//! `std::process::Child::wait` discards the kernel's resource usage record,
//! so the child is reaped here with `wait4(2)` instead.

#![allow(unsafe_code)]

use std::io;
use std::mem::MaybeUninit;
use std::time::Duration;

use crate::core::event::ResourceUsage;

/// How a reaped process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Normal exit with a status code.
    Code(i32),
    /// Terminated by a signal.
    Signal(i32),
}

/// Block until `pid` exits, returning its exit kind and resource usage.
///
/// Must be called at most once per child, and never on a child that was
/// already reaped by other means.
///
/// # Errors
///
/// The `wait4` error, other than `EINTR` which is retried.
pub fn wait_with_usage(pid: libc::pid_t) -> io::Result<(ExitKind, ResourceUsage)> {
    let mut status: libc::c_int = 0;
    let mut usage = MaybeUninit::<libc::rusage>::zeroed();

    loop {
        // SAFETY: status and usage point to live, writable locals
        let rc = unsafe { libc::wait4(pid, &mut status, 0, usage.as_mut_ptr()) };
        if rc == pid {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }

    // SAFETY: wait4 succeeded, usage is initialized (and was zeroed before)
    let usage = unsafe { usage.assume_init() };

    let kind = if libc::WIFEXITED(status) {
        ExitKind::Code(libc::WEXITSTATUS(status))
    } else if libc::WIFSIGNALED(status) {
        ExitKind::Signal(libc::WTERMSIG(status))
    } else {
        ExitKind::Signal(0)
    };

    Ok((kind, to_resource_usage(&usage)))
}

/// Send `SIGKILL` to the whole process group led by `pid`.
///
/// A group that is already gone is not an error.
///
/// # Errors
///
/// The `killpg` error other than `ESRCH`.
pub fn kill_group(pid: libc::pid_t) -> io::Result<()> {
    // SAFETY: killpg takes plain integers and only sends a signal
    let rc = unsafe { libc::killpg(pid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[allow(clippy::unnecessary_cast)] // field types vary by platform
fn to_resource_usage(ru: &libc::rusage) -> ResourceUsage {
    let max_rss = u64::try_from(ru.ru_maxrss as i64).unwrap_or(0);
    // Linux reports KiB, macOS reports bytes
    let max_rss_bytes = if cfg!(target_os = "macos") {
        max_rss
    } else {
        max_rss.saturating_mul(1024)
    };

    ResourceUsage {
        max_rss_bytes,
        user_time: timeval_to_duration(&ru.ru_utime),
        system_time: timeval_to_duration(&ru.ru_stime),
    }
}

#[allow(clippy::unnecessary_cast)]
fn timeval_to_duration(tv: &libc::timeval) -> Duration {
    let secs = u64::try_from(tv.tv_sec as i64).unwrap_or(0);
    let micros = u64::try_from(tv.tv_usec as i64).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(micros)
}

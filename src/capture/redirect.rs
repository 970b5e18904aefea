//! Temporary redirection of this process's stdout into the line capture.
//!
//! Used by in-process probes, which print straight to fd 1. While a
//! redirection is active, fd 1 is the write end of a pipe drained by a
//! reader thread. The original fd is put back by a drop guard, so it is
//! restored on every exit path including a panic in the probe.
//!
//! fd 1 is process-global: only one redirection may be active at a time,
//! enforced by [`REDIRECT_LOCK`].

use std::panic::{self, AssertUnwindSafe};

use parking_lot::{Mutex, MutexGuard};

use super::LineCallback;
use crate::error::{Error, Result};

/// Serializes redirections of the process-wide stdout
static REDIRECT_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` with stdout captured line by line into `on_line`.
///
/// The outer `Result` reports redirection failures; the inner one carries a
/// panic from `f`, already caught and with stdout restored.
pub fn capture_stdout<F, T>(on_line: LineCallback, f: F) -> Result<std::thread::Result<T>>
where
    F: FnOnce() -> T,
{
    let _lock = REDIRECT_LOCK.lock();
    imp::capture_stdout(on_line, f)
}

/// Wait out any active redirection and keep new ones from starting.
///
/// Writers to the real stdout hold this so their text is not swallowed by
/// a probe's capture.
pub fn hold_stdout() -> MutexGuard<'static, ()> {
    REDIRECT_LOCK.lock()
}

#[cfg(unix)]
mod imp {
    use super::*;

    use std::fs::File;
    use std::io::Write;
    use std::os::unix::io::{FromRawFd, RawFd};
    use std::thread;

    use tracing::{debug, warn};

    use crate::capture::pump_blocking;

    /// Create a pipe pair, returning (read_fd, write_fd).
    fn create_pipe() -> std::io::Result<(RawFd, RawFd)> {
        let mut fds = [0 as RawFd; 2];
        let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
        // Keep helper children from inheriting either end
        for &fd in &fds {
            unsafe {
                let flags = libc::fcntl(fd, libc::F_GETFD);
                libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
            }
        }
        Ok((fds[0], fds[1]))
    }

    fn close_fd(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    /// Holds the saved stdout; puts it back on drop
    struct Restore {
        saved: RawFd,
    }

    impl Drop for Restore {
        fn drop(&mut self) {
            let _ = std::io::stdout().flush();
            // Replacing fd 1 closes the last write end, so the reader sees EOF
            if unsafe { libc::dup2(self.saved, libc::STDOUT_FILENO) } < 0 {
                warn!(error = %std::io::Error::last_os_error(), "Failed to restore stdout");
            }
            close_fd(self.saved);
        }
    }

    pub(super) fn capture_stdout<F, T>(on_line: LineCallback, f: F) -> Result<thread::Result<T>>
    where
        F: FnOnce() -> T,
    {
        let _ = std::io::stdout().flush();

        let (read_fd, write_fd) =
            create_pipe().map_err(|e| Error::Redirect(format!("pipe: {}", e)))?;

        let saved = unsafe { libc::dup(libc::STDOUT_FILENO) };
        if saved < 0 {
            let e = std::io::Error::last_os_error();
            close_fd(read_fd);
            close_fd(write_fd);
            return Err(Error::Redirect(format!("dup stdout: {}", e)));
        }

        if unsafe { libc::dup2(write_fd, libc::STDOUT_FILENO) } < 0 {
            let e = std::io::Error::last_os_error();
            close_fd(read_fd);
            close_fd(write_fd);
            close_fd(saved);
            return Err(Error::Redirect(format!("dup2 stdout: {}", e)));
        }
        // fd 1 is now the only write end
        close_fd(write_fd);
        let restore = Restore { saved };

        // SAFETY: read_fd is a fresh pipe end owned by nothing else
        let reader = unsafe { File::from_raw_fd(read_fd) };
        let drain = thread::Builder::new()
            .name("hostprobe-capture".to_string())
            .spawn(move || pump_blocking(reader, &on_line))
            .map_err(|e| Error::Redirect(format!("spawn reader: {}", e)))?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        drop(restore);

        match drain.join() {
            Ok(bytes) => debug!(bytes, "Captured in-process stdout"),
            Err(_) => warn!("Capture reader thread panicked"),
        }
        Ok(outcome)
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;

    pub(super) fn capture_stdout<F, T>(_on_line: LineCallback, _f: F) -> Result<std::thread::Result<T>>
    where
        F: FnOnce() -> T,
    {
        Err(Error::Redirect(
            "stdout redirection needs POSIX file descriptors".to_string(),
        ))
    }
}

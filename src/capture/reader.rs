//! Stream readers feeding a [`LineBuffer`].
//!
//! A zero-length read is end of stream. `Interrupted` is retried; any other
//! read error is treated as end of stream (the partial line is flushed and
//! reading stops).

use std::io::{ErrorKind, Read};
use std::process::ExitStatus;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tracing::debug;

use super::{LineBuffer, LineCallback};

const READ_CHUNK: usize = 8 * 1024;

/// Read `reader` to the end, delivering lines to `on_line`.
///
/// Returns the number of bytes read.
pub async fn pump<R>(mut reader: R, on_line: &LineCallback) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut lines = LineBuffer::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                total += n as u64;
                if let Some(text) = lines.push(&buf[..n]) {
                    on_line(&text);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "Stream read failed, treating as end of stream");
                break;
            }
        }
    }

    if let Some(rest) = lines.finish() {
        on_line(&rest);
    }
    total
}

/// Blocking counterpart of [`pump`], for pipe ends read on a plain thread
pub fn pump_blocking<R: Read>(mut reader: R, on_line: &LineCallback) -> u64 {
    let mut lines = LineBuffer::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                total += n as u64;
                if let Some(text) = lines.push(&buf[..n]) {
                    on_line(&text);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "Stream read failed, treating as end of stream");
                break;
            }
        }
    }

    if let Some(rest) = lines.finish() {
        on_line(&rest);
    }
    total
}

/// Capture a spawned child's stdout and stderr until both close, then reap
/// it.
///
/// The two streams are read concurrently and share `on_line`. The exit
/// status is only collected after both readers reach end of stream.
pub async fn capture_child(child: &mut Child, on_line: &LineCallback) -> std::io::Result<ExitStatus> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out = async {
        match stdout {
            Some(s) => pump(s, on_line).await,
            None => 0,
        }
    };
    let err = async {
        match stderr {
            Some(s) => pump(s, on_line).await,
            None => 0,
        }
    };
    let (out_bytes, err_bytes) = tokio::join!(out, err);
    debug!(stdout_bytes = out_bytes, stderr_bytes = err_bytes, "Child streams closed");

    child.wait().await
}

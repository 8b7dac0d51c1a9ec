//! Child process plumbing for the journal command sources.
//!
//! A collector command (`journalctl`, or `ssh` running journalctl remotely)
//! is spawned with its stdout piped into the journal record decoder.
//! Stopping is cooperative: the child receives `SIGINT` (the stop signal
//! journalctl handles cleanly), its stdout reaches end-of-file, and the
//! child is reaped when the stream is dropped.

use super::Closer;
use crate::error::{Result, WeirError};
use crate::records::{JournalRecords, RawRecord};
use std::io::BufReader;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct ChildHandle {
    pid: u32,
    reaped: AtomicBool,
}

impl ChildHandle {
    fn interrupt(&self) {
        if self.reaped.load(Ordering::Acquire) {
            return;
        }
        // SAFETY: a plain signal send; the pid is not recycled before
        // `reaped` is set, which happens just before the wait.
        unsafe {
            libc::kill(self.pid as libc::pid_t, libc::SIGINT);
        }
    }
}

struct ChildGuard {
    child: Child,
    handle: Arc<ChildHandle>,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.handle.interrupt();
        self.handle.reaped.store(true, Ordering::Release);
        if let Err(e) = self.child.wait() {
            tracing::warn!(error = %e, "failed to reap collector command");
        }
    }
}

/// Records decoded from a spawned collector command's stdout.
///
/// Dropping the stream interrupts and reaps the child. Field order
/// matters: the decoder (and with it the stdout pipe) goes first, so the
/// child sees the pipe close before it is waited on.
pub(crate) struct CommandStream {
    records: JournalRecords<BufReader<ChildStdout>>,
    _guard: ChildGuard,
}

impl std::fmt::Debug for CommandStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStream").finish_non_exhaustive()
    }
}

impl Iterator for CommandStream {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}

/// Spawn `command` and decode its stdout as a journal export stream.
///
/// Returns the stream and a [`Closer`] that interrupts the child to
/// unblock a pending read.
pub(crate) fn spawn(mut command: Command, docker_aware: bool) -> Result<(CommandStream, Closer)> {
    let program = command.get_program().to_string_lossy().into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = command.spawn().map_err(|e| WeirError::Spawn {
        program,
        cause: e.to_string(),
    })?;
    let stdout = child.stdout.take().expect("stdout was piped");

    let handle = Arc::new(ChildHandle {
        pid: child.id(),
        reaped: AtomicBool::new(false),
    });

    let closer = {
        let handle = Arc::clone(&handle);
        Closer::new(move || handle.interrupt())
    };

    let stream = CommandStream {
        records: JournalRecords::new(BufReader::new(stdout), docker_aware),
        _guard: ChildGuard { child, handle },
    };

    Ok((stream, closer))
}

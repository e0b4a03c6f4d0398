//! PTY allocation and child spawning.
//!
//! A spawned child owns the slave side as its controlling terminal; the
//! handle here owns the master plus the child. The master is switched to
//! O_NONBLOCK so the single-threaded tick loop can poll it freely; the
//! cloned reader shares the master's file description, so one F_SETFL
//! covers both.

use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;

use indexmap::IndexMap;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

#[derive(Debug)]
pub enum PtyError {
    SpawnFailed { cause: String },
    ResizeFailed(String),
    Io(std::io::Error),
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::SpawnFailed { cause } => write!(f, "PTY spawn failed: {cause}"),
            PtyError::ResizeFailed(cause) => write!(f, "PTY resize failed: {cause}"),
            PtyError::Io(err) => write!(f, "PTY I/O error: {err}"),
        }
    }
}

impl std::error::Error for PtyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtyError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PtyError {
    fn from(err: std::io::Error) -> Self {
        PtyError::Io(err)
    }
}

/// Exit record of a finished child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub code: u32,
}

impl ChildExit {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

impl std::fmt::Display for ChildExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exit={}", self.code)
    }
}

/// A spawned child and its PTY master. Exclusively owned by one process
/// controller; dropping the handle closes the master.
pub struct ChildHandle {
    master: Box<dyn MasterPty + Send>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    pid: Option<u32>,
    started_at: Instant,
    exit: Option<ChildExit>,
}

impl std::fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildHandle")
            .field("pid", &self.pid)
            .field("started_at", &self.started_at)
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

impl ChildHandle {
    /// Allocate a PTY pair and spawn `argv` on the slave side with the
    /// given dimensions. The environment always carries `FORCE_COLOR=1`,
    /// `COLUMNS` and `LINES`; caller-provided values win on collision.
    pub fn spawn(
        argv: &[String],
        env: &IndexMap<String, String>,
        cwd: Option<&Path>,
        cols: u16,
        rows: u16,
    ) -> Result<Self, PtyError> {
        let Some(program) = argv.first() else {
            return Err(PtyError::SpawnFailed {
                cause: "empty argv".to_owned(),
            });
        };

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| PtyError::SpawnFailed {
                cause: format!("failed to open PTY: {err}"),
            })?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(&argv[1..]);
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("FORCE_COLOR", "1");
        cmd.env("COLUMNS", cols.to_string());
        cmd.env("LINES", rows.to_string());
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|err| PtyError::SpawnFailed {
                cause: format!("failed to spawn command: {err}"),
            })?;
        // The parent keeps only the master side.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| PtyError::SpawnFailed {
                cause: format!("failed to clone reader: {err}"),
            })?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|err| PtyError::SpawnFailed {
                cause: format!("failed to take writer: {err}"),
            })?;

        let fd = pair.master.as_raw_fd().ok_or_else(|| PtyError::SpawnFailed {
            cause: "PTY master exposes no file descriptor".to_owned(),
        })?;
        set_nonblocking(fd).map_err(|err| PtyError::SpawnFailed {
            cause: format!("failed to set O_NONBLOCK on PTY master: {err}"),
        })?;

        let pid = child.process_id();
        Ok(Self {
            master: pair.master,
            reader,
            writer,
            child,
            pid,
            started_at: Instant::now(),
            exit: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Issue a window-size update to the PTY; the child receives SIGWINCH.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| PtyError::ResizeFailed(err.to_string()))
    }

    /// Non-blocking PTY reader for the output ingestor.
    pub fn reader_mut(&mut self) -> &mut (dyn Read + Send) {
        &mut *self.reader
    }

    /// Write keystrokes to the child's stdin.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Non-blocking liveness poll; the exit record is cached once seen.
    pub fn poll_exit(&mut self) -> Option<ChildExit> {
        if self.exit.is_some() {
            return self.exit;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(ChildExit {
                    code: status.exit_code(),
                });
                self.exit
            }
            Ok(None) => None,
            Err(err) => {
                tracing::debug!("try_wait failed, treating child as exited: {err}");
                self.exit = Some(ChildExit { code: 1 });
                self.exit
            }
        }
    }
}

fn set_nonblocking(fd: std::os::unix::io::RawFd) -> nix::Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_retain(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

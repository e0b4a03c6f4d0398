//! Per-tab process supervision.
//!
//! One controller owns one child at a time and is driven by the host's
//! periodic tick: it services PTY output, polls liveness, and walks the
//! stop state machine (SIGTERM, five second grace, SIGKILL, descendant
//! reaping). Nothing here blocks.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use nix::sys::signal::Signal;

use crate::ingest::{OutputIngestor, PumpStatus};
use crate::input::{InputRouter, Routed, RouterMode};
use crate::proctree;
use crate::pty::{ChildExit, ChildHandle, PtyError};
use crate::term::ScreenBuffer;

/// How long a SIGTERMed child gets before SIGKILL.
pub const STOP_GRACE_TIMEOUT: Duration = Duration::from_secs(5);

/// Floor between consecutive "Waiting..." notices while stopping.
const WAIT_NOTICE_INTERVAL: Duration = Duration::from_millis(40);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    ForceKilling,
    Terminated,
}

/// What to run in a tab.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: String,
    pub run: String,
    pub cwd: Option<PathBuf>,
    pub autostart: bool,
    pub env: IndexMap<String, String>,
}

impl ProcessSpec {
    fn argv(&self) -> Vec<String> {
        vec!["sh".to_owned(), "-lc".to_owned(), self.run.clone()]
    }
}

/// Deferred zero-argument action run once the controller re-enters
/// `Stopped`; the queue hands the controller back to each action.
type DeferredAction = Box<dyn FnOnce(&mut ProcessController)>;

pub struct ProcessController {
    spec: ProcessSpec,
    cols: u16,
    rows: u16,
    state: ProcessState,
    handle: Option<ChildHandle>,
    screen: ScreenBuffer,
    ingestor: OutputIngestor,
    router: InputRouter,
    focused: bool,
    autostart_enabled: bool,
    stop_initiated_at: Option<Instant>,
    stop_snapshot: HashSet<u32>,
    last_wait_notice: Option<Instant>,
    after_terminate: Vec<DeferredAction>,
    grace_timeout: Duration,
    last_exit: Option<String>,
    pty_lost: bool,
}

impl ProcessController {
    pub fn new(spec: ProcessSpec, cols: u16, rows: u16, scrollback: usize) -> Self {
        Self {
            spec,
            cols,
            rows,
            state: ProcessState::Stopped,
            handle: None,
            screen: ScreenBuffer::with_scrollback(cols, rows, scrollback),
            ingestor: OutputIngestor::new(),
            router: InputRouter::new(cols),
            focused: false,
            autostart_enabled: true,
            stop_initiated_at: None,
            stop_snapshot: HashSet::new(),
            last_wait_notice: None,
            after_terminate: Vec::new(),
            grace_timeout: STOP_GRACE_TIMEOUT,
            last_exit: None,
            pty_lost: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn running(&self) -> bool {
        matches!(
            self.state,
            ProcessState::Starting
                | ProcessState::Running
                | ProcessState::Stopping
                | ProcessState::ForceKilling
        )
    }

    pub fn screen(&self) -> &ScreenBuffer {
        &self.screen
    }

    pub fn mode(&self) -> RouterMode {
        self.router.mode()
    }

    pub fn set_mode(&mut self, mode: RouterMode) {
        self.router.set_mode(mode);
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn blur(&mut self) {
        self.focused = false;
        // Leaving the tab also leaves interactive mode.
        self.router.set_mode(RouterMode::Passive);
    }

    pub fn exit_diagnostic(&self) -> Option<&str> {
        self.last_exit.as_deref()
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.handle.as_ref().map(|h| h.started_at().elapsed())
    }

    /// Quit suppresses autostart so stopped tabs stay stopped.
    pub fn set_autostart_enabled(&mut self, enabled: bool) {
        self.autostart_enabled = enabled;
    }

    /// Spawn the child. Only valid from `Stopped`.
    pub fn start(&mut self) {
        if self.state != ProcessState::Stopped {
            return;
        }
        self.state = ProcessState::Starting;
        self.last_exit = None;
        self.pty_lost = false;
        match ChildHandle::spawn(
            &self.spec.argv(),
            &self.spec.env,
            self.spec.cwd.as_deref(),
            self.cols,
            self.rows,
        ) {
            Ok(handle) => {
                tracing::info!(
                    process = %self.spec.name,
                    pid = handle.pid(),
                    "process started"
                );
                self.handle = Some(handle);
                self.state = ProcessState::Running;
            }
            Err(err) => {
                tracing::info!(process = %self.spec.name, "spawn failed: {err}");
                self.status(&format!("Failed to start: {err}"));
                self.state = ProcessState::Terminated;
                self.last_exit = Some("spawn-failed".to_owned());
                self.finish_termination();
            }
        }
    }

    /// Begin a graceful stop: snapshot descendants, SIGTERM the root.
    /// Idempotent while already stopping.
    pub fn stop(&mut self) {
        match self.state {
            ProcessState::Starting | ProcessState::Running => {}
            _ => return,
        }
        let pid = self.handle.as_ref().and_then(ChildHandle::pid);
        self.stop_snapshot = pid.map(proctree::descendants).unwrap_or_default();
        self.stop_initiated_at = Some(Instant::now());
        self.last_wait_notice = None;
        if let Some(pid) = pid {
            let mut root = HashSet::new();
            root.insert(pid);
            proctree::signal_all(&root, Signal::SIGTERM);
        }
        self.state = ProcessState::Stopping;
        self.status("Stopping process...");
    }

    /// Stop, then start again once the child is fully gone.
    pub fn restart(&mut self) {
        if self.state == ProcessState::Stopped {
            self.start();
            return;
        }
        self.after_terminate.push(Box::new(|controller| {
            controller.start();
        }));
        self.stop();
    }

    pub fn toggle(&mut self) {
        if self.running() {
            self.stop();
        } else if self.state == ProcessState::Stopped {
            self.start();
        }
    }

    /// One supervision pass: autostart, output servicing, liveness, and
    /// the stopping-state reconciliation.
    pub fn tick(&mut self) {
        if self.state == ProcessState::Stopped && self.autostart_enabled && self.spec.autostart {
            self.start();
        }

        if let Some(handle) = self.handle.as_mut() {
            match self.ingestor.pump(handle.reader_mut(), &mut self.screen) {
                PumpStatus::Eof => self.pty_lost = true,
                PumpStatus::Failed(err) => {
                    tracing::debug!(process = %self.spec.name, "PTY read failed: {err}");
                    self.pty_lost = true;
                }
                PumpStatus::Idle | PumpStatus::Progressed => {}
            }
        }

        if let Some(exit) = self.handle.as_mut().and_then(ChildHandle::poll_exit) {
            self.on_child_exit(Some(exit));
            return;
        }
        if self.pty_lost && self.handle.is_some() {
            // Read failure is treated as child death even before the exit
            // status is reapable.
            self.on_child_exit(None);
            return;
        }

        if self.state == ProcessState::Stopping {
            let waited = self
                .stop_initiated_at
                .map(|at| at.elapsed())
                .unwrap_or_default();
            if waited >= self.grace_timeout {
                let pid = self.handle.as_ref().and_then(ChildHandle::pid);
                if let Some(pid) = pid {
                    let mut root = HashSet::new();
                    root.insert(pid);
                    proctree::signal_all(&root, Signal::SIGKILL);
                }
                self.state = ProcessState::ForceKilling;
                self.status("Force killing!");
            } else if self
                .last_wait_notice
                .map_or(true, |at| at.elapsed() >= WAIT_NOTICE_INTERVAL)
            {
                self.last_wait_notice = Some(Instant::now());
                self.status("Waiting...");
            }
        }
    }

    fn on_child_exit(&mut self, exit: Option<ChildExit>) {
        let was_stopping = matches!(
            self.state,
            ProcessState::Stopping | ProcessState::ForceKilling
        );
        let diagnostic = match (self.state, exit) {
            (_, Some(exit)) if exit.success() => "exit=0".to_owned(),
            (ProcessState::ForceKilling, _) => "signal=9".to_owned(),
            (ProcessState::Stopping, _) => "signal=15".to_owned(),
            (_, Some(exit)) => exit.to_string(),
            (_, None) => "pty-closed".to_owned(),
        };
        tracing::info!(process = %self.spec.name, %diagnostic, "process terminated");
        self.state = ProcessState::Terminated;
        self.last_exit = Some(diagnostic.clone());
        if was_stopping {
            self.status("Stopped.");
        } else {
            self.status(&format!("Process exited ({diagnostic})."));
        }
        self.finish_termination();
    }

    /// Terminated -> Stopped: release the PTY, reap snapshotted
    /// descendants, then run the deferred actions exactly once, FIFO.
    fn finish_termination(&mut self) {
        self.handle = None;
        self.pty_lost = false;
        self.stop_initiated_at = None;
        self.router.set_mode(RouterMode::Passive);

        let stragglers: HashSet<u32> = self
            .stop_snapshot
            .drain()
            .filter(|&pid| proctree::alive(pid))
            .collect();
        if !stragglers.is_empty() {
            tracing::info!(
                process = %self.spec.name,
                count = stragglers.len(),
                "reaping leftover descendants"
            );
            proctree::signal_all(&stragglers, Signal::SIGKILL);
        }

        self.state = ProcessState::Stopped;
        let actions: Vec<DeferredAction> = self.after_terminate.drain(..).collect();
        for action in actions {
            action(self);
        }
    }

    /// Host keystrokes for the focused tab, routed per the current mode.
    pub fn send_input(&mut self, bytes: &[u8]) -> Result<(), PtyError> {
        match self.router.route(bytes) {
            Routed::Forward(payload) => self.write_pty(&payload),
            Routed::ExitInteractive | Routed::Discard => Ok(()),
        }
    }

    /// Explicit pass-through for command-specific hotkeys; works in
    /// passive mode too, as long as the child is alive.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), PtyError> {
        self.write_pty(bytes)
    }

    fn write_pty(&mut self, bytes: &[u8]) -> Result<(), PtyError> {
        match self.handle.as_mut() {
            Some(handle) => handle.write(bytes),
            None => Ok(()),
        }
    }

    pub fn set_dimensions(&mut self, cols: u16, rows: u16) {
        if cols == self.cols && rows == self.rows {
            return;
        }
        self.cols = cols;
        self.rows = rows;
        self.screen.resize(cols, rows);
        self.router.set_screen_width(cols);
        if let Some(handle) = &self.handle {
            if let Err(err) = handle.resize(cols, rows) {
                tracing::debug!(process = %self.spec.name, "resize failed: {err}");
            }
        }
    }

    /// Rendered pane contents, `offset` rows scrolled back from live.
    pub fn render_lines(&self, offset: usize) -> Vec<String> {
        self.screen.render_lines(offset)
    }

    /// Status lines share the pane; the child's pen survives them.
    fn status(&mut self, message: &str) {
        let pen = self.screen.pen();
        let line = format!("\r\n\x1b[2m[manifold] {message}\x1b[0m\r\n");
        self.ingestor.accept(line.as_bytes(), &mut self.screen);
        *self.screen.pen_mut() = pen;
    }
}

/// Diagnostics produced by our own SIGTERM/SIGKILL are not failures.
pub fn is_expected_shutdown_diagnostic(diagnostic: &str) -> bool {
    matches!(diagnostic, "signal=15" | "signal=9")
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;

//! The host event loop: one tab per supervised process.
//!
//! Everything runs on one thread. Each pass drains signal flags, ticks
//! every controller (which services its PTY without blocking), renders a
//! frame, and then parks briefly in the input poll: about 40 frames per
//! second, tighter while a tab is interactive.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGWINCH};

use crate::config::Config;
use crate::controller::{ProcessController, ProcessSpec, ProcessState};
use crate::input::RouterMode;
use crate::theme::{resolve_color_enabled, styled, OutputMode, Theme};

/// Fallback when the terminal size cannot be queried.
const FALLBACK_SIZE: (u16, u16) = (80, 24);

/// Input poll timeouts; these are the loop's only suspension points.
const POLL_INTERACTIVE: Duration = Duration::from_millis(5);
const POLL_PASSIVE: Duration = Duration::from_millis(25);

/// How long quit waits for children before handing back to the host.
const QUIT_DEADLINE: Duration = Duration::from_secs(3);

/// Rows taken by the chrome: tab bar above, hint line below.
const CHROME_ROWS: u16 = 2;

struct Tab {
    controller: ProcessController,
    view_offset: usize,
}

pub struct Dashboard {
    tabs: Vec<Tab>,
    active: usize,
    theme: Theme,
    color_enabled: bool,
    quit: Arc<AtomicBool>,
    winch: Arc<AtomicBool>,
    cols: u16,
    rows: u16,
}

impl Dashboard {
    pub fn from_config(config: &Config) -> Self {
        let scrollback = config.settings.scrollback;
        let (cols, rows) = crossterm::terminal::size().unwrap_or(FALLBACK_SIZE);
        let pane_rows = rows.saturating_sub(CHROME_ROWS).max(1);
        let tabs = config
            .processes
            .iter()
            .map(|(name, entry)| Tab {
                controller: ProcessController::new(
                    ProcessSpec {
                        name: name.clone(),
                        run: entry.run.clone(),
                        cwd: entry.cwd.clone(),
                        autostart: entry.autostart,
                        env: entry.env.clone(),
                    },
                    cols,
                    pane_rows,
                    scrollback,
                ),
                view_offset: 0,
            })
            .collect();
        Self {
            tabs,
            active: 0,
            theme: Theme::default(),
            color_enabled: resolve_color_enabled(OutputMode::from_env(), io::stdout().is_terminal()),
            quit: Arc::new(AtomicBool::new(false)),
            winch: Arc::new(AtomicBool::new(false)),
            cols,
            rows,
        }
    }

    /// Run until quit; returns per-process exit diagnostics for the
    /// post-TUI summary.
    pub fn run(&mut self) -> io::Result<Vec<(String, String)>> {
        self.install_signal_flags()?;

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, Hide, Clear(ClearType::All))?;
        execute!(stdout, MoveTo(0, 0))?;

        if let Some(tab) = self.tabs.get_mut(self.active) {
            tab.controller.focus();
        }

        let mut first_frame = true;
        let result = self.event_loop(&mut stdout, &mut first_frame);
        let quit_result = self.quit_sequence(&mut stdout, &mut first_frame);

        execute!(stdout, LeaveAlternateScreen, Show)?;
        disable_raw_mode()?;

        result?;
        quit_result?;

        Ok(self
            .tabs
            .iter()
            .map(|tab| {
                let diagnostic = match tab.controller.exit_diagnostic() {
                    Some(diag) => diag.to_owned(),
                    None if tab.controller.running() => "running".to_owned(),
                    None => "never-started".to_owned(),
                };
                (tab.controller.name().to_owned(), diagnostic)
            })
            .collect())
    }

    fn install_signal_flags(&self) -> io::Result<()> {
        for signal in [SIGINT, SIGTERM, SIGHUP, SIGQUIT] {
            signal_hook::flag::register(signal, Arc::clone(&self.quit))?;
        }
        signal_hook::flag::register(SIGWINCH, Arc::clone(&self.winch))?;
        Ok(())
    }

    fn event_loop(&mut self, stdout: &mut io::Stdout, first_frame: &mut bool) -> io::Result<()> {
        loop {
            if self.quit.load(Ordering::Relaxed) {
                return Ok(());
            }
            if self.winch.swap(false, Ordering::Relaxed) {
                let (cols, rows) = crossterm::terminal::size().unwrap_or(FALLBACK_SIZE);
                self.apply_resize(cols, rows);
            }

            for tab in &mut self.tabs {
                tab.controller.tick();
            }
            self.draw(stdout, first_frame, None)?;

            let timeout = if self.active_interactive() {
                POLL_INTERACTIVE
            } else {
                POLL_PASSIVE
            };
            if event::poll(timeout)? {
                match event::read()? {
                    Event::Resize(cols, rows) => self.apply_resize(cols, rows),
                    Event::Key(key) => {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if self.handle_key(&key)? {
                            return Ok(());
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn active_interactive(&self) -> bool {
        self.tabs
            .get(self.active)
            .map(|tab| tab.controller.mode() == RouterMode::Interactive)
            .unwrap_or(false)
    }

    /// Returns true when the loop should quit.
    fn handle_key(&mut self, key: &KeyEvent) -> io::Result<bool> {
        if self.active_interactive() {
            if let Some(bytes) = encode_key(key) {
                let tab = &mut self.tabs[self.active];
                if let Err(err) = tab.controller.send_input(&bytes) {
                    tracing::debug!("input write failed: {err}");
                }
            }
            return Ok(false);
        }

        let pane_rows = self.pane_rows() as usize;
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Right | KeyCode::Tab => self.switch_tab(1),
            KeyCode::Left | KeyCode::BackTab => self.switch_tab(-1),
            KeyCode::Char('s') => self.tabs[self.active].controller.stop(),
            KeyCode::Char('r') => self.tabs[self.active].controller.restart(),
            KeyCode::Char('t') => self.tabs[self.active].controller.toggle(),
            KeyCode::Char('i') => {
                let tab = &mut self.tabs[self.active];
                if tab.controller.running() {
                    tab.view_offset = 0;
                    tab.controller.set_mode(RouterMode::Interactive);
                }
            }
            KeyCode::PageUp => {
                let tab = &mut self.tabs[self.active];
                let max = tab.controller.screen().max_view_offset();
                tab.view_offset = (tab.view_offset + pane_rows).min(max);
            }
            KeyCode::PageDown => {
                let tab = &mut self.tabs[self.active];
                tab.view_offset = tab.view_offset.saturating_sub(pane_rows);
            }
            KeyCode::End | KeyCode::Esc => self.tabs[self.active].view_offset = 0,
            _ => {}
        }
        Ok(false)
    }

    fn switch_tab(&mut self, delta: isize) {
        if self.tabs.is_empty() {
            return;
        }
        self.tabs[self.active].controller.blur();
        let len = self.tabs.len() as isize;
        self.active = ((self.active as isize + delta + len) % len) as usize;
        self.tabs[self.active].controller.focus();
    }

    fn apply_resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols.max(1);
        self.rows = rows.max(CHROME_ROWS + 1);
        let pane_rows = self.pane_rows();
        for tab in &mut self.tabs {
            tab.controller.set_dimensions(self.cols, pane_rows);
        }
    }

    fn pane_rows(&self) -> u16 {
        self.rows.saturating_sub(CHROME_ROWS).max(1)
    }

    /// Stop everything, keep ticking up to the deadline with a "Quitting"
    /// overlay, then hand control back regardless; anything still alive is
    /// left to the host supervisor.
    fn quit_sequence(&mut self, stdout: &mut io::Stdout, first_frame: &mut bool) -> io::Result<()> {
        for tab in &mut self.tabs {
            tab.controller.set_autostart_enabled(false);
            tab.controller.stop();
        }
        let deadline = Instant::now() + QUIT_DEADLINE;
        while Instant::now() < deadline {
            for tab in &mut self.tabs {
                tab.controller.tick();
            }
            self.draw(stdout, first_frame, Some("Quitting..."))?;
            if self
                .tabs
                .iter()
                .all(|tab| tab.controller.state() == ProcessState::Stopped)
            {
                break;
            }
            std::thread::sleep(POLL_PASSIVE);
        }
        Ok(())
    }

    /// Write one full frame: cursor-home escape, then tab bar, pane cells,
    /// and the hint line.
    fn draw(
        &mut self,
        stdout: &mut io::Stdout,
        first_frame: &mut bool,
        overlay: Option<&str>,
    ) -> io::Result<()> {
        let mut frame = String::new();
        if *first_frame {
            *first_frame = false;
        } else {
            frame.push_str(&format!("\x1b[{}F", self.rows));
        }

        frame.push_str(&self.tab_bar());
        frame.push_str("\x1b[K\r\n");

        let (lines, hint) = {
            let tab = &self.tabs[self.active];
            (
                tab.controller.render_lines(tab.view_offset),
                self.hint_line(overlay),
            )
        };
        let pane_rows = self.pane_rows() as usize;
        for index in 0..pane_rows {
            if let Some(line) = lines.get(index) {
                frame.push_str(line);
            }
            frame.push_str("\x1b[K\r\n");
        }
        frame.push_str(&hint);
        frame.push_str("\x1b[K");

        stdout.write_all(frame.as_bytes())?;
        stdout.flush()
    }

    fn tab_bar(&self) -> String {
        let mut bar = String::new();
        for (index, tab) in self.tabs.iter().enumerate() {
            let marker = if tab.controller.running() { "*" } else { " " };
            let label = format!(" {}{} ", marker, tab.controller.name());
            if !self.color_enabled {
                if index == self.active {
                    bar.push_str(&format!("[{}]", label.trim()));
                    bar.push(' ');
                } else {
                    bar.push_str(&label);
                }
                continue;
            }
            if index == self.active {
                bar.push_str(&styled(self.theme.accent.invert(), &label));
            } else if tab.controller.running() {
                bar.push_str(&styled(self.theme.success, &label));
            } else {
                bar.push_str(&styled(self.theme.muted, &label));
            }
        }
        bar
    }

    fn hint_line(&self, overlay: Option<&str>) -> String {
        if let Some(message) = overlay {
            return if self.color_enabled {
                styled(self.theme.warning, message)
            } else {
                message.to_owned()
            };
        }
        let tab = &self.tabs[self.active];
        let mut hint = if tab.controller.mode() == RouterMode::Interactive {
            "interactive - ctrl-x to detach".to_owned()
        } else {
            "tab: switch  s: stop  r: restart  t: toggle  i: interact  q: quit".to_owned()
        };
        if tab.view_offset > 0 {
            hint.push_str(&format!("  [scrolled {} rows]", tab.view_offset));
        }
        if self.color_enabled {
            styled(self.theme.muted, &hint)
        } else {
            hint
        }
    }
}

/// Key event to PTY bytes. Control-letter chords fold to C0 bytes; arrows
/// and navigation keys use their CSI encodings.
fn encode_key(key: &KeyEvent) -> Option<Vec<u8>> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char(c) = key.code {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_lowercase() {
                return Some(vec![lower as u8 - b'a' + 1]);
            }
        }
    }

    let mapped: &[u8] = match key.code {
        KeyCode::Enter => b"\n",
        KeyCode::Tab => b"\t",
        KeyCode::Backspace => b"\x7f",
        KeyCode::Esc => b"\x1b",
        KeyCode::Left => b"\x1b[D",
        KeyCode::Right => b"\x1b[C",
        KeyCode::Up => b"\x1b[A",
        KeyCode::Down => b"\x1b[B",
        KeyCode::Home => b"\x1b[H",
        KeyCode::End => b"\x1b[F",
        KeyCode::Delete => b"\x1b[3~",
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            return Some(c.encode_utf8(&mut buf).as_bytes().to_vec());
        }
        _ => return None,
    };
    Some(mapped.to_vec())
}

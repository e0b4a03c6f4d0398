//! Keystroke routing toward the focused child's PTY.
//!
//! In passive mode the host keeps keys for navigation; in interactive mode
//! they are translated and forwarded. The router tracks a local
//! (line length, cursor position) estimate so arrow keys and backspace can
//! be bounds-checked without asking the child. The estimate is exactly
//! that: a child that redraws its own prompt can drift from it.

use unicode_segmentation::UnicodeSegmentation;

const CTRL_X: u8 = 0x18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouterMode {
    #[default]
    Passive,
    Interactive,
}

/// Outcome of routing one key's worth of bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Write these bytes to the PTY stdin.
    Forward(Vec<u8>),
    /// Ctrl-X: leave interactive mode, nothing forwarded.
    ExitInteractive,
    /// Swallowed (passive mode, or bounds-checked away).
    Discard,
}

pub struct InputRouter {
    mode: RouterMode,
    line_length: usize,
    cursor_position: usize,
    screen_width: usize,
}

impl InputRouter {
    pub fn new(screen_width: u16) -> Self {
        Self {
            mode: RouterMode::Passive,
            line_length: 0,
            cursor_position: 0,
            screen_width: screen_width as usize,
        }
    }

    pub fn mode(&self) -> RouterMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RouterMode) {
        self.mode = mode;
    }

    pub fn set_screen_width(&mut self, cols: u16) {
        self.screen_width = cols as usize;
    }

    pub fn line_estimate(&self) -> (usize, usize) {
        (self.line_length, self.cursor_position)
    }

    /// Route one key event's bytes according to the current mode.
    pub fn route(&mut self, bytes: &[u8]) -> Routed {
        if self.mode != RouterMode::Interactive {
            return Routed::Discard;
        }
        if bytes.is_empty() {
            return Routed::Discard;
        }

        match bytes {
            [CTRL_X] => {
                self.mode = RouterMode::Passive;
                return Routed::ExitInteractive;
            }
            [0x1B, b'[', b'D'] => {
                if self.cursor_position == 0 {
                    return Routed::Discard;
                }
                self.cursor_position -= 1;
            }
            [0x1B, b'[', b'C'] => {
                if self.cursor_position >= self.line_length {
                    return Routed::Discard;
                }
                self.cursor_position += 1;
            }
            [0x1B, b'[', b'A'] => {
                // One "line" approximated as the screen width; always
                // forwarded.
                self.cursor_position = self.cursor_position.saturating_sub(self.screen_width);
            }
            [0x1B, b'[', b'B'] => {
                self.cursor_position =
                    (self.cursor_position + self.screen_width).min(self.line_length);
            }
            [0x7F] | [0x08] => {
                if self.cursor_position == 0 {
                    return Routed::Discard;
                }
                self.cursor_position -= 1;
                self.line_length = self.line_length.saturating_sub(1);
            }
            _ => return Routed::Forward(self.translate(bytes)),
        }
        Routed::Forward(bytes.to_vec())
    }

    /// Newline becomes carriage return and resets the estimate; printable
    /// graphemes advance it; everything else passes through untouched.
    fn translate(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(bytes.len());
        match std::str::from_utf8(bytes) {
            Ok(text) if !text.starts_with('\x1b') => {
                for grapheme in text.graphemes(true) {
                    match grapheme {
                        "\n" | "\r" | "\r\n" => {
                            self.line_length = 0;
                            self.cursor_position = 0;
                            out.push(b'\r');
                        }
                        _ => {
                            if !grapheme.chars().next().is_some_and(char::is_control) {
                                self.line_length += 1;
                                self.cursor_position += 1;
                            }
                            out.extend_from_slice(grapheme.as_bytes());
                        }
                    }
                }
            }
            _ => {
                for &byte in bytes {
                    out.push(if byte == b'\n' { b'\r' } else { byte });
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interactive(width: u16) -> InputRouter {
        let mut router = InputRouter::new(width);
        router.set_mode(RouterMode::Interactive);
        router
    }

    #[test]
    fn passive_mode_swallows_keys() {
        let mut router = InputRouter::new(80);
        assert_eq!(router.route(b"x"), Routed::Discard);
    }

    #[test]
    fn newline_becomes_carriage_return_and_resets_estimate() {
        let mut router = interactive(80);
        router.route(b"abc");
        assert_eq!(router.line_estimate(), (3, 3));
        assert_eq!(router.route(b"\n"), Routed::Forward(b"\r".to_vec()));
        assert_eq!(router.line_estimate(), (0, 0));
    }

    #[test]
    fn ctrl_x_exits_interactive_without_forwarding() {
        let mut router = interactive(80);
        assert_eq!(router.route(&[0x18]), Routed::ExitInteractive);
        assert_eq!(router.mode(), RouterMode::Passive);
    }

    #[test]
    fn printable_advance_counts_graphemes_not_bytes() {
        let mut router = interactive(80);
        router.route("❤\u{FE0F}".as_bytes());
        assert_eq!(router.line_estimate(), (1, 1));
    }

    #[test]
    fn left_arrow_is_bounds_checked_at_zero() {
        let mut router = interactive(80);
        assert_eq!(router.route(b"\x1b[D"), Routed::Discard);
        router.route(b"ab");
        assert_eq!(router.route(b"\x1b[D"), Routed::Forward(b"\x1b[D".to_vec()));
        assert_eq!(router.line_estimate(), (2, 1));
    }

    #[test]
    fn right_arrow_stops_at_line_length() {
        let mut router = interactive(80);
        router.route(b"ab");
        assert_eq!(router.route(b"\x1b[C"), Routed::Discard);
        router.route(b"\x1b[D");
        assert_eq!(router.route(b"\x1b[C"), Routed::Forward(b"\x1b[C".to_vec()));
    }

    #[test]
    fn up_arrow_always_forwards_and_moves_by_screen_width() {
        let mut router = interactive(10);
        router.route(b"some long input here");
        let (_, before) = router.line_estimate();
        assert_eq!(router.route(b"\x1b[A"), Routed::Forward(b"\x1b[A".to_vec()));
        assert_eq!(router.line_estimate().1, before.saturating_sub(10));
        assert_eq!(router.route(b"\x1b[B"), Routed::Forward(b"\x1b[B".to_vec()));
    }

    #[test]
    fn backspace_ignored_at_column_zero() {
        let mut router = interactive(80);
        assert_eq!(router.route(&[0x7F]), Routed::Discard);
        router.route(b"a");
        assert_eq!(router.route(&[0x7F]), Routed::Forward(vec![0x7F]));
        assert_eq!(router.line_estimate(), (0, 0));
    }

    #[test]
    fn pasted_text_resets_estimate_at_the_newline() {
        let mut router = interactive(80);
        assert_eq!(
            router.route(b"abc\ndef"),
            Routed::Forward(b"abc\rdef".to_vec())
        );
        assert_eq!(router.line_estimate(), (3, 3));
    }

    #[test]
    fn control_sequences_forward_verbatim() {
        let mut router = interactive(80);
        assert_eq!(
            router.route(b"\x1b[3~"),
            Routed::Forward(b"\x1b[3~".to_vec())
        );
        assert_eq!(router.line_estimate(), (0, 0));
    }
}

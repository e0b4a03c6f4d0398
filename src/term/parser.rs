//! VT/ANSI byte parser driving the screen model.
//!
//! The state machine survives across feeds, so escape sequences and UTF-8
//! sequences split between chunks resume where they left off. Sequences
//! outside the supported subset are parsed to completion and dropped; a
//! malformed sequence never corrupts later output.

use super::screen::{AttrFlags, Color, ScreenBuffer};

#[derive(Clone, Copy, Default, PartialEq, Eq)]
enum ParserState {
    #[default]
    Ground,
    Utf8Continuation,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    // ESC seen inside an OSC string, waiting for the backslash of ST.
    EscapeInOsc,
}

pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    current_param: Option<u16>,
    intermediates: Vec<u8>,
    utf8_bytes: [u8; 4],
    utf8_len: usize,
    utf8_need: usize,
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            intermediates: Vec::with_capacity(4),
            current_param: None,
            utf8_bytes: [0; 4],
            utf8_len: 0,
            utf8_need: 0,
        }
    }

    pub fn feed(&mut self, bytes: &[u8], screen: &mut ScreenBuffer) {
        for &byte in bytes {
            self.feed_byte(byte, screen);
        }
    }

    fn feed_byte(&mut self, byte: u8, screen: &mut ScreenBuffer) {
        if self.state == ParserState::Utf8Continuation {
            self.utf8_continuation(byte, screen);
            return;
        }

        // C0 controls act everywhere except inside an OSC payload.
        if byte < 0x20
            && self.state != ParserState::OscString
            && self.state != ParserState::EscapeInOsc
        {
            match byte {
                0x1B => self.enter_escape(),
                0x08 => screen.backspace(),
                0x09 => screen.horizontal_tab(),
                0x0A | 0x0B | 0x0C => screen.linefeed(),
                0x0D => screen.carriage_return(),
                _ => {}
            }
            return;
        }

        match self.state {
            ParserState::Ground => self.ground(byte, screen),
            ParserState::Utf8Continuation => unreachable!("handled above"),
            ParserState::Escape => self.escape(byte, screen),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte),
            ParserState::CsiEntry => self.csi_entry(byte, screen),
            ParserState::CsiParam => self.csi_param(byte, screen),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, screen),
            ParserState::OscString => self.osc_string(byte),
            ParserState::EscapeInOsc => self.escape_in_osc(byte, screen),
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn ground(&mut self, byte: u8, screen: &mut ScreenBuffer) {
        if (0x20..0x7F).contains(&byte) {
            screen.put_char(byte as char);
            return;
        }
        if byte >= 0x80 {
            let need = match byte {
                0xC2..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF4 => 4,
                // Stray continuation or invalid lead byte.
                _ => return,
            };
            self.utf8_bytes[0] = byte;
            self.utf8_len = 1;
            self.utf8_need = need;
            self.state = ParserState::Utf8Continuation;
        }
    }

    fn utf8_continuation(&mut self, byte: u8, screen: &mut ScreenBuffer) {
        if !(0x80..0xC0).contains(&byte) {
            // Broken sequence: drop what was collected and reprocess the
            // byte from ground.
            tracing::debug!("malformed UTF-8 sequence dropped");
            self.state = ParserState::Ground;
            self.utf8_len = 0;
            self.feed_byte(byte, screen);
            return;
        }
        self.utf8_bytes[self.utf8_len] = byte;
        self.utf8_len += 1;
        if self.utf8_len < self.utf8_need {
            return;
        }
        self.state = ParserState::Ground;
        match std::str::from_utf8(&self.utf8_bytes[..self.utf8_len]) {
            Ok(s) => {
                if let Some(ch) = s.chars().next() {
                    screen.put_char(ch);
                }
            }
            Err(_) => tracing::debug!("malformed UTF-8 sequence dropped"),
        }
        self.utf8_len = 0;
    }

    fn escape(&mut self, byte: u8, screen: &mut ScreenBuffer) {
        match byte {
            b'[' => {
                self.state = ParserState::CsiEntry;
            }
            b']' => {
                self.state = ParserState::OscString;
            }
            b'7' => {
                screen.save_cursor(true);
                self.state = ParserState::Ground;
            }
            b'8' => {
                screen.restore_cursor();
                self.state = ParserState::Ground;
            }
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => {
                // Outside the supported subset; sequence complete, drop it.
                tracing::debug!("unhandled ESC sequence: {:?}", byte as char);
                self.state = ParserState::Ground;
            }
        }
    }

    fn escape_intermediate(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            // Final byte of a charset/alignment sequence; all discarded.
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_entry(&mut self, byte: u8, screen: &mut ScreenBuffer) {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some(u16::from(byte - b'0'));
                self.state = ParserState::CsiParam;
            }
            b';' | b':' => {
                self.params.push(0);
                self.state = ParserState::CsiParam;
            }
            b'?' | b'>' | b'<' | b'=' => {
                self.intermediates.push(byte);
            }
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => self.execute_csi(byte, screen),
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_param(&mut self, byte: u8, screen: &mut ScreenBuffer) {
        match byte {
            b'0'..=b'9' => {
                let digit = u16::from(byte - b'0');
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            b';' | b':' => {
                self.params.push(self.current_param.take().unwrap_or(0));
            }
            0x20..=0x2F => {
                if let Some(param) = self.current_param.take() {
                    self.params.push(param);
                }
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                if let Some(param) = self.current_param.take() {
                    self.params.push(param);
                }
                self.execute_csi(byte, screen);
            }
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_intermediate(&mut self, byte: u8, screen: &mut ScreenBuffer) {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            0x40..=0x7E => self.execute_csi(byte, screen),
            _ => self.state = ParserState::Ground,
        }
    }

    fn osc_string(&mut self, byte: u8) {
        match byte {
            // BEL or ST terminate; the payload (window title etc.) is
            // discarded either way.
            0x07 | 0x9C => self.state = ParserState::Ground,
            0x1B => self.state = ParserState::EscapeInOsc,
            _ => {}
        }
    }

    fn escape_in_osc(&mut self, byte: u8, screen: &mut ScreenBuffer) {
        self.state = ParserState::Ground;
        if byte != b'\\' {
            // Not ST: the OSC ends and the byte starts a fresh escape.
            self.enter_escape();
            self.escape(byte, screen);
        }
    }

    fn execute_csi(&mut self, final_byte: u8, screen: &mut ScreenBuffer) {
        self.state = ParserState::Ground;
        if !self.intermediates.is_empty() {
            // Private and intermediate-qualified sequences are outside the
            // supported subset.
            tracing::debug!("unhandled private CSI sequence: {:?}", final_byte as char);
            return;
        }

        let first = self.params.first().copied();
        match final_byte {
            b'A' => screen.cursor_up(first.unwrap_or(1)),
            b'B' => screen.cursor_down(first.unwrap_or(1)),
            b'C' => screen.cursor_forward(first.unwrap_or(1)),
            b'D' => screen.cursor_backward(first.unwrap_or(1)),
            b'H' | b'f' => {
                let row = first.unwrap_or(1);
                let col = self.params.get(1).copied().unwrap_or(1);
                screen.cursor_position(row, col);
            }
            b'J' => screen.erase_in_display(first.unwrap_or(0)),
            b'K' => screen.erase_in_line(first.unwrap_or(0)),
            b'm' => apply_sgr(&self.params, screen),
            b's' => screen.save_cursor(false),
            b'u' => screen.restore_cursor(),
            _ => {
                tracing::debug!("unhandled CSI sequence: {:?} {:?}", self.params, final_byte as char);
            }
        }
    }
}

fn apply_sgr(params: &[u16], screen: &mut ScreenBuffer) {
    if params.is_empty() {
        screen.pen_mut().reset();
        return;
    }

    let mut iter = params.iter().copied();
    while let Some(param) = iter.next() {
        match param {
            0 => screen.pen_mut().reset(),
            1 => screen.pen_mut().flags |= AttrFlags::BOLD,
            2 => screen.pen_mut().flags |= AttrFlags::DIM,
            3 => screen.pen_mut().flags |= AttrFlags::ITALIC,
            4 => screen.pen_mut().flags |= AttrFlags::UNDERLINE,
            7 => screen.pen_mut().flags |= AttrFlags::INVERSE,
            22 => screen.pen_mut().flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
            23 => screen.pen_mut().flags &= !AttrFlags::ITALIC,
            24 => screen.pen_mut().flags &= !AttrFlags::UNDERLINE,
            27 => screen.pen_mut().flags &= !AttrFlags::INVERSE,
            30..=37 => screen.pen_mut().fg = Color::Indexed((param - 30) as u8),
            38 => {
                if let Some(color) = extended_color(&mut iter) {
                    screen.pen_mut().fg = color;
                }
            }
            39 => screen.pen_mut().fg = Color::Default,
            40..=47 => screen.pen_mut().bg = Color::Indexed((param - 40) as u8),
            48 => {
                if let Some(color) = extended_color(&mut iter) {
                    screen.pen_mut().bg = color;
                }
            }
            49 => screen.pen_mut().bg = Color::Default,
            90..=97 => screen.pen_mut().fg = Color::Indexed((param - 90 + 8) as u8),
            100..=107 => screen.pen_mut().bg = Color::Indexed((param - 100 + 8) as u8),
            _ => {}
        }
    }
}

/// `38;5;n` / `38;2;r;g;b` payloads (and the `48;...` background forms).
fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
    match iter.next()? {
        5 => Some(Color::Indexed(iter.next()? as u8)),
        2 => {
            let r = iter.next()? as u8;
            let g = iter.next()? as u8;
            let b = iter.next()? as u8;
            Some(Color::Rgb(r, g, b))
        }
        _ => None,
    }
}

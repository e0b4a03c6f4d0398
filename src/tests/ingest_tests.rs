//! Carry-buffer behavior: the 1024-byte hold rule and chunk-size
//! independence of the final screen.

use std::collections::VecDeque;
use std::io::{self, Read};

use super::{OutputIngestor, PumpStatus, PTY_CHUNK_LEN};
use crate::term::{Color, ScreenBuffer};

fn screens_match(a: &ScreenBuffer, b: &ScreenBuffer) {
    assert_eq!(a.cursor(), b.cursor());
    assert_eq!(a.render_lines(0), b.render_lines(0));
}

fn ingest_whole(input: &[u8]) -> ScreenBuffer {
    let mut screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    for chunk in input.chunks(PTY_CHUNK_LEN) {
        ingestor.accept(chunk, &mut screen);
    }
    ingestor.flush(&mut screen);
    screen
}

fn ingest_split(input: &[u8], piece: usize) -> ScreenBuffer {
    let mut screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    for chunk in input.chunks(piece) {
        ingestor.accept(chunk, &mut screen);
    }
    ingestor.flush(&mut screen);
    screen
}

#[test]
fn split_points_do_not_change_the_final_screen() {
    let input = "plain \x1b[1;32mgreen bold\x1b[0m 🐛❤\u{FE0F}\r\nsecond line\x1b[2Aup"
        .as_bytes()
        .to_vec();
    let whole = ingest_whole(&input);
    for piece in [1, 2, 3, 5, 7, 13, 64] {
        let split = ingest_split(&input, piece);
        screens_match(&whole, &split);
    }
}

#[test]
fn full_chunk_is_held_in_the_carry() {
    let mut screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    let chunk = vec![b'a'; PTY_CHUNK_LEN];
    ingestor.accept(&chunk, &mut screen);
    // Nothing parsed yet; more is expected immediately.
    assert_eq!(screen.cursor(), (0, 0));
    ingestor.accept(b"b", &mut screen);
    assert_ne!(screen.cursor(), (0, 0));
    assert_eq!(screen.row(0).unwrap().text(), "a".repeat(80));
}

#[test]
fn escape_straddling_a_full_chunk_boundary_applies_cleanly() {
    // `ESC [ 3 1 m` ends exactly at the 1024-byte mark; the red attribute
    // must land on the byte right after the escape.
    let mut input = vec![b'a'; PTY_CHUNK_LEN - 4];
    input.extend_from_slice(b"\x1b[31");
    assert_eq!(input.len(), PTY_CHUNK_LEN);
    let mut tail = b"mZ".to_vec();

    let mut split_screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    ingestor.accept(&input, &mut split_screen);
    assert_eq!(split_screen.cursor(), (0, 0), "held back until the burst ends");
    ingestor.accept(&tail, &mut split_screen);

    let mut whole = input.clone();
    whole.append(&mut tail);
    let whole_screen = ingest_whole(&whole);
    screens_match(&whole_screen, &split_screen);

    let (col, row) = split_screen.cursor();
    let z = split_screen.cell(col - 1, row).unwrap();
    assert_eq!(z.grapheme, "Z");
    assert_eq!(z.pen.fg, Color::Indexed(1));
}

#[test]
fn utf8_straddling_a_full_chunk_boundary_survives() {
    let bug = "🐛".as_bytes();
    let mut input = vec![b'-'; PTY_CHUNK_LEN - 2];
    input.extend_from_slice(&bug[..2]);
    assert_eq!(input.len(), PTY_CHUNK_LEN);

    let mut screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    ingestor.accept(&input, &mut screen);
    ingestor.accept(&bug[2..], &mut screen);

    let (col, row) = screen.cursor();
    let cell = screen.cell(col - 2, row).unwrap();
    assert_eq!(cell.grapheme, "🐛");
    assert_eq!(cell.width, 2);
}

#[test]
fn flush_drains_a_burst_that_ended_on_a_full_chunk() {
    let mut screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    ingestor.accept(&vec![b'x'; PTY_CHUNK_LEN], &mut screen);
    assert_eq!(screen.cursor(), (0, 0));
    ingestor.flush(&mut screen);
    assert_eq!(screen.row(0).unwrap().text(), "x".repeat(80));
}

/// Scripted reader standing in for a non-blocking PTY master.
struct ScriptedReader {
    events: VecDeque<io::Result<Vec<u8>>>,
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.events.pop_front() {
            Some(Ok(bytes)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(Err(err)) => Err(err),
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "drained")),
        }
    }
}

#[test]
fn pump_reads_until_would_block() {
    let mut reader = ScriptedReader {
        events: VecDeque::from([Ok(b"one ".to_vec()), Ok(b"two".to_vec())]),
    };
    let mut screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    assert!(matches!(
        ingestor.pump(&mut reader, &mut screen),
        PumpStatus::Progressed
    ));
    assert_eq!(screen.row(0).unwrap().text().trim_end(), "one two");
    assert!(matches!(
        ingestor.pump(&mut reader, &mut screen),
        PumpStatus::Idle
    ));
}

#[test]
fn pump_reports_eof_and_flushes_the_carry() {
    let mut reader = ScriptedReader {
        events: VecDeque::from([Ok(vec![b'y'; PTY_CHUNK_LEN]), Ok(Vec::new())]),
    };
    let mut screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    assert!(matches!(
        ingestor.pump(&mut reader, &mut screen),
        PumpStatus::Eof
    ));
    assert_eq!(screen.row(0).unwrap().text(), "y".repeat(80));
}

#[test]
fn pump_treats_hard_errors_as_child_death() {
    let mut reader = ScriptedReader {
        events: VecDeque::from([
            Ok(b"last words".to_vec()),
            Err(io::Error::new(io::ErrorKind::Other, "EIO")),
        ]),
    };
    let mut screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    assert!(matches!(
        ingestor.pump(&mut reader, &mut screen),
        PumpStatus::Failed(_)
    ));
    assert_eq!(screen.row(0).unwrap().text().trim_end(), "last words");
}

#[test]
fn interrupted_reads_are_retried() {
    let mut reader = ScriptedReader {
        events: VecDeque::from([
            Err(io::Error::new(io::ErrorKind::Interrupted, "EINTR")),
            Ok(b"after".to_vec()),
        ]),
    };
    let mut screen = ScreenBuffer::new(80, 24);
    let mut ingestor = OutputIngestor::new();
    assert!(matches!(
        ingestor.pump(&mut reader, &mut screen),
        PumpStatus::Progressed
    ));
    assert_eq!(screen.row(0).unwrap().text().trim_end(), "after");
}

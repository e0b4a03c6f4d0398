//! PTY output ingestion with the 1024-byte boundary rule.
//!
//! PTY reads tend to arrive in 1024-byte chunks, and a chunk that size can
//! end mid-UTF-8 or mid-escape. A full-sized chunk is therefore held back in
//! a carry buffer and only parsed once a shorter chunk closes the burst. The
//! parser itself keeps its state across feeds, so the screen is the only
//! accumulated output state; no raw transcript is retained.

use std::io::{ErrorKind, Read};

use crate::term::{ScreenBuffer, VtParser};

/// The chunk size PTY reads are issued at; a read filling the whole buffer
/// means more output is expected immediately.
pub const PTY_CHUNK_LEN: usize = 1024;

/// Reads serviced per tick before yielding back to the loop.
const MAX_READS_PER_TICK: usize = 64;

/// What a pump pass observed on the PTY.
#[derive(Debug)]
pub enum PumpStatus {
    /// Nothing available right now.
    Idle,
    /// Output was read and applied to the screen.
    Progressed,
    /// The child closed its side of the PTY.
    Eof,
    /// A read failed with something other than EAGAIN/EINTR; treat the
    /// child as dead.
    Failed(std::io::Error),
}

#[derive(Default)]
pub struct OutputIngestor {
    carry: Vec<u8>,
    parser: VtParser,
}

impl OutputIngestor {
    pub fn new() -> Self {
        Self {
            carry: Vec::new(),
            parser: VtParser::new(),
        }
    }

    /// Apply one delivered chunk. Exactly [`PTY_CHUNK_LEN`] bytes means the
    /// burst is still in flight: hold everything in the carry and wait.
    pub fn accept(&mut self, chunk: &[u8], screen: &mut ScreenBuffer) {
        if chunk.len() == PTY_CHUNK_LEN {
            self.carry.extend_from_slice(chunk);
            return;
        }
        if self.carry.is_empty() {
            self.parser.feed(chunk, screen);
        } else {
            let mut pending = std::mem::take(&mut self.carry);
            pending.extend_from_slice(chunk);
            self.parser.feed(&pending, screen);
        }
    }

    /// Parse whatever the carry still holds. Called when the stream ends so
    /// a burst that stopped on a full chunk is not lost.
    pub fn flush(&mut self, screen: &mut ScreenBuffer) {
        if !self.carry.is_empty() {
            let pending = std::mem::take(&mut self.carry);
            self.parser.feed(&pending, screen);
        }
    }

    /// Drain available PTY output into the screen without blocking.
    pub fn pump<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        screen: &mut ScreenBuffer,
    ) -> PumpStatus {
        let mut buf = [0u8; PTY_CHUNK_LEN];
        let mut progressed = false;
        for _ in 0..MAX_READS_PER_TICK {
            match reader.read(&mut buf) {
                Ok(0) => {
                    self.flush(screen);
                    return PumpStatus::Eof;
                }
                Ok(n) => {
                    self.accept(&buf[..n], screen);
                    progressed = true;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.flush(screen);
                    return PumpStatus::Failed(err);
                }
            }
        }
        if progressed {
            PumpStatus::Progressed
        } else {
            PumpStatus::Idle
        }
    }
}

#[cfg(test)]
#[path = "tests/ingest_tests.rs"]
mod tests;

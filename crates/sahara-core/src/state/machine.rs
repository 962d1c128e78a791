//! Session state for the Sahara engine.

use std::fmt;

use crate::error::SaharaError;
use crate::events::SaharaPhase;

/// Where the session is in the protocol, with the data valid for that phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// HELLO exchange and command mode.
    #[default]
    Handshake,
    /// Waiting for the 0x50-byte image header.
    TransferInit,
    /// ELF loader: waiting for the block that holds the program headers.
    FormatScan { phdr_offset: usize },
    /// Image length known; pulling the rest chunk by chunk.
    Streaming { total: u64, remaining: u64 },
}

impl Phase {
    pub fn kind(&self) -> SaharaPhase {
        match self {
            Phase::Handshake => SaharaPhase::Handshake,
            Phase::TransferInit => SaharaPhase::TransferInit,
            Phase::FormatScan { .. } => SaharaPhase::FormatScan,
            Phase::Streaming { .. } => SaharaPhase::Streaming,
        }
    }

    /// Any phase in which inbound bytes are image data.
    pub fn is_transfer(&self) -> bool {
        !matches!(self, Phase::Handshake)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::FormatScan { phdr_offset } => {
                write!(f, "{} (phdr @ 0x{:X})", self.kind(), phdr_offset)
            }
            Phase::Streaming { total, remaining } => {
                write!(f, "{} (0x{:X} of 0x{:X} left)", self.kind(), remaining, total)
            }
            _ => write!(f, "{}", self.kind()),
        }
    }
}

/// Collects USB packets until one requested block is complete.
///
/// A host may split a READ_DATA answer over any number of bulk packets.
#[derive(Debug, Default)]
pub struct Reassembly {
    buffer: Vec<u8>,
    expected: usize,
}

impl Reassembly {
    /// Start waiting for a block of `len` bytes.
    pub fn expect(&mut self, len: usize) {
        self.buffer.clear();
        self.buffer.reserve(len);
        self.expected = len;
    }

    /// Append a packet. Returns the whole block once `expected` bytes are in.
    ///
    /// Overflowing the block drops the buffer.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, SaharaError> {
        let actual = self.buffer.len() + data.len();
        if actual > self.expected {
            let expected = self.expected;
            self.reset();
            return Err(SaharaError::ReassemblyOverflow { expected, actual });
        }

        self.buffer.extend_from_slice(data);
        if self.buffer.len() == self.expected {
            self.expected = 0;
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }

        tracing::trace!(
            have = self.buffer.len(),
            expected = self.expected,
            "Queueing partial block"
        );
        Ok(None)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected = 0;
    }
}

/// All per-host runtime state.
#[derive(Debug, Default)]
pub struct Session {
    pub phase: Phase,
    /// HELLO/HELLO_RSP exchanges seen; zero means HELLO is still owed.
    pub hello_count: u32,
    pub reassembly: Reassembly,
    /// Image offset of the outstanding READ_DATA.
    pub current_offset: u64,
    /// Image bytes received so far.
    pub image: Vec<u8>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to a fresh handshake, dropping any partial image.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Transition to a new phase, returning the one left.
    pub fn goto(&mut self, next: Phase) -> Phase {
        tracing::debug!(from = %self.phase, to = %next, "Session transition");
        std::mem::replace(&mut self.phase, next)
    }

    /// Total image length once known.
    pub fn total_image_length(&self) -> Option<u64> {
        match self.phase {
            Phase::Streaming { total, .. } => Some(total),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reassembly_completes_on_exact_fill() {
        let mut r = Reassembly::default();
        r.expect(0x50);
        assert!(r.push(&[1; 0x20]).unwrap().is_none());
        assert!(r.push(&[2; 0x20]).unwrap().is_none());
        assert_eq!(r.len(), 0x40);
        let block = r.push(&[3; 0x10]).unwrap().unwrap();
        assert_eq!(block.len(), 0x50);
        assert_eq!(block[0x3F], 2);
        assert_eq!(block[0x40], 3);
        assert!(r.is_empty());
        assert_eq!(r.expected(), 0);
    }

    #[test]
    fn test_reassembly_overflow_clears() {
        let mut r = Reassembly::default();
        r.expect(0x10);
        r.push(&[0; 8]).unwrap();
        let err = r.push(&[0; 9]).unwrap_err();
        assert!(matches!(
            err,
            SaharaError::ReassemblyOverflow {
                expected: 0x10,
                actual: 0x11
            }
        ));
        assert!(r.is_empty());
    }

    #[test]
    fn test_session_reset() {
        let mut s = Session::new();
        s.hello_count = 2;
        s.goto(Phase::Streaming {
            total: 0x100,
            remaining: 0xB0,
        });
        s.image.extend_from_slice(&[0; 0x50]);
        assert_eq!(s.total_image_length(), Some(0x100));

        s.reset();
        assert_eq!(s.phase, Phase::Handshake);
        assert_eq!(s.hello_count, 0);
        assert!(s.image.is_empty());
        assert_eq!(s.total_image_length(), None);
    }

    #[test]
    fn test_phase_kind() {
        assert!(!Phase::Handshake.is_transfer());
        assert!(Phase::TransferInit.is_transfer());
        assert_eq!(
            Phase::FormatScan { phdr_offset: 0x40 }.kind(),
            SaharaPhase::FormatScan
        );
    }
}

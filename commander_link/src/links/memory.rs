//! In-memory link.
//!
//! Records every write with its start and completion instants, lets the
//! caller inject inbound bytes, and counts clears and closes. Clones share
//! state, so a test keeps one clone for inspection while the transport
//! owns the other.
//!
//! In loopback mode each written frame is echoed back as inbound data,
//! which is how `--simulate` exercises the full round trip without a
//! marshaller attached.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::link::{Link, LinkError, LinkSettings};

/// One recorded physical write.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    /// Bytes written.
    pub bytes: Vec<u8>,
    /// When `write_all` was entered.
    pub started: Instant,
    /// When `write_all` returned.
    pub finished: Instant,
}

#[derive(Debug, Default)]
struct MemoryState {
    writes: Vec<WriteRecord>,
    inbound: VecDeque<u8>,
    loopback: bool,
    fail_writes: bool,
    closed: bool,
    close_calls: usize,
    clear_calls: usize,
}

/// Link backed by shared in-process buffers.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLink {
    /// Create a link with empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a link that echoes every write back as inbound data.
    pub fn loopback() -> Self {
        let link = Self::new();
        link.state.lock().loopback = true;
        link
    }

    /// Queue bytes for the reader.
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().inbound.extend(bytes.iter().copied());
    }

    /// Make subsequent writes fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Writes recorded so far, including failed attempts.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Number of `close()` calls that actually closed the link.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_calls
    }

    /// Number of `clear_input()` calls.
    pub fn clear_count(&self) -> usize {
        self.state.lock().clear_calls
    }

    /// Bytes still waiting to be read.
    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }
}

/// Factory registered as `memory`.
pub fn open_link(settings: &LinkSettings) -> Result<Box<dyn Link>, LinkError> {
    debug!("Opening loopback memory link in place of {}", settings.device);
    Ok(Box::new(MemoryLink::loopback()))
}

impl Link for MemoryLink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkError> {
        let state = self.state.lock();
        if state.closed {
            return Err(LinkError::Closed);
        }
        Ok(state.inbound.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(LinkError::Closed);
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let started = Instant::now();
        let mut state = self.state.lock();
        if state.closed {
            return Err(LinkError::Closed);
        }
        let result = if state.fail_writes {
            Err(LinkError::Io(std::io::Error::other("simulated write failure")))
        } else {
            if state.loopback {
                state.inbound.extend(bytes.iter().copied());
            }
            Ok(())
        };
        state.writes.push(WriteRecord {
            bytes: bytes.to_vec(),
            started,
            finished: Instant::now(),
        });
        result
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.clear_calls += 1;
        state.inbound.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.close_calls += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let probe = MemoryLink::new();
        let mut link: Box<dyn Link> = Box::new(probe.clone());
        link.write_all(b"abc").unwrap();
        assert_eq!(probe.writes().len(), 1);
        assert_eq!(probe.writes()[0].bytes, b"abc");
    }

    #[test]
    fn test_inject_then_read() {
        let probe = MemoryLink::new();
        let mut link = probe.clone();
        probe.inject(b"hello");
        assert_eq!(link.bytes_to_read().unwrap(), 5);

        let mut buf = [0u8; 3];
        assert_eq!(link.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(probe.pending_inbound(), 2);
    }

    #[test]
    fn test_clear_discards_inbound() {
        let probe = MemoryLink::new();
        let mut link = probe.clone();
        probe.inject(b"stale");
        link.clear_input().unwrap();
        assert_eq!(link.bytes_to_read().unwrap(), 0);
        assert_eq!(probe.clear_count(), 1);
    }

    #[test]
    fn test_loopback_echoes_writes() {
        let mut link = MemoryLink::loopback();
        link.write_all(b"[1]\n").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(link.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"[1]\n");
    }

    #[test]
    fn test_close_is_idempotent() {
        let probe = MemoryLink::new();
        let mut link = probe.clone();
        link.close().unwrap();
        link.close().unwrap();
        assert_eq!(probe.close_count(), 1);
        assert!(matches!(link.write_all(b"x"), Err(LinkError::Closed)));
    }

    #[test]
    fn test_failed_writes_are_still_recorded() {
        let probe = MemoryLink::new();
        let mut link = probe.clone();
        probe.fail_writes(true);
        assert!(matches!(link.write_all(b"x"), Err(LinkError::Io(_))));
        assert_eq!(probe.writes().len(), 1);
    }
}

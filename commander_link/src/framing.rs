//! Wire encoding and inbound frame assembly.
//!
//! Outbound: each command is encoded as its JSON array
//! `[name, axis, params, blocking]` followed by a single `\n`. JSON string
//! escaping keeps raw newlines out of the payload, so the delimiter is
//! unambiguous.
//!
//! Inbound: bytes are mapped one-to-one onto `char`s (no multi-byte
//! decoding), accumulated, and split on the delimiter.

use commander_common::consts::{FRAME_DELIMITER, MAX_INBOUND_FRAME};
use commander_common::envelope::LowLevelCommand;
use tracing::warn;

use crate::transport::TransportError;

/// Encode `cmd` as one delimited frame.
pub fn encode_frame(cmd: &LowLevelCommand) -> Result<Vec<u8>, TransportError> {
    let mut frame = serde_json::to_vec(cmd)?;
    frame.push(FRAME_DELIMITER);
    Ok(frame)
}

/// Parse one frame (with or without its delimiter) back into a command.
pub fn decode_frame(frame: &str) -> Result<LowLevelCommand, TransportError> {
    Ok(serde_json::from_str(frame.trim_end_matches(FRAME_DELIMITER as char))?)
}

/// Map each byte to the `char` with the same code point.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Accumulates inbound text and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: String,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` and return every frame it completes, without delimiters.
    ///
    /// Empty frames (back-to-back delimiters) are skipped. Undelimited text
    /// longer than [`MAX_INBOUND_FRAME`] is returned as a frame of its own.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);
        let mut frames = Vec::new();
        while let Some(pos) = self.pending.find(FRAME_DELIMITER as char) {
            let frame: String = self.pending.drain(..=pos).collect();
            let frame = frame.trim_end_matches(['\r', '\n']);
            if !frame.is_empty() {
                frames.push(frame.to_string());
            }
        }
        if self.pending.len() > MAX_INBOUND_FRAME {
            warn!(
                "{} bytes without a frame delimiter, handing off as is",
                self.pending.len()
            );
            frames.push(std::mem::take(&mut self.pending));
        }
        frames
    }

    /// Text received after the last delimiter.
    pub fn pending(&self) -> &str {
        &self.pending
    }
}

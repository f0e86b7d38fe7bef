//! Incremental XML framer over the raw serial byte stream.
//!
//! The RAVEn stick writes a continuous sequence of XML fragments with no
//! enclosing document, interleaved with fragment kinds this exporter does
//! not track. [`XmlScanner`] buffers bytes until a complete instance of a
//! registered shape is present, decodes it, and resumes from the byte
//! after it. Message boundaries never align with read boundaries, so the
//! scanner is restartable at any byte offset.

use thiserror::Error;

use crate::message::{CurrentSummationDelivered, InstantaneousDemand, MessageKind, RavenMessage};

/// Error type for framing failures.
///
/// Distinct from "no message yet": a `ScanError` means a registered
/// fragment was present but not well-formed, which leaves the framer
/// desynchronized with no safe point to resume from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("malformed {tag} fragment: {reason}")]
    Malformed { tag: &'static str, reason: String },
}

/// A registered decodable message shape.
struct Shape {
    kind: MessageKind,
    tag: &'static str,
    open: &'static [u8],
    close: &'static [u8],
}

// The device emits attribute-free elements, so literal tag matching is
// sufficient for framing. Field-level validation happens in the decode.
const SHAPES: [Shape; 2] = [
    Shape {
        kind: MessageKind::Demand,
        tag: "InstantaneousDemand",
        open: b"<InstantaneousDemand>",
        close: b"</InstantaneousDemand>",
    },
    Shape {
        kind: MessageKind::Summation,
        tag: "CurrentSummationDelivered",
        open: b"<CurrentSummationDelivered>",
        close: b"</CurrentSummationDelivered>",
    },
];

// Longest registered open tag minus one byte: the longest tag prefix that
// can straddle a read boundary and must survive a buffer trim.
const MAX_CARRY: usize = b"<CurrentSummationDelivered>".len() - 1;

/// Stateful framer yielding one decoded message per pull.
#[derive(Debug, Default)]
pub struct XmlScanner {
    buf: Vec<u8>,
}

impl XmlScanner {
    /// Create an empty scanner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete message, if one is buffered.
    ///
    /// `Ok(None)` means more bytes are needed; a truncated fragment at the
    /// end of the buffer is never matched. Content ahead of the earliest
    /// registered tag is discarded silently.
    pub fn try_next(&mut self) -> Result<Option<RavenMessage>, ScanError> {
        let earliest = SHAPES
            .iter()
            .filter_map(|shape| find(&self.buf, shape.open).map(|pos| (pos, shape)))
            .min_by_key(|(pos, _)| *pos);

        let Some((start, shape)) = earliest else {
            // Nothing recognizable. Keep a tail in case a tag is split
            // across reads; everything before it is undeclared markup.
            if self.buf.len() > MAX_CARRY {
                self.buf.drain(..self.buf.len() - MAX_CARRY);
            }
            return Ok(None);
        };

        // Skipped content ahead of the fragment is dropped so the buffer
        // stays bounded while waiting for the close tag.
        if start > 0 {
            self.buf.drain(..start);
        }

        let Some(end) = find(&self.buf, shape.close) else {
            return Ok(None);
        };

        let fragment: Vec<u8> = self.buf.drain(..end + shape.close.len()).collect();
        decode_fragment(shape, &fragment).map(Some)
    }
}

/// Decode a complete framed fragment into its typed message.
fn decode_fragment(shape: &Shape, fragment: &[u8]) -> Result<RavenMessage, ScanError> {
    let text = std::str::from_utf8(fragment).map_err(|e| ScanError::Malformed {
        tag: shape.tag,
        reason: e.to_string(),
    })?;

    match shape.kind {
        MessageKind::Demand => quick_xml::de::from_str::<InstantaneousDemand>(text)
            .map(RavenMessage::Demand)
            .map_err(|e| ScanError::Malformed {
                tag: shape.tag,
                reason: e.to_string(),
            }),
        MessageKind::Summation => quick_xml::de::from_str::<CurrentSummationDelivered>(text)
            .map(RavenMessage::Summation)
            .map_err(|e| ScanError::Malformed {
                tag: shape.tag,
                reason: e.to_string(),
            }),
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

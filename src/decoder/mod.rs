//! Single-frame decoding.
//!
//! [`decode_one`] turns the frame at an offset into decoded bytes plus the
//! markers describing anything lost on the way there.  Structural damage is
//! repaired by resyncing to the next valid frame; payload damage and
//! unsupported codecs cost only the frame concerned.  The only state carried
//! between frames is the last sequence number, held in a [`DecoderState`]
//! owned by the caller.

pub mod marker;

pub use marker::Marker;

use crate::codec::{get_codec, CodecError};
use crate::frame::{FrameHeader, FIXED_HEADER_LEN};
use crate::recovery::{find_next_start, validate, FrameFault};

// ── Sequence tracking ────────────────────────────────────────────────────────

/// Per-session decoder state.  Create one per input; never share or reuse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderState {
    last_sequence: u16,
}

impl DecoderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last non-zero sequence number seen, 0 before the first one.
    pub fn last_sequence(&self) -> u16 {
        self.last_sequence
    }

    /// Record `sequence` and report the numbers skipped since the previous
    /// frame.  Sequences 0 and 1 are never gap-checked; 0 is not recorded.
    pub fn observe(&mut self, sequence: u16) -> Option<Marker> {
        let seq  = u32::from(sequence);
        let last = u32::from(self.last_sequence);
        let gap = (seq > 1 && last != 0 && seq != last + 1)
            .then(|| Marker::MissingSequence { first: last + 1, last: seq - 1 });
        if sequence != 0 {
            self.last_sequence = sequence;
        }
        gap
    }
}

// ── Frame decoding ───────────────────────────────────────────────────────────

/// Result of one [`decode_one`] call.
#[derive(Debug)]
pub enum Step {
    /// No further frame exists at or after the requested offset.
    End,
    Frame(DecodedFrame),
}

#[derive(Debug)]
pub struct DecodedFrame {
    /// Where the frame actually started (after any resync).
    pub offset:      usize,
    /// First byte after this frame's sentinel.
    pub next_offset: usize,
    pub header:      FrameHeader,
    /// Decoded payload; empty when the frame was skipped.
    pub data:        Vec<u8>,
    /// Annotations in output order; all precede `data`.
    pub markers:     Vec<Marker>,
}

impl DecodedFrame {
    /// Append markers then data to the output stream.
    pub fn write_to(&self, tag: &str, out: &mut Vec<u8>) {
        for m in &self.markers {
            m.write_to(tag, out);
        }
        out.extend_from_slice(&self.data);
    }

    pub fn resynced_bytes(&self) -> usize {
        self.markers
            .iter()
            .map(|m| match m {
                Marker::Resync { skipped, .. } => *skipped,
                _ => 0,
            })
            .sum()
    }
}

/// Decode the frame at `offset`, resyncing forward first if the bytes there
/// are not a valid frame.
///
/// Returns [`Step::End`] when `offset` is past the buffer or no valid frame
/// follows it.  Frame-level faults never surface as `Err`; an error here means
/// the header could not be re-read after it validated.
pub fn decode_one(buf: &[u8], offset: usize, state: &mut DecoderState) -> Result<Step, FrameFault> {
    if offset >= buf.len() {
        return Ok(Step::End);
    }

    let mut markers = Vec::new();
    let mut offset = offset;

    if let Err(fault) = validate(buf, offset, 1) {
        let Some(found) = find_next_start(buf, offset, 1) else {
            tracing::warn!(
                offset,
                trailing = buf.len() - offset,
                %fault,
                "no valid frame after offset, stopping"
            );
            return Ok(Step::End);
        };
        let skipped = found - offset;
        tracing::warn!(offset, skipped, resumed_at = found, %fault, "resynced past corrupt bytes");
        markers.push(Marker::Resync { resumed_at: found, skipped, cause: fault.to_string() });
        offset = found;
    }

    let header = FrameHeader::read(&buf[offset..]).map_err(|_| FrameFault::TruncatedHeader {
        offset,
        header_len: FIXED_HEADER_LEN,
        available: buf.len() - offset,
    })?;
    let payload_start = offset + header.header_len();
    let payload = &buf[payload_start..payload_start + header.payload_len as usize];
    let next_offset = offset + header.frame_len();

    if let Some(gap) = state.observe(header.sequence) {
        tracing::warn!(offset, sequence = header.sequence, %gap, "sequence gap");
        markers.push(gap);
    }

    let compression = header.format.compression;
    let decoded = get_codec(compression).and_then(|codec| codec.decompress(payload));
    let data = match decoded {
        Ok(data) => data,
        Err(CodecError::Unsupported { compression }) => {
            tracing::warn!(offset, magic = header.format.magic, %compression, "skipping frame with unsupported compression");
            markers.push(Marker::Unsupported { offset, compression });
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(offset, %compression, error = %e, "payload failed to decompress");
            markers.push(Marker::Decompress { offset, error: e.to_string() });
            Vec::new()
        }
    };

    tracing::debug!(
        offset,
        sequence = header.sequence,
        payload_len = header.payload_len,
        decoded_len = data.len(),
        "decoded frame"
    );

    Ok(Step::Frame(DecodedFrame { offset, next_offset, header, data, markers }))
}

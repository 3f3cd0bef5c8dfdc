//! Structural validation of frame runs.
//!
//! A frame is structurally valid when its header fits in the buffer, its
//! declared payload plus the sentinel fit after the header, and the byte
//! after the payload is [`SENTINEL`].  Nothing here inflates a payload.
//!
//! [`validate`] checks a run of consecutive frames with a plain loop; a file
//! holding hundreds of thousands of frames costs no stack depth.

pub mod scanner;

pub use scanner::find_next_start;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::codec::FrameFormat;
use crate::frame::SENTINEL;

/// Why the bytes at an offset are not a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameFault {
    #[error("buffer[{offset}]:{magic} is not a frame magic")]
    UnknownMagic { offset: usize, magic: u8 },
    #[error("header at {offset} needs {header_len} bytes, {available} available")]
    TruncatedHeader { offset: usize, header_len: usize, available: usize },
    #[error("log length:{payload_len} at {offset}, end pos {end} > len(buffer):{available}")]
    TruncatedPayload { offset: usize, payload_len: u32, end: usize, available: usize },
    #[error("log length:{payload_len} at {offset}, buffer[{sentinel_at}]:{found} is not the end sentinel")]
    BadSentinel { offset: usize, payload_len: u32, sentinel_at: usize, found: u8 },
}

impl FrameFault {
    /// Offset of the frame start that failed.
    pub fn offset(&self) -> usize {
        match self {
            FrameFault::UnknownMagic { offset, .. }
            | FrameFault::TruncatedHeader { offset, .. }
            | FrameFault::TruncatedPayload { offset, .. }
            | FrameFault::BadSentinel { offset, .. } => *offset,
        }
    }
}

/// Check the single frame starting at `offset` and return the offset just
/// past its sentinel.
pub fn check_frame(buf: &[u8], offset: usize) -> Result<usize, FrameFault> {
    let available = buf.len();
    let magic = match buf.get(offset) {
        Some(&b) => b,
        None => {
            return Err(FrameFault::TruncatedHeader {
                offset,
                header_len: crate::frame::FIXED_HEADER_LEN,
                available: 0,
            })
        }
    };
    let format = FrameFormat::detect(magic)
        .map_err(|_| FrameFault::UnknownMagic { offset, magic })?;

    let header_len = format.header_len();
    let remaining  = available - offset;
    if header_len > remaining {
        return Err(FrameFault::TruncatedHeader { offset, header_len, available: remaining });
    }

    let len_at = offset + crate::frame::FIXED_HEADER_LEN - 4;
    let payload_len = LittleEndian::read_u32(&buf[len_at..len_at + 4]);

    // Checked so a hostile length cannot wrap on 32-bit targets.
    let sentinel_at = (offset + header_len).checked_add(payload_len as usize);
    let end = sentinel_at.and_then(|s| s.checked_add(1));
    let (sentinel_at, end) = match (sentinel_at, end) {
        (Some(s), Some(e)) if e <= available => (s, e),
        _ => {
            return Err(FrameFault::TruncatedPayload {
                offset,
                payload_len,
                end: end.unwrap_or(usize::MAX),
                available,
            })
        }
    };

    let found = buf[sentinel_at];
    if found != SENTINEL {
        return Err(FrameFault::BadSentinel { offset, payload_len, sentinel_at, found });
    }
    Ok(end)
}

/// Confirm that `count` consecutive frames starting at `offset` are
/// structurally valid.  Reaching the exact end of `buf` before `count` frames
/// have been seen is success.
pub fn validate(buf: &[u8], offset: usize, count: usize) -> Result<(), FrameFault> {
    let mut pos = offset;
    for _ in 0..count.max(1) {
        if pos == buf.len() {
            return Ok(());
        }
        pos = check_frame(buf, pos)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_raw_frame;

    fn frame(seq: u16, payload: &[u8]) -> Vec<u8> {
        encode_raw_frame(0x03, seq, payload).unwrap()
    }

    #[test]
    fn single_frame_is_valid() {
        let buf = frame(2, b"hello");
        assert_eq!(check_frame(&buf, 0), Ok(buf.len()));
        assert_eq!(validate(&buf, 0, 1), Ok(()));
    }

    #[test]
    fn end_of_buffer_is_not_corruption() {
        let buf = frame(2, b"only one");
        assert_eq!(validate(&buf, 0, 2), Ok(()));
        assert_eq!(validate(&buf, buf.len(), 5), Ok(()));
    }

    #[test]
    fn second_frame_fault_is_reported_at_its_offset() {
        let mut buf = frame(2, b"first");
        let second = buf.len();
        buf.extend_from_slice(&[0xEE; 20]);
        assert_eq!(validate(&buf, 0, 1), Ok(()));
        assert_eq!(
            validate(&buf, 0, 2),
            Err(FrameFault::UnknownMagic { offset: second, magic: 0xEE })
        );
    }

    #[test]
    fn truncated_header() {
        let buf = frame(2, b"abc");
        let err = validate(&buf[..8], 0, 1).unwrap_err();
        assert_eq!(err, FrameFault::TruncatedHeader { offset: 0, header_len: 13, available: 8 });
        assert!(err.to_string().contains("at 0"));
    }

    #[test]
    fn truncated_payload() {
        let buf = frame(2, b"abcdef");
        let cut = &buf[..buf.len() - 2];
        assert!(matches!(
            validate(cut, 0, 1),
            Err(FrameFault::TruncatedPayload { offset: 0, payload_len: 6, .. })
        ));
    }

    #[test]
    fn huge_declared_length_is_truncated_payload() {
        let mut buf = frame(2, b"abc");
        buf[5..9].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(validate(&buf, 0, 1), Err(FrameFault::TruncatedPayload { .. })));
    }

    #[test]
    fn bad_sentinel() {
        let mut buf = frame(2, b"abc");
        let last = buf.len() - 1;
        buf[last] = 0x7F;
        assert_eq!(
            validate(&buf, 0, 1),
            Err(FrameFault::BadSentinel { offset: 0, payload_len: 3, sentinel_at: last, found: 0x7F })
        );
    }

    #[test]
    fn long_runs_validate_without_recursion() {
        let mut buf = Vec::new();
        for i in 0..200_000u32 {
            buf.extend(frame((i % 60_000) as u16 + 2, b"x"));
        }
        assert_eq!(validate(&buf, 0, usize::MAX), Ok(()));
    }

    #[test]
    fn zero_length_payload_is_valid() {
        let buf = frame(2, b"");
        assert_eq!(buf.len(), 14);
        assert_eq!(validate(&buf, 0, 1), Ok(()));
    }
}

//! Resynchronisation scanner.
//!
//! Walks forward one byte at a time.  Every byte that is a known magic is
//! tried as a frame start by running [`validate`](super::validate) over the
//! requested number of frames; the first offset that passes wins.  The same
//! routine anchors a session (leading garbage, usually with a two-frame
//! lookahead) and recovers mid-stream after a structural fault (one frame).

use crate::codec::FrameFormat;

use super::validate;

/// First offset at or after `from` where `count` consecutive frames validate.
pub fn find_next_start(buf: &[u8], from: usize, count: usize) -> Option<usize> {
    let tail = buf.get(from..)?;
    tail.iter()
        .enumerate()
        .filter(|(_, b)| FrameFormat::is_known_magic(**b))
        .map(|(i, _)| from + i)
        .find(|&pos| validate(buf, pos, count).is_ok())
}

//! Inline diagnostic markers.
//!
//! Markers are UTF-8 lines written straight into the decoded stream at the
//! point where data went missing, so a reader of the output log sees the
//! damage in context:
//!
//! ```text
//! [F]<tag> decode error len=<skipped>, result:<cause>
//! [F]<tag> log seq:<first>-<last> is missing
//! [F]<tag> decompress err, <error>
//! [F]<tag> unsupported compression <scheme>, frame at <offset> skipped
//! ```

use std::fmt;

use crate::codec::Compression;

/// One corruption annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// `skipped` bytes before `resumed_at` were not part of any valid frame.
    Resync { resumed_at: usize, skipped: usize, cause: String },
    /// Sequence numbers `first..=last` never appeared.  `last < first` when
    /// the counter went backwards.
    MissingSequence { first: u32, last: u32 },
    /// A supported codec rejected the payload of the frame at `offset`.
    Decompress { offset: usize, error: String },
    /// The frame at `offset` uses a scheme this build does not decode.
    Unsupported { offset: usize, compression: Compression },
}

impl Marker {
    /// Render as a complete marker line for `tag`.
    pub fn line(&self, tag: &str) -> String {
        format!("[F]{tag} {self}\n")
    }

    /// Append the rendered line to `out`.
    pub fn write_to(&self, tag: &str, out: &mut Vec<u8>) {
        out.extend_from_slice(self.line(tag).as_bytes());
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Resync { skipped, cause, .. } => {
                write!(f, "decode error len={skipped}, result:{cause}")
            }
            Marker::MissingSequence { first, last } => {
                write!(f, "log seq:{first}-{last} is missing")
            }
            Marker::Decompress { error, .. } => write!(f, "decompress err, {error}"),
            Marker::Unsupported { offset, compression } => {
                write!(f, "unsupported compression {compression}, frame at {offset} skipped")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_prefix_tag_and_newline() {
        let m = Marker::MissingSequence { first: 6, last: 7 };
        assert_eq!(m.line("xlog-decoder"), "[F]xlog-decoder log seq:6-7 is missing\n");

        let m = Marker::Resync { resumed_at: 5, skipped: 5, cause: "junk".into() };
        let mut out = b"before".to_vec();
        m.write_to("t", &mut out);
        assert_eq!(out, b"before[F]t decode error len=5, result:junk\n");
    }

    #[test]
    fn unsupported_names_scheme_and_offset() {
        let m = Marker::Unsupported { offset: 42, compression: Compression::ZstdSync };
        assert_eq!(m.to_string(), "unsupported compression zstd-sync, frame at 42 skipped");
    }
}

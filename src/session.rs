//! Decode sessions, one per input buffer.
//!
//! ```no_run
//! use xlog_decoder::session::{decode_file, DecodeOptions};
//!
//! let decoded = decode_file("app_20240101.xlog", &DecodeOptions::default())?;
//! std::fs::write("app_20240101_.log", &decoded.output)?;
//! println!("{}", decoded.report.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A session anchors on the first offset where several consecutive frames
//! validate, then drives [`decode_one`] until the buffer is exhausted,
//! concatenating decoded payloads and inline markers into one stream.  Every
//! session owns a fresh [`DecoderState`], so sequence tracking never leaks
//! between files even when files are decoded in parallel.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::codec::Compression;
use crate::decoder::{decode_one, DecoderState, Marker, Step};
use crate::recovery::{find_next_start, FrameFault};

/// Default tag written inside markers.
pub const DEFAULT_SOURCE_TAG: &str = "xlog-decoder";
/// Frames that must validate back to back before a session anchors.
pub const DEFAULT_ANCHOR_LOOKAHEAD: usize = 2;

// ── Options ───────────────────────────────────────────────────────────────────

/// What to do when no anchor is found anywhere in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorPolicy {
    /// Fail the session with [`DecodeFailure::NoAnchor`].
    #[default]
    Strict,
    /// Start at offset 0 and let per-frame resync salvage what it can.
    Lenient,
}

/// Configuration for a [`Session`].
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub anchor:           AnchorPolicy,
    pub anchor_lookahead: usize,
    pub source_tag:       String,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            anchor:           AnchorPolicy::Strict,
            anchor_lookahead: DEFAULT_ANCHOR_LOOKAHEAD,
            source_tag:       DEFAULT_SOURCE_TAG.to_string(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum DecodeFailure {
    #[error("no valid log data found")]
    NoAnchor,
    #[error("no decodable log content")]
    NoDecodableContent,
    #[error("frame header unreadable after validation: {0}")]
    Frame(#[from] FrameFault),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Report ────────────────────────────────────────────────────────────────────

/// Inclusive range of sequence numbers that never appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MissingRange {
    pub first: u32,
    pub last:  u32,
}

/// What a session found, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    /// Offset of the first frame decoded; `None` if none anchored.
    pub anchor_offset:        Option<usize>,
    pub input_bytes:          usize,
    pub output_bytes:         usize,
    pub frames:               usize,
    pub resyncs:              usize,
    pub skipped_bytes:        usize,
    pub missing_sequences:    Vec<MissingRange>,
    pub decompress_failures:  usize,
    pub unsupported_frames:   usize,
    /// Frame count per compression scheme name.
    pub frames_by_compression: BTreeMap<&'static str, usize>,
    pub last_sequence:        u16,
}

impl DecodeReport {
    /// True when nothing was skipped, missing or undecodable.
    pub fn is_clean(&self) -> bool {
        self.resyncs == 0
            && self.missing_sequences.is_empty()
            && self.decompress_failures == 0
            && self.unsupported_frames == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} frame(s), {} byte(s) out; {} resync(s) skipping {} byte(s), \
             {} missing range(s), {} decompress failure(s), {} unsupported frame(s)",
            self.frames,
            self.output_bytes,
            self.resyncs,
            self.skipped_bytes,
            self.missing_sequences.len(),
            self.decompress_failures,
            self.unsupported_frames,
        )
    }

    fn record(&mut self, marker: &Marker) {
        match marker {
            Marker::Resync { skipped, .. } => {
                self.resyncs += 1;
                self.skipped_bytes += skipped;
            }
            Marker::MissingSequence { first, last } => {
                self.missing_sequences.push(MissingRange { first: *first, last: *last });
            }
            Marker::Decompress { .. }  => self.decompress_failures += 1,
            Marker::Unsupported { .. } => self.unsupported_frames += 1,
        }
    }

    fn count_frame(&mut self, compression: Compression) {
        self.frames += 1;
        *self.frames_by_compression.entry(compression.name()).or_insert(0) += 1;
    }
}

/// Output of a successful session.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub output: Vec<u8>,
    pub report: DecodeReport,
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One decode pass over one buffer.  Not reusable: [`Session::run`] consumes it.
pub struct Session<'a> {
    buf:     &'a [u8],
    options: &'a DecodeOptions,
    state:   DecoderState,
    output:  Vec<u8>,
    report:  DecodeReport,
}

impl<'a> Session<'a> {
    pub fn new(buf: &'a [u8], options: &'a DecodeOptions) -> Self {
        Self {
            buf,
            options,
            state:  DecoderState::new(),
            output: Vec::with_capacity(buf.len()),
            report: DecodeReport { input_bytes: buf.len(), ..DecodeReport::default() },
        }
    }

    pub fn run(mut self) -> Result<Decoded, DecodeFailure> {
        let mut offset = self.anchor()?;

        loop {
            let frame = match decode_one(self.buf, offset, &mut self.state)? {
                Step::End        => break,
                Step::Frame(f)   => f,
            };
            if self.report.anchor_offset.is_none() {
                self.report.anchor_offset = Some(frame.offset);
            }
            for m in &frame.markers {
                self.report.record(m);
            }
            self.report.count_frame(frame.header.format.compression);
            frame.write_to(&self.options.source_tag, &mut self.output);
            offset = frame.next_offset;
        }

        self.report.output_bytes  = self.output.len();
        self.report.last_sequence = self.state.last_sequence();
        tracing::debug!(summary = %self.report.summary(), "session finished");

        if self.output.is_empty() {
            return Err(DecodeFailure::NoDecodableContent);
        }
        Ok(Decoded { output: self.output, report: self.report })
    }

    /// Locate the first frame.  Bytes skipped before it are annotated like
    /// any other resync.
    fn anchor(&mut self) -> Result<usize, DecodeFailure> {
        let lookahead = self.options.anchor_lookahead.max(1);
        match find_next_start(self.buf, 0, lookahead) {
            Some(0) => Ok(0),
            Some(start) => {
                tracing::warn!(skipped = start, lookahead, "leading bytes precede first valid frame");
                let marker = Marker::Resync {
                    resumed_at: start,
                    skipped:    start,
                    cause:      format!("no frame run of {lookahead} starts before offset {start}"),
                };
                self.report.record(&marker);
                marker.write_to(&self.options.source_tag, &mut self.output);
                Ok(start)
            }
            None => match self.options.anchor {
                AnchorPolicy::Strict => {
                    tracing::warn!(len = self.buf.len(), lookahead, "no anchor found");
                    Err(DecodeFailure::NoAnchor)
                }
                AnchorPolicy::Lenient => {
                    tracing::debug!(lookahead, "no anchor found, starting at offset 0");
                    Ok(0)
                }
            },
        }
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Decode a whole buffer with default options.
pub fn decode(bytes: &[u8]) -> Result<Vec<u8>, DecodeFailure> {
    Ok(decode_with(bytes, &DecodeOptions::default())?.output)
}

/// Decode a whole buffer.
pub fn decode_with(bytes: &[u8], options: &DecodeOptions) -> Result<Decoded, DecodeFailure> {
    Session::new(bytes, options).run()
}

/// Read `path` into memory and decode it.
pub fn decode_file<P: AsRef<Path>>(path: P, options: &DecodeOptions) -> Result<Decoded, DecodeFailure> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_with(&bytes, options)
}

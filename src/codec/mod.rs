//! Format detection and payload codecs.
//!
//! # Magic table
//! The first byte of every frame selects two things at once: the length of
//! the opaque crypt-key field that closes the header, and the compression
//! scheme applied to the payload.  The table is closed: a byte that is not
//! listed is not a frame start, and there is no default.
//!
//! | magic | crypt key | compression |
//! |-------|-----------|-------------|
//! | 0x03  | 4         | none |
//! | 0x06  | 64        | none |
//! | 0x08  | 64        | none |
//! | 0x04  | 4         | raw deflate, single stream |
//! | 0x09  | 64        | raw deflate, single stream |
//! | 0x05  | 4         | raw deflate, segmented |
//! | 0x07  | 64        | zstd |
//! | 0x0A  | 64        | zstd (sync) |
//! | 0x0B  | 64        | zstd (sync) |
//! | 0x0C  | 64        | zstd (async) |
//! | 0x0D  | 64        | zstd (async) |
//!
//! The ZSTD family is recognised (so frames using it still anchor and resync
//! correctly) but never decoded; [`get_codec`] reports it as
//! [`CodecError::Unsupported`].
//!
//! # Deflate flavour
//! Payloads are *raw* deflate: no zlib header, no Adler-32 trailer.  Writers
//! that crash mid-flush leave streams without a final block, so inflation
//! returns whatever the stream yielded up to the end of the input and only
//! fails on data that is actually corrupt.

use std::io::{self, Write};

use flate2::write::DeflateEncoder;
use flate2::{Compression as Level, Decompress, FlushDecompress, Status};
use thiserror::Error;

// ── Magic bytes ──────────────────────────────────────────────────────────────

pub const MAGIC_NO_COMPRESS:            u8 = 0x03;
pub const MAGIC_NO_COMPRESS_1:          u8 = 0x06;
pub const MAGIC_NO_COMPRESS_NO_CRYPT:   u8 = 0x08;
pub const MAGIC_COMPRESS:               u8 = 0x04;
pub const MAGIC_COMPRESS_SEGMENTED:     u8 = 0x05;
pub const MAGIC_COMPRESS_ZSTD:          u8 = 0x07;
pub const MAGIC_COMPRESS_NO_CRYPT:      u8 = 0x09;
pub const MAGIC_SYNC_ZSTD:              u8 = 0x0A;
pub const MAGIC_SYNC_NO_CRYPT_ZSTD:     u8 = 0x0B;
pub const MAGIC_ASYNC_ZSTD:             u8 = 0x0C;
pub const MAGIC_ASYNC_NO_CRYPT_ZSTD:    u8 = 0x0D;

/// Every recognised frame magic, in table order.
pub const KNOWN_MAGICS: [u8; 11] = [
    MAGIC_NO_COMPRESS,
    MAGIC_NO_COMPRESS_1,
    MAGIC_NO_COMPRESS_NO_CRYPT,
    MAGIC_COMPRESS,
    MAGIC_COMPRESS_NO_CRYPT,
    MAGIC_COMPRESS_SEGMENTED,
    MAGIC_COMPRESS_ZSTD,
    MAGIC_SYNC_ZSTD,
    MAGIC_SYNC_NO_CRYPT_ZSTD,
    MAGIC_ASYNC_ZSTD,
    MAGIC_ASYNC_NO_CRYPT_ZSTD,
];

/// Crypt-key length of the short header variants.
pub const SHORT_CRYPT_KEY_LEN: usize = 4;
/// Crypt-key length of the long header variants.
pub const LONG_CRYPT_KEY_LEN:  usize = 64;

// ── Compression scheme ───────────────────────────────────────────────────────

/// Payload compression scheme selected by a frame magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    RawDeflate,
    SegmentedDeflate,
    Zstd,
    ZstdSync,
    ZstdAsync,
}

impl Compression {
    /// Human-readable name (diagnostics and markers only).
    pub fn name(self) -> &'static str {
        match self {
            Compression::None             => "none",
            Compression::RawDeflate       => "zlib-raw-single-stream",
            Compression::SegmentedDeflate => "zlib-raw-segmented",
            Compression::Zstd             => "zstd",
            Compression::ZstdSync         => "zstd-sync",
            Compression::ZstdAsync        => "zstd-async",
        }
    }

    /// Whether this build can decode payloads using the scheme.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            Compression::None | Compression::RawDeflate | Compression::SegmentedDeflate
        )
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Format detector ──────────────────────────────────────────────────────────

/// Byte value that is not a frame magic.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown frame magic 0x{0:02x}")]
pub struct UnknownMagic(pub u8);

/// Everything a magic byte says about the frame it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub magic:         u8,
    pub crypt_key_len: usize,
    pub compression:   Compression,
}

impl FrameFormat {
    /// Classify a magic byte.
    pub fn detect(magic: u8) -> Result<Self, UnknownMagic> {
        let (crypt_key_len, compression) = match magic {
            MAGIC_NO_COMPRESS          => (SHORT_CRYPT_KEY_LEN, Compression::None),
            MAGIC_NO_COMPRESS_1        => (LONG_CRYPT_KEY_LEN,  Compression::None),
            MAGIC_NO_COMPRESS_NO_CRYPT => (LONG_CRYPT_KEY_LEN,  Compression::None),
            MAGIC_COMPRESS             => (SHORT_CRYPT_KEY_LEN, Compression::RawDeflate),
            MAGIC_COMPRESS_NO_CRYPT    => (LONG_CRYPT_KEY_LEN,  Compression::RawDeflate),
            MAGIC_COMPRESS_SEGMENTED   => (SHORT_CRYPT_KEY_LEN, Compression::SegmentedDeflate),
            MAGIC_COMPRESS_ZSTD        => (LONG_CRYPT_KEY_LEN,  Compression::Zstd),
            MAGIC_SYNC_ZSTD            => (LONG_CRYPT_KEY_LEN,  Compression::ZstdSync),
            MAGIC_SYNC_NO_CRYPT_ZSTD   => (LONG_CRYPT_KEY_LEN,  Compression::ZstdSync),
            MAGIC_ASYNC_ZSTD           => (LONG_CRYPT_KEY_LEN,  Compression::ZstdAsync),
            MAGIC_ASYNC_NO_CRYPT_ZSTD  => (LONG_CRYPT_KEY_LEN,  Compression::ZstdAsync),
            other                      => return Err(UnknownMagic(other)),
        };
        Ok(Self { magic, crypt_key_len, compression })
    }

    #[inline]
    pub fn is_known_magic(byte: u8) -> bool {
        KNOWN_MAGICS.contains(&byte)
    }

    /// magic + seq + begin hour + end hour + payload length + crypt key.
    #[inline]
    pub fn header_len(&self) -> usize {
        crate::frame::FIXED_HEADER_LEN + self.crypt_key_len
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// The scheme is recognised but this build does not decode it.
    #[error("Unsupported compression: {compression}")]
    Unsupported { compression: Compression },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn compression(&self) -> Compression;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn compression(&self) -> Compression { Compression::None }
    fn compress(&self, data: &[u8])   -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct RawDeflateCodec;
impl Codec for RawDeflateCodec {
    fn compression(&self) -> Compression { Compression::RawDeflate }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        deflate_raw(data)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        inflate_raw(data)
    }
}

/// Largest body a single segment can carry (u16 length prefix).
pub const MAX_SEGMENT_LEN: usize = u16::MAX as usize;

/// Raw deflate whose compressed stream is cut into `(u16 LE length, body)`
/// sub-records.  Decoding joins the bodies and inflates the join once.
pub struct SegmentedDeflateCodec;
impl Codec for SegmentedDeflateCodec {
    fn compression(&self) -> Compression { Compression::SegmentedDeflate }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let stream = deflate_raw(data)?;
        let mut out = Vec::with_capacity(stream.len() + 2 * (stream.len() / MAX_SEGMENT_LEN + 1));
        for segment in stream.chunks(MAX_SEGMENT_LEN) {
            out.extend_from_slice(&(segment.len() as u16).to_le_bytes());
            out.extend_from_slice(segment);
        }
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        inflate_raw(&join_segments(data)?)
    }
}

/// Concatenate the bodies of a segmented payload.
///
/// A final segment that declares more bytes than remain contributes what is
/// there.  A lone trailing byte cannot hold a length prefix and is an error.
pub fn join_segments(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut joined = Vec::with_capacity(data.len());
    let mut rest = data;
    while !rest.is_empty() {
        if rest.len() < 2 {
            return Err(CodecError::Decompression(format!(
                "segment length prefix truncated at payload byte {}",
                data.len() - rest.len()
            )));
        }
        let len  = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let body = &rest[2..];
        let take = len.min(body.len());
        joined.extend_from_slice(&body[..take]);
        rest = &body[take..];
    }
    Ok(joined)
}

// ── Raw deflate helpers ──────────────────────────────────────────────────────

/// Compress into a headerless deflate stream.
pub fn deflate_raw(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut enc = DeflateEncoder::new(Vec::new(), Level::default());
    enc.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
    enc.finish().map_err(|e| CodecError::Compression(e.to_string()))
}

/// Inflate a headerless deflate stream, tolerating a missing final block.
pub fn inflate_raw(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut inflater = Decompress::new(false);
    let mut out: Vec<u8> = Vec::with_capacity(data.len().saturating_mul(4).max(256));
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity().max(4096));
        }
        let in_before  = inflater.total_in();
        let out_before = inflater.total_out();
        let consumed   = in_before as usize;
        let status = inflater
            .decompress_vec(&data[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        if status == Status::StreamEnd {
            break;
        }
        // Spare capacity is always available here, so a call that moves
        // nothing means the input is exhausted.
        if inflater.total_in() == in_before && inflater.total_out() == out_before {
            break;
        }
    }
    Ok(out)
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve a compression scheme to a built-in codec.
///
/// The ZSTD family is reported as [`CodecError::Unsupported`]; callers skip
/// the frame rather than falling back to another codec.
pub fn get_codec(compression: Compression) -> Result<Box<dyn Codec>, CodecError> {
    match compression {
        Compression::None             => Ok(Box::new(NoneCodec)),
        Compression::RawDeflate       => Ok(Box::new(RawDeflateCodec)),
        Compression::SegmentedDeflate => Ok(Box::new(SegmentedDeflateCodec)),
        Compression::Zstd
        | Compression::ZstdSync
        | Compression::ZstdAsync      => Err(CodecError::Unsupported { compression }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_covers_the_whole_table() {
        let expected = [
            (0x03, 4,  Compression::None),
            (0x06, 64, Compression::None),
            (0x08, 64, Compression::None),
            (0x04, 4,  Compression::RawDeflate),
            (0x09, 64, Compression::RawDeflate),
            (0x05, 4,  Compression::SegmentedDeflate),
            (0x07, 64, Compression::Zstd),
            (0x0A, 64, Compression::ZstdSync),
            (0x0B, 64, Compression::ZstdSync),
            (0x0C, 64, Compression::ZstdAsync),
            (0x0D, 64, Compression::ZstdAsync),
        ];
        for (magic, key_len, compression) in expected {
            let fmt = FrameFormat::detect(magic).unwrap();
            assert_eq!(fmt.crypt_key_len, key_len, "magic 0x{magic:02x}");
            assert_eq!(fmt.compression, compression, "magic 0x{magic:02x}");
        }
    }

    #[test]
    fn every_other_byte_is_unknown() {
        let known = (0u8..=255).filter(|b| FrameFormat::detect(*b).is_ok()).count();
        assert_eq!(known, KNOWN_MAGICS.len());
        assert_eq!(FrameFormat::detect(0x00), Err(UnknownMagic(0x00)));
        assert_eq!(FrameFormat::detect(0x0E), Err(UnknownMagic(0x0E)));
        assert_eq!(FrameFormat::detect(0x50), Err(UnknownMagic(0x50)));
    }

    #[test]
    fn header_len_follows_key_len() {
        assert_eq!(FrameFormat::detect(0x03).unwrap().header_len(), 13);
        assert_eq!(FrameFormat::detect(0x09).unwrap().header_len(), 73);
    }

    #[test]
    fn raw_deflate_has_no_zlib_header() {
        let text = b"2024-01-01 12:00:00 I/app: started\n".repeat(20);
        let compressed = RawDeflateCodec.compress(&text).unwrap();
        // A zlib stream would start with 0x78.
        assert_ne!(compressed[0], 0x78);
        assert_eq!(RawDeflateCodec.decompress(&compressed).unwrap(), text);
    }

    #[test]
    fn truncated_deflate_yields_partial_output() {
        let text: Vec<u8> = (0..20_000u32).flat_map(|i| format!("line {i}\n").into_bytes()).collect();
        let compressed = deflate_raw(&text).unwrap();
        let cut = &compressed[..compressed.len() / 2];
        let partial = inflate_raw(cut).unwrap();
        assert!(!partial.is_empty());
        assert!(partial.len() < text.len());
        assert_eq!(&text[..partial.len()], &partial[..]);
    }

    #[test]
    fn corrupt_deflate_is_an_error() {
        // BTYPE = 11 is reserved in every deflate block header.
        let err = inflate_raw(&[0xFF, 0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, CodecError::Decompression(_)));
    }

    #[test]
    fn segmented_bodies_are_joined_before_inflating() {
        assert_eq!(
            join_segments(&[3, 0, b'a', b'b', b'c', 2, 0, b'd', b'e']).unwrap(),
            b"abcde"
        );

        let compressed = deflate_raw(b"abcde").unwrap();
        let (head, tail) = compressed.split_at(compressed.len() / 2);
        let mut payload = Vec::new();
        for part in [head, tail] {
            payload.extend_from_slice(&(part.len() as u16).to_le_bytes());
            payload.extend_from_slice(part);
        }
        assert_eq!(SegmentedDeflateCodec.decompress(&payload).unwrap(), b"abcde");
    }

    #[test]
    fn segmented_overlong_tail_is_clamped() {
        assert_eq!(join_segments(&[9, 0, b'x', b'y']).unwrap(), b"xy");
    }

    #[test]
    fn segmented_dangling_byte_is_an_error() {
        assert!(matches!(
            join_segments(&[1, 0, b'x', 7]),
            Err(CodecError::Decompression(_))
        ));
    }

    #[test]
    fn segmented_compress_roundtrips() {
        let text = b"segment me ".repeat(1000);
        let payload = SegmentedDeflateCodec.compress(&text).unwrap();
        assert_eq!(SegmentedDeflateCodec.decompress(&payload).unwrap(), text);
    }

    #[test]
    fn zstd_family_is_unsupported() {
        for c in [Compression::Zstd, Compression::ZstdSync, Compression::ZstdAsync] {
            assert!(!c.is_supported());
            assert!(matches!(get_codec(c), Err(CodecError::Unsupported { compression }) if compression == c));
        }
    }
}

//! Frame header layout.
//!
//! ```text
//! offset  size  field
//! 0       1     magic          (see codec::FrameFormat)
//! 1       2     sequence       u16 LE; 0 and 1 are never gap-checked
//! 3       1     begin_hour
//! 4       1     end_hour
//! 5       4     payload_len    u32 LE
//! 9       K     crypt_key      K = 4 or 64, opaque, never interpreted
//! 9+K     N     payload        compressed per the magic
//! 9+K+N   1     sentinel       always 0x00
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::codec::{get_codec, CodecError, FrameFormat, UnknownMagic};

/// Terminator byte following every payload.
pub const SENTINEL: u8 = 0x00;
/// Header bytes that precede the crypt key.
pub const FIXED_HEADER_LEN: usize = 1 + 2 + 1 + 1 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub format:      FrameFormat,
    pub sequence:    u16,
    pub begin_hour:  u8,
    pub end_hour:    u8,
    pub payload_len: u32,
    pub crypt_key:   Vec<u8>,
}

impl FrameHeader {
    /// Header with an all-zero crypt key of the length the magic demands.
    pub fn new(magic: u8, sequence: u16, payload_len: u32) -> Result<Self, UnknownMagic> {
        let format = FrameFormat::detect(magic)?;
        Ok(Self {
            format,
            sequence,
            begin_hour: 0,
            end_hour: 0,
            payload_len,
            crypt_key: vec![0u8; format.crypt_key_len],
        })
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.format.header_len()
    }

    /// Header + payload + sentinel.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.header_len() + self.payload_len as usize + 1
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u8(self.format.magic)?;
        writer.write_u16::<LittleEndian>(self.sequence)?;
        writer.write_u8(self.begin_hour)?;
        writer.write_u8(self.end_hour)?;
        writer.write_u32::<LittleEndian>(self.payload_len)?;
        writer.write_all(&self.crypt_key)?;
        Ok(())
    }

    /// Read one header.  An unrecognised magic surfaces as `InvalidData`.
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let magic = reader.read_u8()?;
        let format = FrameFormat::detect(magic)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let sequence    = reader.read_u16::<LittleEndian>()?;
        let begin_hour  = reader.read_u8()?;
        let end_hour    = reader.read_u8()?;
        let payload_len = reader.read_u32::<LittleEndian>()?;
        let mut crypt_key = vec![0u8; format.crypt_key_len];
        reader.read_exact(&mut crypt_key)?;
        Ok(Self { format, sequence, begin_hour, end_hour, payload_len, crypt_key })
    }
}

/// Build one frame around `payload`, stored verbatim whatever the magic says.
pub fn encode_raw_frame(magic: u8, sequence: u16, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| CodecError::Compression(format!("payload of {} bytes exceeds u32", payload.len())))?;
    let header = FrameHeader::new(magic, sequence, payload_len)
        .map_err(|e| CodecError::Compression(e.to_string()))?;
    let mut out = Vec::with_capacity(header.frame_len());
    header.write(&mut out)?;
    out.extend_from_slice(payload);
    out.push(SENTINEL);
    Ok(out)
}

/// Compress `data` with the scheme `magic` selects and frame the result.
pub fn encode_frame(magic: u8, sequence: u16, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let format = FrameFormat::detect(magic).map_err(|e| CodecError::Compression(e.to_string()))?;
    let payload = get_codec(format.compression)?.compress(data)?;
    encode_raw_frame(magic, sequence, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_fields_are_little_endian() {
        let mut header = FrameHeader::new(0x03, 0x0102, 0x0A0B0C0D).unwrap();
        header.begin_hour = 7;
        header.end_hour   = 9;
        header.crypt_key  = vec![0xAA, 0xBB, 0xCC, 0xDD];

        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        assert_eq!(
            bytes,
            [0x03, 0x02, 0x01, 7, 9, 0x0D, 0x0C, 0x0B, 0x0A, 0xAA, 0xBB, 0xCC, 0xDD]
        );
        assert_eq!(FrameHeader::read(Cursor::new(&bytes)).unwrap(), header);
    }

    #[test]
    fn frame_len_counts_sentinel() {
        let header = FrameHeader::new(0x09, 1, 10).unwrap();
        assert_eq!(header.header_len(), 73);
        assert_eq!(header.frame_len(), 73 + 10 + 1);
    }

    #[test]
    fn read_rejects_unknown_magic() {
        let err = FrameHeader::read(Cursor::new([0x42u8; 16])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn read_reports_short_header() {
        let err = FrameHeader::read(Cursor::new([0x06u8, 0, 0, 0, 0, 1, 0, 0, 0, 0])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn raw_frame_matches_documented_layout() {
        let frame = encode_raw_frame(0x03, 0, b"hi").unwrap();
        assert_eq!(frame, [0x03, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, b'h', b'i', 0x00]);
    }

    #[test]
    fn encode_frame_refuses_zstd() {
        assert!(matches!(
            encode_frame(0x0A, 2, b"x"),
            Err(CodecError::Unsupported { .. })
        ));
    }
}

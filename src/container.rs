//! Input classification.
//!
//! Xlog files start with a frame magic.  Some collection tools ship the
//! same logs zipped; those start with a ZIP local-file-header signature
//! instead.  Anything else is still worth an xlog decode attempt, since a
//! crash can leave garbage in front of the first frame.

use crate::codec::FrameFormat;

/// ZIP local file header signature, `PK\x03\x04`.
pub const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Byte 0 is a frame magic.
    Xlog,
    /// Byte 0 is not a magic and the ZIP signature is present.
    Zip,
    Unknown,
}

impl ContainerKind {
    pub fn detect(bytes: &[u8]) -> Self {
        match bytes.first() {
            Some(&b) if FrameFormat::is_known_magic(b) => ContainerKind::Xlog,
            _ if bytes.starts_with(&ZIP_SIGNATURE)      => ContainerKind::Zip,
            _                                          => ContainerKind::Unknown,
        }
    }

    /// Whether an xlog decode should be attempted.
    pub fn try_xlog(self) -> bool {
        !matches!(self, ContainerKind::Zip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_leading_bytes() {
        assert_eq!(ContainerKind::detect(&[0x03, 0, 0]), ContainerKind::Xlog);
        assert_eq!(ContainerKind::detect(&[0x0D]), ContainerKind::Xlog);
        assert_eq!(ContainerKind::detect(b"PK\x03\x04rest"), ContainerKind::Zip);
        assert_eq!(ContainerKind::detect(b"PK\x05\x06"), ContainerKind::Unknown);
        assert_eq!(ContainerKind::detect(&[]), ContainerKind::Unknown);
    }

    #[test]
    fn only_zip_skips_xlog_decoding() {
        assert!(ContainerKind::Xlog.try_xlog());
        assert!(ContainerKind::Unknown.try_xlog());
        assert!(!ContainerKind::Zip.try_xlog());
    }
}

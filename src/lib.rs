pub mod codec;
pub mod frame;
pub mod recovery;
pub mod decoder;
pub mod session;
pub mod container;
pub mod discover;

pub use codec::{Compression, FrameFormat, UnknownMagic};
pub use frame::{FrameHeader, encode_frame, encode_raw_frame};
pub use decoder::{DecoderState, Marker, decode_one};
pub use session::{AnchorPolicy, DecodeFailure, DecodeOptions, DecodeReport, Decoded, decode, decode_file, decode_with};
pub use container::ContainerKind;

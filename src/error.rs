use thiserror::Error;

use crate::channels::ChannelSet;
use crate::client::VerificationFailure;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("png encoding error: {0}")]
    PngEncode(#[from] png::EncodingError),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported raw channel count {0}")]
    BadChannelCount(u8),
    #[error("no crop rectangle known for a {width}x{height} raw frame")]
    UnknownFrameSize { width: u32, height: u32 },
    #[error("frame data holds {actual} bytes, expected {expected}")]
    FrameDataLength { expected: usize, actual: usize },
    #[error("a screenshot needs at least one frame")]
    EmptyScreenshot,
    #[error("frame size {actual:?} differs from {expected:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("channels {requested} requested but only {available} are valid")]
    MissingChannels {
        requested: ChannelSet,
        available: ChannelSet,
    },
    #[error("invalid channel set name {0:?}")]
    BadChannelName(String),
    #[error("unknown video chip type {0:?}")]
    UnknownChipType(String),
    #[error("register index {0} out of range 0..=7")]
    BadRegister(u8),
    #[error("unexpected reply from bridge: {0:?}")]
    BadReply(String),
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("chip byte stream lost: {0}")]
    ChipLinkLost(String),
    #[error("{0}")]
    ScreenshotMismatch(Box<VerificationFailure>),
}

//! Error types

use crate::protocol::X11Error;
use crate::render::StandardFormat;
use std::io;
use thiserror::Error;

/// Failures of the wire layer
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("X server rejected connection: {0}")]
    SetupFailed(String),

    #[error("{0}")]
    Protocol(X11Error),

    #[error("unexpected packet: {0}")]
    UnexpectedPacket(String),

    #[error("resource ids exhausted")]
    IdsExhausted,

    #[error("request of {len} bytes exceeds server maximum of {max} bytes")]
    RequestTooLarge { len: usize, max: usize },

    #[error("invalid display name: {0}")]
    InvalidDisplay(String),
}

/// Failures while validating or walking a QueryPictFormats payload
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("declared {what} count {count} exceeds limit {limit}")]
    CountOverflow {
        what: &'static str,
        count: u32,
        limit: u32,
    },

    #[error("reply declares {declared} bytes but counts need {required}")]
    Truncated { declared: u64, required: u64 },

    #[error("{what} count {count} exceeds the {remaining} left in the reply")]
    NestedOverflow {
        what: &'static str,
        count: u32,
        remaining: u32,
    },

    #[error("reference to unknown format 0x{0:x}")]
    UnknownFormat(u32),

    #[error("payload ended early")]
    ShortRead,

    #[error("version reply missing")]
    MissingVersion,
}

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("RENDER extension not available")]
    ExtensionAbsent,

    #[error("malformed reply: {0}")]
    MalformedReply(#[from] DecodeError),

    #[error("screen {screen} is missing required depths (mask 0x{missing_depths:08x})")]
    CapabilityMismatch { screen: usize, missing_depths: u32 },

    #[error("allocation failed")]
    AllocationFailure,

    #[error("{0}")]
    Protocol(X11Error),

    #[error(transparent)]
    Connection(ConnectionError),

    #[error("RENDER {major}.{minor} does not support ARGB cursors")]
    UnsupportedVersion { major: u32, minor: u32 },

    #[error("invalid cursor image: {0}")]
    InvalidImage(String),

    #[error("server has no {0:?} picture format")]
    MissingFormat(StandardFormat),

    #[error("connection has no default screen")]
    NoScreen,
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Protocol(e) => Error::Protocol(e),
            other => Error::Connection(other),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Connection(ConnectionError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

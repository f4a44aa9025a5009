//! X11 protocol error codes and error packets

use super::types::ByteOrder;
use super::wire::{get_u16, get_u32};
use std::fmt;

/// Core error codes (1..=17)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Request = 1,
    Value = 2,
    Window = 3,
    Pixmap = 4,
    Atom = 5,
    Cursor = 6,
    Font = 7,
    Match = 8,
    Drawable = 9,
    Access = 10,
    Alloc = 11,
    Colormap = 12,
    GContext = 13,
    IDChoice = 14,
    Name = 15,
    Length = 16,
    Implementation = 17,
}

const CORE_ERRORS: [ErrorCode; 17] = [
    ErrorCode::Request,
    ErrorCode::Value,
    ErrorCode::Window,
    ErrorCode::Pixmap,
    ErrorCode::Atom,
    ErrorCode::Cursor,
    ErrorCode::Font,
    ErrorCode::Match,
    ErrorCode::Drawable,
    ErrorCode::Access,
    ErrorCode::Alloc,
    ErrorCode::Colormap,
    ErrorCode::GContext,
    ErrorCode::IDChoice,
    ErrorCode::Name,
    ErrorCode::Length,
    ErrorCode::Implementation,
];

impl ErrorCode {
    /// Core code for `code`; extension errors map to `None`
    pub fn from_u8(code: u8) -> Option<Self> {
        CORE_ERRORS.get((code as usize).checked_sub(1)?).copied()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bad{:?}", self)
    }
}

/// X11 error packet as received from the server.
///
/// `error_code` is kept raw because extension errors (e.g. RENDER's
/// PictFormat or Picture errors) live above the core range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X11Error {
    pub error_code: u8,
    pub sequence: u16,
    pub bad_value: u32,
    pub minor_opcode: u16,
    pub major_opcode: u8,
}

impl X11Error {
    pub fn new(
        error_code: u8,
        sequence: u16,
        bad_value: u32,
        minor_opcode: u16,
        major_opcode: u8,
    ) -> Self {
        X11Error {
            error_code,
            sequence,
            bad_value,
            minor_opcode,
            major_opcode,
        }
    }

    /// Decode a 32-byte error packet
    pub fn decode(packet: &[u8; 32], byte_order: ByteOrder) -> Self {
        X11Error {
            error_code: packet[1],
            sequence: get_u16(&packet[2..4], byte_order),
            bad_value: get_u32(&packet[4..8], byte_order),
            minor_opcode: get_u16(&packet[8..10], byte_order),
            major_opcode: packet[10],
        }
    }

    /// Core error code, if this is not an extension error
    pub fn code(&self) -> Option<ErrorCode> {
        ErrorCode::from_u8(self.error_code)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.error_code == code as u8
    }
}

impl fmt::Display for X11Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "X11 Error: {}", code)?,
            None => write!(f, "X11 Error: extension error {}", self.error_code)?,
        }
        write!(
            f,
            " (sequence: {}, value: 0x{:08x}, major: {}, minor: {})",
            self.sequence, self.bad_value, self.major_opcode, self.minor_opcode
        )
    }
}

impl std::error::Error for X11Error {}

/// An error together with the full-width sequence number of the request
/// that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub serial: u64,
    pub error: X11Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_packet() {
        let mut packet = [0u8; 32];
        packet[1] = ErrorCode::Value as u8;
        packet[2..4].copy_from_slice(&7u16.to_le_bytes());
        packet[4..8].copy_from_slice(&24u32.to_le_bytes());
        packet[10] = 53;

        let err = X11Error::decode(&packet, ByteOrder::LSBFirst);
        assert_eq!(err.code(), Some(ErrorCode::Value));
        assert_eq!(err.sequence, 7);
        assert_eq!(err.bad_value, 24);
        assert_eq!(err.major_opcode, 53);
        assert!(err.is(ErrorCode::Value));
    }

    #[test]
    fn test_core_code_range() {
        assert_eq!(ErrorCode::from_u8(0), None);
        assert_eq!(ErrorCode::from_u8(1), Some(ErrorCode::Request));
        assert_eq!(ErrorCode::from_u8(17), Some(ErrorCode::Implementation));
        assert_eq!(ErrorCode::from_u8(18), None);
        assert_eq!(ErrorCode::Value.to_string(), "BadValue");
    }

    #[test]
    fn test_extension_error_display() {
        let err = X11Error::new(142, 3, 0, 4, 139);
        assert_eq!(err.code(), None);
        assert!(err.to_string().contains("extension error 142"));
    }
}

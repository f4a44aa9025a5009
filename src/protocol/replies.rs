//! Reply headers and fixed-size reply decoders

use super::types::ByteOrder;
use super::wire::{get_u16, get_u32};

/// Packet type byte for errors
pub const PACKET_ERROR: u8 = 0;
/// Packet type byte for replies
pub const PACKET_REPLY: u8 = 1;

/// The fixed 32-byte part of a reply. Any additional payload
/// (`length` 4-byte units) is still unread on the connection.
#[derive(Debug, Clone)]
pub struct ReplyHeader {
    pub sequence: u64,
    pub length: u32,
    pub data: [u8; 32],
}

impl ReplyHeader {
    /// Size of the payload that follows the header, in bytes
    pub fn extra_bytes(&self) -> u64 {
        self.length as u64 * 4
    }

    /// Byte 1 of the reply, used by some replies as a data field
    pub fn detail(&self) -> u8 {
        self.data[1]
    }
}

/// Extension codes returned by QueryExtension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionCodes {
    pub major_opcode: u8,
    pub first_event: u8,
    pub first_error: u8,
}

/// Decode a QueryExtension reply; `None` if the extension is absent
pub fn decode_query_extension(reply: &ReplyHeader) -> Option<ExtensionCodes> {
    if reply.data[8] == 0 {
        return None;
    }
    Some(ExtensionCodes {
        major_opcode: reply.data[9],
        first_event: reply.data[10],
        first_error: reply.data[11],
    })
}

/// Negotiated RENDER version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RenderVersion {
    pub major: u32,
    pub minor: u32,
}

impl RenderVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        RenderVersion { major, minor }
    }
}

/// Decode the body of a RenderQueryVersion reply
pub fn decode_render_version(packet: &[u8; 32], byte_order: ByteOrder) -> RenderVersion {
    RenderVersion {
        major: get_u32(&packet[8..12], byte_order),
        minor: get_u32(&packet[12..16], byte_order),
    }
}

/// Element counts declared by a RenderQueryPictFormats reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PictFormatsCounts {
    pub formats: u32,
    pub screens: u32,
    pub depths: u32,
    pub visuals: u32,
    pub subpixels: u32,
}

impl PictFormatsCounts {
    pub fn decode(packet: &[u8; 32], byte_order: ByteOrder) -> Self {
        PictFormatsCounts {
            formats: get_u32(&packet[8..12], byte_order),
            screens: get_u32(&packet[12..16], byte_order),
            depths: get_u32(&packet[16..20], byte_order),
            visuals: get_u32(&packet[20..24], byte_order),
            subpixels: get_u32(&packet[24..28], byte_order),
        }
    }
}

/// Raw 16-bit sequence number of a packet
pub fn wire_sequence(packet: &[u8; 32], byte_order: ByteOrder) -> u16 {
    get_u16(&packet[2..4], byte_order)
}

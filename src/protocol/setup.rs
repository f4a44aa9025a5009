//! X11 connection setup protocol
//!
//! This module handles the client side of the initial handshake: encoding the
//! setup request and parsing the server's reply.

use super::wire::{get_u16, WireReader, WireWriter};
use super::*;
use std::io;

/// Connection setup request sent by the client
#[derive(Debug, Clone)]
pub struct SetupRequest {
    pub byte_order: ByteOrder,
    pub protocol_major_version: u16,
    pub protocol_minor_version: u16,
    pub authorization_protocol_name: String,
    pub authorization_protocol_data: Vec<u8>,
}

impl SetupRequest {
    pub fn new(byte_order: ByteOrder, auth_name: &str, auth_data: &[u8]) -> Self {
        SetupRequest {
            byte_order,
            protocol_major_version: PROTOCOL_MAJOR_VERSION,
            protocol_minor_version: PROTOCOL_MINOR_VERSION,
            authorization_protocol_name: auth_name.to_string(),
            authorization_protocol_data: auth_data.to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let name = self.authorization_protocol_name.as_bytes();
        let data = &self.authorization_protocol_data;

        let mut w = WireWriter::with_capacity(self.byte_order, 12 + name.len() + data.len() + 6);
        w.u8(self.byte_order.setup_byte())
            .u8(0)
            .u16(self.protocol_major_version)
            .u16(self.protocol_minor_version)
            .u16(name.len() as u16)
            .u16(data.len() as u16)
            .zeros(2)
            .bytes(name)
            .align()
            .bytes(data)
            .align();
        w.finish()
    }
}

/// Setup response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    Failed = 0,
    Success = 1,
    Authenticate = 2,
}

impl SetupStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SetupStatus::Failed),
            1 => Some(SetupStatus::Success),
            2 => Some(SetupStatus::Authenticate),
            _ => None,
        }
    }
}

/// Pixmap format information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub depth: u8,
    pub bits_per_pixel: u8,
    pub scanline_pad: u8,
}

/// Visual type information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualType {
    pub visual_id: VisualID,
    pub class: u8,
    pub bits_per_rgb_value: u8,
    pub colormap_entries: u16,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

/// Depth information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Depth {
    pub depth: u8,
    pub visuals: Vec<VisualType>,
}

/// Screen information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub root: Window,
    pub default_colormap: Colormap,
    pub white_pixel: u32,
    pub black_pixel: u32,
    pub current_input_masks: u32,
    pub width_in_pixels: u16,
    pub height_in_pixels: u16,
    pub width_in_millimeters: u16,
    pub height_in_millimeters: u16,
    pub min_installed_maps: u16,
    pub max_installed_maps: u16,
    pub root_visual: VisualID,
    pub backing_stores: u8,
    pub save_unders: bool,
    pub root_depth: u8,
    pub allowed_depths: Vec<Depth>,
}

/// Setup reply (success case)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupSuccess {
    pub protocol_major_version: u16,
    pub protocol_minor_version: u16,
    pub release_number: u32,
    pub resource_id_base: u32,
    pub resource_id_mask: u32,
    pub motion_buffer_size: u32,
    pub maximum_request_length: u16,
    pub image_byte_order: ByteOrder,
    pub bitmap_format_bit_order: ByteOrder,
    pub bitmap_format_scanline_unit: u8,
    pub bitmap_format_scanline_pad: u8,
    pub min_keycode: u8,
    pub max_keycode: u8,
    pub vendor: String,
    pub pixmap_formats: Vec<Format>,
    pub roots: Vec<Screen>,
}

fn byte_order_from(value: u8) -> ByteOrder {
    if value == 0 {
        ByteOrder::LSBFirst
    } else {
        ByteOrder::MSBFirst
    }
}

impl SetupSuccess {
    /// Parse the success body that follows the 8-byte setup header
    pub fn parse(header: &[u8; 8], data: &[u8], byte_order: ByteOrder) -> io::Result<Self> {
        let mut r = WireReader::new(data, byte_order);

        let protocol_major_version = get_u16(&header[2..4], byte_order);
        let protocol_minor_version = get_u16(&header[4..6], byte_order);

        let release_number = r.read_u32()?;
        let resource_id_base = r.read_u32()?;
        let resource_id_mask = r.read_u32()?;
        let motion_buffer_size = r.read_u32()?;
        let vendor_len = r.read_u16()? as usize;
        let maximum_request_length = r.read_u16()?;
        let num_screens = r.read_u8()?;
        let num_formats = r.read_u8()?;
        let image_byte_order = byte_order_from(r.read_u8()?);
        let bitmap_format_bit_order = byte_order_from(r.read_u8()?);
        let bitmap_format_scanline_unit = r.read_u8()?;
        let bitmap_format_scanline_pad = r.read_u8()?;
        let min_keycode = r.read_u8()?;
        let max_keycode = r.read_u8()?;
        r.skip(4)?;

        let vendor = String::from_utf8_lossy(r.read_bytes(vendor_len)?).to_string();
        r.skip(pad(vendor_len))?;

        let mut pixmap_formats = Vec::with_capacity(num_formats as usize);
        for _ in 0..num_formats {
            let depth = r.read_u8()?;
            let bits_per_pixel = r.read_u8()?;
            let scanline_pad = r.read_u8()?;
            r.skip(5)?;
            pixmap_formats.push(Format {
                depth,
                bits_per_pixel,
                scanline_pad,
            });
        }

        let mut roots = Vec::with_capacity(num_screens as usize);
        for _ in 0..num_screens {
            roots.push(parse_screen(&mut r)?);
        }

        Ok(SetupSuccess {
            protocol_major_version,
            protocol_minor_version,
            release_number,
            resource_id_base,
            resource_id_mask,
            motion_buffer_size,
            maximum_request_length,
            image_byte_order,
            bitmap_format_bit_order,
            bitmap_format_scanline_unit,
            bitmap_format_scanline_pad,
            min_keycode,
            max_keycode,
            vendor,
            pixmap_formats,
            roots,
        })
    }

    /// Largest request the server accepts, in bytes
    pub fn maximum_request_bytes(&self) -> usize {
        self.maximum_request_length as usize * 4
    }
}

fn parse_screen(r: &mut WireReader<'_>) -> io::Result<Screen> {
    let root = Window::new(r.read_u32()?);
    let default_colormap = Colormap::new(r.read_u32()?);
    let white_pixel = r.read_u32()?;
    let black_pixel = r.read_u32()?;
    let current_input_masks = r.read_u32()?;
    let width_in_pixels = r.read_u16()?;
    let height_in_pixels = r.read_u16()?;
    let width_in_millimeters = r.read_u16()?;
    let height_in_millimeters = r.read_u16()?;
    let min_installed_maps = r.read_u16()?;
    let max_installed_maps = r.read_u16()?;
    let root_visual = VisualID::new(r.read_u32()?);
    let backing_stores = r.read_u8()?;
    let save_unders = r.read_u8()? != 0;
    let root_depth = r.read_u8()?;
    let num_depths = r.read_u8()?;

    let mut allowed_depths = Vec::with_capacity(num_depths as usize);
    for _ in 0..num_depths {
        let depth = r.read_u8()?;
        r.skip(1)?;
        let num_visuals = r.read_u16()?;
        r.skip(4)?;

        let mut visuals = Vec::with_capacity(num_visuals as usize);
        for _ in 0..num_visuals {
            let visual_id = VisualID::new(r.read_u32()?);
            let class = r.read_u8()?;
            let bits_per_rgb_value = r.read_u8()?;
            let colormap_entries = r.read_u16()?;
            let red_mask = r.read_u32()?;
            let green_mask = r.read_u32()?;
            let blue_mask = r.read_u32()?;
            r.skip(4)?;
            visuals.push(VisualType {
                visual_id,
                class,
                bits_per_rgb_value,
                colormap_entries,
                red_mask,
                green_mask,
                blue_mask,
            });
        }
        allowed_depths.push(Depth { depth, visuals });
    }

    Ok(Screen {
        root,
        default_colormap,
        white_pixel,
        black_pixel,
        current_input_masks,
        width_in_pixels,
        height_in_pixels,
        width_in_millimeters,
        height_in_millimeters,
        min_installed_maps,
        max_installed_maps,
        root_visual,
        backing_stores,
        save_unders,
        root_depth,
        allowed_depths,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_request_padding() {
        let req = SetupRequest::new(ByteOrder::LSBFirst, "MIT-MAGIC-COOKIE-1", &[7u8; 16]);
        let bytes = req.encode();
        assert_eq!(bytes[0], b'l');
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 11);
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 18);
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), 16);
        // 12 header + 20 padded name + 16 data
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[12..30], b"MIT-MAGIC-COOKIE-1");
    }

    #[test]
    fn test_parse_minimal_setup() {
        let mut w = WireWriter::new(ByteOrder::LSBFirst);
        w.u32(12000000) // release
            .u32(0x0020_0000)
            .u32(0x001f_ffff)
            .u32(256)
            .u16(4) // vendor length
            .u16(0xffff)
            .u8(1) // screens
            .u8(1) // formats
            .u8(0)
            .u8(0)
            .u8(32)
            .u8(32)
            .u8(8)
            .u8(255)
            .zeros(4)
            .bytes(b"test")
            .u8(32)
            .u8(32)
            .u8(32)
            .zeros(5);
        // screen
        w.u32(0x100)
            .u32(0x20)
            .u32(0xffffff)
            .u32(0)
            .u32(0)
            .u16(1920)
            .u16(1080)
            .u16(500)
            .u16(300)
            .u16(1)
            .u16(1)
            .u32(0x21)
            .u8(0)
            .u8(0)
            .u8(24)
            .u8(2);
        // depth 24 with one visual, depth 32 with none
        w.u8(24).u8(0).u16(1).zeros(4);
        w.u32(0x21).u8(4).u8(8).u16(256).u32(0xff0000).u32(0xff00).u32(0xff).zeros(4);
        w.u8(32).u8(0).u16(0).zeros(4);
        let data = w.finish();

        let mut header = [0u8; 8];
        header[0] = 1;
        header[2..4].copy_from_slice(&11u16.to_le_bytes());

        let setup = SetupSuccess::parse(&header, &data, ByteOrder::LSBFirst).unwrap();
        assert_eq!(setup.vendor, "test");
        assert_eq!(setup.resource_id_base, 0x0020_0000);
        assert_eq!(setup.maximum_request_bytes(), 0xffff * 4);
        assert_eq!(setup.roots.len(), 1);
        let depths: Vec<u8> = setup.roots[0].allowed_depths.iter().map(|d| d.depth).collect();
        assert_eq!(depths, vec![24, 32]);
        assert_eq!(setup.roots[0].allowed_depths[0].visuals[0].visual_id, VisualID::new(0x21));
    }

    #[test]
    fn test_parse_truncated_setup_fails() {
        let header = [1u8, 0, 11, 0, 0, 0, 0, 0];
        assert!(SetupSuccess::parse(&header, &[0u8; 10], ByteOrder::LSBFirst).is_err());
    }
}

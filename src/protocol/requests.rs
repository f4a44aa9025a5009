//! X11 protocol requests
//!
//! Opcodes and encoders for the core and RENDER requests a cursor upload
//! needs. Every encoder returns a complete request, padded and with its
//! length field filled in.

use super::types::*;
use super::wire::WireWriter;

/// Core X11 request opcodes used by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestOpcode {
    ChangeWindowAttributes = 2,
    GetInputFocus = 43,
    CreatePixmap = 53,
    FreePixmap = 54,
    CreateGC = 55,
    FreeGC = 60,
    PutImage = 72,
    FreeCursor = 95,
    QueryExtension = 98,
}

impl RequestOpcode {
    pub fn from_u8(opcode: u8) -> Option<Self> {
        match opcode {
            2 => Some(RequestOpcode::ChangeWindowAttributes),
            43 => Some(RequestOpcode::GetInputFocus),
            53 => Some(RequestOpcode::CreatePixmap),
            54 => Some(RequestOpcode::FreePixmap),
            55 => Some(RequestOpcode::CreateGC),
            60 => Some(RequestOpcode::FreeGC),
            72 => Some(RequestOpcode::PutImage),
            95 => Some(RequestOpcode::FreeCursor),
            98 => Some(RequestOpcode::QueryExtension),
            _ => None,
        }
    }
}

/// RENDER extension minor opcodes used by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RenderOpcode {
    QueryVersion = 0,
    QueryPictFormats = 1,
    CreatePicture = 4,
    FreePicture = 7,
    CreateCursor = 27,
}

impl RenderOpcode {
    pub fn from_u8(opcode: u8) -> Option<Self> {
        match opcode {
            0 => Some(RenderOpcode::QueryVersion),
            1 => Some(RenderOpcode::QueryPictFormats),
            4 => Some(RenderOpcode::CreatePicture),
            7 => Some(RenderOpcode::FreePicture),
            27 => Some(RenderOpcode::CreateCursor),
            _ => None,
        }
    }
}

/// Window attribute mask bit for the cursor attribute
pub const CW_CURSOR: u32 = 1 << 14;

/// CreatePicture value-mask bits
pub mod picture_mask {
    pub const REPEAT: u32 = 1 << 0;
    pub const ALPHA_MAP: u32 = 1 << 1;
    pub const ALPHA_X_ORIGIN: u32 = 1 << 2;
    pub const ALPHA_Y_ORIGIN: u32 = 1 << 3;
    pub const CLIP_X_ORIGIN: u32 = 1 << 4;
    pub const CLIP_Y_ORIGIN: u32 = 1 << 5;
    pub const CLIP_MASK: u32 = 1 << 6;
    pub const GRAPHICS_EXPOSURE: u32 = 1 << 7;
    pub const SUBWINDOW_MODE: u32 = 1 << 8;
    pub const POLY_EDGE: u32 = 1 << 9;
    pub const POLY_MODE: u32 = 1 << 10;
    pub const DITHER: u32 = 1 << 11;
    pub const COMPONENT_ALPHA: u32 = 1 << 12;
}

/// Optional attributes for CreatePicture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PictureAttributes {
    pub repeat: Option<u32>,
    pub alpha_map: Option<Picture>,
    pub alpha_x_origin: Option<i16>,
    pub alpha_y_origin: Option<i16>,
    pub clip_x_origin: Option<i16>,
    pub clip_y_origin: Option<i16>,
    pub clip_mask: Option<Pixmap>,
    pub graphics_exposures: Option<bool>,
    pub subwindow_mode: Option<u32>,
    pub poly_edge: Option<u32>,
    pub poly_mode: Option<u32>,
    pub dither: Option<u32>,
    pub component_alpha: Option<bool>,
}

impl PictureAttributes {
    /// Value mask and values, in mask bit order
    pub fn value_list(&self) -> (u32, Vec<u32>) {
        use picture_mask::*;

        let mut mask = 0;
        let mut values = Vec::new();
        let mut push = |bit: u32, value: Option<u32>| {
            if let Some(value) = value {
                mask |= bit;
                values.push(value);
            }
        };

        push(REPEAT, self.repeat);
        push(ALPHA_MAP, self.alpha_map.map(|p| p.id().get()));
        push(ALPHA_X_ORIGIN, self.alpha_x_origin.map(|v| v as i32 as u32));
        push(ALPHA_Y_ORIGIN, self.alpha_y_origin.map(|v| v as i32 as u32));
        push(CLIP_X_ORIGIN, self.clip_x_origin.map(|v| v as i32 as u32));
        push(CLIP_Y_ORIGIN, self.clip_y_origin.map(|v| v as i32 as u32));
        push(CLIP_MASK, self.clip_mask.map(|p| p.id().get()));
        push(GRAPHICS_EXPOSURE, self.graphics_exposures.map(u32::from));
        push(SUBWINDOW_MODE, self.subwindow_mode);
        push(POLY_EDGE, self.poly_edge);
        push(POLY_MODE, self.poly_mode);
        push(DITHER, self.dither);
        push(COMPONENT_ALPHA, self.component_alpha.map(u32::from));

        (mask, values)
    }
}

/// Fixed part of a PutImage request, in bytes
pub const PUT_IMAGE_HEADER_LEN: usize = 24;

/// Request encoder
pub struct RequestEncoder {
    byte_order: ByteOrder,
}

impl RequestEncoder {
    pub fn new(byte_order: ByteOrder) -> Self {
        RequestEncoder { byte_order }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn start(&self, opcode: u8, detail: u8, capacity: usize) -> WireWriter {
        let mut w = WireWriter::with_capacity(self.byte_order, capacity);
        w.u8(opcode).u8(detail).u16(0); // length patched in finish()
        w
    }

    fn finish(&self, mut w: WireWriter) -> Vec<u8> {
        w.align();
        let words = (w.len() / 4) as u16;
        w.patch_u16(2, words);
        w.finish()
    }

    /// QueryExtension
    pub fn query_extension(&self, name: &str) -> Vec<u8> {
        let mut w = self.start(RequestOpcode::QueryExtension as u8, 0, 8 + name.len() + 3);
        w.u16(name.len() as u16).zeros(2).bytes(name.as_bytes());
        self.finish(w)
    }

    /// GetInputFocus, used as a cheap round trip
    pub fn get_input_focus(&self) -> Vec<u8> {
        let w = self.start(RequestOpcode::GetInputFocus as u8, 0, 4);
        self.finish(w)
    }

    /// CreatePixmap
    pub fn create_pixmap(
        &self,
        depth: u8,
        pixmap: Pixmap,
        drawable: Window,
        width: u16,
        height: u16,
    ) -> Vec<u8> {
        let mut w = self.start(RequestOpcode::CreatePixmap as u8, depth, 16);
        w.u32(pixmap.id().get())
            .u32(drawable.id().get())
            .u16(width)
            .u16(height);
        self.finish(w)
    }

    /// FreePixmap
    pub fn free_pixmap(&self, pixmap: Pixmap) -> Vec<u8> {
        let mut w = self.start(RequestOpcode::FreePixmap as u8, 0, 8);
        w.u32(pixmap.id().get());
        self.finish(w)
    }

    /// CreateGC with no attributes set
    pub fn create_gc(&self, gc: GContext, drawable: Pixmap) -> Vec<u8> {
        let mut w = self.start(RequestOpcode::CreateGC as u8, 0, 16);
        w.u32(gc.id().get()).u32(drawable.id().get()).u32(0);
        self.finish(w)
    }

    /// FreeGC
    pub fn free_gc(&self, gc: GContext) -> Vec<u8> {
        let mut w = self.start(RequestOpcode::FreeGC as u8, 0, 8);
        w.u32(gc.id().get());
        self.finish(w)
    }

    /// PutImage in ZPixmap format
    #[allow(clippy::too_many_arguments)]
    pub fn put_image(
        &self,
        drawable: Pixmap,
        gc: GContext,
        width: u16,
        height: u16,
        dst_x: i16,
        dst_y: i16,
        depth: u8,
        data: &[u8],
    ) -> Vec<u8> {
        let mut w = self.start(
            RequestOpcode::PutImage as u8,
            ImageFormat::ZPixmap as u8,
            PUT_IMAGE_HEADER_LEN + data.len() + 3,
        );
        w.u32(drawable.id().get())
            .u32(gc.id().get())
            .u16(width)
            .u16(height)
            .i16(dst_x)
            .i16(dst_y)
            .u8(0) // left-pad
            .u8(depth)
            .zeros(2)
            .bytes(data);
        self.finish(w)
    }

    /// FreeCursor
    pub fn free_cursor(&self, cursor: Cursor) -> Vec<u8> {
        let mut w = self.start(RequestOpcode::FreeCursor as u8, 0, 8);
        w.u32(cursor.id().get());
        self.finish(w)
    }

    /// ChangeWindowAttributes setting only the cursor
    pub fn define_cursor(&self, window: Window, cursor: Cursor) -> Vec<u8> {
        let mut w = self.start(RequestOpcode::ChangeWindowAttributes as u8, 0, 16);
        w.u32(window.id().get()).u32(CW_CURSOR).u32(cursor.id().get());
        self.finish(w)
    }

    /// RenderQueryVersion
    pub fn render_query_version(&self, major_opcode: u8, major: u32, minor: u32) -> Vec<u8> {
        let mut w = self.start(major_opcode, RenderOpcode::QueryVersion as u8, 12);
        w.u32(major).u32(minor);
        self.finish(w)
    }

    /// RenderQueryPictFormats
    pub fn render_query_pict_formats(&self, major_opcode: u8) -> Vec<u8> {
        let w = self.start(major_opcode, RenderOpcode::QueryPictFormats as u8, 4);
        self.finish(w)
    }

    /// RenderCreatePicture
    pub fn render_create_picture(
        &self,
        major_opcode: u8,
        picture: Picture,
        drawable: Pixmap,
        format: PictFormatId,
        attributes: Option<&PictureAttributes>,
    ) -> Vec<u8> {
        let (mask, values) = attributes.map(|a| a.value_list()).unwrap_or_default();
        let mut w = self.start(
            major_opcode,
            RenderOpcode::CreatePicture as u8,
            20 + values.len() * 4,
        );
        w.u32(picture.id().get())
            .u32(drawable.id().get())
            .u32(format.get())
            .u32(mask);
        for value in values {
            w.u32(value);
        }
        self.finish(w)
    }

    /// RenderFreePicture
    pub fn render_free_picture(&self, major_opcode: u8, picture: Picture) -> Vec<u8> {
        let mut w = self.start(major_opcode, RenderOpcode::FreePicture as u8, 8);
        w.u32(picture.id().get());
        self.finish(w)
    }

    /// RenderCreateCursor
    pub fn render_create_cursor(
        &self,
        major_opcode: u8,
        cursor: Cursor,
        source: Picture,
        x: u16,
        y: u16,
    ) -> Vec<u8> {
        let mut w = self.start(major_opcode, RenderOpcode::CreateCursor as u8, 16);
        w.u32(cursor.id().get()).u32(source.id().get()).u16(x).u16(y);
        self.finish(w)
    }
}

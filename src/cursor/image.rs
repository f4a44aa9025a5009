//! Cursor pixel data
//!
//! Callers hand over pixels with alpha in the top byte and blue, green, red
//! below it (the layout GL readback produces on little-endian hosts). The
//! server wants ARGB with red in bits 16-23, so each sample has its red and
//! blue bytes swapped on the way in.

use crate::error::{Error, Result};
use byteorder::{ByteOrder as _, NativeEndian};

/// Largest width or height the server accepts for a cursor
pub const MAX_CURSOR_SIZE: u32 = 0x7fff;

/// Bytes per sample
pub const BYTES_PER_PIXEL: usize = 4;

/// Swap the red and blue channels of one sample
#[inline]
pub fn convert_pixel(pixel: u32) -> u32 {
    (pixel & 0xff00_ff00) | ((pixel & 0xff) << 16) | ((pixel >> 16) & 0xff)
}

/// Swap the red and blue channels of every sample, in place
pub fn convert_channel_order(pixels: &mut [u32]) {
    for p in pixels.iter_mut() {
        *p = convert_pixel(*p);
    }
}

/// Caller-owned pixels, borrowed for one cursor creation
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows
    pub stride: usize,
    pub hot_x: u32,
    pub hot_y: u32,
}

impl<'a> PixelBuffer<'a> {
    /// Tightly packed buffer with the hotspot at the origin
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Self {
        PixelBuffer {
            data,
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            hot_x: 0,
            hot_y: 0,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_hotspot(mut self, x: u32, y: u32) -> Self {
        self.hot_x = x;
        self.hot_y = y;
        self
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidImage(msg));

        if self.width == 0 || self.height == 0 {
            return invalid(format!("empty image {}x{}", self.width, self.height));
        }
        if self.width > MAX_CURSOR_SIZE || self.height > MAX_CURSOR_SIZE {
            return invalid(format!(
                "{}x{} exceeds {} per side",
                self.width, self.height, MAX_CURSOR_SIZE
            ));
        }
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        if self.stride < row_bytes {
            return invalid(format!("stride {} shorter than a row ({})", self.stride, row_bytes));
        }
        let needed = self.stride * (self.height as usize - 1) + row_bytes;
        if self.data.len() < needed {
            return invalid(format!("{} bytes given, {} needed", self.data.len(), needed));
        }
        if self.hot_x >= self.width || self.hot_y >= self.height {
            return invalid(format!("hotspot ({}, {}) outside image", self.hot_x, self.hot_y));
        }
        Ok(())
    }
}

/// Validated, packed ARGB cursor image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    width: u16,
    height: u16,
    hot_x: u16,
    hot_y: u16,
    pixels: Vec<u32>,
}

impl CursorImage {
    /// Copy rows out of `buffer` and convert them to ARGB
    pub fn from_buffer(buffer: &PixelBuffer<'_>) -> Result<Self> {
        buffer.validate()?;

        let count = buffer.width as usize * buffer.height as usize;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(count)
            .map_err(|_| Error::AllocationFailure)?;

        let row_bytes = buffer.width as usize * BYTES_PER_PIXEL;
        for row in buffer.data.chunks(buffer.stride).take(buffer.height as usize) {
            pixels.extend(
                row[..row_bytes]
                    .chunks_exact(BYTES_PER_PIXEL)
                    .map(NativeEndian::read_u32),
            );
        }
        convert_channel_order(&mut pixels);

        Ok(CursorImage {
            width: buffer.width as u16,
            height: buffer.height as u16,
            hot_x: buffer.hot_x as u16,
            hot_y: buffer.hot_y as u16,
            pixels,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn hotspot(&self) -> (u16, u16) {
        (self.hot_x, self.hot_y)
    }

    /// ARGB samples, row-major, no padding
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(samples: &[u32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
    }

    #[test]
    fn test_convert_pixel_swaps_red_and_blue() {
        assert_eq!(convert_pixel(0xAABBCCDD), 0xAADDCCBB);
        assert_eq!(convert_pixel(0xff0000ff), 0xffff0000);
    }

    #[test]
    fn test_convert_zero_buffer_unchanged() {
        for len in [0, 1, 7, 64] {
            let mut buf = vec![0u32; len];
            convert_channel_order(&mut buf);
            assert!(buf.iter().all(|&p| p == 0));
        }
    }

    #[test]
    fn test_from_buffer_honours_stride() {
        // 2x2 image in rows of 3 samples; the third sample is padding
        let data = bytes(&[0xff0000ff, 0xff00ff00, 0xdeadbeef, 0x80ff0000, 0x00000000, 0xdeadbeef]);
        let buffer = PixelBuffer::new(&data, 2, 2).with_stride(12).with_hotspot(1, 1);
        let image = CursorImage::from_buffer(&buffer).unwrap();

        assert_eq!(image.pixels(), &[0xffff0000, 0xff00ff00, 0x800000ff, 0]);
        assert_eq!(image.hotspot(), (1, 1));
        // caller's buffer is untouched
        assert_eq!(&data[..4], &0xff0000ffu32.to_ne_bytes());
    }

    #[test]
    fn test_last_row_needs_no_stride_padding() {
        let data = bytes(&[1, 0, 2]);
        let buffer = PixelBuffer::new(&data, 1, 2).with_stride(8);
        let image = CursorImage::from_buffer(&buffer).unwrap();
        assert_eq!(image.pixels().len(), 2);
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let data = bytes(&[0; 4]);
        let cases = [
            PixelBuffer::new(&data, 0, 1),
            PixelBuffer::new(&data, 2, 2).with_stride(4),
            PixelBuffer::new(&data, 3, 3),
            PixelBuffer::new(&data, 2, 2).with_hotspot(2, 0),
            PixelBuffer::new(&data, MAX_CURSOR_SIZE + 1, 1),
        ];
        for buffer in cases {
            assert!(matches!(
                CursorImage::from_buffer(&buffer),
                Err(Error::InvalidImage(_))
            ));
        }
    }
}

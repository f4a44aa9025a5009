//! Server-side resources used by the cursor path
//!
//! Every creator allocates a fresh id from the connection, queues its request
//! and returns the id. Nothing is freed implicitly: each surface and picture
//! must be handed back to its destroyer, and cursors to `free_cursor`.

use crate::connection::XConnection;
use crate::cursor::image::{CursorImage, BYTES_PER_PIXEL};
use crate::error::ConnectionError;
use crate::protocol::*;
use crate::render::catalog::PictFormat;
use std::io::{Read, Write};

/// Depth of the surface an ARGB cursor image is uploaded into
pub const CURSOR_DEPTH: u8 = 32;

type Result<T> = std::result::Result<T, ConnectionError>;

/// CreatePixmap on the screen of `drawable`
pub fn create_offscreen_surface<S: Read + Write>(
    conn: &mut XConnection<S>,
    drawable: Window,
    width: u16,
    height: u16,
    depth: u8,
) -> Result<Pixmap> {
    let pixmap = Pixmap(conn.generate_id()?);
    let request = conn
        .encoder()
        .create_pixmap(depth, pixmap, drawable, width, height);
    conn.send_request(&request)?;
    log::debug!("Created {}x{} depth {} pixmap {}", width, height, depth, pixmap.id());
    Ok(pixmap)
}

pub fn destroy_surface<S: Read + Write>(conn: &mut XConnection<S>, pixmap: Pixmap) -> Result<()> {
    let request = conn.encoder().free_pixmap(pixmap);
    conn.send_request(&request)?;
    Ok(())
}

fn image_bytes(pixels: &[u32], byte_order: ByteOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * BYTES_PER_PIXEL);
    for p in pixels {
        match byte_order {
            ByteOrder::LSBFirst => out.extend_from_slice(&p.to_le_bytes()),
            ByteOrder::MSBFirst => out.extend_from_slice(&p.to_be_bytes()),
        }
    }
    out
}

/// Write `image` into the top-left corner of a depth-32 `surface`.
///
/// The upload is split into bands of whole rows so that no PutImage exceeds
/// the server's maximum request length.
pub fn upload_image<S: Read + Write>(
    conn: &mut XConnection<S>,
    surface: Pixmap,
    image: &CursorImage,
) -> Result<()> {
    let gc = GContext(conn.generate_id()?);
    let request = conn.encoder().create_gc(gc, surface);
    conn.send_request(&request)?;

    let result = put_image_bands(conn, surface, gc, image);

    let request = conn.encoder().free_gc(gc);
    conn.send_request(&request)?;
    result
}

fn put_image_bands<S: Read + Write>(
    conn: &mut XConnection<S>,
    surface: Pixmap,
    gc: GContext,
    image: &CursorImage,
) -> Result<()> {
    let data = image_bytes(image.pixels(), conn.setup().image_byte_order);
    let row_bytes = image.width() as usize * BYTES_PER_PIXEL;
    let budget = conn
        .setup()
        .maximum_request_bytes()
        .saturating_sub(PUT_IMAGE_HEADER_LEN);
    let rows_per_band = (budget / row_bytes).max(1);

    let mut y = 0usize;
    for band in data.chunks(rows_per_band * row_bytes) {
        let rows = band.len() / row_bytes;
        let request = conn.encoder().put_image(
            surface,
            gc,
            image.width(),
            rows as u16,
            0,
            y as i16,
            CURSOR_DEPTH,
            band,
        );
        conn.send_request(&request)?;
        y += rows;
    }
    log::trace!("Uploaded {} rows into {}", y, surface.id());
    Ok(())
}

/// RenderCreatePicture over `surface`
pub fn create_picture<S: Read + Write>(
    conn: &mut XConnection<S>,
    codes: &ExtensionCodes,
    surface: Pixmap,
    format: &PictFormat,
    attributes: Option<&PictureAttributes>,
) -> Result<Picture> {
    let picture = Picture(conn.generate_id()?);
    let request = conn.encoder().render_create_picture(
        codes.major_opcode,
        picture,
        surface,
        format.id,
        attributes,
    );
    conn.send_request(&request)?;
    Ok(picture)
}

pub fn destroy_picture<S: Read + Write>(
    conn: &mut XConnection<S>,
    codes: &ExtensionCodes,
    picture: Picture,
) -> Result<()> {
    let request = conn
        .encoder()
        .render_free_picture(codes.major_opcode, picture);
    conn.send_request(&request)?;
    Ok(())
}

/// RenderCreateCursor from `picture` with the given hotspot
pub fn create_cursor<S: Read + Write>(
    conn: &mut XConnection<S>,
    codes: &ExtensionCodes,
    picture: Picture,
    hot_x: u16,
    hot_y: u16,
) -> Result<Cursor> {
    let cursor = Cursor(conn.generate_id()?);
    let request = conn
        .encoder()
        .render_create_cursor(codes.major_opcode, cursor, picture, hot_x, hot_y);
    conn.send_request(&request)?;
    Ok(cursor)
}

/// Release a cursor returned by the cursor pipeline
pub fn free_cursor<S: Read + Write>(conn: &mut XConnection<S>, cursor: Cursor) -> Result<()> {
    if cursor.is_none() {
        return Ok(());
    }
    let request = conn.encoder().free_cursor(cursor);
    conn.send_request(&request)?;
    Ok(())
}

/// Make `cursor` the pointer image while inside `window`
pub fn define_cursor<S: Read + Write>(
    conn: &mut XConnection<S>,
    window: Window,
    cursor: Cursor,
) -> Result<()> {
    let request = conn.encoder().define_cursor(window, cursor);
    conn.send_request(&request)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_bytes_follow_server_order() {
        let pixels = [0x11223344u32];
        assert_eq!(image_bytes(&pixels, ByteOrder::LSBFirst), vec![0x44, 0x33, 0x22, 0x11]);
        assert_eq!(image_bytes(&pixels, ByteOrder::MSBFirst), vec![0x11, 0x22, 0x33, 0x44]);
    }
}

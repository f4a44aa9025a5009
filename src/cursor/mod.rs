//! Pixel buffer to server cursor
//!
//! The pipeline uploads the converted pixels into a depth-32 pixmap, wraps
//! it in an ARGB32 picture and creates the cursor from that picture. The
//! pixmap and picture only live for the duration of the call.

pub mod image;

pub use image::{convert_channel_order, convert_pixel, CursorImage, PixelBuffer, MAX_CURSOR_SIZE};

use crate::connection::XConnection;
use crate::error::{ConnectionError, Error, Result};
use crate::protocol::*;
use crate::render::{CapabilityEntry, Registry, StandardFormat, ARGB_CURSOR_VERSION};
use crate::resources::{self, CURSOR_DEPTH};
use std::io::{Read, Write};

fn release(result: std::result::Result<(), ConnectionError>, what: &str) {
    if let Err(err) = result {
        log::warn!("Failed to release cursor {}: {}", what, err);
    }
}

/// Create an ARGB cursor from `buffer`.
///
/// The returned cursor belongs to the caller; release it with
/// `resources::free_cursor`. Nothing else created here outlives the call.
pub fn try_create_cursor<S: Read + Write>(
    registry: &Registry,
    conn: &mut XConnection<S>,
    buffer: &PixelBuffer<'_>,
) -> Result<Cursor> {
    let entry = registry.get_or_create(conn)?;
    let codes = entry.codes().ok_or(Error::ExtensionAbsent)?;
    let root = conn.default_screen().ok_or(Error::NoScreen)?.root;

    let image = CursorImage::from_buffer(buffer)?;

    let surface = resources::create_offscreen_surface(
        conn,
        root,
        image.width(),
        image.height(),
        CURSOR_DEPTH,
    )?;
    let picture = upload_and_wrap(registry, conn, &entry, surface, &image);
    release(resources::destroy_surface(conn, surface), "pixmap");
    let picture = picture?;

    let (hot_x, hot_y) = image.hotspot();
    let cursor = resources::create_cursor(conn, &codes, picture, hot_x, hot_y);
    release(resources::destroy_picture(conn, &codes, picture), "picture");
    let cursor = cursor?;

    conn.flush()?;
    log::debug!(
        "Created {}x{} cursor {} (hotspot {},{})",
        image.width(),
        image.height(),
        cursor.id(),
        hot_x,
        hot_y
    );
    Ok(cursor)
}

fn upload_and_wrap<S: Read + Write>(
    registry: &Registry,
    conn: &mut XConnection<S>,
    entry: &CapabilityEntry,
    surface: Pixmap,
    image: &CursorImage,
) -> Result<Picture> {
    resources::upload_image(conn, surface, image)?;

    let catalog = registry.ensure_format_catalog(conn, entry)?;
    let version = catalog.version();
    if version < ARGB_CURSOR_VERSION {
        return Err(Error::UnsupportedVersion {
            major: version.major,
            minor: version.minor,
        });
    }
    let format = catalog
        .find_standard_format(StandardFormat::Argb32)
        .ok_or(Error::MissingFormat(StandardFormat::Argb32))?;

    let codes = entry.codes().ok_or(Error::ExtensionAbsent)?;
    Ok(resources::create_picture(conn, &codes, surface, format, None)?)
}

/// Compositor entry point: `Cursor::NONE` on any failure.
///
/// `data` holds `height` rows of `stride` bytes, each sample a native-endian
/// u32 with alpha in the top byte, then blue, green and red.
pub fn create_cursor<S: Read + Write>(
    conn: &mut XConnection<S>,
    data: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    hot_x: u32,
    hot_y: u32,
) -> Cursor {
    let buffer = PixelBuffer {
        data,
        width,
        height,
        stride,
        hot_x,
        hot_y,
    };
    match try_create_cursor(Registry::global(), conn, &buffer) {
        Ok(cursor) => cursor,
        Err(err) => {
            log::warn!("Failed to create cursor: {}", err);
            Cursor::NONE
        }
    }
}

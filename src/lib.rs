/// xrender-cursor - ARGB cursors over the X RENDER extension
///
/// A small X11 client: connection framing, the RENDER version and picture
/// format queries, and the pipeline that turns a pixel buffer into a server
/// cursor. A compositor backend only needs `create_cursor`.

pub mod connection;
pub mod cursor;
pub mod error;
pub mod protocol;
pub mod render;
pub mod resources;

pub use connection::{ConnectionId, XConnection};
pub use cursor::{create_cursor, try_create_cursor, CursorImage, PixelBuffer};
pub use error::{ConnectionError, DecodeError, Error, Result};
pub use protocol::{Cursor, Picture, Pixmap, Window};
pub use render::{
    query_extension_present, query_extension_version, supports_argb_cursors, FormatCatalog,
    Registry, StandardFormat,
};
pub use resources::{define_cursor, free_cursor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

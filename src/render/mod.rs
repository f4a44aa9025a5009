//! RENDER extension client
//!
//! Capability lookup, the picture format catalog and the depth probe. The
//! free functions at the bottom use the global registry and turn every
//! failure into a plain "not available" answer.

pub mod catalog;
mod probe;
mod query;
mod registry;

pub use catalog::{
    format_mask, DepthInfo, DirectFormat, FormatCatalog, PictFormat, PictType, ScreenInfo,
    StandardFormat, SubpixelOrder, VisualInfo,
};
pub use probe::{advertised_depths, depth_mask, REQUIRED_DEPTHS};
pub use query::{query_formats, CLIENT_VERSION};
pub use registry::{CapabilityEntry, CatalogState, Registry};

use crate::connection::XConnection;
use crate::error::Result;
use crate::protocol::RenderVersion;
use std::io::{Read, Write};

/// Name passed to QueryExtension
pub const RENDER_EXTENSION_NAME: &str = "RENDER";

/// First version with CreateCursor
pub const ARGB_CURSOR_VERSION: RenderVersion = RenderVersion::new(0, 5);

impl Registry {
    /// Whether the server has RENDER at all
    pub fn extension_present<S: Read + Write>(&self, conn: &mut XConnection<S>) -> Result<bool> {
        Ok(self.get_or_create(conn)?.is_present())
    }

    /// Negotiated version; builds the format catalog on first use
    pub fn extension_version<S: Read + Write>(
        &self,
        conn: &mut XConnection<S>,
    ) -> Result<RenderVersion> {
        let entry = self.get_or_create(conn)?;
        let catalog = self.ensure_format_catalog(conn, &entry)?;
        Ok(catalog.version())
    }

    /// Whether ARGB cursors can be created on `conn`
    pub fn supports_argb_cursors<S: Read + Write>(&self, conn: &mut XConnection<S>) -> Result<bool> {
        Ok(self.extension_version(conn)? >= ARGB_CURSOR_VERSION)
    }
}

pub fn query_extension_present<S: Read + Write>(conn: &mut XConnection<S>) -> bool {
    Registry::global()
        .extension_present(conn)
        .unwrap_or_else(|err| {
            log::warn!("RENDER lookup failed: {}", err);
            false
        })
}

pub fn query_extension_version<S: Read + Write>(conn: &mut XConnection<S>) -> Option<(u32, u32)> {
    match Registry::global().extension_version(conn) {
        Ok(version) => Some((version.major, version.minor)),
        Err(err) => {
            log::warn!("RENDER version query failed: {}", err);
            None
        }
    }
}

pub fn supports_argb_cursors<S: Read + Write>(conn: &mut XConnection<S>) -> bool {
    Registry::global()
        .supports_argb_cursors(conn)
        .unwrap_or(false)
}

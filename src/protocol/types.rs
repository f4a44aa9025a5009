//! Core X11 protocol types
//!
//! Ids and enums shared by the request encoder, the setup parser and the
//! RENDER client.

use std::fmt;

/// Resource id as sent on the wire (29 significant bits)
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XID(pub u32);

impl XID {
    pub const NONE: XID = XID(0);

    pub fn new(id: u32) -> Self {
        XID(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for XID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// Client-allocated resource handles. Each wraps the XID it was created
// with; `NONE` (0) is the protocol's "no resource".
macro_rules! resource_id {
    ($($(#[$meta:meta])* $name:ident;)+) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub XID);

        impl $name {
            pub const NONE: $name = $name(XID::NONE);

            pub fn new(id: u32) -> Self {
                $name(XID::new(id))
            }

            pub fn id(&self) -> XID {
                self.0
            }

            pub fn is_none(&self) -> bool {
                self.0 == XID::NONE
            }
        }
    )+};
}

resource_id! {
    Window;
    /// Offscreen surface cursor pixels are uploaded into
    Pixmap;
    GContext;
    Colormap;
    Cursor;
    /// RENDER picture
    Picture;
}

/// RENDER PictFormat ID (server-assigned, not allocated by the client)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PictFormatId(pub u32);

impl PictFormatId {
    pub fn new(id: u32) -> Self {
        PictFormatId(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Visual ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualID(pub u32);

impl VisualID {
    pub fn new(id: u32) -> Self {
        VisualID(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// PutImage layout; only ZPixmap is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    ZPixmap = 2,
}

/// Byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LSBFirst = 0,
    MSBFirst = 1,
}

impl ByteOrder {
    /// Order of the host, used for everything this client sends
    pub fn native() -> Self {
        #[cfg(target_endian = "big")]
        return ByteOrder::MSBFirst;
        #[cfg(target_endian = "little")]
        return ByteOrder::LSBFirst;
    }

    /// Byte sent first in the connection setup request
    pub fn setup_byte(&self) -> u8 {
        match self {
            ByteOrder::MSBFirst => b'B',
            ByteOrder::LSBFirst => b'l',
        }
    }
}

//! QueryVersion + QueryPictFormats exchange
//!
//! Both requests go out back to back. The caller blocks on the formats
//! reply, so the version reply arrives while nobody is waiting for it and is
//! picked up by an async handler keyed to its sequence number.

use super::catalog::{validate_counts, FormatCatalog, SUBPIXEL_VERSION};
use super::registry::lock;
use crate::connection::{AsyncPacket, PacketKind, XConnection};
use crate::error::{DecodeError, Error, Result};
use crate::protocol::*;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

/// Version this client implements
pub const CLIENT_VERSION: RenderVersion = RenderVersion::new(0, 11);

#[derive(Debug, Clone)]
enum VersionReply {
    Waiting,
    Received(RenderVersion),
    Failed(X11Error),
}

/// Run the exchange and decode the catalog.
///
/// On every failure path the rest of the formats reply is consumed, so the
/// connection stays in sync for the next request.
pub fn query_formats<S: Read + Write>(
    conn: &mut XConnection<S>,
    codes: &ExtensionCodes,
) -> Result<FormatCatalog> {
    let request = conn.encoder().render_query_version(
        codes.major_opcode,
        CLIENT_VERSION.major,
        CLIENT_VERSION.minor,
    );
    let version_seq = conn.send_request(&request)?;

    let slot = Arc::new(Mutex::new(VersionReply::Waiting));
    let handler_slot = slot.clone();
    let handler = conn.add_async_handler(Box::new(move |packet: &AsyncPacket<'_>| {
        if packet.last_request_read != version_seq {
            return false;
        }
        let reply = match packet.kind {
            PacketKind::Error => {
                VersionReply::Failed(X11Error::decode(packet.header, packet.byte_order))
            }
            PacketKind::Reply => {
                VersionReply::Received(decode_render_version(packet.header, packet.byte_order))
            }
            PacketKind::Event => return false,
        };
        *lock(&handler_slot) = reply;
        true
    }));

    let request = conn.encoder().render_query_pict_formats(codes.major_opcode);
    let reply = conn
        .send_request(&request)
        .and_then(|seq| conn.wait_for_reply(seq));
    conn.remove_async_handler(handler);
    let reply = reply?;

    let version = lock(&slot).clone();
    let version = match version {
        VersionReply::Received(version) => version,
        VersionReply::Failed(error) => {
            log::warn!("RENDER QueryVersion failed: {}", error);
            conn.discard(reply.extra_bytes())?;
            return Err(Error::Protocol(error));
        }
        VersionReply::Waiting => {
            conn.discard(reply.extra_bytes())?;
            return Err(DecodeError::MissingVersion.into());
        }
    };
    log::debug!("RENDER server version {}.{}", version.major, version.minor);

    let mut counts = PictFormatsCounts::decode(&reply.data, conn.byte_order());
    // before 0.6 the subpixel count is padding
    if version < SUBPIXEL_VERSION {
        counts.subpixels = 0;
    }
    let required = match validate_counts(&counts, reply.length) {
        Ok(required) => required,
        Err(err) => {
            log::warn!("Rejecting QueryPictFormats reply: {}", err);
            conn.discard(reply.extra_bytes())?;
            return Err(err.into());
        }
    };

    let mut payload = Vec::new();
    if payload.try_reserve_exact(required as usize).is_err() {
        conn.discard(reply.extra_bytes())?;
        return Err(Error::AllocationFailure);
    }
    payload.resize(required as usize, 0);
    conn.read_reply_body(&mut payload)?;
    conn.discard(reply.extra_bytes() - required)?;

    FormatCatalog::decode(&payload, &counts, conn.byte_order(), version).map_err(|err| {
        log::warn!("Rejecting QueryPictFormats reply: {}", err);
        err
    })
}

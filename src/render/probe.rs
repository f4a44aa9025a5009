//! Depth probe
//!
//! Some servers list fewer pixmap depths than RENDER's standard formats
//! need. For each depth a screen does not advertise we try to create a 1x1
//! pixmap and watch for BadValue; a depth that fails to create makes the
//! extension unusable on that connection.

use super::registry::{lock, Registry};
use crate::connection::{ConnectionId, XConnection};
use crate::error::{ConnectionError, Error, Result};
use crate::protocol::*;
use std::io::{Read, Write};

/// Bit for `depth` in a depth mask
pub const fn depth_mask(depth: u8) -> u32 {
    1 << (depth - 1)
}

/// Depths of the standard formats
pub const REQUIRED_DEPTHS: u32 =
    depth_mask(1) | depth_mask(4) | depth_mask(8) | depth_mask(24) | depth_mask(32);

/// One in-flight probe. Errors count toward it only if they answer a
/// request sent at or after `serial`.
#[derive(Debug, Clone)]
pub(crate) struct DepthProbeRecord {
    token: u64,
    connection: ConnectionId,
    serial: u64,
    missing: u32,
}

/// Mask of the depths `screen` lists
pub fn advertised_depths(screen: &Screen) -> u32 {
    screen
        .allowed_depths
        .iter()
        .filter(|d| (1..=32).contains(&d.depth))
        .fold(0, |mask, d| mask | depth_mask(d.depth))
}

impl Registry {
    /// Probe every screen of `conn`; the first screen with a missing
    /// required depth fails the whole connection.
    pub(crate) fn probe_depths<S: Read + Write>(&self, conn: &mut XConnection<S>) -> Result<()> {
        let screens: Vec<(Window, u32)> = conn
            .setup()
            .roots
            .iter()
            .map(|s| (s.root, advertised_depths(s)))
            .collect();

        for (index, (root, advertised)) in screens.into_iter().enumerate() {
            let unlisted = REQUIRED_DEPTHS & !advertised;
            if unlisted == 0 {
                continue;
            }
            log::debug!("Screen {} does not list depths 0x{:08x}, probing", index, unlisted);

            let missing = self.probe_screen(conn, root, unlisted)?;
            if missing != 0 {
                log::warn!(
                    "Screen {} cannot create pixmaps of depths 0x{:08x}, RENDER disabled",
                    index,
                    missing
                );
                return Err(Error::CapabilityMismatch {
                    screen: index,
                    missing_depths: missing,
                });
            }
        }
        Ok(())
    }

    fn probe_screen<S: Read + Write>(
        &self,
        conn: &mut XConnection<S>,
        root: Window,
        unlisted: u32,
    ) -> Result<u32> {
        let connection = conn.id();
        let token = {
            let mut state = self.lock();
            let token = state.next_probe;
            state.next_probe += 1;
            state.probes.push(DepthProbeRecord {
                token,
                connection,
                serial: conn.next_request_serial(),
                missing: 0,
            });
            token
        };

        let shared = self.inner.clone();
        let interceptor = Box::new(move |event: &ErrorEvent| {
            let error = &event.error;
            let create_failed = error.major_opcode == RequestOpcode::CreatePixmap as u8
                && error.is(ErrorCode::Value)
                && (1..=32).contains(&error.bad_value);
            // freeing a pixmap that was never created
            let free_failed = error.major_opcode == RequestOpcode::FreePixmap as u8
                && error.is(ErrorCode::Pixmap);
            if !create_failed && !free_failed {
                return false;
            }

            let mut state = lock(&shared);
            let record = state.probes.iter_mut().rev().find(|r| {
                r.connection == connection && event.serial.wrapping_sub(r.serial) as i64 >= 0
            });
            match record {
                Some(record) => {
                    if create_failed {
                        record.missing |= depth_mask(error.bad_value as u8);
                    }
                    true
                }
                None => false,
            }
        });

        let sent = conn.with_error_interceptor(interceptor, |conn| -> std::result::Result<(), ConnectionError> {
            for depth in 2..=32u8 {
                if unlisted & depth_mask(depth) == 0 {
                    continue;
                }
                let pixmap = Pixmap(conn.generate_id()?);
                let request = conn.encoder().create_pixmap(depth, pixmap, root, 1, 1);
                conn.send_request(&request)?;
                let request = conn.encoder().free_pixmap(pixmap);
                conn.send_request(&request)?;
            }
            conn.sync()
        });

        let record = {
            let mut state = self.lock();
            let position = state.probes.iter().position(|r| r.token == token);
            position.map(|i| state.probes.remove(i))
        };
        sent?;

        Ok(record.map_or(0, |r| r.missing))
    }
}

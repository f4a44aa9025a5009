//! Xauthority lookup
//!
//! The file is a sequence of big-endian records:
//! family, address, display number, auth name, auth data, where every
//! field but `family` is a u16 length followed by that many bytes.

use crate::protocol::wire::WireReader;
use crate::protocol::ByteOrder;
use std::io;
use std::path::PathBuf;

const FAMILY_LOCAL: u16 = 256;
const FAMILY_WILD: u16 = 65535;

/// Only cookie scheme we send
pub const MIT_MAGIC_COOKIE: &str = "MIT-MAGIC-COOKIE-1";

/// One Xauthority record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEntry {
    pub family: u16,
    pub address: Vec<u8>,
    pub number: String,
    pub name: String,
    pub data: Vec<u8>,
}

fn read_field<'a>(r: &mut WireReader<'a>) -> io::Result<&'a [u8]> {
    let len = r.read_u16()? as usize;
    r.read_bytes(len)
}

/// Parse every complete record; a truncated tail is ignored
pub fn parse_xauthority(data: &[u8]) -> Vec<AuthEntry> {
    let mut r = WireReader::new(data, ByteOrder::MSBFirst);
    let mut entries = Vec::new();

    while r.remaining() > 0 {
        let entry = (|| -> io::Result<AuthEntry> {
            let family = r.read_u16()?;
            let address = read_field(&mut r)?.to_vec();
            let number = String::from_utf8_lossy(read_field(&mut r)?).to_string();
            let name = String::from_utf8_lossy(read_field(&mut r)?).to_string();
            let data = read_field(&mut r)?.to_vec();
            Ok(AuthEntry {
                family,
                address,
                number,
                name,
                data,
            })
        })();
        match entry {
            Ok(entry) => entries.push(entry),
            Err(_) => break,
        }
    }
    entries
}

fn xauthority_path() -> Option<PathBuf> {
    std::env::var_os("XAUTHORITY")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".Xauthority")))
}

/// Pick the cookie for a local display from a parsed file
pub fn select_entry(entries: &[AuthEntry], display: u32) -> Option<AuthEntry> {
    let number = display.to_string();
    entries
        .iter()
        .filter(|e| e.family == FAMILY_LOCAL || e.family == FAMILY_WILD)
        .filter(|e| e.number.is_empty() || e.number == number)
        .find(|e| e.name == MIT_MAGIC_COOKIE)
        .cloned()
}

/// Cookie for `display` from `$XAUTHORITY` or `~/.Xauthority`, if any
pub fn find_auth_entry(display: u32) -> Option<AuthEntry> {
    let path = xauthority_path()?;
    log::debug!("Reading auth from: {:?}", path);

    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) => {
            log::debug!("No usable Xauthority at {:?}: {}", path, e);
            return None;
        }
    };

    let entry = select_entry(&parse_xauthority(&data), display);
    if entry.is_none() {
        log::debug!("No {} entry for display :{}", MIT_MAGIC_COOKIE, display);
    }
    entry
}

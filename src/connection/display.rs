//! Opening a local display
//!
//! Only local displays are handled: `:N`, `:N.S` and `unix:N[.S]`.
//! On Linux the abstract socket is tried before the filesystem socket.

use super::{find_auth_entry, XConnection};
use crate::error::ConnectionError;
use std::os::unix::net::UnixStream;

/// Parsed display name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayName {
    pub display: u32,
    pub screen: usize,
}

impl DisplayName {
    pub fn parse(name: &str) -> Result<Self, ConnectionError> {
        let invalid = || ConnectionError::InvalidDisplay(name.to_string());

        let (host, rest) = name.rsplit_once(':').ok_or_else(invalid)?;
        if !host.is_empty() && host != "unix" {
            return Err(invalid());
        }

        let (display, screen) = match rest.split_once('.') {
            Some((d, s)) => (d, s.parse().map_err(|_| invalid())?),
            None => (rest, 0),
        };
        let display = display.parse().map_err(|_| invalid())?;

        Ok(DisplayName { display, screen })
    }

    /// `$DISPLAY`, or `:0` when unset
    pub fn from_env() -> Result<Self, ConnectionError> {
        let name = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string());
        Self::parse(&name)
    }

    pub fn socket_path(&self) -> String {
        format!("/tmp/.X11-unix/X{}", self.display)
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(path: &str) -> nix::Result<UnixStream> {
    use nix::sys::socket::{connect, socket, AddressFamily, SockFlag, SockType, UnixAddr};
    use std::os::fd::AsRawFd;

    let fd = socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        None,
    )?;
    let addr = UnixAddr::new_abstract(path.as_bytes())?;
    connect(fd.as_raw_fd(), &addr)?;
    Ok(UnixStream::from(fd))
}

/// Connect the socket for `display` without performing the handshake
pub fn connect_socket(display: &DisplayName) -> Result<UnixStream, ConnectionError> {
    let path = display.socket_path();

    #[cfg(target_os = "linux")]
    {
        match connect_abstract(&path) {
            Ok(stream) => {
                log::debug!("Connected to abstract socket @{}", path);
                return Ok(stream);
            }
            Err(e) => log::debug!("Abstract socket @{} unavailable: {}", path, e),
        }
    }

    let stream = UnixStream::connect(&path)?;
    log::debug!("Connected to {}", path);
    Ok(stream)
}

/// Open `name` (or `$DISPLAY` when `None`) and complete the handshake
pub fn open_display(name: Option<&str>) -> Result<XConnection<UnixStream>, ConnectionError> {
    let display = match name {
        Some(name) => DisplayName::parse(name)?,
        None => DisplayName::from_env()?,
    };

    let stream = connect_socket(&display)?;
    let auth = find_auth_entry(display.display);
    let conn = XConnection::handshake(stream, auth.as_ref())?;

    if display.screen >= conn.setup().roots.len() {
        return Err(ConnectionError::InvalidDisplay(format!(
            ":{}.{} (server has {} screens)",
            display.display,
            display.screen,
            conn.setup().roots.len()
        )));
    }

    log::info!(
        "Opened display :{}.{} ({})",
        display.display,
        display.screen,
        conn.setup().vendor
    );
    Ok(conn.with_default_screen(display.screen))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_names() {
        assert_eq!(
            DisplayName::parse(":0").unwrap(),
            DisplayName {
                display: 0,
                screen: 0
            }
        );
        assert_eq!(
            DisplayName::parse("unix:3.1").unwrap(),
            DisplayName {
                display: 3,
                screen: 1
            }
        );
        assert_eq!(DisplayName::parse(":12").unwrap().socket_path(), "/tmp/.X11-unix/X12");
    }

    #[test]
    fn test_reject_remote_and_garbage() {
        assert!(DisplayName::parse("remote:0").is_err());
        assert!(DisplayName::parse("0").is_err());
        assert!(DisplayName::parse(":x").is_err());
        assert!(DisplayName::parse(":0.y").is_err());
    }
}

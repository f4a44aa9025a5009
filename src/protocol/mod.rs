/// X11 protocol implementation
///
/// This module implements the client-side subset of the X11 wire protocol the
/// cursor path needs: types, requests, errors, reply headers and setup.

pub mod types;
pub mod errors;
pub mod requests;
pub mod replies;
pub mod setup;
pub mod wire;

pub use types::*;
pub use errors::*;
pub use requests::*;
pub use replies::*;
pub use setup::*;

/// X11 protocol version
pub const PROTOCOL_MAJOR_VERSION: u16 = 11;
pub const PROTOCOL_MINOR_VERSION: u16 = 0;

/// Padding helper - X11 requires data to be padded to 4-byte boundaries
pub fn pad(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

/// Calculate padded length
pub fn padded_len(n: usize) -> usize {
    n + pad(n)
}

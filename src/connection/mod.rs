//! Connection layer
//!
//! `XConnection` frames requests and replies over any byte stream that has
//! completed (or is about to perform) the X11 setup exchange. Requests are
//! buffered and numbered; replies are matched back to their request by
//! sequence number. Packets the caller is not waiting for are offered to
//! registered async handlers and error interceptors before being dropped.

mod auth;
#[cfg(unix)]
pub mod display;

pub use auth::{find_auth_entry, AuthEntry};

use crate::error::ConnectionError;
use crate::protocol::wire::{get_u16, get_u32};
use crate::protocol::*;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Flush the output buffer once it grows past this many bytes
const OUTPUT_BUFFER_SIZE: usize = 16384;

/// Unhandled errors kept for `poll_error`
const MAX_QUEUED_ERRORS: usize = 64;

/// Events without a sequence number field
const KEYMAP_NOTIFY: u8 = 11;
/// Events followed by extra payload
const GENERIC_EVENT: u8 = 35;

/// Process-unique identity of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: u64) -> Self {
        ConnectionId(id)
    }
}

/// Kind of packet read from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Error,
    Reply,
    Event,
}

/// A reply or error offered to async handlers
pub struct AsyncPacket<'a> {
    pub kind: PacketKind,
    pub sequence: u64,
    pub last_request_read: u64,
    pub header: &'a [u8; 32],
    pub body: &'a [u8],
    pub byte_order: ByteOrder,
}

/// Out-of-band reply consumer. Returns `true` if it consumed the packet.
pub type AsyncHandler = Box<dyn FnMut(&AsyncPacket<'_>) -> bool + Send>;

/// Error consumer installed for the duration of a scoped operation.
/// Returns `true` if it consumed the error.
pub type ErrorInterceptor = Box<dyn FnMut(&ErrorEvent) -> bool + Send>;

/// Cleanup callback run once when the connection closes
pub type CloseHook = Box<dyn FnOnce(ConnectionId) + Send>;

/// Registration handle for async handlers and interceptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

struct Packet {
    kind: PacketKind,
    sequence: u64,
    header: [u8; 32],
}

/// Client side of one X11 session
pub struct XConnection<S: Read + Write> {
    id: ConnectionId,
    stream: S,
    byte_order: ByteOrder,
    setup: SetupSuccess,
    default_screen: usize,
    encoder: RequestEncoder,

    output: Vec<u8>,
    last_request: u64,
    last_request_read: u64,
    next_resource: u32,

    extensions: HashMap<String, Option<ExtensionCodes>>,
    async_handlers: Vec<(HandlerId, AsyncHandler)>,
    interceptors: Vec<(HandlerId, ErrorInterceptor)>,
    next_handler: u64,
    close_hooks: Vec<CloseHook>,

    events: VecDeque<[u8; 32]>,
    errors: VecDeque<ErrorEvent>,
}

impl<S: Read + Write> XConnection<S> {
    /// Perform the setup exchange on a freshly opened stream
    pub fn handshake(mut stream: S, auth: Option<&AuthEntry>) -> Result<Self, ConnectionError> {
        let byte_order = ByteOrder::native();
        let request = match auth {
            Some(entry) => SetupRequest::new(byte_order, &entry.name, &entry.data),
            None => SetupRequest::new(byte_order, "", &[]),
        };
        stream.write_all(&request.encode())?;
        stream.flush()?;

        let mut header = [0u8; 8];
        stream.read_exact(&mut header)?;
        let additional = get_u16(&header[6..8], byte_order) as usize * 4;
        let mut body = vec![0u8; additional];
        stream.read_exact(&mut body)?;

        match SetupStatus::from_u8(header[0]) {
            Some(SetupStatus::Success) => {
                let setup = SetupSuccess::parse(&header, &body, byte_order)?;
                log::debug!(
                    "Setup successful: vendor={}, screens={}, id base=0x{:08x} mask=0x{:08x}",
                    setup.vendor,
                    setup.roots.len(),
                    setup.resource_id_base,
                    setup.resource_id_mask
                );
                Ok(Self::from_setup(stream, setup, byte_order))
            }
            Some(SetupStatus::Failed) => {
                let len = (header[1] as usize).min(body.len());
                Err(ConnectionError::SetupFailed(
                    String::from_utf8_lossy(&body[..len]).to_string(),
                ))
            }
            Some(SetupStatus::Authenticate) => {
                let reason = String::from_utf8_lossy(&body);
                Err(ConnectionError::SetupFailed(
                    reason.trim_end_matches('\0').to_string(),
                ))
            }
            None => Err(ConnectionError::UnexpectedPacket(format!(
                "setup status {}",
                header[0]
            ))),
        }
    }

    /// Wrap a stream whose setup exchange has already been performed
    pub fn from_setup(stream: S, setup: SetupSuccess, byte_order: ByteOrder) -> Self {
        XConnection {
            id: ConnectionId::next(),
            stream,
            byte_order,
            setup,
            default_screen: 0,
            encoder: RequestEncoder::new(byte_order),
            output: Vec::new(),
            last_request: 0,
            last_request_read: 0,
            next_resource: 1,
            extensions: HashMap::new(),
            async_handlers: Vec::new(),
            interceptors: Vec::new(),
            next_handler: 1,
            close_hooks: Vec::new(),
            events: VecDeque::new(),
            errors: VecDeque::new(),
        }
    }

    pub fn with_default_screen(mut self, screen: usize) -> Self {
        self.default_screen = screen;
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn setup(&self) -> &SetupSuccess {
        &self.setup
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn encoder(&self) -> &RequestEncoder {
        &self.encoder
    }

    pub fn default_screen(&self) -> Option<&Screen> {
        self.setup.roots.get(self.default_screen)
    }

    /// Allocate a fresh resource id. Ids are never handed out twice.
    pub fn generate_id(&mut self) -> Result<XID, ConnectionError> {
        let mask = self.setup.resource_id_mask;
        if mask == 0 {
            return Err(ConnectionError::IdsExhausted);
        }
        let shift = mask.trailing_zeros();
        if self.next_resource > mask >> shift {
            return Err(ConnectionError::IdsExhausted);
        }
        let id = self.setup.resource_id_base | (self.next_resource << shift);
        self.next_resource += 1;
        Ok(XID::new(id))
    }

    /// Sequence number the next request will get
    pub fn next_request_serial(&self) -> u64 {
        self.last_request + 1
    }

    /// Sequence number of the last request sent
    pub fn last_request(&self) -> u64 {
        self.last_request
    }

    /// Sequence number of the last reply, error or event processed
    pub fn last_request_read(&self) -> u64 {
        self.last_request_read
    }

    /// Queue a request and return its sequence number
    pub fn send_request(&mut self, request: &[u8]) -> Result<u64, ConnectionError> {
        let max = self.setup.maximum_request_bytes();
        if request.len() > max {
            return Err(ConnectionError::RequestTooLarge {
                len: request.len(),
                max,
            });
        }
        debug_assert_eq!(request.len() % 4, 0, "requests are padded to 4 bytes");

        if self.output.len() + request.len() > OUTPUT_BUFFER_SIZE {
            self.flush()?;
        }
        self.output.extend_from_slice(request);
        self.last_request += 1;

        log::trace!(
            "Request #{}: opcode={} minor={} len={}",
            self.last_request,
            request[0],
            request[1],
            request.len()
        );
        Ok(self.last_request)
    }

    /// Write out all buffered requests
    pub fn flush(&mut self) -> Result<(), ConnectionError> {
        if !self.output.is_empty() {
            self.stream.write_all(&self.output)?;
            self.output.clear();
        }
        self.stream.flush()?;
        Ok(())
    }

    /// Round trip that processes every error from earlier requests
    pub fn sync(&mut self) -> Result<(), ConnectionError> {
        let request = self.encoder.get_input_focus();
        let sequence = self.send_request(&request)?;
        let reply = self.wait_for_reply(sequence)?;
        self.discard(reply.extra_bytes())
    }

    /// Block until the reply to `sequence` arrives.
    ///
    /// The payload after the 32-byte header is left on the stream; the caller
    /// must consume exactly `extra_bytes()` with `read_reply_body`/`discard`.
    pub fn wait_for_reply(&mut self, sequence: u64) -> Result<ReplyHeader, ConnectionError> {
        self.flush()?;
        loop {
            let packet = self.read_packet()?;
            match packet.kind {
                PacketKind::Event => {
                    self.events.push_back(packet.header);
                }
                PacketKind::Error => {
                    let error = X11Error::decode(&packet.header, self.byte_order);
                    if packet.sequence == sequence {
                        return Err(ConnectionError::Protocol(error));
                    }
                    self.handle_stray_error(packet.sequence, &packet.header, error);
                }
                PacketKind::Reply => {
                    let length = get_u32(&packet.header[4..8], self.byte_order);
                    if packet.sequence == sequence {
                        return Ok(ReplyHeader {
                            sequence,
                            length,
                            data: packet.header,
                        });
                    }
                    self.handle_stray_reply(packet.sequence, &packet.header, length)?;
                }
            }

            if self.last_request_read > sequence {
                return Err(ConnectionError::UnexpectedPacket(format!(
                    "no reply for request {}",
                    sequence
                )));
            }
        }
    }

    /// Read reply payload into `buf`
    pub fn read_reply_body(&mut self, buf: &mut [u8]) -> Result<(), ConnectionError> {
        self.stream.read_exact(buf)?;
        Ok(())
    }

    /// Skip `nbytes` of unread reply payload
    pub fn discard(&mut self, nbytes: u64) -> Result<(), ConnectionError> {
        if nbytes == 0 {
            return Ok(());
        }
        let copied = io::copy(&mut Read::by_ref(&mut self.stream).take(nbytes), &mut io::sink())?;
        if copied != nbytes {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "reply payload cut short").into());
        }
        Ok(())
    }

    /// Look up an extension, caching the answer for this connection
    pub fn query_extension(&mut self, name: &str) -> Result<Option<ExtensionCodes>, ConnectionError> {
        if let Some(codes) = self.extensions.get(name) {
            return Ok(*codes);
        }

        let request = self.encoder.query_extension(name);
        let sequence = self.send_request(&request)?;
        let reply = self.wait_for_reply(sequence)?;
        self.discard(reply.extra_bytes())?;

        let codes = decode_query_extension(&reply);
        match codes {
            Some(c) => log::debug!("Extension {}: major opcode {}", name, c.major_opcode),
            None => log::debug!("Extension {} not present", name),
        }
        self.extensions.insert(name.to_string(), codes);
        Ok(codes)
    }

    pub fn add_async_handler(&mut self, handler: AsyncHandler) -> HandlerId {
        let id = self.allocate_handler_id();
        self.async_handlers.push((id, handler));
        id
    }

    pub fn remove_async_handler(&mut self, id: HandlerId) -> bool {
        let before = self.async_handlers.len();
        self.async_handlers.retain(|(h, _)| *h != id);
        before != self.async_handlers.len()
    }

    /// Run `body` with `interceptor` seeing every error that is not the
    /// direct answer to a waited-for request. The interceptor is removed
    /// before this returns.
    pub fn with_error_interceptor<T>(
        &mut self,
        interceptor: ErrorInterceptor,
        body: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let id = self.allocate_handler_id();
        self.interceptors.push((id, interceptor));
        let result = body(self);
        self.interceptors.retain(|(h, _)| *h != id);
        result
    }

    /// Number of installed error interceptors
    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }

    /// Register a callback run once when the connection is closed or dropped
    pub fn on_close(&mut self, hook: CloseHook) {
        self.close_hooks.push(hook);
    }

    /// Flush pending requests and run the close hooks
    pub fn close(mut self) -> Result<(), ConnectionError> {
        let result = self.flush();
        self.run_close_hooks();
        result
    }

    /// Next queued event, if any
    pub fn poll_event(&mut self) -> Option<[u8; 32]> {
        self.events.pop_front()
    }

    /// Next error nobody claimed, if any
    pub fn poll_error(&mut self) -> Option<ErrorEvent> {
        self.errors.pop_front()
    }

    fn allocate_handler_id(&mut self) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        id
    }

    fn run_close_hooks(&mut self) {
        for hook in self.close_hooks.drain(..) {
            hook(self.id);
        }
    }

    /// Extend a 16-bit wire sequence number to full width
    fn widen_sequence(&self, wire: u16) -> u64 {
        let mut sequence = (self.last_request_read & !0xffff) | wire as u64;
        if sequence < self.last_request_read {
            sequence += 0x10000;
        }
        if sequence > self.last_request && sequence >= 0x10000 {
            sequence -= 0x10000;
        }
        sequence
    }

    fn read_packet(&mut self) -> Result<Packet, ConnectionError> {
        let mut header = [0u8; 32];
        self.stream.read_exact(&mut header)?;

        let kind = match header[0] {
            PACKET_ERROR => PacketKind::Error,
            PACKET_REPLY => PacketKind::Reply,
            _ => PacketKind::Event,
        };
        let event_type = header[0] & 0x7f;

        let sequence = if kind == PacketKind::Event && event_type == KEYMAP_NOTIFY {
            self.last_request_read
        } else {
            self.widen_sequence(wire_sequence(&header, self.byte_order))
        };
        self.last_request_read = sequence;

        if kind == PacketKind::Event && event_type == GENERIC_EVENT {
            let extra = get_u32(&header[4..8], self.byte_order) as u64 * 4;
            self.discard(extra)?;
        }

        Ok(Packet {
            kind,
            sequence,
            header,
        })
    }

    fn dispatch_async(&mut self, kind: PacketKind, sequence: u64, header: &[u8; 32], body: &[u8]) -> bool {
        if self.async_handlers.is_empty() {
            return false;
        }
        let packet = AsyncPacket {
            kind,
            sequence,
            last_request_read: self.last_request_read,
            header,
            body,
            byte_order: self.byte_order,
        };
        self.async_handlers
            .iter_mut()
            .any(|(_, handler)| handler(&packet))
    }

    fn handle_stray_error(&mut self, sequence: u64, header: &[u8; 32], error: X11Error) {
        if self.dispatch_async(PacketKind::Error, sequence, header, &[]) {
            return;
        }

        let event = ErrorEvent {
            serial: sequence,
            error,
        };
        let claimed = self
            .interceptors
            .iter_mut()
            .rev()
            .any(|(_, interceptor)| interceptor(&event));
        if claimed {
            return;
        }

        log::warn!("Unhandled error for request #{}: {}", sequence, event.error);
        if self.errors.len() == MAX_QUEUED_ERRORS {
            self.errors.pop_front();
        }
        self.errors.push_back(event);
    }

    fn handle_stray_reply(&mut self, sequence: u64, header: &[u8; 32], length: u32) -> Result<(), ConnectionError> {
        let extra = length as usize * 4;
        let mut body = Vec::new();
        if body.try_reserve_exact(extra).is_err() {
            log::warn!("Dropping {} byte reply for request #{}", extra, sequence);
            return self.discard(extra as u64);
        }
        body.resize(extra, 0);
        self.stream.read_exact(&mut body)?;

        if !self.dispatch_async(PacketKind::Reply, sequence, header, &body) {
            log::warn!("Discarding unexpected reply for request #{}", sequence);
        }
        Ok(())
    }
}

impl<S: Read + Write> Drop for XConnection<S> {
    fn drop(&mut self) {
        self.run_close_hooks();
    }
}

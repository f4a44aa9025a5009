//! Scripted in-memory X server
//!
//! `FakeServer` implements `Read + Write` so an `XConnection` can run on top
//! of it. Requests are answered as soon as they are written; replies queue up
//! until the client reads them. The server keeps a per-class count of live
//! resources so tests can check that nothing leaks.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use xrender_cursor::protocol::wire::{get_u16, get_u32, WireWriter};
use xrender_cursor::protocol::{padded_len, ByteOrder};
use xrender_cursor::XConnection;

pub const RENDER_OPCODE: u8 = 139;
pub const RENDER_FIRST_ERROR: u8 = 142;
pub const RESOURCE_BASE: u32 = 0x0040_0000;
pub const RESOURCE_MASK: u32 = 0x003f_ffff;
pub const ROOT: u32 = 0x0000_0100;

pub const FORMAT_RGB24: u32 = 0x21;
pub const FORMAT_ARGB32: u32 = 0x22;
pub const FORMAT_A8: u32 = 0x23;
pub const FORMAT_A4: u32 = 0x24;
pub const FORMAT_A1: u32 = 0x25;

const BAD_REQUEST: u8 = 1;
const BAD_VALUE: u8 = 2;
const BAD_PIXMAP: u8 = 4;
const BAD_CURSOR: u8 = 6;
const BAD_DRAWABLE: u8 = 9;
const BAD_PICTURE: u8 = RENDER_FIRST_ERROR + 1;

/// Server-side resource classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pixmap,
    GC,
    Picture,
    Cursor,
}

/// Live resources per class
#[derive(Debug, Default)]
pub struct ResourceTracker {
    live: HashMap<ResourceKind, HashSet<u32>>,
    created: HashMap<ResourceKind, usize>,
}

impl ResourceTracker {
    fn create(&mut self, kind: ResourceKind, id: u32) {
        self.live.entry(kind).or_default().insert(id);
        *self.created.entry(kind).or_default() += 1;
    }

    fn free(&mut self, kind: ResourceKind, id: u32) -> bool {
        self.live
            .get_mut(&kind)
            .map(|ids| ids.remove(&id))
            .unwrap_or(false)
    }

    fn exists(&self, kind: ResourceKind, id: u32) -> bool {
        self.live.get(&kind).is_some_and(|ids| ids.contains(&id))
    }

    pub fn live(&self, kind: ResourceKind) -> usize {
        self.live.get(&kind).map_or(0, HashSet::len)
    }

    pub fn created(&self, kind: ResourceKind) -> usize {
        self.created.get(&kind).copied().unwrap_or(0)
    }
}

/// What to send for one QueryPictFormats
#[derive(Debug, Clone)]
pub enum FormatsReply {
    /// The server's real catalog
    Standard,
    /// Header counts and payload exactly as given; the reply length is
    /// `payload.len() / 4` unless `length` overrides it
    Crafted {
        counts: [u32; 5],
        length: Option<u32>,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub render: bool,
    pub render_version: (u32, u32),
    pub version_error: bool,
    /// Depths listed in the setup reply
    pub listed_depths: Vec<u8>,
    /// Depths CreatePixmap accepts
    pub creatable_depths: Vec<u8>,
    /// Consumed one per QueryPictFormats; `Standard` once empty
    pub formats_replies: VecDeque<FormatsReply>,
    pub max_request_len: u16,
    pub fail_setup: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            render: true,
            render_version: (0, 11),
            version_error: false,
            listed_depths: vec![1, 4, 8, 24, 32],
            creatable_depths: vec![1, 4, 8, 15, 16, 24, 32],
            formats_replies: VecDeque::new(),
            max_request_len: 0xffff,
            fail_setup: None,
        }
    }
}

/// One PutImage as the server saw it
#[derive(Debug, Clone)]
pub struct PutImage {
    pub drawable: u32,
    pub width: u16,
    pub height: u16,
    pub dst_y: i16,
    pub depth: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedCursor {
    pub cursor: u32,
    pub picture: u32,
    pub x: u16,
    pub y: u16,
}

pub struct ServerState {
    pub config: ServerConfig,
    order: ByteOrder,
    input: Vec<u8>,
    output: VecDeque<u8>,
    setup_done: bool,
    sequence: u16,
    pub resources: ResourceTracker,
    /// (major, minor) of every request in arrival order
    pub requests: Vec<(u8, u8)>,
    pub put_images: Vec<PutImage>,
    pub picture_formats: Vec<u32>,
    pub cursors: Vec<CreatedCursor>,
    pub errors_sent: Vec<(u8, u8)>,
}

/// Handle to the scripted server; clones share state
#[derive(Clone)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new(config: ServerConfig) -> Self {
        FakeServer {
            state: Arc::new(Mutex::new(ServerState {
                config,
                order: ByteOrder::LSBFirst,
                input: Vec::new(),
                output: VecDeque::new(),
                setup_done: false,
                sequence: 0,
                resources: ResourceTracker::default(),
                requests: Vec::new(),
                put_images: Vec::new(),
                picture_formats: Vec::new(),
                cursors: Vec::new(),
                errors_sent: Vec::new(),
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn live(&self, kind: ResourceKind) -> usize {
        self.state().resources.live(kind)
    }

    pub fn created(&self, kind: ResourceKind) -> usize {
        self.state().resources.created(kind)
    }

    /// Number of requests with this major (and, for extensions, minor) opcode
    pub fn count(&self, major: u8, minor: Option<u8>) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|(ma, mi)| *ma == major && minor.map_or(true, |m| m == *mi))
            .count()
    }

    pub fn render_requests(&self, minor: u8) -> usize {
        self.count(RENDER_OPCODE, Some(minor))
    }

    /// Bytes queued for the client and not yet read
    pub fn pending_output(&self) -> usize {
        self.state().output.len()
    }
}

/// Open a connection to a fresh server
pub fn connect(config: ServerConfig) -> (XConnection<FakeServer>, FakeServer) {
    let server = FakeServer::new(config);
    let conn = XConnection::handshake(server.clone(), None).expect("handshake");
    (conn, server)
}

impl Read for FakeServer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        let n = buf.len().min(state.output.len());
        for (dst, src) in buf.iter_mut().zip(state.output.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for FakeServer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        state.input.extend_from_slice(buf);
        state.process();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn visuals_for(depth: u8) -> Vec<u32> {
    match depth {
        24 => vec![0x21],
        32 => vec![0x22],
        _ => Vec::new(),
    }
}

/// Counts and payload of the server's real QueryPictFormats reply
pub fn standard_formats(config: &ServerConfig, order: ByteOrder) -> ([u32; 5], Vec<u8>) {
    // id, depth, (red, green, blue, alpha) shift/mask pairs
    let formats: [(u32, u8, [u16; 8]); 5] = [
        (FORMAT_RGB24, 24, [16, 0xff, 8, 0xff, 0, 0xff, 0, 0]),
        (FORMAT_ARGB32, 32, [16, 0xff, 8, 0xff, 0, 0xff, 24, 0xff]),
        (FORMAT_A8, 8, [0, 0, 0, 0, 0, 0, 0, 0xff]),
        (FORMAT_A4, 4, [0, 0, 0, 0, 0, 0, 0, 0x0f]),
        (FORMAT_A1, 1, [0, 0, 0, 0, 0, 0, 0, 0x01]),
    ];

    let mut w = WireWriter::new(order);
    for (id, depth, channels) in formats {
        w.u32(id).u8(1).u8(depth).zeros(2);
        for c in channels {
            w.u16(c);
        }
        w.u32(0);
    }

    let depths = &config.listed_depths;
    let mut nvisuals = 0;
    w.u32(depths.len() as u32).u32(FORMAT_RGB24);
    for &depth in depths {
        let visuals = visuals_for(depth);
        w.u8(depth).u8(0).u16(visuals.len() as u16).zeros(4);
        for visual in &visuals {
            w.u32(*visual).u32(*visual);
        }
        nvisuals += visuals.len() as u32;
    }
    // subpixel order of the single screen
    w.u32(1);

    (
        [formats.len() as u32, 1, depths.len() as u32, nvisuals, 1],
        w.finish(),
    )
}

impl ServerState {
    fn u16_at(&self, req: &[u8], offset: usize) -> u16 {
        get_u16(&req[offset..offset + 2], self.order)
    }

    fn u32_at(&self, req: &[u8], offset: usize) -> u32 {
        get_u32(&req[offset..offset + 4], self.order)
    }

    fn process(&mut self) {
        if !self.setup_done {
            if self.input.len() < 12 {
                return;
            }
            self.order = if self.input[0] == b'B' {
                ByteOrder::MSBFirst
            } else {
                ByteOrder::LSBFirst
            };
            let name_len = self.u16_at(&self.input, 6) as usize;
            let data_len = self.u16_at(&self.input, 8) as usize;
            let need = 12 + padded_len(name_len) + padded_len(data_len);
            if self.input.len() < need {
                return;
            }
            self.input.drain(..need);
            let reply = self.setup_reply();
            self.output.extend(reply);
            self.setup_done = true;
        }

        loop {
            if self.input.len() < 4 {
                return;
            }
            let len = self.u16_at(&self.input, 2) as usize * 4;
            if len == 0 || self.input.len() < len {
                return;
            }
            let request: Vec<u8> = self.input.drain(..len).collect();
            self.sequence = self.sequence.wrapping_add(1);
            self.requests.push((request[0], request[1]));
            self.handle(&request);
        }
    }

    fn setup_reply(&self) -> Vec<u8> {
        let c = &self.config;
        let mut w = WireWriter::new(self.order);

        if let Some(reason) = &c.fail_setup {
            let reason = reason.as_bytes();
            let padded = padded_len(reason.len());
            w.u8(0)
                .u8(reason.len() as u8)
                .u16(11)
                .u16(0)
                .u16((padded / 4) as u16)
                .bytes(reason)
                .align();
            return w.finish();
        }

        let vendor = b"fake";
        let image_order = self.order as u8;
        let mut body = WireWriter::new(self.order);
        body.u32(1)
            .u32(RESOURCE_BASE)
            .u32(RESOURCE_MASK)
            .u32(256)
            .u16(vendor.len() as u16)
            .u16(c.max_request_len)
            .u8(1)
            .u8(c.listed_depths.len() as u8)
            .u8(image_order)
            .u8(image_order)
            .u8(32)
            .u8(32)
            .u8(8)
            .u8(255)
            .zeros(4)
            .bytes(vendor)
            .align();
        for &depth in &c.listed_depths {
            let bpp = match depth {
                1 | 4 | 8 => depth,
                15 | 16 => 16,
                _ => 32,
            };
            body.u8(depth).u8(bpp).u8(32).zeros(5);
        }

        body.u32(ROOT)
            .u32(0x20)
            .u32(0xffffff)
            .u32(0)
            .u32(0)
            .u16(1024)
            .u16(768)
            .u16(270)
            .u16(200)
            .u16(1)
            .u16(1)
            .u32(0x21)
            .u8(0)
            .u8(0)
            .u8(24)
            .u8(c.listed_depths.len() as u8);
        for &depth in &c.listed_depths {
            let visuals = visuals_for(depth);
            body.u8(depth).u8(0).u16(visuals.len() as u16).zeros(4);
            for visual in visuals {
                body.u32(visual)
                    .u8(4)
                    .u8(8)
                    .u16(256)
                    .u32(0xff0000)
                    .u32(0xff00)
                    .u32(0xff)
                    .zeros(4);
            }
        }
        let body = body.finish();

        w.u8(1)
            .u8(0)
            .u16(11)
            .u16(0)
            .u16((body.len() / 4) as u16)
            .bytes(&body);
        w.finish()
    }

    fn reply(&mut self, detail: u8, fill: impl FnOnce(&mut WireWriter), extra: &[u8]) {
        let mut w = WireWriter::new(self.order);
        w.u8(1).u8(detail).u16(self.sequence).u32((extra.len() / 4) as u32);
        fill(&mut w);
        let fixed = w.len();
        w.zeros(32 - fixed).bytes(extra);
        self.output.extend(w.finish());
    }

    fn error(&mut self, code: u8, bad_value: u32, major: u8, minor: u8) {
        let mut w = WireWriter::new(self.order);
        w.u8(0)
            .u8(code)
            .u16(self.sequence)
            .u32(bad_value)
            .u16(minor as u16)
            .u8(major)
            .zeros(21);
        self.output.extend(w.finish());
        self.errors_sent.push((code, major));
    }

    fn handle(&mut self, req: &[u8]) {
        use ResourceKind::*;

        let major = req[0];
        match major {
            // ChangeWindowAttributes
            2 => {}
            // GetInputFocus
            43 => self.reply(1, |w| {
                w.u32(ROOT);
            }, &[]),
            // CreatePixmap
            53 => {
                let depth = req[1];
                let pid = self.u32_at(req, 4);
                if self.config.creatable_depths.contains(&depth) {
                    self.resources.create(Pixmap, pid);
                } else {
                    self.error(BAD_VALUE, depth as u32, major, 0);
                }
            }
            // FreePixmap
            54 => {
                let pid = self.u32_at(req, 4);
                if !self.resources.free(Pixmap, pid) {
                    self.error(BAD_PIXMAP, pid, major, 0);
                }
            }
            // CreateGC
            55 => {
                let gc = self.u32_at(req, 4);
                self.resources.create(GC, gc);
            }
            // FreeGC
            60 => {
                let gc = self.u32_at(req, 4);
                self.resources.free(GC, gc);
            }
            // PutImage
            72 => {
                let drawable = self.u32_at(req, 4);
                if !self.resources.exists(Pixmap, drawable) {
                    self.error(BAD_DRAWABLE, drawable, major, 0);
                    return;
                }
                self.put_images.push(PutImage {
                    drawable,
                    width: self.u16_at(req, 12),
                    height: self.u16_at(req, 14),
                    dst_y: self.u16_at(req, 18) as i16,
                    depth: req[21],
                    data: req[24..].to_vec(),
                });
            }
            // FreeCursor
            95 => {
                let cursor = self.u32_at(req, 4);
                if !self.resources.free(Cursor, cursor) {
                    self.error(BAD_CURSOR, cursor, major, 0);
                }
            }
            // QueryExtension
            98 => {
                let len = self.u16_at(req, 4) as usize;
                let present = self.config.render && &req[8..8 + len] == b"RENDER";
                self.reply(0, |w| {
                    if present {
                        w.u8(1).u8(RENDER_OPCODE).u8(0).u8(RENDER_FIRST_ERROR);
                    } else {
                        w.u8(0).u8(0).u8(0).u8(0);
                    }
                }, &[]);
            }
            RENDER_OPCODE if self.config.render => self.handle_render(req),
            _ => self.error(BAD_REQUEST, 0, major, req[1]),
        }
    }

    fn handle_render(&mut self, req: &[u8]) {
        use ResourceKind::*;

        let minor = req[1];
        match minor {
            // QueryVersion
            0 => {
                if self.config.version_error {
                    self.error(BAD_REQUEST, 0, RENDER_OPCODE, minor);
                    return;
                }
                let (major, minor) = self.config.render_version;
                self.reply(0, |w| {
                    w.u32(major).u32(minor);
                }, &[]);
            }
            // QueryPictFormats
            1 => {
                let reply = self
                    .config
                    .formats_replies
                    .pop_front()
                    .unwrap_or(FormatsReply::Standard);
                let (counts, payload, length) = match reply {
                    FormatsReply::Standard => {
                        let (counts, payload) = standard_formats(&self.config, self.order);
                        (counts, payload, None)
                    }
                    FormatsReply::Crafted {
                        counts,
                        length,
                        payload,
                    } => (counts, payload, length),
                };
                let mut payload = payload;
                payload.resize(padded_len(payload.len()), 0);
                let mut w = WireWriter::new(self.order);
                w.u8(1)
                    .u8(0)
                    .u16(self.sequence)
                    .u32(length.unwrap_or((payload.len() / 4) as u32));
                for count in counts {
                    w.u32(count);
                }
                w.zeros(4).bytes(&payload);
                self.output.extend(w.finish());
            }
            // CreatePicture
            4 => {
                let pid = self.u32_at(req, 4);
                let drawable = self.u32_at(req, 8);
                let format = self.u32_at(req, 12);
                if !self.resources.exists(Pixmap, drawable) {
                    self.error(BAD_DRAWABLE, drawable, RENDER_OPCODE, minor);
                    return;
                }
                self.resources.create(Picture, pid);
                self.picture_formats.push(format);
            }
            // FreePicture
            7 => {
                let pid = self.u32_at(req, 4);
                if !self.resources.free(Picture, pid) {
                    self.error(BAD_PICTURE, pid, RENDER_OPCODE, minor);
                }
            }
            // CreateCursor
            27 => {
                let cursor = self.u32_at(req, 4);
                let picture = self.u32_at(req, 8);
                if !self.resources.exists(Picture, picture) {
                    self.error(BAD_PICTURE, picture, RENDER_OPCODE, minor);
                    return;
                }
                self.resources.create(Cursor, cursor);
                self.cursors.push(CreatedCursor {
                    cursor,
                    picture,
                    x: self.u16_at(req, 12),
                    y: self.u16_at(req, 14),
                });
            }
            _ => self.error(BAD_REQUEST, 0, RENDER_OPCODE, minor),
        }
    }
}

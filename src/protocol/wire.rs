//! Byte-order aware readers and writers for wire data
//!
//! X11 lets the client pick the byte order at setup time, so every multi-byte
//! field is read and written through these helpers.

use super::types::ByteOrder;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};

/// Sequential reader over a byte slice
pub struct WireReader<'a> {
    cursor: Cursor<&'a [u8]>,
    byte_order: ByteOrder,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8], byte_order: ByteOrder) -> Self {
        WireReader {
            cursor: Cursor::new(data),
            byte_order,
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    /// Fail without consuming anything if fewer than `n` bytes are left
    fn ensure(&self, n: usize, what: &'static str) -> io::Result<()> {
        if self.remaining() < n {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, what));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.ensure(1, "read past end of buffer")?;
        self.cursor.read_u8()
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        self.ensure(2, "read past end of buffer")?;
        match self.byte_order {
            ByteOrder::MSBFirst => self.cursor.read_u16::<BigEndian>(),
            ByteOrder::LSBFirst => self.cursor.read_u16::<LittleEndian>(),
        }
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        self.ensure(4, "read past end of buffer")?;
        match self.byte_order {
            ByteOrder::MSBFirst => self.cursor.read_u32::<BigEndian>(),
            ByteOrder::LSBFirst => self.cursor.read_u32::<LittleEndian>(),
        }
    }

    /// Skip `n` padding bytes
    pub fn skip(&mut self, n: usize) -> io::Result<()> {
        self.ensure(n, "skip past end of buffer")?;
        self.cursor.set_position(self.cursor.position() + n as u64);
        Ok(())
    }

    /// Borrow the next `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> io::Result<&'a [u8]> {
        self.ensure(n, "read past end of buffer")?;
        let start = self.position();
        let data: &'a [u8] = self.cursor.get_ref();
        self.cursor.set_position((start + n) as u64);
        Ok(&data[start..start + n])
    }
}

/// Growable writer for requests
pub struct WireWriter {
    buffer: Vec<u8>,
    byte_order: ByteOrder,
}

impl WireWriter {
    pub fn new(byte_order: ByteOrder) -> Self {
        WireWriter {
            buffer: Vec::new(),
            byte_order,
        }
    }

    pub fn with_capacity(byte_order: ByteOrder, capacity: usize) -> Self {
        WireWriter {
            buffer: Vec::with_capacity(capacity),
            byte_order,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        let bytes = match self.byte_order {
            ByteOrder::MSBFirst => value.to_be_bytes(),
            ByteOrder::LSBFirst => value.to_le_bytes(),
        };
        self.bytes(&bytes)
    }

    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.u16(value as u16)
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        let bytes = match self.byte_order {
            ByteOrder::MSBFirst => value.to_be_bytes(),
            ByteOrder::LSBFirst => value.to_le_bytes(),
        };
        self.bytes(&bytes)
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.buffer.resize(self.buffer.len() + n, 0);
        self
    }

    /// Pad to a 4-byte boundary
    pub fn align(&mut self) -> &mut Self {
        let n = super::pad(self.buffer.len());
        self.zeros(n)
    }

    /// Overwrite a u16 already written at `offset`
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let bytes = match self.byte_order {
            ByteOrder::MSBFirst => value.to_be_bytes(),
            ByteOrder::LSBFirst => value.to_le_bytes(),
        };
        self.buffer[offset..offset + 2].copy_from_slice(&bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

/// Read a u16 from a fixed position in a packet
pub fn get_u16(bytes: &[u8], byte_order: ByteOrder) -> u16 {
    match byte_order {
        ByteOrder::MSBFirst => u16::from_be_bytes([bytes[0], bytes[1]]),
        ByteOrder::LSBFirst => u16::from_le_bytes([bytes[0], bytes[1]]),
    }
}

/// Read a u32 from a fixed position in a packet
pub fn get_u32(bytes: &[u8], byte_order: ByteOrder) -> u32 {
    match byte_order {
        ByteOrder::MSBFirst => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        ByteOrder::LSBFirst => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_respects_byte_order() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut le = WireReader::new(&data, ByteOrder::LSBFirst);
        assert_eq!(le.read_u32().unwrap(), 0x04030201);

        let mut be = WireReader::new(&data, ByteOrder::MSBFirst);
        assert_eq!(be.read_u16().unwrap(), 0x0102);
        assert_eq!(be.remaining(), 2);
    }

    #[test]
    fn test_reader_stops_at_end() {
        let data = [0u8; 3];
        let mut reader = WireReader::new(&data, ByteOrder::LSBFirst);
        assert!(reader.read_u32().is_err());
        assert_eq!(reader.remaining(), 3);
        assert!(reader.skip(4).is_err());
        assert!(reader.read_bytes(3).is_ok());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_failed_reads_leave_position() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = WireReader::new(&data, ByteOrder::MSBFirst);
        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert!(reader.read_u32().is_err());
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.read_u16().unwrap(), 0x0203);
        assert!(reader.read_u16().is_err());
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn test_writer_signed_and_order() {
        let mut le = WireWriter::new(ByteOrder::LSBFirst);
        le.i16(-2).u32(0x0102_0304);
        assert_eq!(le.finish(), vec![0xfe, 0xff, 0x04, 0x03, 0x02, 0x01]);

        let mut be = WireWriter::new(ByteOrder::MSBFirst);
        be.i16(-2).u32(0x0102_0304);
        assert_eq!(be.finish(), vec![0xff, 0xfe, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_writer_align_and_patch() {
        let mut w = WireWriter::new(ByteOrder::LSBFirst);
        w.u8(1).u16(0).bytes(b"abc").align();
        assert_eq!(w.len(), 8);
        w.patch_u16(1, 0x0203);
        let bytes = w.finish();
        assert_eq!(&bytes[..3], &[1, 0x03, 0x02]);
        assert_eq!(&bytes[6..], &[0, 0]);
    }
}

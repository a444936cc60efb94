//! Sequential cursors over update input/output byte buffers
//!
//! Both cursors borrow the buffer and track a position; every extraction is
//! bounds-checked so a short section can never read past the end.

use crate::error::ResultCode;

type CursorResult<T> = std::result::Result<T, ResultCode>;

/// Little-endian reader over an immutable byte slice
pub struct SpanReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SpanReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub fn read_bytes(&mut self, len: usize) -> CursorResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(ResultCode::InvalidUpdateInfo);
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.bytes[start..start + len])
    }

    pub fn read_array<const N: usize>(&mut self) -> CursorResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> CursorResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> CursorResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> CursorResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> CursorResult<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> CursorResult<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> CursorResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> CursorResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> CursorResult<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Look at the next u32 without consuming it
    pub fn peek_u32(&self) -> CursorResult<u32> {
        let bytes = self
            .bytes
            .get(self.pos..self.pos + 4)
            .ok_or(ResultCode::InvalidUpdateInfo)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Little-endian writer over a mutable byte slice
pub struct SpanWriter<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> SpanWriter<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes written so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> CursorResult<()> {
        if self.remaining() < data.len() {
            return Err(ResultCode::InsufficientBuffer);
        }
        self.bytes[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
        Ok(())
    }

    pub fn write_zeros(&mut self, len: usize) -> CursorResult<()> {
        if self.remaining() < len {
            return Err(ResultCode::InsufficientBuffer);
        }
        self.bytes[self.pos..self.pos + len].fill(0);
        self.pos += len;
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> CursorResult<()> {
        self.write_bytes(&[v])
    }

    pub fn write_bool(&mut self, v: bool) -> CursorResult<()> {
        self.write_u8(v as u8)
    }

    pub fn write_u16(&mut self, v: u16) -> CursorResult<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i16(&mut self, v: i16) -> CursorResult<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> CursorResult<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> CursorResult<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_f32(&mut self, v: f32) -> CursorResult<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Overwrite bytes at an absolute offset without moving the cursor
    pub fn patch(&mut self, offset: usize, data: &[u8]) -> CursorResult<()> {
        let end = offset + data.len();
        if end > self.bytes.len() {
            return Err(ResultCode::InsufficientBuffer);
        }
        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_bounds() {
        let bytes = [1u8, 0, 0, 0, 2];
        let mut r = SpanReader::new(&bytes);
        assert_eq!(r.peek_u32(), Ok(1));
        assert_eq!(r.read_u32(), Ok(1));
        assert_eq!(r.position(), 4);
        assert_eq!(r.read_u32(), Err(ResultCode::InvalidUpdateInfo));
        // a failed read does not move the cursor
        assert_eq!(r.position(), 4);
        assert_eq!(r.read_u8(), Ok(2));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_writer_bounds_and_patch() {
        let mut buf = [0u8; 6];
        let mut w = SpanWriter::new(&mut buf);
        w.write_u32(0xAABBCCDD).unwrap();
        assert_eq!(w.write_u32(1), Err(ResultCode::InsufficientBuffer));
        w.write_u16(7).unwrap();
        w.patch(0, &[9]).unwrap();
        assert_eq!(w.patch(5, &[0, 0]), Err(ResultCode::InsufficientBuffer));
        assert_eq!(buf, [9, 0xCC, 0xBB, 0xAA, 7, 0]);
    }
}

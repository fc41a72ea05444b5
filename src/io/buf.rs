use byteorder::{ByteOrder, NetworkEndian};
use memchr::memchr;

use crate::error::{Error, Result};
use crate::io::Transport;

/// Fixed-capacity I/O buffer shared by one connection.
///
/// The buffer is used in half-duplex: writers fill `[0, write_pos)` and a
/// flusher drains it; a refiller fills `[filled_end, capacity)` and readers
/// consume `[read_pos, filled_end)`. The codec never performs I/O itself —
/// it checks [`write_space_left`] / [`read_bytes_left`] and suspends when a
/// unit does not fit, leaving the actual flush or refill to the driver loop.
///
/// All multi-byte integers are big-endian, per the wire protocol.
///
/// [`write_space_left`]: Self::write_space_left
/// [`read_bytes_left`]: Self::read_bytes_left
pub struct ByteBuffer {
    buf: Box<[u8]>,

    // write side
    write_pos: usize,

    // read side
    read_pos: usize,
    filled_end: usize,
}

impl ByteBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { buf: vec![0; capacity].into_boxed_slice(), write_pos: 0, read_pos: 0, filled_end: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn write_space_left(&self) -> usize {
        self.buf.len() - self.write_pos
    }

    #[inline]
    pub fn read_bytes_left(&self) -> usize {
        self.filled_end - self.read_pos
    }

    /// Bytes written so far and not yet flushed.
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.write_pos]
    }

    // -- write side --------------------------------------------------------

    // The put_* primitives assume the caller checked `write_space_left`;
    // every codec state arm does exactly that before emitting.

    pub fn put_u8(&mut self, val: u8) {
        debug_assert!(self.write_space_left() >= 1);

        self.buf[self.write_pos] = val;
        self.write_pos += 1;
    }

    pub fn put_i16(&mut self, val: i16) {
        debug_assert!(self.write_space_left() >= 2);

        NetworkEndian::write_i16(&mut self.buf[self.write_pos..], val);
        self.write_pos += 2;
    }

    pub fn put_i32(&mut self, val: i32) {
        debug_assert!(self.write_space_left() >= 4);

        NetworkEndian::write_i32(&mut self.buf[self.write_pos..], val);
        self.write_pos += 4;
    }

    pub fn put_u32(&mut self, val: u32) {
        debug_assert!(self.write_space_left() >= 4);

        NetworkEndian::write_u32(&mut self.buf[self.write_pos..], val);
        self.write_pos += 4;
    }

    pub fn put_i64(&mut self, val: i64) {
        debug_assert!(self.write_space_left() >= 8);

        NetworkEndian::write_i64(&mut self.buf[self.write_pos..], val);
        self.write_pos += 8;
    }

    pub fn put_f32(&mut self, val: f32) {
        debug_assert!(self.write_space_left() >= 4);

        NetworkEndian::write_f32(&mut self.buf[self.write_pos..], val);
        self.write_pos += 4;
    }

    pub fn put_f64(&mut self, val: f64) {
        debug_assert!(self.write_space_left() >= 8);

        NetworkEndian::write_f64(&mut self.buf[self.write_pos..], val);
        self.write_pos += 8;
    }

    pub fn put_bytes(&mut self, val: &[u8]) {
        debug_assert!(self.write_space_left() >= val.len());

        self.buf[self.write_pos..self.write_pos + val.len()].copy_from_slice(val);
        self.write_pos += val.len();
    }

    /// Put a NUL-terminated string. The string must not contain an embedded
    /// NUL; identifiers on this protocol are NUL-delimited.
    pub fn put_str_nul(&mut self, val: &str) -> Result<()> {
        if memchr(b'\0', val.as_bytes()).is_some() {
            return Err(Error::Protocol("string contains an embedded NUL".into()));
        }

        self.put_bytes(val.as_bytes());
        self.put_u8(b'\0');

        Ok(())
    }

    // -- read side ---------------------------------------------------------

    // The get_* primitives assume the caller checked `read_bytes_left`.

    pub fn get_u8(&mut self) -> u8 {
        debug_assert!(self.read_bytes_left() >= 1);

        let val = self.buf[self.read_pos];
        self.read_pos += 1;
        val
    }

    pub fn get_i16(&mut self) -> i16 {
        debug_assert!(self.read_bytes_left() >= 2);

        let val = NetworkEndian::read_i16(&self.buf[self.read_pos..]);
        self.read_pos += 2;
        val
    }

    pub fn get_i32(&mut self) -> i32 {
        debug_assert!(self.read_bytes_left() >= 4);

        let val = NetworkEndian::read_i32(&self.buf[self.read_pos..]);
        self.read_pos += 4;
        val
    }

    pub fn get_u32(&mut self) -> u32 {
        debug_assert!(self.read_bytes_left() >= 4);

        let val = NetworkEndian::read_u32(&self.buf[self.read_pos..]);
        self.read_pos += 4;
        val
    }

    pub fn get_i64(&mut self) -> i64 {
        debug_assert!(self.read_bytes_left() >= 8);

        let val = NetworkEndian::read_i64(&self.buf[self.read_pos..]);
        self.read_pos += 8;
        val
    }

    pub fn get_f32(&mut self) -> f32 {
        debug_assert!(self.read_bytes_left() >= 4);

        let val = NetworkEndian::read_f32(&self.buf[self.read_pos..]);
        self.read_pos += 4;
        val
    }

    pub fn get_f64(&mut self) -> f64 {
        debug_assert!(self.read_bytes_left() >= 8);

        let val = NetworkEndian::read_f64(&self.buf[self.read_pos..]);
        self.read_pos += 8;
        val
    }

    /// Consume `n` bytes and return them as a slice.
    pub fn get_bytes(&mut self, n: usize) -> &[u8] {
        debug_assert!(self.read_bytes_left() >= n);

        let slice = &self.buf[self.read_pos..self.read_pos + n];
        self.read_pos += n;
        slice
    }

    /// Discard up to `n` readable bytes, returning how many were discarded.
    pub fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.read_bytes_left());
        self.read_pos += n;
        n
    }

    // -- driver side -------------------------------------------------------

    /// Hand `[0, write_pos)` to the transport and reset the write cursor.
    pub fn flush_into(&mut self, transport: &mut dyn Transport) -> Result<()> {
        if self.write_pos > 0 {
            transport.flush(&self.buf[..self.write_pos])?;
            self.write_pos = 0;
        }

        Ok(())
    }

    /// Pull more bytes from the transport into the read region.
    ///
    /// Unconsumed bytes are compacted to the front first so a value larger
    /// than the remaining tail can still be assembled. A zero-length fill is
    /// an unexpected end of stream.
    pub fn refill_from(&mut self, transport: &mut dyn Transport) -> Result<()> {
        if self.read_pos > 0 {
            self.buf.copy_within(self.read_pos..self.filled_end, 0);
            self.filled_end -= self.read_pos;
            self.read_pos = 0;
        }

        let n = transport.fill(&mut self.buf[self.filled_end..])?;

        if n == 0 {
            return Err(Error::Protocol("unexpected end of stream".into()));
        }

        self.filled_end += n;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ByteBuffer;

    #[test]
    fn it_tracks_write_space() {
        let mut buf = ByteBuffer::new(16);

        assert_eq!(buf.write_space_left(), 16);

        buf.put_i32(1);
        buf.put_i16(2);

        assert_eq!(buf.write_space_left(), 10);
        assert_eq!(buf.written(), b"\0\0\0\x01\0\x02");
    }

    #[test]
    fn it_round_trips_integers() {
        let mut buf = ByteBuffer::new(32);

        buf.put_i16(-2);
        buf.put_i32(70_000);
        buf.put_i64(-9_000_000_000);

        // move the written bytes to the read region by hand
        let written = buf.written().to_vec();
        let mut rd = ByteBuffer::new(32);
        rd.buf[..written.len()].copy_from_slice(&written);
        rd.filled_end = written.len();

        assert_eq!(rd.get_i16(), -2);
        assert_eq!(rd.get_i32(), 70_000);
        assert_eq!(rd.get_i64(), -9_000_000_000);
        assert_eq!(rd.read_bytes_left(), 0);
    }

    #[test]
    fn it_writes_str_nul() {
        let mut buf = ByteBuffer::new(16);

        buf.put_str_nul("portal").unwrap();

        assert_eq!(buf.written(), b"portal\0");
    }

    #[test]
    fn it_rejects_embedded_nul() {
        let mut buf = ByteBuffer::new(16);

        assert!(buf.put_str_nul("por\0tal").is_err());
        assert_eq!(buf.written(), b"");
    }

    #[test]
    fn it_skips_at_most_what_is_left() {
        let mut buf = ByteBuffer::new(8);
        buf.buf[..4].copy_from_slice(b"abcd");
        buf.filled_end = 4;

        assert_eq!(buf.skip(16), 4);
        assert_eq!(buf.read_bytes_left(), 0);
    }
}

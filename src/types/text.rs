//! Chunking handlers for values of unbounded size: `text` and `bytea`.
//!
//! Both stream through the main buffer in whatever increments fit. `bytea`
//! additionally uses the direct-buffer bypass: a payload that could never
//! fit in the buffer is handed to the transport as one contiguous slice
//! instead of being copied through in pieces.

use std::mem;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::io::ByteBuffer;
use crate::types::{
    ChunkingRead, ChunkingWrite, PgValue, ReadChunks, Reader, TypeHandler, TypeId, WriteChunks,
    Writer,
};

fn checked_len(name: &'static str, len: usize) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| Error::InvalidCast(format!("`{}` value longer than 2^31-1 bytes", name).into()))
}

pub struct TextHandler;

impl TypeHandler for TextHandler {
    fn oid(&self) -> u32 {
        TypeId::TEXT.0
    }

    fn name(&self) -> &'static str {
        "text"
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Chunking(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Chunking(self))
    }
}

impl ChunkingWrite for TextHandler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        match value {
            PgValue::Text(s) => checked_len(self.name(), s.len()),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }

    fn begin(&self, value: &PgValue) -> Result<Box<dyn WriteChunks>> {
        match value {
            PgValue::Text(_) => Ok(Box::new(TextWriteChunks { pos: 0 })),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }
}

struct TextWriteChunks {
    pos: usize,
}

impl WriteChunks for TextWriteChunks {
    fn write(
        &mut self,
        value: &PgValue,
        buf: &mut ByteBuffer,
        _direct: &mut Option<Bytes>,
    ) -> Result<bool> {
        let bytes = match value {
            PgValue::Text(s) => s.as_bytes(),
            other => return Err(Error::mismatch("text", other)),
        };

        let n = (bytes.len() - self.pos).min(buf.write_space_left());
        buf.put_bytes(&bytes[self.pos..self.pos + n]);
        self.pos += n;

        Ok(self.pos == bytes.len())
    }
}

impl ChunkingRead for TextHandler {
    fn begin(&self, len: usize) -> Box<dyn ReadChunks> {
        Box::new(TextReadChunks { remaining: len, data: Vec::with_capacity(len) })
    }
}

struct TextReadChunks {
    remaining: usize,
    data: Vec<u8>,
}

impl ReadChunks for TextReadChunks {
    fn read(&mut self, buf: &mut ByteBuffer) -> Result<Option<PgValue>> {
        let n = self.remaining.min(buf.read_bytes_left());
        self.data.extend_from_slice(buf.get_bytes(n));
        self.remaining -= n;

        if self.remaining > 0 {
            return Ok(None);
        }

        match String::from_utf8(mem::take(&mut self.data)) {
            Ok(s) => Ok(Some(PgValue::Text(s))),

            // every declared byte is consumed, the payload just isn't UTF-8
            Err(err) => Err(Error::safe(err)),
        }
    }
}

pub struct ByteaHandler;

impl TypeHandler for ByteaHandler {
    fn oid(&self) -> u32 {
        TypeId::BYTEA.0
    }

    fn name(&self) -> &'static str {
        "bytea"
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Chunking(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Chunking(self))
    }
}

impl ChunkingWrite for ByteaHandler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        match value {
            PgValue::Bytea(b) => checked_len(self.name(), b.len()),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }

    fn begin(&self, value: &PgValue) -> Result<Box<dyn WriteChunks>> {
        match value {
            PgValue::Bytea(_) => Ok(Box::new(ByteaWriteChunks { pos: 0 })),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }
}

struct ByteaWriteChunks {
    pos: usize,
}

impl WriteChunks for ByteaWriteChunks {
    fn write(
        &mut self,
        value: &PgValue,
        buf: &mut ByteBuffer,
        direct: &mut Option<Bytes>,
    ) -> Result<bool> {
        let bytes = match value {
            PgValue::Bytea(b) => b,
            other => return Err(Error::mismatch("bytea", other)),
        };

        let remaining = bytes.len() - self.pos;

        if remaining > buf.capacity() {
            // could never fit whole; let the transport take the tail in one
            // zero-copy slice
            *direct = Some(bytes.slice(self.pos..));
            self.pos = bytes.len();

            return Ok(false);
        }

        let n = remaining.min(buf.write_space_left());
        buf.put_bytes(&bytes[self.pos..self.pos + n]);
        self.pos += n;

        Ok(self.pos == bytes.len())
    }
}

impl ChunkingRead for ByteaHandler {
    fn begin(&self, len: usize) -> Box<dyn ReadChunks> {
        Box::new(ByteaReadChunks { remaining: len, data: Vec::with_capacity(len) })
    }
}

struct ByteaReadChunks {
    remaining: usize,
    data: Vec<u8>,
}

impl ReadChunks for ByteaReadChunks {
    fn read(&mut self, buf: &mut ByteBuffer) -> Result<Option<PgValue>> {
        let n = self.remaining.min(buf.read_bytes_left());
        self.data.extend_from_slice(buf.get_bytes(n));
        self.remaining -= n;

        if self.remaining > 0 {
            return Ok(None);
        }

        Ok(Some(PgValue::Bytea(mem::take(&mut self.data).into())))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::{ByteaHandler, TextHandler};
    use crate::io::ByteBuffer;
    use crate::types::{ChunkingWrite, PgValue};

    #[test]
    fn it_streams_text_across_a_tiny_buffer() {
        let value = PgValue::Text("hello world".into());
        let mut chunks = TextHandler.begin(&value).unwrap();
        let mut out = Vec::new();
        let mut direct = None;

        loop {
            let mut buf = ByteBuffer::new(4);
            let done = chunks.write(&value, &mut buf, &mut direct).unwrap();
            out.extend_from_slice(buf.written());

            if done {
                break;
            }
        }

        assert_eq!(out, b"hello world");
    }

    #[test]
    fn it_bypasses_the_buffer_for_oversized_bytea() {
        let value = PgValue::Bytea(Bytes::from(vec![0xAB; 100]));
        let mut chunks = ByteaHandler.begin(&value).unwrap();
        let mut buf = ByteBuffer::new(16);
        let mut direct = None;

        let done = chunks.write(&value, &mut buf, &mut direct).unwrap();

        assert!(!done);
        assert_eq!(direct.as_deref(), Some(&[0xAB; 100][..]));
        assert_eq!(buf.written(), b"");

        // re-entry after the driver sends the chunk reports completion
        direct = None;
        let done = chunks.write(&value, &mut buf, &mut direct).unwrap();
        assert!(done);
    }
}

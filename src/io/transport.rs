use std::io;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::io::ByteBuffer;

/// The byte sink/source behind a connection. TCP, TLS, and connection
/// lifecycle live on the other side of this seam.
pub trait Transport {
    /// Send `bytes` down the wire.
    fn flush(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Pull at most `dest.len()` bytes from the wire, returning how many
    /// were placed. Zero means end of stream.
    fn fill(&mut self, dest: &mut [u8]) -> io::Result<usize>;
}

/// A resumable message or value writer.
///
/// `write` emits as much as fits, returning `Ok(true)` on completion. On
/// `Ok(false)` the codec has suspended: either `direct` holds a chunk to
/// emit past the main buffer, or the buffer needs a flush. All suspension
/// state is preserved inside the codec; re-entering continues exactly where
/// emission stopped.
pub trait WireWrite {
    fn write(&mut self, buf: &mut ByteBuffer, direct: &mut Option<Bytes>) -> Result<bool>;
}

/// A resumable value reader. `Ok(None)` means the buffer ran dry and must be
/// refilled before re-entering.
pub trait WireRead {
    type Output;

    fn read(&mut self, buf: &mut ByteBuffer) -> Result<Option<Self::Output>>;
}

/// Drive a writer to completion, flushing between suspensions.
///
/// Bytes reach the transport in exact emission order: the main buffer is
/// drained before a direct chunk is sent, because the chunk was logically
/// emitted after whatever the buffer already holds.
pub fn drive_write<M, T>(message: &mut M, buf: &mut ByteBuffer, transport: &mut T) -> Result<()>
where
    M: WireWrite,
    T: Transport,
{
    let mut direct = None;

    loop {
        let done = message.write(buf, &mut direct)?;

        if let Some(chunk) = direct.take() {
            debug_assert!(!done);

            buf.flush_into(transport)?;
            transport.flush(&chunk)?;

            continue;
        }

        if done {
            return buf.flush_into(transport);
        }

        if buf.written().is_empty() {
            // suspended with nothing to flush: the unit the codec is stuck
            // on can never fit
            return Err(Error::BufferTooSmall {
                required: buf.capacity() + 1,
                capacity: buf.capacity(),
            });
        }

        log::trace!("flushing {} bytes mid-message", buf.written().len());
        buf.flush_into(transport)?;
    }
}

/// Drive a reader to completion, refilling between suspensions.
pub fn drive_read<M, T>(codec: &mut M, buf: &mut ByteBuffer, transport: &mut T) -> Result<M::Output>
where
    M: WireRead,
    T: Transport,
{
    loop {
        if let Some(out) = codec.read(buf)? {
            return Ok(out);
        }

        buf.refill_from(transport)?;
    }
}

/// In-memory transport: flushed bytes accumulate in a vector, reads are
/// served from a preloaded script. Backs the tests and single-shot encoding.
#[derive(Default)]
pub struct MemTransport {
    sent: Vec<u8>,
    flushes: usize,
    input: Vec<u8>,
    input_pos: usize,
}

impl MemTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: Vec<u8>) -> Self {
        Self { input, ..Self::default() }
    }

    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// How many flush calls the driver loop has issued.
    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl Transport for MemTransport {
    fn flush(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sent.extend_from_slice(bytes);
        self.flushes += 1;

        Ok(())
    }

    fn fill(&mut self, dest: &mut [u8]) -> io::Result<usize> {
        let n = dest.len().min(self.input.len() - self.input_pos);

        dest[..n].copy_from_slice(&self.input[self.input_pos..self.input_pos + n]);
        self.input_pos += n;

        Ok(n)
    }
}

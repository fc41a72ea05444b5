//! The type-handler layer: the host value model, the handler capability
//! traits, and the per-value emission/consumption routine shared by the
//! bind writer and the array codec.

mod array;
mod primitive;
mod registry;
mod text;
mod timestamp;
mod type_id;
mod unknown;

pub use array::{ArrayDecoder, ArrayEncoder, ArrayHandler};
pub use primitive::{
    BoolHandler, Float4Handler, Float8Handler, Int2Handler, Int4Handler, Int8Handler,
};
pub use registry::TypeHandlerRegistry;
pub use text::{ByteaHandler, TextHandler};
pub use timestamp::TimestampHandler;
pub use type_id::TypeId;
pub use unknown::UnknownTypeHandler;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::io::ByteBuffer;

/// A PostgreSQL value on the host side.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(String),
    Bytea(Bytes),

    /// Microseconds since 2000-01-01 00:00:00, the backend's integer
    /// timestamp representation.
    Timestamp(i64),

    Array(PgArray),
}

impl PgValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PgValue::Null)
    }

    /// The registry key for this value's host type. `Null` carries no type
    /// of its own and must be bound with an explicit hint.
    pub fn host_kind(&self) -> Option<HostKind> {
        Some(match self {
            PgValue::Null => return None,
            PgValue::Bool(_) => HostKind::Bool,
            PgValue::Int2(_) => HostKind::Int2,
            PgValue::Int4(_) => HostKind::Int4,
            PgValue::Int8(_) => HostKind::Int8,
            PgValue::Float4(_) => HostKind::Float4,
            PgValue::Float8(_) => HostKind::Float8,
            PgValue::Text(_) => HostKind::Text,
            PgValue::Bytea(_) => HostKind::Bytea,
            PgValue::Timestamp(_) => HostKind::Timestamp,
            PgValue::Array(array) => HostKind::Array(array.element_oid),
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PgValue::Null => "null",
            PgValue::Bool(_) => "bool",
            PgValue::Int2(_) => "int2",
            PgValue::Int4(_) => "int4",
            PgValue::Int8(_) => "int8",
            PgValue::Float4(_) => "float4",
            PgValue::Float8(_) => "float8",
            PgValue::Text(_) => "text",
            PgValue::Bytea(_) => "bytea",
            PgValue::Timestamp(_) => "timestamp",
            PgValue::Array(_) => "array",
        }
    }
}

/// An N-dimensional array value. Elements are stored flat in row-major
/// order; `dims` holds the per-dimension lengths. Rank zero is the empty
/// array. Lower bounds are not modeled: they are written as 1 and discarded
/// on read.
#[derive(Debug, Clone, PartialEq)]
pub struct PgArray {
    pub element_oid: u32,
    pub dims: Vec<i32>,
    pub elements: Vec<PgValue>,
}

impl PgArray {
    /// A one-dimensional array over `elements`.
    pub fn from_vec(element_oid: TypeId, elements: Vec<PgValue>) -> Self {
        let dims = vec![elements.len() as i32];

        Self { element_oid: element_oid.0, dims, elements }
    }

    /// An array of the given shape. The element count must equal the
    /// product of `dims`.
    pub fn with_dims(element_oid: TypeId, dims: Vec<i32>, elements: Vec<PgValue>) -> Result<Self> {
        let expected: i64 = dims.iter().map(|&d| d as i64).product();

        if dims.iter().any(|&d| d < 0) || expected != elements.len() as i64 {
            return Err(Error::InvalidCast(
                format!("array of shape {:?} cannot hold {} elements", dims, elements.len())
                    .into(),
            ));
        }

        Ok(Self { element_oid: element_oid.0, dims, elements })
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub(crate) fn has_nulls(&self) -> bool {
        self.elements.iter().any(PgValue::is_null)
    }
}

/// Host-type key used for parameter handler lookup. Arrays key on their
/// element OID so each element type resolves to its own array handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    Bytea,
    Timestamp,
    Array(u32),
}

/// A type handler: metadata plus at most one write capability and one read
/// capability.
///
/// Handlers are shared read-only across every statement on a connection and
/// hold no per-value state; anything mutable lives in the codec driving
/// them (for chunking handlers, in the state returned by `begin`).
pub trait TypeHandler: Send + Sync {
    fn oid(&self) -> u32;

    fn name(&self) -> &'static str;

    fn supports_binary_read(&self) -> bool {
        true
    }

    fn supports_binary_write(&self) -> bool {
        true
    }

    fn prefer_text_write(&self) -> bool {
        false
    }

    fn writer(&self) -> Option<Writer<'_>> {
        None
    }

    fn reader(&self) -> Option<Reader<'_>> {
        None
    }
}

/// A handler's write capability. The enum is the discriminator: a handler
/// is either simple or chunking, never both.
pub enum Writer<'h> {
    Simple(&'h dyn SimpleWrite),
    Chunking(&'h dyn ChunkingWrite),
}

impl Writer<'_> {
    /// Binary length of `value`, validated against the handler.
    pub fn size(&self, value: &PgValue) -> Result<i32> {
        match self {
            Writer::Simple(w) => w.size(value),
            Writer::Chunking(w) => w.size(value),
        }
    }
}

/// A handler's read capability.
pub enum Reader<'h> {
    Simple(&'h dyn SimpleRead),
    Chunking(&'h dyn ChunkingRead),
}

/// Synchronous writer for values whose bytes always fit in the buffer. The
/// caller reserves `size()` bytes of contiguous space before calling
/// `write`, which must emit exactly that many.
pub trait SimpleWrite: Send + Sync {
    fn size(&self, value: &PgValue) -> Result<i32>;

    fn write(&self, value: &PgValue, buf: &mut ByteBuffer) -> Result<()>;
}

/// Streaming writer for values of unbounded size.
pub trait ChunkingWrite: Send + Sync {
    fn size(&self, value: &PgValue) -> Result<i32>;

    /// Validate `value` and produce the per-value emission state. The same
    /// value is passed back on every [`WriteChunks::write`] call.
    fn begin(&self, value: &PgValue) -> Result<Box<dyn WriteChunks>>;
}

/// In-flight emission state for one chunking value.
pub trait WriteChunks {
    /// Emit as much as fits. Returns `Ok(true)` when the value is complete.
    /// Must return `Ok(false)` whenever it populates `direct` — the driver
    /// sends that chunk to the transport bypassing the buffer, then
    /// re-enters.
    fn write(
        &mut self,
        value: &PgValue,
        buf: &mut ByteBuffer,
        direct: &mut Option<Bytes>,
    ) -> Result<bool>;
}

/// Synchronous reader for fixed-size values. The caller guarantees `len`
/// readable bytes; the implementation must consume exactly `len`, also when
/// it reports a safe error.
pub trait SimpleRead: Send + Sync {
    fn read(&self, len: usize, buf: &mut ByteBuffer) -> Result<PgValue>;
}

/// Streaming reader for values of unbounded size.
pub trait ChunkingRead: Send + Sync {
    fn begin(&self, len: usize) -> Box<dyn ReadChunks>;
}

/// In-flight consumption state for one chunking value. `Ok(None)` means the
/// buffer ran dry; the partial value is retained across the refill.
pub trait ReadChunks {
    fn read(&mut self, buf: &mut ByteBuffer) -> Result<Option<PgValue>>;
}

/// Emits one length-prefixed value: `i32` length (−1 for null) followed by
/// the body through the handler's write capability. Survives suspension
/// between the prefix and the body via `wrote_len`.
///
/// This is the per-parameter routine of the bind writer and the per-element
/// routine of the array writer.
#[derive(Default)]
pub(crate) struct ValueWriter {
    wrote_len: bool,
    chunks: Option<Box<dyn WriteChunks>>,
}

impl ValueWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `size` is the precomputed binary length of `value` (ignored for
    /// null). Returns `Ok(false)` to suspend; state resets on `Ok(true)`.
    pub(crate) fn write(
        &mut self,
        handler: &dyn TypeHandler,
        value: &PgValue,
        size: i32,
        buf: &mut ByteBuffer,
        direct: &mut Option<Bytes>,
    ) -> Result<bool> {
        if value.is_null() {
            if buf.write_space_left() < 4 {
                return Ok(false);
            }

            buf.put_i32(-1);

            return Ok(true);
        }

        match handler.writer() {
            Some(Writer::Simple(w)) => {
                // prefix and body are emitted as one unit
                if buf.write_space_left() < 4 + size as usize {
                    return Ok(false);
                }

                buf.put_i32(size);
                w.write(value, buf)?;

                Ok(true)
            }

            Some(Writer::Chunking(w)) => {
                if !self.wrote_len {
                    if buf.write_space_left() < 4 {
                        return Ok(false);
                    }

                    // validate before the prefix so a bad value emits nothing
                    self.chunks = Some(w.begin(value)?);

                    buf.put_i32(size);
                    self.wrote_len = true;
                }

                let chunks = match self.chunks.as_mut() {
                    Some(chunks) => chunks,
                    None => return Err(Error::ConcurrentOperation),
                };

                let done = chunks.write(value, buf, direct)?;

                if done {
                    self.wrote_len = false;
                    self.chunks = None;
                }

                Ok(done)
            }

            None => Err(Error::mismatch(handler.name(), value)),
        }
    }
}

/// Consumes one length-prefixed value, mirroring [`ValueWriter`].
///
/// Owns `element_len` (−1 until the prefix is read) and the safe-read
/// containment: when a handler reports a safe error, the element's declared
/// bytes are drained — across suspensions if necessary — before the error
/// surfaces, so the stream stays on a value boundary.
pub(crate) struct ValueReader {
    element_len: i32,
    consumed: usize,
    chunks: Option<Box<dyn ReadChunks>>,
    skip_left: usize,
    pending_safe: Option<Error>,
}

impl ValueReader {
    pub(crate) fn new() -> Self {
        Self { element_len: -1, consumed: 0, chunks: None, skip_left: 0, pending_safe: None }
    }

    /// `Ok(None)` suspends. A null prefix yields `PgValue::Null`. On any
    /// `Err` the reader has reset itself; if the error is safe the stream
    /// is positioned after the value.
    pub(crate) fn read(
        &mut self,
        handler: &dyn TypeHandler,
        buf: &mut ByteBuffer,
    ) -> Result<Option<PgValue>> {
        if let Some(err) = self.pending_safe.take() {
            self.skip_left -= buf.skip(self.skip_left);

            if self.skip_left > 0 {
                self.pending_safe = Some(err);
                return Ok(None);
            }

            self.element_len = -1;
            return Err(err);
        }

        if self.element_len < 0 {
            if buf.read_bytes_left() < 4 {
                return Ok(None);
            }

            let len = buf.get_i32();

            if len == -1 {
                return Ok(Some(PgValue::Null));
            }

            if len < 0 {
                return Err(Error::Protocol(
                    format!("negative value length {}", len).into(),
                ));
            }

            self.element_len = len;
            self.consumed = 0;
        }

        let len = self.element_len as usize;

        match handler.reader() {
            Some(Reader::Simple(r)) => {
                if buf.read_bytes_left() < len {
                    return Ok(None);
                }

                let before = buf.read_bytes_left();
                let result = r.read(len, buf);

                // hold the reader to its exactly-len contract
                let consumed = before - buf.read_bytes_left();
                if consumed < len {
                    buf.skip(len - consumed);
                }

                self.element_len = -1;

                result.map(Some)
            }

            Some(Reader::Chunking(r)) => {
                let chunks = self.chunks.get_or_insert_with(|| r.begin(len));

                let before = buf.read_bytes_left();
                let result = chunks.read(buf);
                self.consumed += before - buf.read_bytes_left();

                match result {
                    Ok(Some(value)) => {
                        self.element_len = -1;
                        self.chunks = None;

                        Ok(Some(value))
                    }

                    Ok(None) => Ok(None),

                    Err(err) if err.is_safe() => {
                        // drain the rest of the element before surfacing
                        self.chunks = None;
                        self.skip_left = len.saturating_sub(self.consumed);
                        self.pending_safe = Some(err);

                        self.read(handler, buf)
                    }

                    Err(err) => Err(err),
                }
            }

            None => {
                if !handler.supports_binary_read() {
                    Err(Error::UnsupportedBinaryFormat(handler.name()))
                } else {
                    Err(Error::TypeMismatch { handler: handler.name(), value: "binary" })
                }
            }
        }
    }
}

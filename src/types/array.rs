//! Binary array codec.
//!
//! Wire layout, as the backend defines it: `ndim:i32`, `has_nulls:i32`
//! (informational), `element_oid:u32`, then `(length:i32, lower_bound:i32)`
//! per dimension, then each element in row-major order as an `i32` length
//! (−1 for SQL NULL) followed by that many bytes.
//!
//! Both directions are explicit state machines that suspend whenever the
//! buffer runs out of space or bytes and resume exactly where they left
//! off, including between an element's length prefix and its body.

use std::mem;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::io::{ByteBuffer, WireRead, WireWrite};
use crate::types::{
    ChunkingRead, ChunkingWrite, PgArray, PgValue, ReadChunks, Reader, TypeHandler, ValueReader,
    ValueWriter, WriteChunks, Writer,
};

/// Array handler generic over its element handler.
///
/// Binary support follows the element: an array reads or writes binary
/// exactly when its element type does. The delimiter only matters for the
/// text representation (`;` for `box`, `,` for everything else).
pub struct ArrayHandler {
    element: Arc<dyn TypeHandler>,
    oid: u32,
    name: &'static str,
    delimiter: u8,
}

impl ArrayHandler {
    pub fn new(oid: u32, name: &'static str, element: Arc<dyn TypeHandler>) -> Self {
        Self::with_delimiter(oid, name, element, b',')
    }

    pub fn with_delimiter(
        oid: u32,
        name: &'static str,
        element: Arc<dyn TypeHandler>,
        delimiter: u8,
    ) -> Self {
        Self { element, oid, name, delimiter }
    }

    pub fn element(&self) -> &Arc<dyn TypeHandler> {
        &self.element
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    fn check_value<'v>(&self, value: &'v PgValue) -> Result<&'v PgArray> {
        let array = match value {
            PgValue::Array(array) => array,
            other => return Err(Error::mismatch(self.name, other)),
        };

        if array.element_oid != self.element.oid() {
            return Err(Error::InvalidCast(
                format!(
                    "array with element oid {} bound to handler for `{}` (oid {})",
                    array.element_oid,
                    self.element.name(),
                    self.element.oid(),
                )
                .into(),
            ));
        }

        Ok(array)
    }

    fn element_writer(&self) -> Result<Writer<'_>> {
        self.element
            .writer()
            .ok_or(Error::UnsupportedBinaryFormat(self.element.name()))
    }
}

impl TypeHandler for ArrayHandler {
    fn oid(&self) -> u32 {
        self.oid
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn supports_binary_read(&self) -> bool {
        self.element.supports_binary_read()
    }

    fn supports_binary_write(&self) -> bool {
        self.element.supports_binary_write()
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Chunking(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Chunking(self))
    }
}

impl ChunkingWrite for ArrayHandler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        let array = self.check_value(value)?;
        let writer = self.element_writer()?;

        let mut total = 12 + 8 * array.rank() as i64;

        for element in &array.elements {
            total += 4;

            if !element.is_null() {
                total += writer.size(element)? as i64;
            }
        }

        i32::try_from(total)
            .map_err(|_| Error::InvalidCast("array larger than 2^31-1 bytes".into()))
    }

    fn begin(&self, value: &PgValue) -> Result<Box<dyn WriteChunks>> {
        self.check_value(value)?;
        self.element_writer()?;

        Ok(Box::new(ArrayWriteChunks::new(self.element.clone())))
    }
}

impl ChunkingRead for ArrayHandler {
    fn begin(&self, _len: usize) -> Box<dyn ReadChunks> {
        // the array layout is self-describing; the outer length is not needed
        Box::new(ArrayReadChunks { decoder: ArrayDecoder::prepared(self.element.clone()) })
    }
}

struct ArrayReadChunks {
    decoder: ArrayDecoder,
}

impl ReadChunks for ArrayReadChunks {
    fn read(&mut self, buf: &mut ByteBuffer) -> Result<Option<PgValue>> {
        Ok(self.decoder.read(buf)?.map(PgValue::Array))
    }
}

/// Emission state for one array value. `WroteNothing` emits the header
/// atomically; `WritingElements` walks the flat row-major element list,
/// resuming mid-element through the shared [`ValueWriter`].
struct ArrayWriteChunks {
    element: Arc<dyn TypeHandler>,
    wrote_header: bool,
    index: usize,
    element_writer: ValueWriter,
}

impl ArrayWriteChunks {
    fn new(element: Arc<dyn TypeHandler>) -> Self {
        Self { element, wrote_header: false, index: 0, element_writer: ValueWriter::new() }
    }
}

impl WriteChunks for ArrayWriteChunks {
    fn write(
        &mut self,
        value: &PgValue,
        buf: &mut ByteBuffer,
        direct: &mut Option<Bytes>,
    ) -> Result<bool> {
        let array = match value {
            PgValue::Array(array) => array,
            other => return Err(Error::mismatch("array", other)),
        };

        if !self.wrote_header {
            let header = 12 + 8 * array.rank();

            if buf.write_space_left() < header {
                return Ok(false);
            }

            buf.put_i32(array.rank() as i32);
            buf.put_i32(array.has_nulls() as i32);
            buf.put_u32(self.element.oid());

            for &len in &array.dims {
                buf.put_i32(len);
                // lower bounds are normalized to 1
                buf.put_i32(1);
            }

            self.wrote_header = true;
        }

        while self.index < array.elements.len() {
            let element = &array.elements[self.index];

            let size = if element.is_null() {
                -1
            } else {
                match self.element.writer() {
                    Some(writer) => writer.size(element)?,
                    None => return Err(Error::UnsupportedBinaryFormat(self.element.name())),
                }
            };

            if !self.element_writer.write(&*self.element, element, size, buf, direct)? {
                return Ok(false);
            }

            self.index += 1;
        }

        Ok(true)
    }
}

/// Standalone resumable writer for one bare array value (no outer length
/// prefix). Cycles `NeedPrepare → writing → NeedPrepare`; preparing while a
/// value is in flight is a `ConcurrentOperation` error.
pub struct ArrayEncoder {
    element: Arc<dyn TypeHandler>,
    inflight: Option<(PgValue, ArrayWriteChunks)>,
}

impl ArrayEncoder {
    pub fn new(element: Arc<dyn TypeHandler>) -> Self {
        Self { element, inflight: None }
    }

    pub fn prepare(&mut self, value: PgArray) -> Result<()> {
        if self.inflight.is_some() {
            return Err(Error::ConcurrentOperation);
        }

        if value.element_oid != self.element.oid() {
            return Err(Error::InvalidCast(
                format!(
                    "array with element oid {} bound to handler for oid {}",
                    value.element_oid,
                    self.element.oid(),
                )
                .into(),
            ));
        }

        if self.element.writer().is_none() {
            return Err(Error::UnsupportedBinaryFormat(self.element.name()));
        }

        self.inflight =
            Some((PgValue::Array(value), ArrayWriteChunks::new(self.element.clone())));

        Ok(())
    }
}

impl WireWrite for ArrayEncoder {
    fn write(&mut self, buf: &mut ByteBuffer, direct: &mut Option<Bytes>) -> Result<bool> {
        let (value, chunks) = match &mut self.inflight {
            Some((value, chunks)) => (&*value, chunks),
            None => return Err(Error::Protocol("array encoder has no value prepared".into())),
        };

        let done = chunks.write(value, buf, direct)?;

        if done {
            self.inflight = None;
        }

        Ok(done)
    }
}

/// Standalone resumable reader for one bare array value.
///
/// `NeedPrepare → ReadNothing → ReadHeader → ReadingElements → NeedPrepare`.
/// A safe element error does not stop consumption: the element becomes SQL
/// NULL, the remaining elements are still decoded, and the first such error
/// is raised once the whole value has been consumed — leaving the stream on
/// a message boundary and the connection healthy.
pub struct ArrayDecoder {
    element: Arc<dyn TypeHandler>,
    state: DecodeState,
}

enum DecodeState {
    NeedPrepare,
    ReadNothing,
    ReadHeader {
        ndim: usize,
    },
    ReadingElements {
        dims: Vec<i32>,
        // lexicographic index walk, used for rank two and above; the 1-D
        // fast path counts flat
        indices: Vec<i32>,
        elements: Vec<PgValue>,
        total: usize,
        element_reader: ValueReader,
        deferred: Option<Error>,
    },
}

impl ArrayDecoder {
    pub fn new(element: Arc<dyn TypeHandler>) -> Self {
        Self { element, state: DecodeState::NeedPrepare }
    }

    fn prepared(element: Arc<dyn TypeHandler>) -> Self {
        Self { element, state: DecodeState::ReadNothing }
    }

    pub fn prepare(&mut self) -> Result<()> {
        if !matches!(self.state, DecodeState::NeedPrepare) {
            return Err(Error::ConcurrentOperation);
        }

        self.state = DecodeState::ReadNothing;

        Ok(())
    }
}

impl WireRead for ArrayDecoder {
    type Output = PgArray;

    fn read(&mut self, buf: &mut ByteBuffer) -> Result<Option<PgArray>> {
        loop {
            match &mut self.state {
                DecodeState::NeedPrepare => {
                    return Err(Error::Protocol("array decoder has no read prepared".into()));
                }

                DecodeState::ReadNothing => {
                    if buf.read_bytes_left() < 12 {
                        return Ok(None);
                    }

                    let ndim = buf.get_i32();
                    let _has_nulls = buf.get_i32();
                    let oid = buf.get_u32();

                    if oid != self.element.oid() {
                        self.state = DecodeState::NeedPrepare;
                        return Err(Error::OidMismatch { expected: self.element.oid(), actual: oid });
                    }

                    if ndim < 0 {
                        self.state = DecodeState::NeedPrepare;
                        return Err(Error::Protocol(
                            format!("negative array dimension count {}", ndim).into(),
                        ));
                    }

                    self.state = DecodeState::ReadHeader { ndim: ndim as usize };
                }

                DecodeState::ReadHeader { ndim } => {
                    let ndim = *ndim;

                    if buf.read_bytes_left() < ndim * 8 {
                        return Ok(None);
                    }

                    if ndim == 0 {
                        // empty array; there is no element buffer to allocate
                        self.state = DecodeState::NeedPrepare;

                        return Ok(Some(PgArray {
                            element_oid: self.element.oid(),
                            dims: Vec::new(),
                            elements: Vec::new(),
                        }));
                    }

                    let mut dims = Vec::with_capacity(ndim);
                    let mut total: i64 = 1;

                    for _ in 0..ndim {
                        let len = buf.get_i32();
                        let _lower_bound = buf.get_i32();

                        if len < 0 {
                            self.state = DecodeState::NeedPrepare;
                            return Err(Error::Protocol(
                                format!("negative array dimension length {}", len).into(),
                            ));
                        }

                        total *= len as i64;
                        dims.push(len);
                    }

                    if total > i32::MAX as i64 {
                        self.state = DecodeState::NeedPrepare;
                        return Err(Error::Protocol(
                            format!("array of {} elements exceeds the protocol limit", total)
                                .into(),
                        ));
                    }

                    let total = total as usize;
                    let indices = if ndim > 1 { vec![0; ndim] } else { Vec::new() };

                    self.state = DecodeState::ReadingElements {
                        dims,
                        indices,
                        elements: Vec::with_capacity(total),
                        total,
                        element_reader: ValueReader::new(),
                        deferred: None,
                    };
                }

                DecodeState::ReadingElements {
                    dims,
                    indices,
                    elements,
                    total,
                    element_reader,
                    deferred,
                } => {
                    while elements.len() < *total {
                        let element = match element_reader.read(&*self.element, buf) {
                            Ok(None) => return Ok(None),
                            Ok(Some(element)) => element,

                            Err(err) if err.is_safe() => {
                                // the element's bytes are consumed; hold the
                                // first error until the array is done
                                deferred.get_or_insert(err);
                                PgValue::Null
                            }

                            Err(err) => {
                                self.state = DecodeState::NeedPrepare;
                                return Err(err);
                            }
                        };

                        elements.push(element);

                        if !indices.is_empty() {
                            let carried = advance_indices(indices, dims);
                            debug_assert_eq!(carried, elements.len() == *total);
                        }
                    }

                    let state = mem::replace(&mut self.state, DecodeState::NeedPrepare);

                    if let DecodeState::ReadingElements { dims, elements, deferred, .. } = state {
                        if let Some(err) = deferred {
                            return Err(err);
                        }

                        return Ok(Some(PgArray {
                            element_oid: self.element.oid(),
                            dims,
                            elements,
                        }));
                    }

                    unreachable!()
                }
            }
        }
    }
}

/// Increment the innermost dimension of the index vector, carrying outward
/// and resetting inner dimensions to their lower bound. Returns true when
/// the carry passes dimension 0, i.e. the walk is complete.
fn advance_indices(indices: &mut [i32], dims: &[i32]) -> bool {
    for d in (0..indices.len()).rev() {
        indices[d] += 1;

        if indices[d] < dims[d] {
            return false;
        }

        indices[d] = 0;
    }

    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ArrayDecoder, ArrayEncoder, ArrayHandler};
    use crate::error::Error;
    use crate::io::{drive_read, drive_write, ByteBuffer, MemTransport};
    use crate::types::{ChunkingWrite, Int4Handler, PgArray, PgValue, TypeHandler, TypeId};

    fn int4_array_handler() -> ArrayHandler {
        ArrayHandler::new(TypeId::ARRAY_INT4.0, "_int4", Arc::new(Int4Handler))
    }

    fn encode(value: &PgArray, capacity: usize) -> Vec<u8> {
        let mut encoder = ArrayEncoder::new(Arc::new(Int4Handler));
        encoder.prepare(value.clone()).unwrap();

        let mut buf = ByteBuffer::new(capacity);
        let mut transport = MemTransport::new();
        drive_write(&mut encoder, &mut buf, &mut transport).unwrap();

        transport.sent().to_vec()
    }

    fn decode(bytes: Vec<u8>, capacity: usize) -> crate::error::Result<PgArray> {
        let mut decoder = ArrayDecoder::new(Arc::new(Int4Handler));
        decoder.prepare().unwrap();

        let mut buf = ByteBuffer::new(capacity);
        let mut transport = MemTransport::with_input(bytes);
        drive_read(&mut decoder, &mut buf, &mut transport)
    }

    const ONE_D_INT4: &[u8] = b"\0\0\0\x01\0\0\0\0\0\0\0\x17\0\0\0\x03\0\0\0\x01\
        \0\0\0\x04\0\0\0\x0a\0\0\0\x04\0\0\0\x14\0\0\0\x04\0\0\0\x1e";

    #[test]
    fn it_writes_one_dimensional_int4() {
        let value = PgArray::from_vec(
            TypeId::INT4,
            vec![PgValue::Int4(10), PgValue::Int4(20), PgValue::Int4(30)],
        );

        assert_eq!(encode(&value, 256), ONE_D_INT4);
        assert_eq!(ONE_D_INT4.len(), 44);

        // emitted bytes equal the precomputed length
        let handler = int4_array_handler();
        assert_eq!(handler.size(&PgValue::Array(value)).unwrap(), 44);
    }

    #[test]
    fn it_writes_two_by_three_in_row_major_order() {
        let value = PgArray::with_dims(
            TypeId::INT4,
            vec![2, 3],
            (1..=6).map(PgValue::Int4).collect(),
        )
        .unwrap();

        let bytes = encode(&value, 256);

        // ndim=2, has_nulls=0, oid=23, dims (2,1) and (3,1)
        assert_eq!(
            &bytes[..28],
            b"\0\0\0\x02\0\0\0\0\0\0\0\x17\0\0\0\x02\0\0\0\x01\0\0\0\x03\0\0\0\x01"
        );

        for i in 0..6u8 {
            let at = 28 + 8 * i as usize;
            assert_eq!(&bytes[at..at + 8], &[0, 0, 0, 4, 0, 0, 0, i + 1]);
        }
    }

    #[test]
    fn it_round_trips_shape_and_null_positions() {
        let value = PgArray::with_dims(
            TypeId::INT4,
            vec![2, 2],
            vec![PgValue::Int4(1), PgValue::Null, PgValue::Int4(3), PgValue::Int4(4)],
        )
        .unwrap();

        let decoded = decode(encode(&value, 256), 256).unwrap();

        assert_eq!(decoded, value);
    }

    #[test]
    fn it_emits_identical_bytes_under_a_tiny_buffer() {
        let value = PgArray::with_dims(
            TypeId::INT4,
            vec![2, 3],
            (1..=6).map(PgValue::Int4).collect(),
        )
        .unwrap();

        assert_eq!(encode(&value, 32), encode(&value, 4096));
    }

    #[test]
    fn it_reads_zero_dimensions_as_empty() {
        // ndim=0, has_nulls=0, oid=23
        let decoded = decode(b"\0\0\0\0\0\0\0\0\0\0\0\x17".to_vec(), 64).unwrap();

        assert_eq!(decoded.rank(), 0);
        assert!(decoded.is_empty());
    }

    #[test]
    fn it_rejects_an_oid_mismatch() {
        // header declares text (oid 25) under an int4 decoder
        let err = decode(b"\0\0\0\0\0\0\0\0\0\0\0\x19".to_vec(), 64).unwrap_err();

        assert!(matches!(err, Error::OidMismatch { expected: 23, actual: 25 }));
        assert!(err.breaks_connection());
    }

    #[test]
    fn it_defers_safe_element_errors_until_the_end() {
        // {10,20,30} but the middle element declares 3 bytes: invalid for
        // int4, yet fully consumable
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"\0\0\0\x01\0\0\0\0\0\0\0\x17\0\0\0\x03\0\0\0\x01");
        bytes.extend_from_slice(b"\0\0\0\x04\0\0\0\x0a");
        bytes.extend_from_slice(b"\0\0\0\x03\xff\xff\xff");
        bytes.extend_from_slice(b"\0\0\0\x04\0\0\0\x1e");

        let err = decode(bytes, 64).unwrap_err();

        assert!(err.is_safe());
        assert!(!err.breaks_connection());
    }

    #[test]
    fn it_guards_against_reentrant_prepare() {
        let mut decoder = ArrayDecoder::new(Arc::new(Int4Handler));

        decoder.prepare().unwrap();

        assert!(matches!(decoder.prepare().unwrap_err(), Error::ConcurrentOperation));
    }

    #[test]
    fn it_resumes_reads_across_refills() {
        let value = PgArray::with_dims(
            TypeId::INT4,
            vec![2, 3],
            (1..=6).map(PgValue::Int4).collect(),
        )
        .unwrap();

        // capacity below the element stride forces multiple refills
        let decoded = decode(encode(&value, 4096), 32).unwrap();

        assert_eq!(decoded, value);
    }

    #[test]
    fn it_forwards_binary_support_to_the_element() {
        let handler = int4_array_handler();
        assert!(handler.supports_binary_read());

        let text_only =
            ArrayHandler::new(0, "_unknown", Arc::new(crate::types::UnknownTypeHandler));
        assert!(!text_only.supports_binary_write());
    }
}

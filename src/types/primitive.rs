//! Fixed-size scalar handlers. Each is a simple reader/writer: the whole
//! value always fits in the buffer, so no suspension state is needed.

use crate::error::{Error, Result};
use crate::io::ByteBuffer;
use crate::types::{PgValue, Reader, SimpleRead, SimpleWrite, TypeHandler, TypeId, Writer};

fn bad_len(name: &'static str, expected: usize, actual: usize) -> Error {
    // the declared bytes were consumed by the caller's contract, so the
    // session can keep going
    Error::safe(format!("invalid length {} for `{}`, expected {}", actual, name, expected))
}

pub struct BoolHandler;

impl TypeHandler for BoolHandler {
    fn oid(&self) -> u32 {
        TypeId::BOOL.0
    }

    fn name(&self) -> &'static str {
        "bool"
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Simple(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Simple(self))
    }
}

impl SimpleWrite for BoolHandler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        match value {
            PgValue::Bool(_) => Ok(1),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }

    fn write(&self, value: &PgValue, buf: &mut ByteBuffer) -> Result<()> {
        match value {
            PgValue::Bool(v) => {
                buf.put_u8(*v as u8);
                Ok(())
            }
            other => Err(Error::mismatch(self.name(), other)),
        }
    }
}

impl SimpleRead for BoolHandler {
    fn read(&self, len: usize, buf: &mut ByteBuffer) -> Result<PgValue> {
        if len != 1 {
            buf.skip(len);
            return Err(bad_len(self.name(), 1, len));
        }

        match buf.get_u8() {
            0 => Ok(PgValue::Bool(false)),
            1 => Ok(PgValue::Bool(true)),

            // the byte is consumed either way
            other => Err(Error::safe(format!("invalid bool byte {}", other))),
        }
    }
}

pub struct Int2Handler;

impl TypeHandler for Int2Handler {
    fn oid(&self) -> u32 {
        TypeId::INT2.0
    }

    fn name(&self) -> &'static str {
        "int2"
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Simple(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Simple(self))
    }
}

impl SimpleWrite for Int2Handler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        match value {
            PgValue::Int2(_) => Ok(2),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }

    fn write(&self, value: &PgValue, buf: &mut ByteBuffer) -> Result<()> {
        match value {
            PgValue::Int2(v) => {
                buf.put_i16(*v);
                Ok(())
            }
            other => Err(Error::mismatch(self.name(), other)),
        }
    }
}

impl SimpleRead for Int2Handler {
    fn read(&self, len: usize, buf: &mut ByteBuffer) -> Result<PgValue> {
        if len != 2 {
            buf.skip(len);
            return Err(bad_len(self.name(), 2, len));
        }

        Ok(PgValue::Int2(buf.get_i16()))
    }
}

pub struct Int4Handler;

impl TypeHandler for Int4Handler {
    fn oid(&self) -> u32 {
        TypeId::INT4.0
    }

    fn name(&self) -> &'static str {
        "int4"
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Simple(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Simple(self))
    }
}

impl SimpleWrite for Int4Handler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        match value {
            PgValue::Int4(_) => Ok(4),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }

    fn write(&self, value: &PgValue, buf: &mut ByteBuffer) -> Result<()> {
        match value {
            PgValue::Int4(v) => {
                buf.put_i32(*v);
                Ok(())
            }
            other => Err(Error::mismatch(self.name(), other)),
        }
    }
}

impl SimpleRead for Int4Handler {
    fn read(&self, len: usize, buf: &mut ByteBuffer) -> Result<PgValue> {
        if len != 4 {
            buf.skip(len);
            return Err(bad_len(self.name(), 4, len));
        }

        Ok(PgValue::Int4(buf.get_i32()))
    }
}

pub struct Int8Handler;

impl TypeHandler for Int8Handler {
    fn oid(&self) -> u32 {
        TypeId::INT8.0
    }

    fn name(&self) -> &'static str {
        "int8"
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Simple(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Simple(self))
    }
}

impl SimpleWrite for Int8Handler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        match value {
            PgValue::Int8(_) => Ok(8),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }

    fn write(&self, value: &PgValue, buf: &mut ByteBuffer) -> Result<()> {
        match value {
            PgValue::Int8(v) => {
                buf.put_i64(*v);
                Ok(())
            }
            other => Err(Error::mismatch(self.name(), other)),
        }
    }
}

impl SimpleRead for Int8Handler {
    fn read(&self, len: usize, buf: &mut ByteBuffer) -> Result<PgValue> {
        if len != 8 {
            buf.skip(len);
            return Err(bad_len(self.name(), 8, len));
        }

        Ok(PgValue::Int8(buf.get_i64()))
    }
}

pub struct Float4Handler;

impl TypeHandler for Float4Handler {
    fn oid(&self) -> u32 {
        TypeId::FLOAT4.0
    }

    fn name(&self) -> &'static str {
        "float4"
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Simple(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Simple(self))
    }
}

impl SimpleWrite for Float4Handler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        match value {
            PgValue::Float4(_) => Ok(4),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }

    fn write(&self, value: &PgValue, buf: &mut ByteBuffer) -> Result<()> {
        match value {
            PgValue::Float4(v) => {
                buf.put_f32(*v);
                Ok(())
            }
            other => Err(Error::mismatch(self.name(), other)),
        }
    }
}

impl SimpleRead for Float4Handler {
    fn read(&self, len: usize, buf: &mut ByteBuffer) -> Result<PgValue> {
        if len != 4 {
            buf.skip(len);
            return Err(bad_len(self.name(), 4, len));
        }

        Ok(PgValue::Float4(buf.get_f32()))
    }
}

pub struct Float8Handler;

impl TypeHandler for Float8Handler {
    fn oid(&self) -> u32 {
        TypeId::FLOAT8.0
    }

    fn name(&self) -> &'static str {
        "float8"
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Simple(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Simple(self))
    }
}

impl SimpleWrite for Float8Handler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        match value {
            PgValue::Float8(_) => Ok(8),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }

    fn write(&self, value: &PgValue, buf: &mut ByteBuffer) -> Result<()> {
        match value {
            PgValue::Float8(v) => {
                buf.put_f64(*v);
                Ok(())
            }
            other => Err(Error::mismatch(self.name(), other)),
        }
    }
}

impl SimpleRead for Float8Handler {
    fn read(&self, len: usize, buf: &mut ByteBuffer) -> Result<PgValue> {
        if len != 8 {
            buf.skip(len);
            return Err(bad_len(self.name(), 8, len));
        }

        Ok(PgValue::Float8(buf.get_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::{BoolHandler, Int4Handler};
    use crate::io::ByteBuffer;
    use crate::types::{PgValue, SimpleRead, SimpleWrite};

    fn readable(bytes: &[u8]) -> ByteBuffer {
        let mut transport = crate::io::MemTransport::with_input(bytes.to_vec());
        let mut buf = ByteBuffer::new(64);
        buf.refill_from(&mut transport).unwrap();
        buf
    }

    #[test]
    fn it_writes_int4() {
        let mut buf = ByteBuffer::new(8);

        Int4Handler.write(&PgValue::Int4(0x0102_0304), &mut buf).unwrap();

        assert_eq!(buf.written(), b"\x01\x02\x03\x04");
    }

    #[test]
    fn it_reads_int4() {
        let mut buf = readable(b"\xff\xff\xff\xfe");

        assert_eq!(Int4Handler.read(4, &mut buf).unwrap(), PgValue::Int4(-2));
    }

    #[test]
    fn it_rejects_wrong_size_for_value() {
        assert!(Int4Handler.size(&PgValue::Int8(1)).is_err());
    }

    #[test]
    fn it_round_trips_every_fixed_size_scalar() {
        use super::{Float4Handler, Float8Handler, Int2Handler, Int8Handler};
        use crate::types::TypeHandler;

        let cases: Vec<(&dyn TypeHandler, PgValue)> = vec![
            (&BoolHandler, PgValue::Bool(true)),
            (&Int2Handler, PgValue::Int2(-300)),
            (&Int4Handler, PgValue::Int4(1 << 30)),
            (&Int8Handler, PgValue::Int8(i64::MIN)),
            (&Float4Handler, PgValue::Float4(1.5)),
            (&Float8Handler, PgValue::Float8(-2.25)),
        ];

        for (handler, value) in cases {
            let writer = match handler.writer().unwrap() {
                crate::types::Writer::Simple(w) => w,
                _ => unreachable!(),
            };
            let reader = match handler.reader().unwrap() {
                crate::types::Reader::Simple(r) => r,
                _ => unreachable!(),
            };

            let size = writer.size(&value).unwrap() as usize;

            let mut buf = ByteBuffer::new(16);
            writer.write(&value, &mut buf).unwrap();
            assert_eq!(buf.written().len(), size, "{}", handler.name());

            let mut rd = readable(buf.written());
            assert_eq!(reader.read(size, &mut rd).unwrap(), value, "{}", handler.name());
        }
    }

    #[test]
    fn it_reads_invalid_bool_as_safe_error() {
        let mut buf = readable(b"\x07");

        let err = BoolHandler.read(1, &mut buf).unwrap_err();

        assert!(err.is_safe());
        assert!(!err.breaks_connection());
        assert_eq!(buf.read_bytes_left(), 0);
    }
}

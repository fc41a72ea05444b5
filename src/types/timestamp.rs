use crate::error::{Error, Result};
use crate::io::ByteBuffer;
use crate::types::{PgValue, Reader, SimpleRead, SimpleWrite, TypeHandler, TypeId, Writer};

/// `timestamp` as an 8-byte count of microseconds since 2000-01-01.
///
/// This is the representation a backend with `integer_datetimes = on` uses;
/// the registry refuses to install this handler otherwise. Converting the
/// microsecond count to a calendar type is the application's concern.
pub struct TimestampHandler;

impl TypeHandler for TimestampHandler {
    fn oid(&self) -> u32 {
        TypeId::TIMESTAMP.0
    }

    fn name(&self) -> &'static str {
        "timestamp"
    }

    fn writer(&self) -> Option<Writer<'_>> {
        Some(Writer::Simple(self))
    }

    fn reader(&self) -> Option<Reader<'_>> {
        Some(Reader::Simple(self))
    }
}

impl SimpleWrite for TimestampHandler {
    fn size(&self, value: &PgValue) -> Result<i32> {
        match value {
            PgValue::Timestamp(_) => Ok(8),
            other => Err(Error::mismatch(self.name(), other)),
        }
    }

    fn write(&self, value: &PgValue, buf: &mut ByteBuffer) -> Result<()> {
        match value {
            PgValue::Timestamp(micros) => {
                buf.put_i64(*micros);
                Ok(())
            }
            other => Err(Error::mismatch(self.name(), other)),
        }
    }
}

impl SimpleRead for TimestampHandler {
    fn read(&self, len: usize, buf: &mut ByteBuffer) -> Result<PgValue> {
        if len != 8 {
            buf.skip(len);
            return Err(Error::safe(format!("invalid length {} for `timestamp`", len)));
        }

        Ok(PgValue::Timestamp(buf.get_i64()))
    }
}

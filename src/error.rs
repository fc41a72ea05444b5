use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::io;

/// A specialized `Result` type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the codec.
///
/// Errors come in two severities. A *healthy* error unwinds the current
/// statement and leaves the connection usable; a *broken* error means the
/// position in the byte stream can no longer be trusted and the connection
/// must be discarded. See [`Error::breaks_connection`].
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The buffer's total capacity is smaller than a unit the codec must
    /// emit atomically. This is a configuration bug, not a transient
    /// condition; flushing will not help.
    BufferTooSmall { required: usize, capacity: usize },

    /// No handler matches the value being bound.
    InvalidCast(Cow<'static, str>),

    /// A handler was found but it cannot service the value or capability
    /// requested of it.
    TypeMismatch { handler: &'static str, value: &'static str },

    /// An array header declared an element OID that disagrees with the
    /// handler expected to decode the elements.
    OidMismatch { expected: u32, actual: u32 },

    /// Binary format was requested of a handler that only understands the
    /// text representation.
    UnsupportedBinaryFormat(&'static str),

    /// The backend reported a setting this codec refuses to speak, such as
    /// floating-point timestamps.
    UnsupportedBackendOption { option: &'static str, value: String },

    NotImplemented(&'static str),

    /// The value's bytes were fully consumed but were semantically invalid.
    /// The stream is still positioned on a value boundary, so the session
    /// may continue; only the current statement fails.
    SafeRead(Box<dyn StdError + Send + Sync>),

    /// Any read or write failure with unknown byte consumption.
    Protocol(Cow<'static, str>),

    /// A codec was re-prepared while still in a non-terminal state.
    ConcurrentOperation,

    Io(io::Error),
}

impl Error {
    pub(crate) fn mismatch(handler: &'static str, value: &crate::types::PgValue) -> Self {
        Error::TypeMismatch { handler, value: value.kind_name() }
    }

    pub(crate) fn safe(inner: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error::SafeRead(inner.into())
    }

    /// Whether the value's bytes were fully consumed despite the failure.
    pub fn is_safe(&self) -> bool {
        matches!(self, Error::SafeRead(_))
    }

    /// Whether the connection must be discarded after this error.
    ///
    /// Everything else unwinds the current statement only.
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            Error::BufferTooSmall { .. }
                | Error::OidMismatch { .. }
                | Error::UnsupportedBackendOption { .. }
                | Error::Protocol(_)
                | Error::Io(_)
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { required, capacity } => {
                write!(f, "buffer of {} bytes cannot hold a {} byte unit", capacity, required)
            }

            Self::InvalidCast(message) => write!(f, "invalid cast: {}", message),

            Self::TypeMismatch { handler, value } => {
                write!(f, "handler `{}` cannot service a `{}` value", handler, value)
            }

            Self::OidMismatch { expected, actual } => {
                write!(f, "array element oid {} does not match expected oid {}", actual, expected)
            }

            Self::UnsupportedBinaryFormat(name) => {
                write!(f, "type `{}` does not support the binary format", name)
            }

            Self::UnsupportedBackendOption { option, value } => {
                write!(f, "unsupported backend option: {} = {:?}", option, value)
            }

            Self::NotImplemented(what) => write!(f, "not implemented: {}", what),

            Self::SafeRead(source) => write!(f, "{}", source),

            Self::Protocol(message) => write!(f, "protocol: {}", message),

            Self::ConcurrentOperation => {
                write!(f, "codec re-entered while an operation is in flight")
            }

            Self::Io(source) => write!(f, "io: {}", source),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::SafeRead(source) => Some(&**source),
            Self::Io(source) => Some(source),

            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

//! Binary wire-format codec and extended-query binding core for a
//! PostgreSQL client.
//!
//! The crate frames the frontend `Bind` message and encodes/decodes the
//! backend's binary array representation, both through a fixed-capacity
//! [`io::ByteBuffer`]. Every codec is an explicit state machine that
//! suspends when the buffer fills or drains and resumes after the
//! surrounding driver loop flushes or refills — output is byte-identical
//! whatever the buffer capacity, as long as the largest atomic header fits.
//!
//! Per-value encoding is dispatched through [`types::TypeHandler`]s looked
//! up by OID, PostgreSQL type name, or host type in a
//! [`types::TypeHandlerRegistry`]. Handlers are *simple* (the value always
//! fits) or *chunking* (streamed, with per-value state held in the codec);
//! chunking writers may hand large payloads to the transport directly,
//! bypassing the buffer.
//!
//! Transport, connection lifecycle, authentication, and result-set
//! materialization live outside this crate, behind [`io::Transport`].

pub mod error;
pub mod io;
pub mod options;
pub mod protocol;
pub mod types;

pub use error::{Error, Result};
pub use options::{BackendParams, CodecOptions, UnknownTypePolicy};
pub use protocol::{BindWriter, Parameter, ResultFormats, TypeFormat};
pub use types::{PgArray, PgValue, TypeHandlerRegistry, TypeId};

mod buf;
mod transport;

pub use buf::ByteBuffer;
pub use transport::{drive_read, drive_write, MemTransport, Transport, WireRead, WireWrite};

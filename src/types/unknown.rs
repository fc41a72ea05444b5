use crate::types::{TypeHandler, TypeId};

/// Fallback handler for OIDs the registry has never heard of.
///
/// It speaks the text format only and exposes no binary capability; a
/// binary read dispatched at it reports `UnsupportedBinaryFormat`. It is
/// installed before any other handler so the catalog bootstrap query —
/// which runs before the OID map exists — has something to decode its own
/// result rows with.
pub struct UnknownTypeHandler;

impl TypeHandler for UnknownTypeHandler {
    fn oid(&self) -> u32 {
        TypeId::UNKNOWN.0
    }

    fn name(&self) -> &'static str {
        "unknown"
    }

    fn supports_binary_read(&self) -> bool {
        false
    }

    fn supports_binary_write(&self) -> bool {
        false
    }

    fn prefer_text_write(&self) -> bool {
        true
    }
}

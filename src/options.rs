use std::collections::HashMap;

/// What `lookup_by_oid` does when the registry has no handler for an OID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownTypePolicy {
    /// Fall back to the unrecognized handler, which services the value in
    /// text format only.
    ReturnAsText,

    /// Report an `InvalidCast` to the caller.
    Fail,
}

/// Tunables for the codec core.
#[derive(Debug, Clone)]
pub struct CodecOptions {
    /// Capacity of the I/O buffer. Must be at least as large as the largest
    /// message header the client will emit; the bind writer reports
    /// `BufferTooSmall` if it is not.
    pub buffer_capacity: usize,

    pub unknown_type_policy: UnknownTypePolicy,

    /// Reject non-ASCII portal and statement names. Embedded NUL is always
    /// rejected regardless of this flag.
    pub strict_ascii_identifiers: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 8 * 1024,
            unknown_type_policy: UnknownTypePolicy::ReturnAsText,
            strict_ascii_identifiers: true,
        }
    }
}

/// Run-time parameters reported by the backend during startup.
///
/// The codec consults these when the handler set is assembled; after that
/// the registry is read-only for the life of the connection.
#[derive(Debug, Clone, Default)]
pub struct BackendParams {
    params: HashMap<String, String>,
}

impl BackendParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| &**s)
    }

    /// Whether the backend transmits timestamps as 8-byte integer
    /// microseconds. The legacy floating-point representation is not
    /// supported.
    pub fn integer_datetimes(&self) -> bool {
        self.get("integer_datetimes") == Some("on")
    }
}

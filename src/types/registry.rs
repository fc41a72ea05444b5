use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::options::{BackendParams, CodecOptions, UnknownTypePolicy};
use crate::types::{
    ArrayHandler, BoolHandler, ByteaHandler, Float4Handler, Float8Handler, HostKind, Int2Handler,
    Int4Handler, Int8Handler, TextHandler, TimestampHandler, TypeHandler, TypeId,
    UnknownTypeHandler,
};

/// Maps PostgreSQL OIDs, PostgreSQL type names, and host types to their
/// handlers.
///
/// Assembled once per connection from the backend's startup parameters,
/// then read-only; handlers are shared across every statement on the
/// connection.
pub struct TypeHandlerRegistry {
    by_oid: HashMap<u32, Arc<dyn TypeHandler>>,
    by_name: HashMap<&'static str, Arc<dyn TypeHandler>>,
    by_host: HashMap<HostKind, Arc<dyn TypeHandler>>,
    unknown: Arc<dyn TypeHandler>,
    policy: UnknownTypePolicy,
}

impl std::fmt::Debug for TypeHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeHandlerRegistry")
            .field("by_oid", &self.by_oid.keys().collect::<Vec<_>>())
            .field("by_name", &self.by_name.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

impl TypeHandlerRegistry {
    /// Build the handler set for a connection.
    ///
    /// The unrecognized text-only handler is installed before anything
    /// else: the catalog bootstrap query runs before any real handler for
    /// its result rows exists and decodes through it.
    pub fn connect(params: &BackendParams, options: &CodecOptions) -> Result<Self> {
        let unknown: Arc<dyn TypeHandler> = Arc::new(UnknownTypeHandler);

        let mut registry = Self {
            by_oid: HashMap::new(),
            by_name: HashMap::new(),
            by_host: HashMap::new(),
            unknown: unknown.clone(),
            policy: options.unknown_type_policy,
        };

        registry.by_oid.insert(unknown.oid(), unknown.clone());
        registry.by_name.insert(unknown.name(), unknown);

        registry.register_scalar(Arc::new(BoolHandler), HostKind::Bool, TypeId::ARRAY_BOOL, "_bool");
        registry.register_scalar(Arc::new(ByteaHandler), HostKind::Bytea, TypeId::ARRAY_BYTEA, "_bytea");
        registry.register_scalar(Arc::new(Int2Handler), HostKind::Int2, TypeId::ARRAY_INT2, "_int2");
        registry.register_scalar(Arc::new(Int4Handler), HostKind::Int4, TypeId::ARRAY_INT4, "_int4");
        registry.register_scalar(Arc::new(Int8Handler), HostKind::Int8, TypeId::ARRAY_INT8, "_int8");
        registry.register_scalar(Arc::new(Float4Handler), HostKind::Float4, TypeId::ARRAY_FLOAT4, "_float4");
        registry.register_scalar(Arc::new(Float8Handler), HostKind::Float8, TypeId::ARRAY_FLOAT8, "_float8");
        registry.register_scalar(Arc::new(TextHandler), HostKind::Text, TypeId::ARRAY_TEXT, "_text");

        if !params.integer_datetimes() {
            // the floating-point representation predates 8.4 and is not spoken here
            return Err(Error::UnsupportedBackendOption {
                option: "integer_datetimes",
                value: params.get("integer_datetimes").unwrap_or("off").to_owned(),
            });
        }

        registry.register_scalar(
            Arc::new(TimestampHandler),
            HostKind::Timestamp,
            TypeId::ARRAY_TIMESTAMP,
            "_timestamp",
        );

        Ok(registry)
    }

    /// Install a scalar handler together with its array companion.
    pub fn register_scalar(
        &mut self,
        handler: Arc<dyn TypeHandler>,
        host: HostKind,
        array_oid: TypeId,
        array_name: &'static str,
    ) {
        let element_oid = handler.oid();

        self.by_oid.insert(element_oid, handler.clone());
        self.by_name.insert(handler.name(), handler.clone());
        self.by_host.insert(host, handler.clone());

        let array: Arc<dyn TypeHandler> = Arc::new(ArrayHandler::new(array_oid.0, array_name, handler));

        self.by_oid.insert(array_oid.0, array.clone());
        self.by_name.insert(array_name, array.clone());
        self.by_host.insert(HostKind::Array(element_oid), array);
    }

    pub fn lookup_by_oid(&self, oid: u32) -> Result<Arc<dyn TypeHandler>> {
        if let Some(handler) = self.by_oid.get(&oid) {
            return Ok(handler.clone());
        }

        match self.policy {
            UnknownTypePolicy::ReturnAsText => {
                log::debug!("no handler for oid {}; falling back to text", oid);

                Ok(self.unknown.clone())
            }

            UnknownTypePolicy::Fail => {
                Err(Error::InvalidCast(format!("no handler for type oid {}", oid).into()))
            }
        }
    }

    pub fn lookup_by_pg_name(&self, name: &str) -> Option<Arc<dyn TypeHandler>> {
        self.by_name.get(name).cloned()
    }

    /// Resolve the handler for a parameter: an explicit type hint wins over
    /// the value's own host type.
    pub fn lookup_for_parameter(
        &self,
        host: Option<HostKind>,
        db_type_hint: Option<TypeId>,
    ) -> Result<Arc<dyn TypeHandler>> {
        if let Some(hint) = db_type_hint {
            if let Some(handler) = self.by_oid.get(&hint.0) {
                return Ok(handler.clone());
            }
        }

        if let Some(kind) = host {
            if let Some(handler) = self.by_host.get(&kind) {
                return Ok(handler.clone());
            }
        }

        Err(Error::InvalidCast(
            match host {
                Some(kind) => format!("no handler for host type {:?}", kind),
                None => "a null parameter needs an explicit type hint".to_owned(),
            }
            .into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::options::{BackendParams, CodecOptions, UnknownTypePolicy};
    use crate::types::{HostKind, TypeHandlerRegistry, TypeId};

    fn params() -> BackendParams {
        let mut params = BackendParams::new();
        params.insert("integer_datetimes", "on");
        params
    }

    #[test]
    fn it_resolves_scalars_and_their_arrays() {
        let registry = TypeHandlerRegistry::connect(&params(), &CodecOptions::default()).unwrap();

        assert_eq!(registry.lookup_by_oid(TypeId::INT4.0).unwrap().name(), "int4");
        assert_eq!(registry.lookup_by_pg_name("_int4").unwrap().oid(), TypeId::ARRAY_INT4.0);

        let array = registry
            .lookup_for_parameter(Some(HostKind::Array(TypeId::INT4.0)), None)
            .unwrap();
        assert_eq!(array.oid(), TypeId::ARRAY_INT4.0);
    }

    #[test]
    fn it_prefers_the_type_hint_over_the_host_type() {
        let registry = TypeHandlerRegistry::connect(&params(), &CodecOptions::default()).unwrap();

        let handler = registry
            .lookup_for_parameter(Some(HostKind::Int4), Some(TypeId::INT8))
            .unwrap();

        assert_eq!(handler.name(), "int8");
    }

    #[test]
    fn it_falls_back_to_text_for_unknown_oids() {
        let registry = TypeHandlerRegistry::connect(&params(), &CodecOptions::default()).unwrap();

        let handler = registry.lookup_by_oid(999_999).unwrap();

        assert_eq!(handler.name(), "unknown");
        assert!(!handler.supports_binary_read());
    }

    #[test]
    fn it_fails_unknown_oids_under_the_fail_policy() {
        let options =
            CodecOptions { unknown_type_policy: UnknownTypePolicy::Fail, ..CodecOptions::default() };
        let registry = TypeHandlerRegistry::connect(&params(), &options).unwrap();

        assert!(matches!(registry.lookup_by_oid(999_999), Err(Error::InvalidCast(_))));
    }

    #[test]
    fn it_refuses_float_timestamps() {
        let err =
            TypeHandlerRegistry::connect(&BackendParams::new(), &CodecOptions::default())
                .unwrap_err();

        assert!(matches!(err, Error::UnsupportedBackendOption { option: "integer_datetimes", .. }));
        assert!(err.breaks_connection());
    }
}

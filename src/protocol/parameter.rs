use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::TypeFormat;
use crate::types::{PgValue, TypeHandler, TypeHandlerRegistry, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDirection {
    Input,
    Output,
}

/// A value bound to its handler for the duration of one `Bind`.
///
/// Binding resolves the handler, fixes the format code, and precomputes
/// `bound_size` — the exact binary length the bind writer will frame the
/// value with. The parameter is immutable afterwards; emitting it writes
/// exactly `bound_size` bytes.
pub struct Parameter {
    value: PgValue,
    handler: Arc<dyn TypeHandler>,
    format: TypeFormat,
    direction: ParameterDirection,
    bound_size: i32,
}

impl Parameter {
    pub fn bind(value: PgValue, registry: &TypeHandlerRegistry) -> Result<Self> {
        Self::bind_as(value, registry, None, None)
    }

    /// Bind with explicit type hints. A declared PostgreSQL type name wins
    /// over an OID hint, which wins over the value's own host type. A null
    /// value carries no host type and needs one of the hints.
    pub fn bind_as(
        value: PgValue,
        registry: &TypeHandlerRegistry,
        pg_type: Option<&str>,
        db_type: Option<TypeId>,
    ) -> Result<Self> {
        let handler = match pg_type.and_then(|name| registry.lookup_by_pg_name(name)) {
            Some(handler) => handler,
            None => registry.lookup_for_parameter(value.host_kind(), db_type)?,
        };

        let format = if handler.supports_binary_write() && !handler.prefer_text_write() {
            TypeFormat::Binary
        } else {
            TypeFormat::Text
        };

        let bound_size = if value.is_null() {
            -1
        } else {
            match handler.writer() {
                Some(writer) => writer.size(&value)?,

                // a write-incapable handler can only carry nulls
                None => return Err(Error::NotImplemented("text-format parameter encoding")),
            }
        };

        Ok(Self { value, handler, format, direction: ParameterDirection::Input, bound_size })
    }

    pub fn value(&self) -> &PgValue {
        &self.value
    }

    pub fn handler(&self) -> &dyn TypeHandler {
        &*self.handler
    }

    pub fn format(&self) -> TypeFormat {
        self.format
    }

    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    pub fn set_direction(&mut self, direction: ParameterDirection) {
        self.direction = direction;
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Binary length of the value; −1 for null.
    pub fn bound_size(&self) -> i32 {
        self.bound_size
    }
}

#[cfg(test)]
mod tests {
    use super::Parameter;
    use crate::error::Error;
    use crate::options::{BackendParams, CodecOptions};
    use crate::protocol::TypeFormat;
    use crate::types::{PgValue, TypeHandlerRegistry, TypeId};

    fn registry() -> TypeHandlerRegistry {
        let mut params = BackendParams::new();
        params.insert("integer_datetimes", "on");

        TypeHandlerRegistry::connect(&params, &CodecOptions::default()).unwrap()
    }

    #[test]
    fn it_precomputes_the_bound_size() {
        let registry = registry();

        let param = Parameter::bind(PgValue::Int8(7), &registry).unwrap();

        assert_eq!(param.bound_size(), 8);
        assert_eq!(param.format(), TypeFormat::Binary);
    }

    #[test]
    fn it_binds_null_with_a_hint() {
        let registry = registry();

        let param =
            Parameter::bind_as(PgValue::Null, &registry, None, Some(TypeId::INT4)).unwrap();

        assert_eq!(param.bound_size(), -1);
        assert!(param.is_null());
    }

    #[test]
    fn it_rejects_null_without_a_hint() {
        let registry = registry();

        assert!(matches!(
            Parameter::bind(PgValue::Null, &registry),
            Err(Error::InvalidCast(_))
        ));
    }

    #[test]
    fn it_resolves_by_pg_name_first() {
        let registry = registry();

        let param =
            Parameter::bind_as(PgValue::Int2(1), &registry, Some("int2"), Some(TypeId::INT8))
                .unwrap();

        assert_eq!(param.handler().name(), "int2");
    }
}

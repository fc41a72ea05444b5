use bytes::Bytes;

use crate::error::{Error, Result};
use crate::io::{ByteBuffer, WireWrite};
use crate::options::CodecOptions;
use crate::protocol::{Parameter, ParameterDirection, TypeFormat};
use crate::types::ValueWriter;

/// Declared formats for the result columns.
///
/// Either one global flag covering every column, or an explicit per-column
/// list; the enum rules out supplying both. `true` means the column's type
/// is unknown and must come back as text.
pub enum ResultFormats {
    AllUnknown(bool),
    PerColumn(Vec<bool>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindState {
    WroteNothing,
    WroteHeader,
    WroteParameters,
    Done,
}

/// Emits exactly one `Bind` message:
///
/// ```text
/// 'B' | i32 len | cstring portal | cstring statement
///     | i16 nFmt | i16[nFmt] fmts
///     | i16 nParams | { i32 paramLen ; bytes[paramLen] } × nParams
///     | i16 nResFmt | i16[nResFmt] resFmts
/// ```
///
/// The length field covers everything after the type byte, including
/// itself, and is computed up front from the parameters' bound sizes — the
/// message streams through a bounded buffer, so nothing can be backpatched
/// after the fact.
///
/// The header through `nParams` is emitted atomically. Suspension points
/// are the per-state space checks; the parameter currently being emitted
/// and its length-prefix progress survive in [`ValueWriter`].
pub struct BindWriter {
    portal: String,
    statement: String,
    params: Vec<Parameter>,
    result_formats: ResultFormats,
    state: BindState,
    param_index: usize,
    param_writer: ValueWriter,
}

impl BindWriter {
    pub fn new(
        options: &CodecOptions,
        portal: impl Into<String>,
        statement: impl Into<String>,
        params: Vec<Parameter>,
        result_formats: ResultFormats,
    ) -> Result<Self> {
        let portal = portal.into();
        let statement = statement.into();

        validate_name(options, &portal)?;
        validate_name(options, &statement)?;

        if params.len() > i16::MAX as usize {
            return Err(Error::Protocol("too many parameters to transmit".into()));
        }

        if let ResultFormats::PerColumn(list) = &result_formats {
            if list.len() > i16::MAX as usize {
                return Err(Error::Protocol("too many result columns to transmit".into()));
            }
        }

        if params.iter().any(|p| p.direction() != ParameterDirection::Input) {
            return Err(Error::Protocol(
                "only input parameters may appear in a portal binding".into(),
            ));
        }

        let payload: i64 = params.iter().map(|p| 4 + p.bound_size().max(0) as i64).sum();

        if payload > i32::MAX as i64 {
            return Err(Error::Protocol("bind message exceeds the 2 GiB frame limit".into()));
        }

        Ok(Self {
            portal,
            statement,
            params,
            result_formats,
            state: BindState::WroteNothing,
            param_index: 0,
            param_writer: ValueWriter::new(),
        })
    }

    /// Number of entries in the format-code block: 0 when every parameter
    /// is text, 1 when every parameter is binary, otherwise one per
    /// parameter.
    fn format_count(&self) -> usize {
        let binary = self.params.iter().filter(|p| p.format() == TypeFormat::Binary).count();

        if binary == 0 {
            0
        } else if binary == self.params.len() {
            1
        } else {
            self.params.len()
        }
    }

    fn result_format_count(&self) -> usize {
        match &self.result_formats {
            ResultFormats::AllUnknown(_) => 1,
            ResultFormats::PerColumn(list) => list.len(),
        }
    }

    /// Header bytes after the type byte: length field, both names, the
    /// format-code block, and the parameter count.
    fn header_len(&self) -> usize {
        4 + self.portal.len() + 1 + self.statement.len() + 1 + 2 + 2 * self.format_count() + 2
    }

    /// The declared message length: header plus parameter payloads plus the
    /// result-format block.
    fn message_len(&self) -> i32 {
        let params: usize =
            self.params.iter().map(|p| 4 + p.bound_size().max(0) as usize).sum();

        (self.header_len() + params + 2 + 2 * self.result_format_count()) as i32
    }
}

impl WireWrite for BindWriter {
    fn write(&mut self, buf: &mut ByteBuffer, direct: &mut Option<Bytes>) -> Result<bool> {
        loop {
            match self.state {
                BindState::WroteNothing => {
                    let header = 1 + self.header_len();

                    if buf.capacity() < header {
                        // no amount of flushing makes an atomic unit fit
                        return Err(Error::BufferTooSmall {
                            required: header,
                            capacity: buf.capacity(),
                        });
                    }

                    if buf.write_space_left() < header {
                        return Ok(false);
                    }

                    buf.put_u8(b'B');
                    buf.put_i32(self.message_len());
                    buf.put_str_nul(&self.portal)?;
                    buf.put_str_nul(&self.statement)?;

                    let count = self.format_count();
                    buf.put_i16(count as i16);

                    match count {
                        0 => {}
                        1 => buf.put_i16(TypeFormat::Binary as i16),
                        _ => {
                            for param in &self.params {
                                buf.put_i16(param.format() as i16);
                            }
                        }
                    }

                    buf.put_i16(self.params.len() as i16);

                    self.state = BindState::WroteHeader;
                }

                BindState::WroteHeader => {
                    while self.param_index < self.params.len() {
                        let param = &self.params[self.param_index];

                        if param.format() == TypeFormat::Text && !param.is_null() {
                            return Err(Error::NotImplemented("text-format parameter encoding"));
                        }

                        if !self.param_writer.write(
                            param.handler(),
                            param.value(),
                            param.bound_size(),
                            buf,
                            direct,
                        )? {
                            return Ok(false);
                        }

                        self.param_index += 1;
                    }

                    self.state = BindState::WroteParameters;
                }

                BindState::WroteParameters => {
                    if buf.write_space_left() < 2 + 2 * self.result_format_count() {
                        return Ok(false);
                    }

                    match &self.result_formats {
                        ResultFormats::AllUnknown(all_unknown) => {
                            buf.put_i16(1);
                            buf.put_i16(if *all_unknown { 0 } else { 1 });
                        }

                        ResultFormats::PerColumn(unknown) => {
                            buf.put_i16(unknown.len() as i16);

                            for &is_unknown in unknown {
                                buf.put_i16(if is_unknown { 0 } else { 1 });
                            }
                        }
                    }

                    self.state = BindState::Done;
                }

                BindState::Done => return Ok(true),
            }
        }
    }
}

fn validate_name(options: &CodecOptions, name: &str) -> Result<()> {
    if name.bytes().any(|b| b == 0) {
        return Err(Error::Protocol("identifier contains an embedded NUL".into()));
    }

    if options.strict_ascii_identifiers && !name.is_ascii() {
        return Err(Error::Protocol("identifier contains non-ASCII bytes".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{BindWriter, ResultFormats};
    use crate::error::Error;
    use crate::io::{drive_write, ByteBuffer, MemTransport};
    use crate::options::{BackendParams, CodecOptions};
    use crate::protocol::Parameter;
    use crate::types::{PgValue, TypeHandlerRegistry, TypeId};

    fn registry() -> TypeHandlerRegistry {
        let mut params = BackendParams::new();
        params.insert("integer_datetimes", "on");

        TypeHandlerRegistry::connect(&params, &CodecOptions::default()).unwrap()
    }

    fn run(writer: &mut BindWriter, capacity: usize) -> Vec<u8> {
        let mut buf = ByteBuffer::new(capacity);
        let mut transport = MemTransport::new();

        drive_write(writer, &mut buf, &mut transport).unwrap();

        transport.sent().to_vec()
    }

    const TWO_INT4_BIND: &[u8] = b"B\0\0\0\x20\0\0\0\x01\0\x01\0\x02\
        \0\0\0\x04\0\0\0\x01\0\0\0\x04\0\0\0\x02\0\x01\0\x01";

    #[test]
    fn it_writes_an_all_binary_bind() {
        let registry = registry();
        let options = CodecOptions::default();

        let params = vec![
            Parameter::bind(PgValue::Int4(1), &registry).unwrap(),
            Parameter::bind(PgValue::Int4(2), &registry).unwrap(),
        ];

        let mut writer =
            BindWriter::new(&options, "", "", params, ResultFormats::AllUnknown(false)).unwrap();

        let bytes = run(&mut writer, 8 * 1024);

        assert_eq!(bytes, TWO_INT4_BIND);

        // the declared length equals the bytes after the type byte
        assert_eq!(bytes.len() - 1, 0x20);
    }

    #[test]
    fn it_writes_the_empty_bind() {
        let options = CodecOptions::default();

        let mut writer =
            BindWriter::new(&options, "", "", Vec::new(), ResultFormats::AllUnknown(true))
                .unwrap();

        let bytes = run(&mut writer, 64);

        // 14 bytes after the type byte
        assert_eq!(bytes, b"B\0\0\0\x0e\0\0\0\0\0\0\0\x01\0\0");
    }

    #[test]
    fn it_enumerates_mixed_formats_explicitly() {
        let registry = registry();
        let options = CodecOptions::default();

        let params = vec![
            // a null bound to the unrecognized handler goes as text
            Parameter::bind_as(PgValue::Null, &registry, Some("unknown"), None).unwrap(),
            Parameter::bind(PgValue::Int4(42), &registry).unwrap(),
        ];

        let mut writer =
            BindWriter::new(&options, "", "", params, ResultFormats::AllUnknown(true)).unwrap();

        let bytes = run(&mut writer, 8 * 1024);

        assert_eq!(
            bytes,
            &b"B\0\0\0\x1e\0\0\0\x02\0\0\0\x01\0\x02\
               \xff\xff\xff\xff\0\0\0\x04\0\0\0\x2a\0\x01\0\0"[..]
        );
    }

    #[test]
    fn it_writes_a_null_parameter_as_a_bare_length() {
        let registry = registry();
        let options = CodecOptions::default();

        let params =
            vec![Parameter::bind_as(PgValue::Null, &registry, None, Some(TypeId::INT4)).unwrap()];

        let mut writer =
            BindWriter::new(&options, "", "", params, ResultFormats::AllUnknown(false)).unwrap();

        let bytes = run(&mut writer, 64);

        assert_eq!(
            bytes,
            &b"B\0\0\0\x14\0\0\0\x01\0\x01\0\x01\xff\xff\xff\xff\0\x01\0\x01"[..]
        );
    }

    #[test]
    fn it_emits_the_per_column_result_block() {
        let options = CodecOptions::default();

        let mut writer = BindWriter::new(
            &options,
            "",
            "",
            Vec::new(),
            ResultFormats::PerColumn(vec![false, true, false]),
        )
        .unwrap();

        let bytes = run(&mut writer, 64);

        assert_eq!(bytes, b"B\0\0\0\x12\0\0\0\0\0\0\0\x03\0\x01\0\0\0\x01");
    }

    #[test]
    fn it_reports_a_buffer_smaller_than_the_header() {
        let registry = registry();
        let options = CodecOptions::default();

        let params = vec![Parameter::bind(PgValue::Int4(1), &registry).unwrap()];

        let mut writer = BindWriter::new(
            &options,
            "a_rather_long_portal_name",
            "",
            params,
            ResultFormats::AllUnknown(false),
        )
        .unwrap();

        let mut buf = ByteBuffer::new(16);
        let mut direct = None;

        let err = crate::io::WireWrite::write(&mut writer, &mut buf, &mut direct).unwrap_err();

        assert!(matches!(err, Error::BufferTooSmall { .. }));
    }

    #[test]
    fn it_produces_identical_bytes_under_a_tiny_buffer() {
        let registry = registry();
        let options = CodecOptions::default();

        let bind = |registry: &TypeHandlerRegistry| {
            vec![
                Parameter::bind(PgValue::Int4(1), registry).unwrap(),
                Parameter::bind(PgValue::Text("a moderately long string value".into()), registry)
                    .unwrap(),
                Parameter::bind_as(PgValue::Null, registry, None, Some(TypeId::INT4)).unwrap(),
            ]
        };

        let mut single_shot = BindWriter::new(
            &options,
            "",
            "",
            bind(&registry),
            ResultFormats::AllUnknown(false),
        )
        .unwrap();

        let mut tiny = BindWriter::new(
            &options,
            "",
            "",
            bind(&registry),
            ResultFormats::AllUnknown(false),
        )
        .unwrap();

        assert_eq!(run(&mut single_shot, 8 * 1024), run(&mut tiny, 16));
    }

    #[test]
    fn it_rejects_output_parameters() {
        let registry = registry();
        let options = CodecOptions::default();

        let mut param = Parameter::bind(PgValue::Int4(1), &registry).unwrap();
        param.set_direction(crate::protocol::ParameterDirection::Output);

        let result =
            BindWriter::new(&options, "", "", vec![param], ResultFormats::AllUnknown(false));

        assert!(result.is_err());
    }

    #[test]
    fn it_rejects_non_ascii_identifiers() {
        let options = CodecOptions::default();

        let result =
            BindWriter::new(&options, "pörtal", "", Vec::new(), ResultFormats::AllUnknown(true));

        assert!(result.is_err());
    }
}

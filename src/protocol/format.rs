/// Data transmission format code, as used in the format-code blocks of the
/// extended query protocol. Binary representations for integers use network
/// byte order; text has no trailing NUL and allows no embedded NUL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum TypeFormat {
    Text = 0,
    Binary = 1,
}

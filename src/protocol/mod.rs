//! Extended-query frontend framing: parameter binding and the `Bind`
//! message writer.

mod bind;
mod format;
mod parameter;

pub use bind::{BindWriter, ResultFormats};
pub use format::TypeFormat;
pub use parameter::{Parameter, ParameterDirection};

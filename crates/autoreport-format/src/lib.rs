pub mod error;
pub mod render;
pub mod spec;

pub use error::{FormatError, Result};
pub use render::{format_numeric, format_value};
pub use spec::{Case, FormatSpec, NumericFormat};

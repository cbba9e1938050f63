//! Writing merged output trees to disk.

pub mod assembler;
pub mod digest;
pub mod error;
pub mod naming;

pub use assembler::{
    JsonAssembler, OutputAssembler, OutputFormat, TextAssembler, WrittenReport, XmlAssembler,
};
pub use digest::sha256_hex;
pub use error::{AssemblyError, Result};
pub use naming::{DEFAULT_PATTERN, OutputNamer, UniqueNames, sanitize};

pub mod document;
pub mod error;
pub mod loader;
pub mod parser;
pub mod region;

pub use document::{DocNode, Document, Group, GroupKind, Run};
pub use error::{LoadError, SyntaxIssue, SyntaxProblem, TemplateSyntaxError};
pub use loader::{load_template, parse_xml_document};
pub use parser::{Token, parse_template, parse_token};
pub use region::{
    MarkerKind, RegionId, RegionKind, RegionNode, RegionTree, RunOrigin, Shell,
};

//! YAML parsing and error handling

pub mod diagnostics;
pub mod ordered;
pub mod parser;

pub use diagnostics::{YamlError, YamlSyntaxError};
pub use ordered::OrderedMap;
pub use parser::{parse_yaml, parse_yaml_file};

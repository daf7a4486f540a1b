//! Typed YAML loading for configuration and histogram documents

use serde::de::DeserializeOwned;
use std::path::Path;

use crate::yaml::diagnostics::{YamlError, YamlSyntaxError};

/// Deserialize `content`; syntax errors point into `filename`
pub fn parse_yaml<T>(content: &str, filename: &str) -> Result<T, YamlError>
where
    T: DeserializeOwned + 'static,
{
    serde_yml::from_str(content)
        .map_err(|e| YamlSyntaxError::from_serde_error(&e, content, filename).into())
}

/// Read and deserialize the document at `path`
pub fn parse_yaml_file<T: DeserializeOwned + 'static>(path: &Path) -> Result<T, YamlError> {
    let content = std::fs::read_to_string(path)?;
    parse_yaml(&content, &path.display().to_string())
}

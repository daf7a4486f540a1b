//! YAML error types with source spans for miette

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Errors raised while reading a YAML document
#[derive(Debug, Error, Diagnostic)]
pub enum YamlError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] YamlSyntaxError),

    #[error("Failed to read file: {0}")]
    #[diagnostic(code(plotit::yaml::io))]
    Io(#[from] std::io::Error),
}

/// A syntax or schema error pointing into the offending document
#[derive(Debug, Error, Diagnostic)]
#[error("Invalid YAML: {message}")]
#[diagnostic(code(plotit::yaml::syntax))]
pub struct YamlSyntaxError {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: Option<SourceSpan>,
}

impl YamlSyntaxError {
    pub fn from_serde_error(err: &serde_yml::Error, content: &str, filename: &str) -> Self {
        let span = err.location().map(|loc| {
            let offset = loc.index().min(content.len());
            let len = usize::from(offset < content.len());
            SourceSpan::from((offset, len))
        });
        Self {
            message: err.to_string(),
            src: NamedSource::new(filename, content.to_string()),
            span,
        }
    }

    /// Line number (1-based) the error points at, if known
    pub fn line(&self) -> Option<usize> {
        let span = self.span?;
        let text = self.src.inner();
        Some(text[..span.offset().min(text.len())].matches('\n').count() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_points_at_error_line() {
        let content = "a: 1\nb: [unclosed\n";
        let err = serde_yml::from_str::<serde_yml::Value>(content).unwrap_err();
        let diag = YamlSyntaxError::from_serde_error(&err, content, "bad.yaml");
        assert!(diag.span.is_some());
        assert!(diag.line().unwrap() >= 2);
    }
}

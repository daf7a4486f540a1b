//! Histogram stores
//!
//! A store maps `(file path, object name)` to a histogram. [`FileStore`] reads
//! histogram documents (YAML or JSON, chosen by extension) and caches each
//! parsed file for the rest of the run. [`MemoryStore`] serves histograms
//! registered in code.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::core::histogram::{Histogram, HistogramError};
use crate::yaml::{parse_yaml, OrderedMap, YamlError};

/// Errors reading histogram documents
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("Failed to read '{path}'")]
    #[diagnostic(code(plotit::store::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}'")]
    #[diagnostic(code(plotit::store::parse))]
    Yaml {
        path: String,
        #[source]
        #[diagnostic_source]
        source: YamlError,
    },

    #[error("Failed to parse '{path}': {message}")]
    #[diagnostic(code(plotit::store::parse))]
    Json { path: String, message: String },

    #[error("Unsupported histogram file '{path}'")]
    #[diagnostic(
        code(plotit::store::format),
        help("histogram files must end in .yaml, .yml or .json")
    )]
    UnsupportedFormat { path: String },

    #[error("Invalid histogram '{object}' in '{path}'")]
    #[diagnostic(code(plotit::store::histogram))]
    Histogram {
        path: String,
        object: String,
        #[source]
        source: HistogramError,
    },
}

/// Source of histograms keyed by file path and object name
pub trait HistogramStore {
    /// Whether the file exists at all
    fn exists(&self, path: &str) -> bool;

    /// Object names in the file, in file order
    fn object_names(&mut self, path: &str) -> Result<Vec<String>, StoreError>;

    /// Load one object; `Ok(None)` when the file has no such object
    fn load(&mut self, path: &str, object: &str) -> Result<Option<Histogram>, StoreError>;
}

/// One histogram as written in a document
///
/// Binning is either explicit `edges` or `bins` + `range`. Errors default to
/// `sqrt(|content|)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,

    pub content: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<f64>>,
}

impl HistogramSpec {
    pub fn to_histogram(&self, name: &str) -> Result<Histogram, HistogramError> {
        let edges = match (&self.edges, self.bins, self.range) {
            (Some(edges), _, _) => edges.clone(),
            (None, Some(bins), Some([low, high])) if bins > 0 => {
                let width = (high - low) / bins as f64;
                (0..=bins).map(|i| low + width * i as f64).collect()
            }
            _ => {
                return Err(HistogramError::InvalidEdges {
                    name: name.to_string(),
                    reason: "expected 'edges', or 'bins' with 'range'".to_string(),
                })
            }
        };
        let histogram = Histogram::from_edges(name, edges)?.with_content(self.content.clone())?;
        match &self.errors {
            Some(errors) => histogram.with_errors(errors.clone()),
            None => Ok(histogram),
        }
    }

    /// Spec describing an existing histogram with explicit edges
    pub fn from_histogram(histogram: &Histogram) -> Self {
        Self {
            edges: Some(histogram.edges().to_vec()),
            bins: None,
            range: None,
            content: histogram.content().to_vec(),
            errors: Some(histogram.errors().to_vec()),
        }
    }
}

/// A parsed histogram file
pub type HistogramDocument = OrderedMap<HistogramSpec>;

enum Format {
    Yaml,
    Json,
}

fn format_of(path: &str) -> Result<Format, StoreError> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("yaml") | Some("yml") => Ok(Format::Yaml),
        Some("json") => Ok(Format::Json),
        _ => Err(StoreError::UnsupportedFormat {
            path: path.to_string(),
        }),
    }
}

/// Reads histogram documents from disk
#[derive(Debug, Default)]
pub struct FileStore {
    cache: HashMap<String, HistogramDocument>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn document(&mut self, path: &str) -> Result<&HistogramDocument, StoreError> {
        if !self.cache.contains_key(path) {
            let document = Self::read(path)?;
            log::debug!("Loaded {} histograms from '{}'", document.len(), path);
            self.cache.insert(path.to_string(), document);
        }
        self.cache
            .get(path)
            .ok_or_else(|| StoreError::UnsupportedFormat {
                path: path.to_string(),
            })
    }

    fn read(path: &str) -> Result<HistogramDocument, StoreError> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_string(),
            source,
        })?;
        match format {
            Format::Yaml => parse_yaml(&content, path).map_err(|source| StoreError::Yaml {
                path: path.to_string(),
                source,
            }),
            Format::Json => serde_json::from_str(&content).map_err(|e| StoreError::Json {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

impl HistogramStore for FileStore {
    fn exists(&self, path: &str) -> bool {
        self.cache.contains_key(path) || Path::new(path).is_file()
    }

    fn object_names(&mut self, path: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.document(path)?.keys().map(str::to_string).collect())
    }

    fn load(&mut self, path: &str, object: &str) -> Result<Option<Histogram>, StoreError> {
        let document = self.document(path)?;
        let Some(spec) = document.get(object) else {
            return Ok(None);
        };
        spec.to_histogram(object)
            .map(Some)
            .map_err(|source| StoreError::Histogram {
                path: path.to_string(),
                object: object.to_string(),
                source,
            })
    }
}

/// Histograms registered in code, keyed by file path
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    files: BTreeMap<String, Vec<Histogram>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `histogram` under `path`, replacing an object of the same name
    pub fn insert(&mut self, path: impl Into<String>, histogram: Histogram) {
        let objects = self.files.entry(path.into()).or_default();
        match objects.iter_mut().find(|h| h.name == histogram.name) {
            Some(slot) => *slot = histogram,
            None => objects.push(histogram),
        }
    }

    /// Builder form of [`MemoryStore::insert`]
    pub fn with(mut self, path: impl Into<String>, histogram: Histogram) -> Self {
        self.insert(path, histogram);
        self
    }
}

impl HistogramStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn object_names(&mut self, path: &str) -> Result<Vec<String>, StoreError> {
        self.files
            .get(path)
            .map(|objects| objects.iter().map(|h| h.name.clone()).collect())
            .ok_or_else(|| StoreError::Io {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })
    }

    fn load(&mut self, path: &str, object: &str) -> Result<Option<Histogram>, StoreError> {
        let objects = self.files.get(path).ok_or_else(|| StoreError::Io {
            path: path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        })?;
        Ok(objects.iter().find(|h| h.name == object).cloned())
    }
}

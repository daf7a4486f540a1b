//! Analysis - the parsed configuration document
//!
//! Holds the global configuration, groups, sources and plot requests in
//! declaration order. Source paths are resolved against `root`, which is
//! itself resolved against the directory of the configuration file.

use miette::Diagnostic;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::entities::configuration::Configuration;
use crate::entities::group::Group;
use crate::entities::plot::Plot;
use crate::entities::source::{Source, SourceKind};
use crate::entities::style::Legend;
use crate::io::store::HistogramStore;
use crate::yaml::{parse_yaml, parse_yaml_file, OrderedMap, YamlError};

/// Nested `include:` lists deeper than this are rejected
const MAX_INCLUDE_DEPTH: usize = 16;

/// Errors loading a configuration document
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Yaml(#[from] YamlError),

    #[error("Configuration file must have a '{section}' section")]
    #[diagnostic(
        code(plotit::config::missing_section),
        help("see the example configuration in the README")
    )]
    MissingSection { section: &'static str },

    #[error("Invalid entry '{key}' in '{section}': {message}")]
    #[diagnostic(code(plotit::config::invalid_entry))]
    InvalidEntry {
        section: &'static str,
        key: String,
        message: String,
    },

    #[error("Failed to include '{path}'")]
    #[diagnostic(code(plotit::config::include))]
    Include {
        path: String,
        #[source]
        source: YamlError,
    },

    #[error("'include' in '{section}' must be a file name or a list of file names")]
    #[diagnostic(code(plotit::config::include))]
    IncludeFormat { section: &'static str },

    #[error("Includes in '{section}' are nested too deeply")]
    #[diagnostic(code(plotit::config::include), help("check for a file including itself"))]
    IncludeDepth { section: &'static str },
}

#[derive(Deserialize)]
struct Document {
    configuration: Option<Configuration>,
    #[serde(default)]
    groups: OrderedMap<Group>,
    files: Option<OrderedMap<serde_yml::Value>>,
    plots: Option<OrderedMap<serde_yml::Value>>,
    #[serde(default)]
    legend: Legend,
}

/// A fully parsed configuration
#[derive(Debug, Clone)]
pub struct Analysis {
    pub configuration: Configuration,
    pub groups: Vec<Group>,
    pub sources: Vec<Source>,
    pub plots: Vec<Plot>,
    pub legend: Legend,
    /// Directory the configuration was read from
    pub base_dir: PathBuf,
    /// Systematics files removed because they do not exist
    pub dropped_systematics: Vec<String>,
}

impl Analysis {
    /// An analysis with no groups, sources or plots
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            groups: Vec::new(),
            sources: Vec::new(),
            plots: Vec::new(),
            legend: Legend::default(),
            base_dir: PathBuf::from("."),
            dropped_systematics: Vec::new(),
        }
    }

    /// Load and parse a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(YamlError::from)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_yaml(&content, &path.display().to_string(), &base_dir)
    }

    /// Parse a configuration document; relative paths resolve against `base_dir`
    pub fn from_yaml(content: &str, filename: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let document: Document = parse_yaml(content, filename)?;

        let configuration = document.configuration.ok_or(ConfigError::MissingSection {
            section: "configuration",
        })?;
        let mut files = document
            .files
            .ok_or(ConfigError::MissingSection { section: "files" })?;
        let mut plots = document
            .plots
            .ok_or(ConfigError::MissingSection { section: "plots" })?;

        expand_includes(&mut files, "files", base_dir)?;
        expand_includes(&mut plots, "plots", base_dir)?;

        let groups: Vec<Group> = document
            .groups
            .into_iter()
            .map(|(name, group)| Group { name, ..group })
            .collect();

        let root = base_dir.join(&configuration.root);
        let resolve = |p: &str| root.join(p).to_string_lossy().into_owned();

        let mut sources = Vec::with_capacity(files.len());
        for (key, value) in files {
            let mut source: Source =
                serde_yml::from_value(value).map_err(|e| ConfigError::InvalidEntry {
                    section: "files",
                    key: key.clone(),
                    message: e.to_string(),
                })?;
            source.path = resolve(&key);
            let attributes = source.drawing_attributes();
            if !attributes.is_empty() {
                log::debug!(
                    "'{}': drawing attributes {} are kept but not interpreted",
                    key,
                    attributes.join(", ")
                );
            }
            for variant in &mut source.systematics {
                variant.path = resolve(&variant.path);
            }
            if let Some(group) = &source.group {
                if !groups.iter().any(|g| &g.name == group) {
                    log::warn!(
                        "Group '{}' of '{}' is not declared; ignoring it",
                        group,
                        key
                    );
                    source.group = None;
                }
            }
            sources.push(source);
        }

        let mut plot_list = Vec::with_capacity(plots.len());
        for (key, value) in plots {
            let plot: Plot = serde_yml::from_value(value).map_err(|e| ConfigError::InvalidEntry {
                section: "plots",
                key: key.clone(),
                message: e.to_string(),
            })?;
            plot_list.push(Plot { name: key, ..plot });
        }

        Ok(Self {
            configuration,
            groups,
            sources,
            plots: plot_list,
            legend: document.legend,
            base_dir: base_dir.to_path_buf(),
            dropped_systematics: Vec::new(),
        })
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn sources_of(&self, kind: SourceKind) -> impl Iterator<Item = &Source> {
        self.sources.iter().filter(move |s| s.kind == kind)
    }

    /// Release every per-plot histogram and summary
    pub fn reset_sources(&mut self) {
        for source in &mut self.sources {
            source.reset();
        }
    }

    /// Remove systematic variants whose file does not exist, returning their paths
    pub fn drop_missing_systematics(&mut self, store: &dyn HistogramStore) -> Vec<String> {
        let mut dropped = Vec::new();
        for source in &mut self.sources {
            source.systematics.retain(|variant| {
                let exists = store.exists(&variant.path);
                if !exists {
                    log::warn!("Systematics file '{}' not found", variant.path);
                    dropped.push(variant.path.clone());
                }
                exists
            });
        }
        self.dropped_systematics.extend(dropped.iter().cloned());
        dropped
    }
}

fn include_list(value: serde_yml::Value, section: &'static str) -> Result<Vec<String>, ConfigError> {
    match value {
        serde_yml::Value::String(path) => Ok(vec![path]),
        serde_yml::Value::Sequence(items) => items
            .into_iter()
            .map(|item| match item {
                serde_yml::Value::String(path) => Ok(path),
                _ => Err(ConfigError::IncludeFormat { section }),
            })
            .collect(),
        _ => Err(ConfigError::IncludeFormat { section }),
    }
}

/// Merge the documents named by `include` into `map`, recursively
fn expand_includes(
    map: &mut OrderedMap<serde_yml::Value>,
    section: &'static str,
    base_dir: &Path,
) -> Result<(), ConfigError> {
    let mut depth = 0;
    while let Some(value) = map.remove("include") {
        depth += 1;
        if depth > MAX_INCLUDE_DEPTH {
            return Err(ConfigError::IncludeDepth { section });
        }
        for file in include_list(value, section)? {
            let path = base_dir.join(&file);
            let included: OrderedMap<serde_yml::Value> =
                parse_yaml_file(&path).map_err(|source| ConfigError::Include {
                    path: file.clone(),
                    source,
                })?;
            log::debug!("Included {} entries from '{}'", included.len(), file);
            for (key, value) in included {
                map.insert(key, value);
            }
        }
    }
    Ok(())
}

//! Shared test helpers for integration tests
//!
//! Fixtures are small histogram documents written into a temp directory next
//! to a configuration file.

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to get a plotit command
pub fn plotit() -> Command {
    Command::new(cargo::cargo_bin!("plotit"))
}

/// Write a histogram document with two unit-width bins per object
pub fn write_histograms(tmp: &TempDir, file: &str, objects: &[(&str, [f64; 2])]) -> PathBuf {
    let mut yaml = String::new();
    for (name, content) in objects {
        yaml.push_str(&format!(
            "{}:\n  edges: [0, 1, 2]\n  content: [{}, {}]\n",
            name, content[0], content[1]
        ));
    }
    let path = tmp.path().join(file);
    fs::write(&path, yaml).unwrap();
    path
}

/// Write the configuration file and return its path
pub fn write_config(tmp: &TempDir, yaml: &str) -> PathBuf {
    let path = tmp.path().join("plots.yml");
    fs::write(&path, yaml).unwrap();
    path
}

/// Data and two simulated backgrounds with one plot, `mjj`
///
/// With a luminosity of 10 the backgrounds scale to [1, 2] and [1, 1].
pub const BASIC_CONFIG: &str = r#"
configuration:
  luminosity: 10
  luminosity-error: 0.1
files:
  data.yaml:
    type: data
    legend: Data
  ttbar.yaml:
    type: mc
    cross-section: 1
    generated-events: 100
    legend: "t#bar{t}"
    order: 1
  dy.yaml:
    type: mc
    cross-section: 1
    generated-events: 50
    legend: Drell-Yan
    order: 2
plots:
  "mjj*":
    show-ratio: true
    show-errors: true
"#;

/// A temp directory holding [`BASIC_CONFIG`] and its inputs
pub fn setup_basic_analysis() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    write_histograms(&tmp, "data.yaml", &[("mjj", [4.0, 6.0]), ("pt", [1.0, 1.0])]);
    write_histograms(&tmp, "ttbar.yaml", &[("mjj", [10.0, 20.0]), ("pt", [5.0, 5.0])]);
    write_histograms(&tmp, "dy.yaml", &[("mjj", [5.0, 5.0]), ("pt", [5.0, 5.0])]);
    let config = write_config(&tmp, BASIC_CONFIG);
    (tmp, config)
}

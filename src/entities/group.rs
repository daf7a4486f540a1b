//! Group entity - named aggregation of sources sharing a legend entry

use serde::{Deserialize, Serialize};

use crate::entities::style::Color;

/// Sources naming the same group are summed into one stack layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Group {
    #[serde(skip_deserializing)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend_style: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<Color>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_color: Option<Color>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Legend text, falling back to the group name
    pub fn label(&self) -> &str {
        self.legend.as_deref().unwrap_or(&self.name)
    }
}

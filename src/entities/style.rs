//! Colors, labels and legend geometry shared by configuration and plots

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a color value
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Invalid color '{value}': expected a palette index or '#rrggbb[aa]'")]
pub struct ColorParseError {
    pub value: String,
}

/// RGBA components in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

/// A color reference: either a palette index or an explicit RGBA value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColorSpec", into = "String")]
pub enum Color {
    Index(i16),
    Rgba(Rgba),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColorSpec {
    Index(i16),
    Text(String),
}

impl TryFrom<ColorSpec> for Color {
    type Error = ColorParseError;

    fn try_from(spec: ColorSpec) -> Result<Self, Self::Error> {
        match spec {
            ColorSpec::Index(index) => Ok(Color::Index(index)),
            ColorSpec::Text(text) => text.parse(),
        }
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError {
            value: s.to_string(),
        };
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if (hex.len() != 6 && hex.len() != 8) || !hex.is_ascii() {
                return Err(err());
            }
            let channel = |i: usize| {
                u8::from_str_radix(&hex[i..i + 2], 16)
                    .map(|v| f64::from(v) / 255.0)
                    .map_err(|_| err())
            };
            let a = if hex.len() == 8 { channel(6)? } else { 1.0 };
            Ok(Color::Rgba(Rgba {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
                a,
            }))
        } else {
            s.parse::<i16>().map(Color::Index).map_err(|_| err())
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Index(index) => write!(f, "{}", index),
            Color::Rgba(c) => {
                let byte = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;
                write!(f, "#{:02x}{:02x}{:02x}", byte(c.r), byte(c.g), byte(c.b))?;
                if c.a < 1.0 {
                    write!(f, "{:02x}", byte(c.a))?;
                }
                Ok(())
            }
        }
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Default text size for free labels
pub const LABEL_FONT_SIZE: u32 = 18;

fn default_label_size() -> u32 {
    LABEL_FONT_SIZE
}

/// A free text label placed in normalized pad coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    pub position: [f64; 2],
    #[serde(default = "default_label_size")]
    pub size: u32,
}

/// Legend box `[x1, y1, x2, y2]` in normalized pad coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(pub [f64; 4]);

impl Default for Position {
    fn default() -> Self {
        Position([0.6, 0.6, 0.9, 0.9])
    }
}

/// The top-level `legend` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    #[serde(default)]
    pub position: Position,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_palette_index() {
        assert_eq!("42".parse::<Color>().unwrap(), Color::Index(42));
    }

    #[test]
    fn test_parse_rgb_and_rgba() {
        let Color::Rgba(rgb) = "#ff0000".parse::<Color>().unwrap() else {
            panic!("expected rgba");
        };
        assert_eq!(rgb.r, 1.0);
        assert_eq!(rgb.a, 1.0);

        let Color::Rgba(rgba) = "#00ff0080".parse::<Color>().unwrap() else {
            panic!("expected rgba");
        };
        assert_eq!(rgba.g, 1.0);
        assert!((rgba.a - 128.0 / 255.0).abs() < 1e-12);
    }

    #[test]
    fn test_reject_malformed_color() {
        assert!("#12345".parse::<Color>().is_err());
        assert!("#gggggg".parse::<Color>().is_err());
        assert!("blue".parse::<Color>().is_err());
    }

    #[test]
    fn test_color_from_yaml_number_or_string() {
        let colors: Vec<Color> = serde_yml::from_str("[46, '#0000ff']").unwrap();
        assert_eq!(colors[0], Color::Index(46));
        assert_eq!(colors[1].to_string(), "#0000ff");
    }

    #[test]
    fn test_label_default_size() {
        let label: Label = serde_yml::from_str("text: Preliminary\nposition: [0.2, 0.9]").unwrap();
        assert_eq!(label.size, LABEL_FONT_SIZE);
    }
}

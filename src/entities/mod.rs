//! Entity type definitions read from the configuration document

pub mod analysis;
pub mod configuration;
pub mod group;
pub mod plot;
pub mod source;
pub mod style;

pub use analysis::{Analysis, ConfigError};
pub use configuration::Configuration;
pub use group::Group;
pub use plot::{Plot, SidebandConfig, SidebandModel};
pub use source::{FractionFrom, Source, SourceKind, Summary, SystematicVariant};
pub use style::{Color, Label, Legend, Position, Rgba};

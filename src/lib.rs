//! plotit: stack, normalize and compare HEP histograms
//!
//! A configuration document names input histogram files (data, simulated
//! backgrounds and signals) and the plots to produce. For every plot the
//! simulated samples are scaled to the integrated luminosity, stacked and
//! compared to data through a ratio panel with systematic bands, and the
//! yields are summarized.

pub mod cli;
pub mod core;
pub mod entities;
pub mod io;
pub mod yaml;

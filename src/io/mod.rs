//! Input side - where histograms come from

pub mod store;

pub use store::{FileStore, HistogramDocument, HistogramSpec, HistogramStore, MemoryStore, StoreError};

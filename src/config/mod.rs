// src/config/mod.rs
pub mod pipeline;

pub use crate::ingest::config::{load_sources_default, load_sources_from, SourcesConfig};
pub use pipeline::PipelineConfig;

//! Command-line front end for ragline
//!
//! Loads a dataset directory, assembles the pipeline described by a
//! [`PipelineConfig`], and answers questions in an interactive loop.

mod app;
mod config;
mod loader;
mod ui;


pub use app::{Providers, build_pipeline, build_store};
pub use config::{
    GroupConfig, JoinConfig, PipelineConfig, RerankerConfig, RetrieverConfig, TransformConfig,
};
pub use loader::{html_to_text, load_dataset, markdown_to_text};
pub use ui::{PROMPT, answer, display_banner, is_exit, run_repl};

// Re-export core types
pub use ragline_core::{Error, Result};

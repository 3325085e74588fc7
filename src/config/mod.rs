//! Settings stored in `~/.docs-rag/config.toml` and the interactive setup
//! behind `docs-rag config`

pub mod interactive;
pub mod settings;

pub use crate::retrieval::RetrievalConfig;
pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, GenerationConfig, OllamaConfig};

// ABOUTME: Configuration crate for the fragment preview workspace
// ABOUTME: Exposes env var names, env parsing helpers and the shared PreviewConfig

pub mod constants;
pub mod env;
pub mod preview;

pub use env::{env_string, parse_env_or_default, parse_env_or_default_with_validation};
pub use preview::PreviewConfig;

//! Fragments CLI - command-line host for fragment previews

pub mod input;

pub use input::{load_fragment, load_result, InputError};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();
}

use std::{env, io::Stderr};
use tracing_subscriber::{fmt::Layer, prelude::*, EnvFilter};

/// Initializes a new tracing configuration.
///
/// - `default_directive`: Used when the `RUST_LOG` environment variable is not provided. You can set the default log
///   level (e.g. `warn`), but you can also configure module-specific log levels using comma-separated entries
///   formatted like `path::to::module=log_level`, e.g. `warn,auto_ansible::steps=debug`
///
/// Logs are written to stderr so that stdout stays free for output the operator is expected to copy, such as
/// the commands used to distribute public keys. Setting `JSON_LOGS` switches to one JSON object per line.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    let filter = env_filter(env::var("RUST_LOG").ok().as_deref(), default_directive);

    let json_logs = env::var_os("JSON_LOGS").is_some();

    if json_logs {
        let layer = Layer::new()
            .with_writer(std::io::stderr as fn() -> Stderr)
            .with_target(true)
            .json()
            .flatten_event(true)
            .with_span_list(false)
            .with_filter(filter);

        tracing_subscriber::registry().with(layer).try_init()?;
    } else {
        let layer = Layer::new()
            .with_writer(std::io::stderr as fn() -> Stderr)
            .with_target(false)
            .with_filter(filter);

        tracing_subscriber::registry().with(layer).try_init()?;
    }

    Ok(())
}

// An unparsable RUST_LOG falls back to the default rather than silencing everything
fn env_filter(rust_log: Option<&str>, default_directive: &str) -> EnvFilter {
    rust_log
        .filter(|directive| !directive.trim().is_empty())
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive))
}

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a tracing subscriber for tree loading diagnostics.
///
/// Log levels come from `RUST_LOG` (e.g. `arbor_tree=trace` to follow every
/// reparenting move), defaulting to `info`. Fails instead of panicking when
/// a global subscriber is already installed.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

//! Tracing subscriber initialisation.

use tracing_subscriber::EnvFilter;

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs a global fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns false if a global subscriber was already installed; that is not
/// an error, the existing subscriber keeps receiving events.
pub fn init_tracing(format: LogFormat) -> bool {
    init_tracing_with_filter(format, None)
}

/// Like [`init_tracing`] with an explicit filter directive taking
/// precedence over `RUST_LOG`.
pub fn init_tracing_with_filter(format: LogFormat, directive: Option<&str>) -> bool {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };

    if !installed {
        tracing::debug!("Global tracing subscriber already initialized - keeping existing subscriber");
    }
    installed
}

//! Process-wide `tracing` setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "reclip=debug,info"
    } else {
        "info"
    }
}

/// Installs a stderr subscriber. `RUST_LOG` takes precedence over `verbose`.
///
/// Calling it twice is harmless; the second call keeps the first subscriber.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

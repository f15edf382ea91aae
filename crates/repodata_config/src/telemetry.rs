use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. `verbosity` sets the default
/// level when `RUST_LOG` is unset; `RUST_LOG` always wins when present.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

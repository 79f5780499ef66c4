use tracing_subscriber::EnvFilter;

pub mod commands;

/// Default log filter for a `-v` count: warn, then info, then debug.
pub fn default_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install a stderr `tracing` subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose)));
    // A subscriber may already be installed (tests calling commands in-process).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

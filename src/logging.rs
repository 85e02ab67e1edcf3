//! Subscriber setup for binaries, demos and tests

use tracing_subscriber::EnvFilter;

/// Install a stderr `fmt` subscriber
///
/// With `debug` every level down to TRACE is enabled; otherwise `RUST_LOG`
/// decides, falling back to `info`. Calling this more than once, or after
/// another subscriber was installed, is a no-op.
pub fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

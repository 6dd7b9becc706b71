//! Centralized logging configuration for quietsolve demos and benchmarks
//!
//! The library itself never installs a subscriber: engine diagnostics are
//! plain `tracing` events, and whether they appear at all is decided by
//! [`LoggingType`](crate::optimizer::LoggingType) in the solver options.

use tracing::Level;

/// Initialize the tracing subscriber with the standard configuration
///
/// Default log level: INFO (overrideable via RUST_LOG environment variable)
///
/// # Example
/// ```no_run
/// use quietsolve::init_logger;
///
/// fn main() {
///     init_logger();
///     tracing::info!("Application started");
/// }
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the tracing subscriber with a custom default level
///
/// # Arguments
/// * `default_level` - The default log level (overrideable via RUST_LOG)
///
/// # Environment Variables
/// ```bash
/// RUST_LOG=debug cargo run --example line_fit
/// RUST_LOG=quietsolve=trace cargo run --example line_fit
/// ```
pub fn init_logger_with_level(default_level: Level) {
    use tracing_subscriber::fmt::time::SystemTime;

    // try_init: a subscriber may already be installed by a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_timer(SystemTime)
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}

//! Logging setup utilities for the darkcomm binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are enabled at the default level.
const WORKSPACE_CRATES: [&str; 3] = ["darkcomm_shared", "darkcomm_server", "darkcomm_client"];

/// Build the default filter directive for the workspace crates and the binary.
fn default_directive(binary_name: &str, default_log_level: &str) -> String {
    let binary_target = binary_name.replace('-', "_");
    let mut targets: Vec<&str> = WORKSPACE_CRATES.to_vec();
    if !targets.contains(&binary_target.as_str()) {
        targets.push(&binary_target);
    }
    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// Every line carries a timestamp and a level. The level can be overridden
/// using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "darkcomm-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn")
///
/// # Examples
///
/// ```no_run
/// use darkcomm_shared::logger::setup_logger;
///
/// setup_logger("darkcomm-server", "debug");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

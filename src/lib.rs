// Range Trainer Core - target capture and shot-group analysis
// Pixel-to-inch calibration, group metrics, and live acoustic shot detection

// Module declarations
pub mod analysis;
pub mod audio;
pub mod calibration;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixtures;
pub mod managers;
pub mod telemetry;

use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber.
///
/// Honors `RUST_LOG`, defaulting to `info`. Output goes to stderr so JSON on
/// stdout stays machine-readable. Safe to call more than once.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
        log::info!("logging initialised twice without panicking");
    }
}

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for the binary and for tests.
///
/// `RUST_LOG` wins when it is set; otherwise everything at `default_level`
/// and above is printed.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(default_level).as_str()));

    // try_init so repeated calls (tests, embedding) never panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub(crate) fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

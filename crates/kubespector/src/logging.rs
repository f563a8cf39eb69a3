//! Tracing subscriber setup
//!
//! Logs go to stderr; stdout carries command output only.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` wins over everything; otherwise `-v` means debug, `-vv` and
/// more mean trace, and without flags the configured level applies.
pub fn init(config_level: &str, verbose: u8, json: bool) {
    let level = match verbose {
        0 => config_level,
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

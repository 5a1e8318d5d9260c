//! Tracing setup.
//!
//! Filter comes from `CHECKPOST_LOG`, falling back to `RUST_LOG`, defaulting
//! to `info`. `CHECKPOST_LOG_FORMAT=json` switches to JSON lines for log
//! shippers. Output goes to stderr so command output stays clean on stdout.

use tracing_subscriber::EnvFilter;

const FILTER_ENV: &str = "CHECKPOST_LOG";
const FORMAT_ENV: &str = "CHECKPOST_LOG_FORMAT";

pub fn init() {
    let filter = EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var(FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // try_init so a second call (tests) is a no-op instead of a panic.
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

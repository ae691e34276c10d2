use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Map a `LOG_LEVEL` setting to a filter; unknown values fall back to `Info`
pub fn level_filter(level: &str) -> LevelFilter {
    match level.trim().to_ascii_uppercase().as_str() {
        "OFF" => LevelFilter::Off,
        "ERROR" | "CRITICAL" => LevelFilter::Error,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Install the stderr logger
///
/// `RUST_LOG` wins when set; otherwise `level` (the `LOG_LEVEL` setting) applies to
/// this crate. Calling it again is a no-op.
pub fn init_logger(level: &str) {
    let default_filter = format!("warn,tts_bridge={}", level_filter(level));
    let env = Env::default().filter_or("RUST_LOG", default_filter);

    let mut builder = Builder::from_env(env);

    // HTTP internals are noisy at debug
    if std::env::var("RUST_LOG").is_err() {
        builder
            .filter_module("hyper", LevelFilter::Error)
            .filter_module("hyper_util", LevelFilter::Error)
            .filter_module("reqwest", LevelFilter::Warn)
            .filter_module("mio", LevelFilter::Error);
    }

    let result = builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .try_init();

    if result.is_err() {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(level_filter("INFO"), LevelFilter::Info);
        assert_eq!(level_filter("debug"), LevelFilter::Debug);
        assert_eq!(level_filter("WARNING"), LevelFilter::Warn);
        assert_eq!(level_filter("CRITICAL"), LevelFilter::Error);
        assert_eq!(level_filter("nonsense"), LevelFilter::Info);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logger("DEBUG");
        init_logger("INFO");
    }
}

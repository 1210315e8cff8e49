use chrono::Local;
use log::LevelFilter;
use std::io::Write;

/// Dependencies that log every statement or connection at info and drown the
/// sync output. They stay at warn unless full tracing is asked for.
const CHATTY: &[&str] = &["sqlx", "reqwest", "hyper_util"];

/// Caps a chatty dependency below the crate's own level.
fn dependency_level(level: LevelFilter) -> LevelFilter {
    if level == LevelFilter::Trace {
        level
    } else {
        level.min(LevelFilter::Warn)
    }
}

/// Installs the stderr logger; stdout is left to command output. Only the
/// first call installs it, later calls just move the max level.
fn install(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .filter_level(level);
    for module in CHATTY {
        builder.filter_module(module, dependency_level(level));
    }

    let _ = builder.try_init();
    log::set_max_level(level);
}

pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Traces everything, SQL statements and HTTP connections included.
pub fn set_debug_log_level() {
    install(LevelFilter::Trace);
}

/// Returns `false`, leaving logging untouched, for an unknown level name.
pub fn set_log_level(level: &str) -> bool {
    match parse_level(level) {
        Some(lvl) => {
            install(lvl);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("WARNING"), Some(LevelFilter::Warn));
        assert_eq!(parse_level(" debug "), Some(LevelFilter::Debug));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn unknown_level_is_rejected() {
        assert!(!set_log_level("loud"));
        assert!(set_log_level("info"));
    }

    #[test]
    fn dependencies_stay_quiet_below_trace() {
        assert_eq!(dependency_level(LevelFilter::Debug), LevelFilter::Warn);
        assert_eq!(dependency_level(LevelFilter::Error), LevelFilter::Error);
        assert_eq!(dependency_level(LevelFilter::Trace), LevelFilter::Trace);
    }
}

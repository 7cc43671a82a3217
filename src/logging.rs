use colored::Colorize;
use log::Level;
use std::io::Write;

/// Initializes the process-wide logger.
///
/// `trace` only takes effect in debug builds, matching the daemon's `-t`
/// flag semantics: trace logging is considered too noisy/unsafe to enable
/// in release builds, so it's silently capped at `debug` there.
/// `no_color` disables ANSI coloring of the level tag, useful when stdout
/// is redirected to a file or journal.
pub fn init(trace: bool, no_color: bool) {
    let level = if trace && cfg!(debug_assertions) {
        log::LevelFilter::Trace
    } else if trace {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format(move |buf, record| {
            let tag = level_tag(record.level());
            let tag = if no_color { tag.normal() } else { colorize(tag, record.level()) };
            writeln!(buf, "[{}] {}", tag, record.args())
        })
        .init();
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

fn colorize(tag: &str, level: Level) -> colored::ColoredString {
    match level {
        Level::Error => tag.red().bold(),
        Level::Warn => tag.yellow(),
        Level::Info => tag.green(),
        Level::Debug => tag.blue(),
        Level::Trace => tag.purple(),
    }
}

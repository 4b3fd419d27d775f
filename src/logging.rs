use chrono::Local;
use log::{Level, Metadata, Record, SetLoggerError};

/// Writes `timestamp level target message` lines to stderr
pub struct ConsoleLogger {
    level: Level,
}

impl ConsoleLogger {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    pub fn init(level: Level) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(ConsoleLogger::new(level)))
            .map(|()| log::set_max_level(level.to_level_filter()))
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "{} {:<5} {} {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Parses a config level name, defaulting to info.
pub fn parse_level(level: &str) -> Level {
    level.parse().unwrap_or(Level::Info)
}

/// Installs the console logger. Uses env_logger instead when a logger has
/// already been set.
pub fn init(level: &str) {
    let level = parse_level(level);
    if ConsoleLogger::init(level).is_err() {
        let _ = env_logger::builder()
            .filter_level(level.to_level_filter())
            .try_init();
    }
}

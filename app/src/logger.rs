use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

/// stderr logger. lines are stamped with seconds since the logger got installed.
pub struct Logger {
    epoch: OnceLock<Instant>,
}

static LOGGER: Logger = Logger {
    epoch: OnceLock::new(),
};

fn format_line(
    elapsed: f64,
    level: log::Level,
    target: &str,
    line: Option<u32>,
    text: &fmt::Arguments,
) -> String {
    format!(
        "{elapsed:>9.3} {level:<5} {target}:{line:<4} > {text}",
        line = line.map_or_else(|| "?".to_string(), |line| line.to_string()),
    )
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.epoch.get_or_init(Instant::now).elapsed().as_secs_f64();
        eprintln!(
            "{}",
            format_line(
                elapsed,
                record.level(),
                record.target(),
                record.line(),
                record.args(),
            )
        );
    }

    fn flush(&self) {}
}

impl Logger {
    /// fails if some other logger is already installed.
    pub fn init(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
        LOGGER.epoch.get_or_init(Instant::now);
        log::set_logger(&LOGGER)?;
        log::set_max_level(level);
        Ok(())
    }
}

#[test]
fn test_format_line() {
    assert_eq!(
        format_line(
            1.5,
            log::Level::Info,
            "app::frameloop",
            Some(42),
            &format_args!("running")
        ),
        "    1.500 INFO  app::frameloop:42   > running"
    );
    assert_eq!(
        format_line(0.0, log::Level::Warn, "gl", None, &format_args!("x")),
        "    0.000 WARN  gl:?    > x"
    );
}

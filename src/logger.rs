use chrono::Utc;
use log::{LevelFilter, Metadata, Record};

static LOGGER: ConsoleLogger = ConsoleLogger;

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!(
                "{} {:<5} [{}] {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn init_installs_the_console_logger() -> Result<(), Box<dyn Error>> {
        init(LevelFilter::Debug)?;
        assert_eq!(log::max_level(), LevelFilter::Debug);
        assert!(log::logger().enabled(&Metadata::builder().level(log::Level::Debug).build()));

        // only one logger per process
        assert!(init(LevelFilter::Info).is_err());
        Ok(())
    }
}

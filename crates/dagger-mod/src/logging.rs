use std::io::Write;

use tracing::Level;

use crate::core::logger::{DynLogger, Logger};

/// Installs a fmt subscriber writing to stderr, keeping stdout free for
/// responses.
pub fn default_logging(level: Level) -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| eyre::eyre!(e))?;

    Ok(())
}

#[derive(Default)]
pub struct StdLogger {}

impl Logger for StdLogger {
    fn stdout(&self, output: &str) -> eyre::Result<()> {
        writeln!(std::io::stdout().lock(), "{}", output)?;

        Ok(())
    }

    fn stderr(&self, output: &str) -> eyre::Result<()> {
        writeln!(std::io::stderr().lock(), "{}", output)?;

        Ok(())
    }
}

#[derive(Default)]
pub struct TracingLogger {}

impl Logger for TracingLogger {
    fn stdout(&self, output: &str) -> eyre::Result<()> {
        tracing::info!(output = output, "dagger-mod");

        Ok(())
    }

    fn stderr(&self, output: &str) -> eyre::Result<()> {
        tracing::warn!(output = output, "dagger-mod");

        Ok(())
    }
}

#[derive(Default)]
pub struct AggregateLogger {
    pub loggers: Vec<DynLogger>,
}

impl Logger for AggregateLogger {
    fn stdout(&self, output: &str) -> eyre::Result<()> {
        for logger in &self.loggers {
            logger.stdout(output)?
        }

        Ok(())
    }

    fn stderr(&self, output: &str) -> eyre::Result<()> {
        for logger in &self.loggers {
            logger.stderr(output)?
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;

    #[derive(Default)]
    struct Capture {
        lines: Mutex<Vec<String>>,
    }

    impl Logger for Capture {
        fn stdout(&self, output: &str) -> eyre::Result<()> {
            self.lines.lock().unwrap().push(format!("out: {output}"));
            Ok(())
        }

        fn stderr(&self, output: &str) -> eyre::Result<()> {
            self.lines.lock().unwrap().push(format!("err: {output}"));
            Ok(())
        }
    }

    #[test]
    #[traced_test]
    fn aggregate_logger_fans_out() {
        let capture = Arc::new(Capture::default());
        let logger = AggregateLogger {
            loggers: vec![
                capture.clone() as DynLogger,
                Arc::new(TracingLogger::default()),
            ],
        };

        logger.stdout("{\"result\":1}").unwrap();
        logger.stderr("boom").unwrap();

        assert_eq!(
            *capture.lines.lock().unwrap(),
            vec!["out: {\"result\":1}".to_string(), "err: boom".to_string()]
        );
        assert!(logs_contain("boom"));
    }
}

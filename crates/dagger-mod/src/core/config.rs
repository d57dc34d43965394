use std::path::PathBuf;
use std::time::Duration;

use dagger_analyzer::discovery::{default_package, DEFAULT_PACKAGE, DEFAULT_PACKAGE_ENV};
use dagger_analyzer::naming::format_name;
use derive_builder::Builder;
use tracing::Level;

use crate::core::logger::DynLogger;
use crate::errors::ModError;

pub const MODULE_ENV: &str = "DAGGER_MODULE";
pub const MAIN_OBJECT_ENV: &str = "DAGGER_MAIN_OBJECT";
pub const EXECUTE_TIMEOUT_ENV: &str = "DAGGER_EXECUTE_TIMEOUT_MS";
pub const LOG_LEVEL_ENV: &str = "DAGGER_LOG_LEVEL";

#[derive(Builder, Clone)]
pub struct Config {
    /// Directory holding `src/<package>` or `<package>`.
    #[builder(setter(into), default = "PathBuf::from(\".\")")]
    pub module_root: PathBuf,
    #[builder(setter(into), default = "default_package()")]
    pub package: String,
    /// Explicit sources. Discovery under `module_root` is skipped when set.
    #[builder(setter(into), default)]
    pub source_files: Vec<PathBuf>,
    #[builder(setter(into))]
    pub module_name: String,
    #[builder(setter(into, strip_option), default)]
    pub main_object: Option<String>,
    #[builder(setter(into, strip_option), default)]
    pub execute_timeout_ms: Option<u64>,
    #[builder(default = "Level::INFO")]
    pub log_level: Level,
    #[builder(setter(strip_option), default)]
    pub logger: Option<DynLogger>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn from_env() -> Result<Self, ModError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ModError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let module_name = var(MODULE_ENV)
            .ok_or_else(|| ModError::Config(eyre::eyre!("`{MODULE_ENV}` is not set")))?;

        let mut builder = Config::builder();
        builder
            .module_name(module_name)
            .package(var(DEFAULT_PACKAGE_ENV).unwrap_or_else(|| DEFAULT_PACKAGE.to_string()));

        if let Some(main_object) = var(MAIN_OBJECT_ENV) {
            builder.main_object(main_object);
        }

        if let Some(timeout) = var(EXECUTE_TIMEOUT_ENV) {
            let timeout = timeout.parse::<u64>().map_err(|e| {
                ModError::Config(eyre::Report::new(e).wrap_err(format!(
                    "`{EXECUTE_TIMEOUT_ENV}` must be a number of milliseconds"
                )))
            })?;
            builder.execute_timeout_ms(timeout);
        }

        if let Some(level) = var(LOG_LEVEL_ENV) {
            builder.log_level(parse_log_level(&level)?);
        }

        builder
            .build()
            .map_err(|e| ModError::Config(eyre::Report::new(e)))
    }

    /// The configured main object, or the PascalCase module name.
    pub fn main_object_name(&self) -> String {
        self.main_object
            .clone()
            .unwrap_or_else(|| format_name(&self.module_name))
    }

    pub fn execute_timeout(&self) -> Option<Duration> {
        self.execute_timeout_ms.map(Duration::from_millis)
    }
}

/// Accepts `trace`, `debug`, `info`, `warn` or `error` in any case.
pub fn parse_log_level(value: &str) -> Result<Level, ModError> {
    value.parse::<Level>().map_err(|e| {
        ModError::Config(eyre::Report::new(e).wrap_err(format!("invalid log level `{value}`")))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn reads_environment() {
        let config = Config::from_lookup(lookup(&[
            ("DAGGER_MODULE", "hello-world"),
            ("DAGGER_DEFAULT_PYTHON_PACKAGE", "ci"),
            ("DAGGER_EXECUTE_TIMEOUT_MS", "1500"),
            ("DAGGER_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.log_level, Level::DEBUG);

        assert_eq!(config.module_name, "hello-world");
        assert_eq!(config.package, "ci");
        assert_eq!(config.main_object_name(), "HelloWorld");
        assert_eq!(config.execute_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.module_root, PathBuf::from("."));
    }

    #[test]
    fn explicit_main_object_wins() {
        let config = Config::from_lookup(lookup(&[
            ("DAGGER_MODULE", "hello"),
            ("DAGGER_MAIN_OBJECT", "Entry"),
        ]))
        .unwrap();

        assert_eq!(config.main_object_name(), "Entry");
        assert_eq!(config.package, "main");
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn invalid_environment() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("DAGGER_MODULE", "hello"),
            ("DAGGER_EXECUTE_TIMEOUT_MS", "soon"),
        ]))
        .is_err());
        assert!(Config::from_lookup(lookup(&[
            ("DAGGER_MODULE", "hello"),
            ("DAGGER_LOG_LEVEL", "chatty"),
        ]))
        .is_err());
    }

    #[test]
    fn builder_requires_module_name() {
        assert!(Config::builder().package("main").build().is_err());

        let config = Config::builder().module_name("hello").build().unwrap();
        assert_eq!(config.main_object_name(), "Hello");
        assert!(config.source_files.is_empty());
    }
}

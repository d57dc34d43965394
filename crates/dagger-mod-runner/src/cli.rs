use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Arg, ArgMatches};
use dagger_mod::core::config::{parse_log_level, LOG_LEVEL_ENV, MODULE_ENV};
use dagger_mod::logging::StdLogger;
use dagger_mod::{Config, DynLogger, Logger};

use crate::{cli_analyze, cli_typedefs};

pub struct Cli {
    cmd: clap::Command,
}

impl Cli {
    pub fn new() -> eyre::Result<Self> {
        Ok(Self {
            cmd: clap::Command::new("dagger-mod")
                .subcommand_required(true)
                .subcommand(cli_analyze::AnalyzeCommand::new_cmd())
                .subcommand(cli_typedefs::TypeDefsCommand::new_cmd()),
        })
    }

    pub async fn execute(self, args: &[&str]) -> eyre::Result<()> {
        let matches = self.cmd.get_matches_from(args);

        match matches.subcommand() {
            Some(("analyze", args)) => cli_analyze::AnalyzeCommand::exec(args).await?,
            Some(("typedefs", args)) => cli_typedefs::TypeDefsCommand::exec(args).await?,
            _ => eyre::bail!("command missing"),
        }

        Ok(())
    }
}

/// Arguments shared by every subcommand that loads a module.
pub fn module_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(Arg::new("output").long("output"))
        .arg(Arg::new("module-root").long("module-root"))
        .arg(Arg::new("module-name").long("module-name"))
        .arg(Arg::new("main-object").long("main-object"))
        .arg(Arg::new("package").long("package"))
        .arg(Arg::new("log-level").long("log-level"))
        .arg(
            Arg::new("files")
                .num_args(0..)
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

pub fn module_config(arg_matches: &ArgMatches) -> eyre::Result<Config> {
    let module_name = match arg_matches.get_one::<String>("module-name") {
        Some(name) => name.clone(),
        None => std::env::var(MODULE_ENV)
            .map_err(|_| eyre::eyre!("pass --module-name or set `{MODULE_ENV}`"))?,
    };

    let mut builder = Config::builder();
    builder.module_name(module_name);

    if let Some(root) = arg_matches.get_one::<String>("module-root") {
        builder.module_root(root);
    }
    if let Some(main_object) = arg_matches.get_one::<String>("main-object") {
        builder.main_object(main_object);
    }
    if let Some(package) = arg_matches.get_one::<String>("package") {
        builder.package(package);
    }
    if let Some(files) = arg_matches.get_many::<PathBuf>("files") {
        builder.source_files(files.cloned().collect::<Vec<_>>());
    }

    let log_level = arg_matches
        .get_one::<String>("log-level")
        .cloned()
        .or_else(|| std::env::var(LOG_LEVEL_ENV).ok());
    if let Some(level) = log_level {
        builder.log_level(parse_log_level(&level)?);
    }

    Ok(builder.build()?)
}

/// Loads the module configuration and starts logging at its level.
pub fn init(arg_matches: &ArgMatches) -> eyre::Result<Config> {
    let config = module_config(arg_matches)?;
    dagger_mod::logging::default_logging(config.log_level)?;

    Ok(config)
}

/// Writes to `--output` when given, stdout otherwise.
pub fn write_output(arg_matches: &ArgMatches, content: &str) -> eyre::Result<()> {
    if let Some(output) = arg_matches.get_one::<String>("output") {
        let mut file = std::fs::File::create(output)?;
        file.write_all(content.as_bytes())?;
    } else {
        let logger: DynLogger = Arc::new(StdLogger::default());
        logger.stdout(content)?;
    }

    Ok(())
}

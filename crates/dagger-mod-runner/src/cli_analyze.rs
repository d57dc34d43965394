use clap::ArgMatches;
use dagger_mod::Module;

use crate::cli::{init, module_args, write_output};

pub struct AnalyzeCommand;

impl AnalyzeCommand {
    pub fn new_cmd() -> clap::Command {
        module_args(
            clap::Command::new("analyze").about("Print the module's metadata as JSON"),
        )
    }

    pub async fn exec(arg_matches: &ArgMatches) -> eyre::Result<()> {
        let module = Module::load(init(arg_matches)?)?;
        let json = module.metadata().to_json()?;

        write_output(arg_matches, &json)
    }
}

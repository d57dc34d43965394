use std::sync::Arc;

use clap::ArgMatches;
use dagger_mod::typedef::{DynTypeDefClient, RecordingTypeDefClient};
use dagger_mod::Module;

use crate::cli::{init, module_args, write_output};

pub struct TypeDefsCommand;

impl TypeDefsCommand {
    pub fn new_cmd() -> clap::Command {
        module_args(
            clap::Command::new("typedefs").about("Print the types the module would register"),
        )
    }

    pub async fn exec(arg_matches: &ArgMatches) -> eyre::Result<()> {
        let module = Module::load(init(arg_matches)?)?;

        let recording = Arc::new(RecordingTypeDefClient::default());
        let client: DynTypeDefClient = recording.clone();
        module.register(&client).await?;

        let json = serde_json::to_string_pretty(&recording.snapshot().await)?;
        tracing::debug!(bytes = json.len(), "rendered type definitions");

        write_output(arg_matches, &json)
    }
}

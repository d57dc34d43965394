use std::sync::Arc;

use dagger_analyzer::discovery::find_module_files;
use dagger_analyzer::ModuleMetadata;

use crate::core::config::Config;
use crate::core::logger::Logger;
use crate::dispatch::{Dispatcher, InvocationResponse};
use crate::errors::{ModError, RegisterError};
use crate::register;
use crate::registry::Resolvers;
use crate::typedef::{DynTypeDefClient, ModuleTypeDefs};

/// An analyzed module, ready to register and serve.
pub struct Module {
    config: Config,
    metadata: Arc<ModuleMetadata>,
}

impl Module {
    /// Finds and analyzes the module's sources. Any analysis error aborts
    /// loading, so nothing gets registered for a broken module.
    pub fn load(config: Config) -> Result<Self, ModError> {
        let files = if config.source_files.is_empty() {
            find_module_files(&config.module_root, &config.package)?
        } else {
            config.source_files.clone()
        };

        let metadata = dagger_analyzer::analyze(
            &files,
            &config.module_name,
            &config.main_object_name(),
        )?;

        Ok(Self {
            config,
            metadata: Arc::new(metadata),
        })
    }

    pub fn from_metadata(config: Config, metadata: ModuleMetadata) -> Self {
        Self {
            config,
            metadata: Arc::new(metadata),
        }
    }

    pub fn metadata(&self) -> &Arc<ModuleMetadata> {
        &self.metadata
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn type_defs(&self) -> Result<ModuleTypeDefs, RegisterError> {
        register::plan(&self.metadata)
    }

    pub async fn register(&self, client: &DynTypeDefClient) -> Result<ModuleTypeDefs, ModError> {
        Ok(register::register(&self.metadata, client).await?)
    }

    pub fn dispatcher(&self, resolvers: Resolvers) -> Dispatcher {
        Dispatcher::new(self.metadata.clone(), resolvers)
            .with_execute_timeout(self.config.execute_timeout())
    }

    /// Answers one JSON request. The response goes to the configured
    /// logger's stdout, and failures are echoed to its stderr.
    pub async fn serve(&self, dispatcher: &Dispatcher, input: &str) -> eyre::Result<String> {
        let response = dispatcher.respond(input).await;
        let output = response.to_json();

        if let Some(logger) = &self.config.logger {
            logger.stdout(&output)?;
            if let InvocationResponse::Error(error) = &response {
                logger.stderr(&error.message)?;
            }
        }

        Ok(output)
    }
}

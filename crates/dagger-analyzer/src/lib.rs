pub mod annotations;
pub mod decorators;
pub mod discovery;
pub mod errors;
pub mod metadata;
pub mod naming;
pub mod parser;
pub mod syntax;

use std::path::Path;

pub use crate::errors::AnalysisError;
pub use crate::metadata::ModuleMetadata;
pub use crate::parser::{ModuleParser, ParsedModule};

/// Analyzes module sources into [`ModuleMetadata`] without running any of
/// them. The first error aborts the whole run.
pub fn analyze<P: AsRef<Path>>(
    files: &[P],
    module_name: &str,
    main_object: &str,
) -> Result<ModuleMetadata, AnalysisError> {
    tracing::info!(
        module = module_name,
        main_object = main_object,
        files = files.len(),
        "analyzing module"
    );

    let parsed = ModuleParser::new(files, main_object).parse()?;

    tracing::info!(
        objects = parsed.objects.len(),
        enums = parsed.enums.len(),
        "module analyzed"
    );

    Ok(ModuleMetadata {
        module_name: module_name.to_string(),
        main_object: main_object.to_string(),
        doc: parsed.doc,
        objects: parsed.objects,
        enums: parsed.enums,
    })
}

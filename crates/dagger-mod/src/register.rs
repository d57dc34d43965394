use std::sync::Arc;

use dagger_analyzer::metadata::{EnumDef, FunctionDef, ModuleMetadata, ObjectDef};
use itertools::Itertools;

use crate::errors::RegisterError;
use crate::typedef::{
    DynTypeDefClient, EnumMemberTypeDef, EnumTypeDef, FieldTypeDef, FunctionArgDef,
    FunctionTypeDef, InterfaceTypeDef, ModuleTypeDefs, ObjectTypeDef, TypeDef, TypeRef,
};

#[derive(Clone, Copy)]
pub enum Declaration<'m> {
    Enum(&'m EnumDef),
    Object(&'m ObjectDef),
}

impl Declaration<'_> {
    fn name(&self) -> &str {
        match self {
            Declaration::Enum(def) => &def.name,
            Declaration::Object(def) => &def.name,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Enum,
    Interface,
    Object,
}

pub struct Visitor<'m> {
    pub metadata: &'m ModuleMetadata,
    pub handlers: VisitHandlers,
}

pub type VisitFunc = Arc<dyn Fn(Declaration<'_>) -> eyre::Result<TypeDef>>;

pub struct VisitHandlers {
    pub visit_enum: VisitFunc,
    pub visit_interface: VisitFunc,
    pub visit_object: VisitFunc,
}

impl Default for VisitHandlers {
    fn default() -> Self {
        Self {
            visit_enum: Arc::new(enum_type_def),
            visit_interface: Arc::new(interface_type_def),
            visit_object: Arc::new(object_type_def),
        }
    }
}

struct SequenceItem {
    kind: Kind,
    handler: VisitFunc,
}

impl<'m> Visitor<'m> {
    pub fn new(metadata: &'m ModuleMetadata) -> Self {
        Self {
            metadata,
            handlers: VisitHandlers::default(),
        }
    }

    /// Visits enums, then interfaces, then objects, each kind by name.
    pub fn run(&self) -> eyre::Result<Vec<TypeDef>> {
        let sequence = vec![
            SequenceItem {
                kind: Kind::Enum,
                handler: self.handlers.visit_enum.clone(),
            },
            SequenceItem {
                kind: Kind::Interface,
                handler: self.handlers.visit_interface.clone(),
            },
            SequenceItem {
                kind: Kind::Object,
                handler: self.handlers.visit_object.clone(),
            },
        ];

        let mut type_defs = vec![];
        for item in sequence {
            type_defs.extend(self.visit(&item)?);
        }

        Ok(type_defs)
    }

    fn visit(&self, item: &SequenceItem) -> eyre::Result<Vec<TypeDef>> {
        let declarations: Vec<Declaration<'m>> = match item.kind {
            Kind::Enum => self.metadata.enums.values().map(Declaration::Enum).collect(),
            Kind::Interface | Kind::Object => self
                .metadata
                .objects
                .values()
                .filter(|o| o.is_interface == (item.kind == Kind::Interface))
                .map(Declaration::Object)
                .collect(),
        };

        declarations
            .into_iter()
            .sorted_by(|a, b| a.name().cmp(b.name()))
            .map(|declaration| (*item.handler)(declaration))
            .collect()
    }
}

fn expect_enum(declaration: Declaration<'_>) -> eyre::Result<&EnumDef> {
    match declaration {
        Declaration::Enum(def) => Ok(def),
        Declaration::Object(def) => Err(eyre::eyre!("`{}` is not an enum", def.name)),
    }
}

fn expect_object(declaration: Declaration<'_>) -> eyre::Result<&ObjectDef> {
    match declaration {
        Declaration::Object(def) => Ok(def),
        Declaration::Enum(def) => Err(eyre::eyre!("`{}` is not an object", def.name)),
    }
}

pub fn enum_type_def(declaration: Declaration<'_>) -> eyre::Result<TypeDef> {
    let def = expect_enum(declaration)?;

    Ok(TypeDef::Enum(EnumTypeDef {
        name: def.name.clone(),
        doc: def.doc.clone(),
        members: def
            .members
            .iter()
            .map(|m| EnumMemberTypeDef {
                name: m.name.clone(),
                value: m.value.clone(),
                doc: m.doc.clone(),
                deprecated: m.deprecated.clone(),
            })
            .collect(),
    }))
}

pub fn interface_type_def(declaration: Declaration<'_>) -> eyre::Result<TypeDef> {
    let def = expect_object(declaration)?;

    Ok(TypeDef::Interface(InterfaceTypeDef {
        name: def.name.clone(),
        doc: def.doc.clone(),
        functions: def.functions.iter().map(function_type_def).collect(),
    }))
}

pub fn object_type_def(declaration: Declaration<'_>) -> eyre::Result<TypeDef> {
    let def = expect_object(declaration)?;

    let fields = def
        .exposed_fields()
        .map(|f| FieldTypeDef {
            name: f.api_name.clone(),
            type_ref: TypeRef::from(&f.ty),
            doc: f.doc.clone(),
            deprecated: f.deprecated.clone(),
        })
        .collect();

    // Constructors always return the object, whatever `__init__` is annotated with.
    let constructor = match &def.constructor {
        Some(constructor) => FunctionTypeDef {
            return_type: TypeRef::object(&def.name),
            ..function_type_def(constructor)
        },
        None => FunctionTypeDef {
            name: String::new(),
            original_name: "__init__".into(),
            return_type: TypeRef::object(&def.name),
            args: def
                .construction_params()
                .iter()
                .map(|p| FunctionArgDef {
                    name: p.api_name.clone(),
                    type_ref: TypeRef::from(&p.ty),
                    doc: p.doc.clone(),
                    default_value: p.default_value.clone(),
                    default_path: p.default_path.clone(),
                    ignore: p.ignore.clone(),
                    deprecated: p.deprecated.clone(),
                })
                .collect(),
            doc: None,
            check: false,
            cache_policy: None,
            deprecated: None,
        },
    };

    Ok(TypeDef::Object(ObjectTypeDef {
        name: def.name.clone(),
        doc: def.doc.clone(),
        deprecated: def.deprecated.clone(),
        fields,
        functions: def.functions.iter().map(function_type_def).collect(),
        constructor: Some(constructor),
    }))
}

fn function_type_def(function: &FunctionDef) -> FunctionTypeDef {
    FunctionTypeDef {
        name: function.api_name.clone(),
        original_name: function.original_name.clone(),
        return_type: function
            .return_type
            .as_ref()
            .map(TypeRef::from)
            .unwrap_or_else(TypeRef::void),
        args: function
            .parameters
            .iter()
            .map(|p| FunctionArgDef {
                name: p.api_name.clone(),
                type_ref: TypeRef::from(&p.ty),
                doc: p.doc.clone(),
                default_value: p.default_value.clone(),
                default_path: p.default_path.clone(),
                ignore: p.ignore.clone(),
                deprecated: p.deprecated.clone(),
            })
            .collect(),
        doc: function.doc.clone(),
        check: function.is_check,
        cache_policy: function.cache_policy.as_ref().map(|c| c.as_str().to_string()),
        deprecated: function.deprecated.clone(),
    }
}

/// Builds the full announcement without talking to the engine.
pub fn plan(metadata: &ModuleMetadata) -> Result<ModuleTypeDefs, RegisterError> {
    let types = Visitor::new(metadata).run().map_err(RegisterError::Plan)?;

    Ok(ModuleTypeDefs {
        name: metadata.module_name.clone(),
        doc: metadata.doc.clone(),
        types,
    })
}

/// Announces the module and each of its types. Stops at the first failure.
pub async fn register(
    metadata: &ModuleMetadata,
    client: &DynTypeDefClient,
) -> Result<ModuleTypeDefs, RegisterError> {
    let plan = plan(metadata)?;

    client
        .with_module(&plan.name, plan.doc.as_deref())
        .await
        .map_err(|source| RegisterError::Module {
            name: plan.name.clone(),
            source,
        })?;

    for type_def in &plan.types {
        tracing::debug!(module = %plan.name, name = type_def.name(), "announcing type");
        client
            .with_type_def(type_def.clone())
            .await
            .map_err(|source| RegisterError::TypeDef {
                name: type_def.name().to_string(),
                source,
            })?;
    }

    tracing::info!(module = %plan.name, types = plan.types.len(), "module registered");

    Ok(plan)
}

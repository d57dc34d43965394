//! Type definitions announced to the engine when a module registers.

use std::sync::Arc;

use async_trait::async_trait;
use dagger_analyzer::metadata::{TypeDescriptor, TypeKind};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeRefKind {
    String,
    Integer,
    Float,
    Boolean,
    Void,
    List { element: Box<TypeRef> },
    Object { name: String },
    Interface { name: String },
    Enum { name: String },
    Scalar { name: String },
    External { name: String },
    Union { members: Vec<TypeRef> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    #[serde(flatten)]
    pub kind: TypeRefKind,
    #[serde(default)]
    pub optional: bool,
}

impl TypeRef {
    pub fn void() -> Self {
        Self {
            kind: TypeRefKind::Void,
            optional: true,
        }
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self {
            kind: TypeRefKind::Object { name: name.into() },
            optional: false,
        }
    }
}

impl From<&TypeDescriptor> for TypeRef {
    fn from(ty: &TypeDescriptor) -> Self {
        let name = || ty.base_name.clone();
        let kind = match ty.kind {
            TypeKind::Void => return TypeRef::void(),
            TypeKind::Primitive => match ty.base_name.as_str() {
                "int" => TypeRefKind::Integer,
                "float" => TypeRefKind::Float,
                "bool" => TypeRefKind::Boolean,
                _ => TypeRefKind::String,
            },
            TypeKind::List => TypeRefKind::List {
                element: Box::new(
                    ty.element()
                        .map(TypeRef::from)
                        .unwrap_or_else(TypeRef::void),
                ),
            },
            TypeKind::Object => TypeRefKind::Object { name: name() },
            TypeKind::Interface => TypeRefKind::Interface { name: name() },
            TypeKind::Enum => TypeRefKind::Enum { name: name() },
            TypeKind::Scalar => TypeRefKind::Scalar { name: name() },
            TypeKind::External => TypeRefKind::External { name: name() },
            TypeKind::Union => TypeRefKind::Union {
                members: ty.type_args.iter().map(TypeRef::from).collect(),
            },
        };

        TypeRef {
            kind,
            optional: ty.is_optional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionArgDef {
    pub name: String,
    pub type_ref: TypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTypeDef {
    pub name: String,
    pub original_name: String,
    pub return_type: TypeRef,
    #[serde(default)]
    pub args: Vec<FunctionArgDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default)]
    pub check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTypeDef {
    pub name: String,
    pub type_ref: TypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectTypeDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldTypeDef>,
    #[serde(default)]
    pub functions: Vec<FunctionTypeDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<FunctionTypeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceTypeDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default)]
    pub functions: Vec<FunctionTypeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMemberTypeDef {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumTypeDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub members: Vec<EnumMemberTypeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDef {
    Object(ObjectTypeDef),
    Interface(InterfaceTypeDef),
    Enum(EnumTypeDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Object(object) => &object.name,
            TypeDef::Interface(interface) => &interface.name,
            TypeDef::Enum(enum_def) => &enum_def.name,
        }
    }
}

/// Everything a module announces, in announcement order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleTypeDefs {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub types: Vec<TypeDef>,
}

impl ModuleTypeDefs {
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name() == name)
    }
}

/// Receives type announcements. Implemented by the engine connection; the
/// wire encoding of each call belongs there.
#[async_trait]
pub trait TypeDefClient {
    async fn with_module(&self, name: &str, doc: Option<&str>) -> eyre::Result<()>;
    async fn with_type_def(&self, type_def: TypeDef) -> eyre::Result<()>;
}

pub type DynTypeDefClient = Arc<dyn TypeDefClient + Send + Sync>;

/// Keeps announcements in memory.
#[derive(Default)]
pub struct RecordingTypeDefClient {
    recorded: Mutex<ModuleTypeDefs>,
}

impl RecordingTypeDefClient {
    pub async fn snapshot(&self) -> ModuleTypeDefs {
        self.recorded.lock().await.clone()
    }
}

#[async_trait]
impl TypeDefClient for RecordingTypeDefClient {
    async fn with_module(&self, name: &str, doc: Option<&str>) -> eyre::Result<()> {
        let mut recorded = self.recorded.lock().await;
        recorded.name = name.to_string();
        recorded.doc = doc.map(str::to_string);

        Ok(())
    }

    async fn with_type_def(&self, type_def: TypeDef) -> eyre::Result<()> {
        let mut recorded = self.recorded.lock().await;
        if recorded.get(type_def.name()).is_some() {
            eyre::bail!("type `{}` announced twice", type_def.name());
        }
        recorded.types.push(type_def);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn type_refs_follow_descriptors() {
        let ty = TypeDescriptor::list_of(TypeDescriptor::named(TypeKind::Object, "Foo").optional());

        let type_ref = TypeRef::from(&ty);

        assert_eq!(
            serde_json::to_value(&type_ref).unwrap(),
            json!({
                "kind": "list",
                "element": {"kind": "object", "name": "Foo", "optional": true},
                "optional": false,
            })
        );
    }

    #[tokio::test]
    async fn recording_client_rejects_duplicates() {
        let client = RecordingTypeDefClient::default();
        let enum_def = TypeDef::Enum(EnumTypeDef {
            name: "Severity".into(),
            doc: None,
            members: vec![],
        });

        client.with_module("test", Some("docs")).await.unwrap();
        client.with_type_def(enum_def.clone()).await.unwrap();
        let err = client.with_type_def(enum_def).await.unwrap_err();

        let recorded = client.snapshot().await;
        assert_eq!(recorded.name, "test");
        assert_eq!(recorded.types.len(), 1);
        assert!(err.to_string().contains("announced twice"));
    }
}

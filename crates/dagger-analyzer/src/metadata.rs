//! Resolved module metadata.
//!
//! This is the single source of truth produced by the parser and consumed by
//! both type registration and runtime dispatch. It is built once per analysis
//! run and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationMetadata {
    pub file: String,
    pub line: usize,
    pub column: usize,
    #[serde(default)]
    pub end_line: usize,
}

impl LocationMetadata {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            end_line: line,
        }
    }
}

impl fmt::Display for LocationMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Primitive,
    List,
    Object,
    Interface,
    Enum,
    /// Engine scalars such as `Platform` or `JSON`, passed through untouched.
    Scalar,
    /// Engine-managed objects (containers, directories, ...) referenced by ID.
    External,
    Union,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    Doc,
    Name,
    DefaultPath,
    Ignore,
    Deprecated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub base_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_args: Vec<TypeDescriptor>,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub is_list: bool,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotated_metadata: Vec<(MetadataKind, MetadataValue)>,
}

impl TypeDescriptor {
    pub fn named(kind: TypeKind, base_name: impl Into<String>) -> Self {
        Self {
            kind,
            base_name: base_name.into(),
            type_args: vec![],
            is_optional: false,
            is_list: false,
            is_self: false,
            annotated_metadata: vec![],
        }
    }

    pub fn primitive(name: &str) -> Self {
        Self::named(TypeKind::Primitive, name)
    }

    pub fn void() -> Self {
        Self {
            is_optional: true,
            ..Self::named(TypeKind::Void, "None")
        }
    }

    pub fn list_of(element: TypeDescriptor) -> Self {
        Self {
            is_list: true,
            type_args: vec![element],
            ..Self::named(TypeKind::List, "list")
        }
    }

    pub fn union_of(members: Vec<TypeDescriptor>) -> Self {
        Self {
            type_args: members,
            ..Self::named(TypeKind::Union, "Union")
        }
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn element(&self) -> Option<&TypeDescriptor> {
        match self.kind {
            TypeKind::List => self.type_args.first(),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.kind == TypeKind::Void
    }

    /// Whether `None` is an acceptable value for this type.
    pub fn accepts_null(&self) -> bool {
        self.is_optional || self.is_void()
    }

    pub fn metadata(&self, kind: MetadataKind) -> Option<&MetadataValue> {
        self.annotated_metadata
            .iter()
            .rev()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v)
    }

    pub fn metadata_text(&self, kind: MetadataKind) -> Option<&str> {
        match self.metadata(kind)? {
            MetadataValue::Text(text) => Some(text.as_str()),
            MetadataValue::List(_) => None,
        }
    }

    pub fn metadata_list(&self, kind: MetadataKind) -> Option<&[String]> {
        match self.metadata(kind)? {
            MetadataValue::List(items) => Some(items.as_slice()),
            MetadataValue::Text(_) => None,
        }
    }

    /// Records a metadata entry, replacing any earlier entry of the same kind.
    pub fn set_metadata(&mut self, kind: MetadataKind, value: MetadataValue) {
        self.annotated_metadata.retain(|(k, _)| *k != kind);
        self.annotated_metadata.push((kind, value));
    }

    /// Renders the descriptor back into a canonical annotation string.
    pub fn render(&self) -> String {
        let inner = match self.kind {
            TypeKind::Void => return "None".to_string(),
            TypeKind::List => format!(
                "list[{}]",
                self.element()
                    .map(|e| e.render())
                    .unwrap_or_else(|| "None".to_string())
            ),
            TypeKind::Union => self.type_args.iter().map(|t| t.render()).join(" | "),
            _ => self.base_name.clone(),
        };

        if self.is_optional {
            format!("{inner} | None")
        } else {
            inner
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    Never,
    Session,
    Ttl(String),
}

impl CachePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "never" => Some(CachePolicy::Never),
            "session" => Some(CachePolicy::Session),
            ttl if is_duration(ttl) => Some(CachePolicy::Ttl(ttl.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CachePolicy::Never => "never",
            CachePolicy::Session => "session",
            CachePolicy::Ttl(ttl) => ttl,
        }
    }
}

/// Accepts Go-style durations made of `<digits><unit>` pairs, e.g. `1h30m`.
fn is_duration(value: &str) -> bool {
    const UNITS: [&str; 6] = ["ns", "us", "ms", "s", "m", "h"];

    let mut rest = value;
    if rest.is_empty() {
        return false;
    }

    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return false;
        }
        rest = &rest[digits..];

        let Some(unit) = UNITS
            .iter()
            .filter(|unit| rest.starts_with(*unit))
            .max_by_key(|unit| unit.len())
        else {
            return false;
        };
        rest = &rest[unit.len()..];
    }

    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub api_name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    pub has_default: bool,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub alt_name: Option<String>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub default_path: Option<String>,
    #[serde(default)]
    pub ignore: Option<Vec<String>>,
    #[serde(default)]
    pub deprecated: Option<String>,
    #[serde(default)]
    pub location: Option<LocationMetadata>,
}

impl ParameterDef {
    /// Whether the caller may omit this parameter.
    pub fn is_optional(&self) -> bool {
        self.has_default || self.ty.is_optional || self.default_path.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub original_name: String,
    pub api_name: String,
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub return_type: Option<TypeDescriptor>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_classmethod: bool,
    #[serde(default)]
    pub is_constructor: bool,
    #[serde(default)]
    pub is_check: bool,
    #[serde(default)]
    pub cache_policy: Option<CachePolicy>,
    #[serde(default)]
    pub deprecated: Option<String>,
    #[serde(default)]
    pub location: Option<LocationMetadata>,
}

impl FunctionDef {
    pub fn parameter(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn parameter_by_api_name(&self, api_name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.api_name == api_name)
    }

    pub fn returns_void(&self) -> bool {
        self.return_type.as_ref().map(|t| t.is_void()).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub original_name: String,
    pub api_name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    pub has_default: bool,
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
    /// Name of a zero-argument callable producing the default; never evaluated
    /// by the analyzer.
    #[serde(default)]
    pub default_factory: Option<String>,
    #[serde(default)]
    pub alt_name: Option<String>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub deprecated: Option<String>,
    /// Declared with `field()` and therefore visible in the API.
    #[serde(default)]
    pub exposed: bool,
    /// Part of the generated constructor.
    #[serde(default = "default_true")]
    pub init: bool,
    #[serde(default)]
    pub location: Option<LocationMetadata>,
}

fn default_true() -> bool {
    true
}

impl FieldDef {
    pub fn is_required(&self) -> bool {
        !self.has_default && !self.ty.is_optional
    }

    pub fn to_parameter(&self) -> ParameterDef {
        ParameterDef {
            name: self.original_name.clone(),
            api_name: self.api_name.clone(),
            ty: self.ty.clone(),
            has_default: self.has_default,
            default_value: self.default_value.clone(),
            alt_name: self.alt_name.clone(),
            doc: self.doc.clone(),
            default_path: None,
            ignore: None,
            deprecated: self.deprecated.clone(),
            location: self.location.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub fields: Vec<FieldDef>,
    pub functions: Vec<FunctionDef>,
    #[serde(default)]
    pub constructor: Option<FunctionDef>,
    #[serde(default)]
    pub is_interface: bool,
    #[serde(default)]
    pub deprecated: Option<String>,
    #[serde(default)]
    pub location: Option<LocationMetadata>,
}

impl ObjectDef {
    /// Finds a function by API name, falling back to the native name.
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions
            .iter()
            .find(|f| f.api_name == name)
            .or_else(|| self.functions.iter().find(|f| f.original_name == name))
    }

    /// Finds a field by API name, falling back to the native name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.api_name == name)
            .or_else(|| self.fields.iter().find(|f| f.original_name == name))
    }

    pub fn exposed_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.exposed)
    }

    /// Parameters accepted when constructing a fresh instance.
    pub fn construction_params(&self) -> Vec<ParameterDef> {
        match &self.constructor {
            Some(constructor) => constructor.parameters.clone(),
            None => self
                .fields
                .iter()
                .filter(|f| f.init)
                .map(FieldDef::to_parameter)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumMemberDef {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub deprecated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub members: Vec<EnumMemberDef>,
    #[serde(default)]
    pub location: Option<LocationMetadata>,
}

impl EnumDef {
    pub fn member_by_value(&self, value: &str) -> Option<&EnumMemberDef> {
        self.members.iter().find(|m| m.value == value)
    }

    pub fn member_by_name(&self, name: &str) -> Option<&EnumMemberDef> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub module_name: String,
    pub main_object: String,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectDef>,
    #[serde(default)]
    pub enums: BTreeMap<String, EnumDef>,
}

impl ModuleMetadata {
    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        self.objects.get(name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.get(name)
    }

    pub fn main(&self) -> Option<&ObjectDef> {
        self.objects.get(&self.main_object)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn render_optional_list_of_optionals() {
        let ty = TypeDescriptor::list_of(TypeDescriptor::primitive("str").optional()).optional();

        assert_eq!(ty.render(), "list[str | None] | None");
    }

    #[test]
    fn render_union() {
        let ty = TypeDescriptor::union_of(vec![
            TypeDescriptor::primitive("str"),
            TypeDescriptor::primitive("int"),
        ])
        .optional();

        assert_eq!(ty.render(), "str | int | None");
    }

    #[test]
    fn set_metadata_replaces_same_kind() {
        let mut ty = TypeDescriptor::primitive("str");
        ty.set_metadata(MetadataKind::Name, MetadataValue::Text("a".into()));
        ty.set_metadata(MetadataKind::Doc, MetadataValue::Text("doc".into()));
        ty.set_metadata(MetadataKind::Name, MetadataValue::Text("b".into()));

        assert_eq!(ty.metadata_text(MetadataKind::Name), Some("b"));
        assert_eq!(ty.annotated_metadata.len(), 2);
    }

    #[test]
    fn cache_policy_accepts_durations() {
        assert_eq!(CachePolicy::parse("never"), Some(CachePolicy::Never));
        assert_eq!(
            CachePolicy::parse("1h30m"),
            Some(CachePolicy::Ttl("1h30m".into()))
        );
        assert_eq!(CachePolicy::parse("10ms").map(|c| c.as_str().to_string()), Some("10ms".into()));
        assert_eq!(CachePolicy::parse("forever"), None);
        assert_eq!(CachePolicy::parse("10"), None);
        assert_eq!(CachePolicy::parse(""), None);
    }

    #[test]
    fn metadata_json_roundtrip_keeps_structure() {
        let metadata = ModuleMetadata {
            module_name: "test".into(),
            main_object: "Test".into(),
            doc: Some("docs".into()),
            objects: BTreeMap::new(),
            enums: BTreeMap::from([(
                "Severity".to_string(),
                EnumDef {
                    name: "Severity".into(),
                    doc: None,
                    members: vec![EnumMemberDef {
                        name: "LOW".into(),
                        value: "low".into(),
                        doc: None,
                        deprecated: None,
                    }],
                    location: None,
                },
            )]),
        };

        let json = metadata.to_json().unwrap();
        let back = ModuleMetadata::from_json(&json).unwrap();

        assert_eq!(back, metadata);
    }
}

//! Resolution of type annotations into [`TypeDescriptor`]s.
//!
//! Annotations are never evaluated. Names are looked up in the set of
//! declarations collected for the current analysis run, then in a fixed table
//! of engine-provided types.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::AnalysisError;
use crate::metadata::{
    LocationMetadata, MetadataKind, MetadataValue, TypeDescriptor, TypeKind,
};
use crate::syntax::{BinOperator, Constant, Expr, SyntaxParser, UnaryOperator};

const PRIMITIVES: [&str; 4] = ["str", "int", "float", "bool"];

const SCALARS: [&str; 2] = ["Platform", "JSON"];

const EXTERNAL_TYPES: [&str; 31] = [
    "Binding",
    "CacheVolume",
    "Changeset",
    "Cloud",
    "Container",
    "CurrentModule",
    "Directory",
    "Engine",
    "Env",
    "EnvVariable",
    "Error",
    "File",
    "Function",
    "FunctionCall",
    "GeneratedCode",
    "GitRef",
    "GitRepository",
    "Host",
    "Label",
    "LLM",
    "Module",
    "ModuleSource",
    "Port",
    "SDKConfig",
    "Secret",
    "Service",
    "Socket",
    "SourceMap",
    "Terminal",
    "TypeDef",
    "Void",
];

/// Names declared by the sources under analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclaredNames {
    pub objects: BTreeSet<String>,
    pub interfaces: BTreeSet<String>,
    /// Enum name to `(member name, wire value)` pairs.
    pub enums: BTreeMap<String, Vec<(String, String)>>,
}

impl DeclaredNames {
    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        if self.objects.contains(name) {
            Some(TypeKind::Object)
        } else if self.interfaces.contains(name) {
            Some(TypeKind::Interface)
        } else if self.enums.contains_key(name) {
            Some(TypeKind::Enum)
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    fn enum_member_value(&self, enum_name: &str, member: &str) -> Option<&str> {
        self.enums
            .get(enum_name)?
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| value.as_str())
    }
}

pub struct TypeResolver {
    declared: DeclaredNames,
    current_class: Option<String>,
    parser: SyntaxParser,
}

impl TypeResolver {
    pub fn new(declared: DeclaredNames) -> Result<Self, AnalysisError> {
        Ok(Self {
            declared,
            current_class: None,
            parser: SyntaxParser::new()?,
        })
    }

    pub fn declared(&self) -> &DeclaredNames {
        &self.declared
    }

    /// Makes enum member values available to default value resolution.
    pub fn register_enum_members(&mut self, name: &str, members: Vec<(String, String)>) {
        self.declared.enums.insert(name.to_string(), members);
    }

    /// Sets the class `Self` refers to.
    pub fn set_current_class(&mut self, class: Option<&str>) {
        self.current_class = class.map(str::to_string);
    }

    pub fn resolve(
        &mut self,
        annotation: &Expr,
        location: &LocationMetadata,
    ) -> Result<TypeDescriptor, AnalysisError> {
        match annotation {
            Expr::Constant(Constant::None) => Ok(TypeDescriptor::void()),
            Expr::Constant(Constant::Str(text)) => self.resolve_forward_ref(text, location),
            Expr::Name(_) | Expr::Attribute { .. } => self.resolve_name(annotation, location),
            Expr::BinOp {
                op: BinOperator::BitOr,
                ..
            } => {
                let mut members = vec![];
                union_members(annotation, &mut members);
                self.resolve_union(&members, location)
            }
            Expr::Subscript { value, slice } => self.resolve_generic(value, slice, location),
            other => Err(AnalysisError::type_resolution(
                "not a type expression",
                other.to_string(),
                location,
            )),
        }
    }

    fn resolve_forward_ref(
        &mut self,
        text: &str,
        location: &LocationMetadata,
    ) -> Result<TypeDescriptor, AnalysisError> {
        let parsed = self.parser.parse_expression(text).ok_or_else(|| {
            AnalysisError::type_resolution("invalid forward reference", text, location)
        })?;

        if matches!(parsed, Expr::Constant(Constant::Str(_))) {
            return Err(AnalysisError::type_resolution(
                "nested forward reference",
                text,
                location,
            ));
        }

        self.resolve(&parsed, location)
    }

    fn self_type(&self, location: &LocationMetadata) -> Result<TypeDescriptor, AnalysisError> {
        let Some(class) = &self.current_class else {
            return Err(AnalysisError::type_resolution(
                "`Self` used outside of a class",
                "Self",
                location,
            ));
        };

        let kind = self.declared.kind_of(class).unwrap_or(TypeKind::Object);
        Ok(TypeDescriptor {
            is_self: true,
            ..TypeDescriptor::named(kind, class.clone())
        })
    }

    fn resolve_name(
        &mut self,
        expr: &Expr,
        location: &LocationMetadata,
    ) -> Result<TypeDescriptor, AnalysisError> {
        let Some(name) = expr.identifier() else {
            return Err(AnalysisError::type_resolution(
                "not a type name",
                expr.to_string(),
                location,
            ));
        };

        if name == "Self" || self.current_class.as_deref() == Some(name) {
            return self.self_type(location);
        }

        if PRIMITIVES.contains(&name) {
            return Ok(TypeDescriptor::primitive(name));
        }

        if name == "NoneType" {
            return Ok(TypeDescriptor::void());
        }

        if let Some(kind) = self.declared.kind_of(name) {
            return Ok(TypeDescriptor::named(kind, name));
        }

        if SCALARS.contains(&name) || (name.len() > 2 && name.ends_with("ID")) {
            return Ok(TypeDescriptor::named(TypeKind::Scalar, name));
        }

        if EXTERNAL_TYPES.contains(&name) || is_dagger_attribute(expr) {
            return Ok(TypeDescriptor::named(TypeKind::External, name));
        }

        let message = match name {
            "list" | "List" | "Sequence" | "Optional" | "Union" | "Annotated" => {
                "missing type arguments".to_string()
            }
            _ => format!("unknown type `{name}`"),
        };
        Err(AnalysisError::type_resolution(
            message,
            expr.to_string(),
            location,
        ))
    }

    fn resolve_union(
        &mut self,
        members: &[&Expr],
        location: &LocationMetadata,
    ) -> Result<TypeDescriptor, AnalysisError> {
        let mut optional = false;
        let mut resolved: Vec<TypeDescriptor> = vec![];

        for member in members {
            let mut ty = self.resolve(member, location)?;
            if ty.is_void() {
                optional = true;
                continue;
            }
            if ty.is_optional {
                optional = true;
                ty.is_optional = false;
            }

            let flattened = if ty.kind == TypeKind::Union {
                ty.type_args
            } else {
                vec![ty]
            };
            for ty in flattened {
                if !resolved.contains(&ty) {
                    resolved.push(ty);
                }
            }
        }

        let ty = match resolved.len() {
            0 => return Ok(TypeDescriptor::void()),
            1 => resolved.remove(0),
            _ => TypeDescriptor::union_of(resolved),
        };

        Ok(TypeDescriptor {
            is_optional: ty.is_optional || optional,
            ..ty
        })
    }

    fn resolve_generic(
        &mut self,
        value: &Expr,
        slice: &[Expr],
        location: &LocationMetadata,
    ) -> Result<TypeDescriptor, AnalysisError> {
        let name = value.identifier().unwrap_or_default();
        let annotation = || Expr::Subscript {
            value: Box::new(value.clone()),
            slice: slice.to_vec(),
        };

        match (name, slice) {
            ("Optional", [inner]) => {
                let none = Expr::Constant(Constant::None);
                self.resolve_union(&[inner, &none], location)
            }
            ("Union", members) if !members.is_empty() => {
                let members: Vec<&Expr> = members.iter().collect();
                self.resolve_union(&members, location)
            }
            ("list" | "List" | "Sequence", [element]) => {
                let element = self.resolve(element, location)?;
                if element.is_void() {
                    return Err(AnalysisError::type_resolution(
                        "list element type cannot be None",
                        annotation().to_string(),
                        location,
                    ));
                }
                Ok(TypeDescriptor::list_of(element))
            }
            ("Annotated", [inner, metadata @ ..]) => {
                let mut ty = self.resolve(inner, location)?;
                for entry in metadata {
                    apply_metadata(&mut ty, entry, location)?;
                }
                Ok(ty)
            }
            ("dict" | "Dict" | "Mapping" | "tuple" | "Tuple" | "set" | "Set", _) => {
                Err(AnalysisError::type_resolution(
                    format!("unsupported generic type `{name}`"),
                    annotation().to_string(),
                    location,
                ))
            }
            _ => Err(AnalysisError::type_resolution(
                "unsupported type expression",
                annotation().to_string(),
                location,
            )),
        }
    }

    /// Converts a default value expression into its literal JSON form.
    pub fn resolve_default(
        &self,
        expr: &Expr,
        location: &LocationMetadata,
    ) -> Result<serde_json::Value, AnalysisError> {
        let non_literal = || {
            AnalysisError::type_resolution(
                "default values must be literals",
                expr.to_string(),
                location,
            )
        };

        match expr {
            Expr::Constant(constant) => match constant {
                Constant::None => Ok(serde_json::Value::Null),
                Constant::Bool(value) => Ok((*value).into()),
                Constant::Int(value) => Ok((*value).into()),
                Constant::Float(value) => serde_json::Number::from_f64(*value)
                    .map(serde_json::Value::Number)
                    .ok_or_else(non_literal),
                Constant::Str(value) => Ok(value.clone().into()),
                Constant::FormattedStr(_) | Constant::Ellipsis => Err(non_literal()),
            },
            Expr::UnaryOp { op, operand } => {
                let value = self.resolve_default(operand, location)?;
                match (op, value) {
                    (UnaryOperator::Pos, value @ serde_json::Value::Number(_)) => Ok(value),
                    (UnaryOperator::Neg, serde_json::Value::Number(n)) => {
                        if let Some(i) = n.as_i64() {
                            Ok((-i).into())
                        } else {
                            n.as_f64()
                                .and_then(|f| serde_json::Number::from_f64(-f))
                                .map(serde_json::Value::Number)
                                .ok_or_else(non_literal)
                        }
                    }
                    _ => Err(non_literal()),
                }
            }
            Expr::List(items) | Expr::Tuple(items) => items
                .iter()
                .map(|item| self.resolve_default(item, location))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            Expr::Dict(items) => {
                let mut map = serde_json::Map::new();
                for (key, value) in items {
                    let Some(key) = key.as_str() else {
                        return Err(non_literal());
                    };
                    map.insert(key.to_string(), self.resolve_default(value, location)?);
                }
                Ok(serde_json::Value::Object(map))
            }
            Expr::Attribute { value, attr } => value
                .identifier()
                .and_then(|enum_name| self.declared.enum_member_value(enum_name, attr))
                .map(|member| serde_json::Value::String(member.to_string()))
                .ok_or_else(non_literal),
            _ => Err(non_literal()),
        }
    }
}

fn union_members<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::BinOp {
            left,
            op: BinOperator::BitOr,
            right,
        } => {
            union_members(left, out);
            union_members(right, out);
        }
        other => out.push(other),
    }
}

fn is_dagger_attribute(expr: &Expr) -> bool {
    matches!(expr, Expr::Attribute { value, .. } if matches!(value.as_ref(), Expr::Name(module) if module == "dagger"))
}

fn metadata_kind(name: &str) -> Option<(MetadataKind, &'static str)> {
    match name {
        "Doc" => Some((MetadataKind::Doc, "documentation")),
        "Name" | "Arg" => Some((MetadataKind::Name, "name")),
        "DefaultPath" => Some((MetadataKind::DefaultPath, "from_context")),
        "Ignore" => Some((MetadataKind::Ignore, "patterns")),
        "Deprecated" => Some((MetadataKind::Deprecated, "reason")),
        _ => None,
    }
}

/// Records one trailing `Annotated[...]` entry. Entries that are not calls
/// to a known marker are ignored.
fn apply_metadata(
    ty: &mut TypeDescriptor,
    entry: &Expr,
    location: &LocationMetadata,
) -> Result<(), AnalysisError> {
    let Expr::Call {
        func,
        args,
        keywords,
    } = entry
    else {
        return Ok(());
    };
    let Some((kind, keyword)) = func.identifier().and_then(metadata_kind) else {
        return Ok(());
    };

    let argument = args.first().or_else(|| {
        keywords
            .iter()
            .find(|k| k.arg.as_deref() == Some(keyword))
            .map(|k| &k.value)
    });

    let value = match (kind, argument) {
        (MetadataKind::Deprecated, None) => MetadataValue::Text(String::new()),
        (MetadataKind::Deprecated, Some(Expr::Constant(Constant::None))) => {
            MetadataValue::Text(String::new())
        }
        (MetadataKind::Ignore, Some(Expr::List(items) | Expr::Tuple(items))) => {
            let patterns = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    AnalysisError::decorator(
                        format!("`{entry}` expects a list of string literals"),
                        location,
                    )
                })?;
            MetadataValue::List(patterns)
        }
        (MetadataKind::Ignore, _) => {
            return Err(AnalysisError::decorator(
                format!("`{entry}` expects a list of string literals"),
                location,
            ))
        }
        (_, Some(Expr::Constant(Constant::Str(text)))) => MetadataValue::Text(text.clone()),
        _ => {
            return Err(AnalysisError::decorator(
                format!("`{entry}` expects a string literal"),
                location,
            ))
        }
    };

    ty.set_metadata(kind, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn resolver() -> TypeResolver {
        let declared = DeclaredNames {
            objects: BTreeSet::from(["Foo".to_string()]),
            interfaces: BTreeSet::from(["Greeter".to_string()]),
            enums: BTreeMap::from([(
                "Severity".to_string(),
                vec![
                    ("LOW".to_string(), "low".to_string()),
                    ("HIGH".to_string(), "high".to_string()),
                ],
            )]),
        };
        TypeResolver::new(declared).unwrap()
    }

    fn resolve(resolver: &mut TypeResolver, annotation: &str) -> Result<TypeDescriptor, AnalysisError> {
        let expr = SyntaxParser::new()
            .unwrap()
            .parse_expression(annotation)
            .unwrap();
        resolver.resolve(&expr, &LocationMetadata::new("main.py", 1, 0))
    }

    #[test]
    fn optional_spellings_are_equivalent() {
        let mut resolver = resolver();

        let a = resolve(&mut resolver, "Optional[str]").unwrap();
        let b = resolve(&mut resolver, "str | None").unwrap();
        let c = resolve(&mut resolver, "Union[str, None]").unwrap();
        let d = resolve(&mut resolver, "'str | None'").unwrap();

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, d);
        assert!(a.is_optional);
        assert_eq!(a.render(), "str | None");
    }

    #[test]
    fn nested_lists_render_canonically() {
        let mut resolver = resolver();

        let ty = resolve(&mut resolver, "Optional[List[Optional[str]]]").unwrap();

        assert!(ty.is_list);
        assert!(ty.is_optional);
        assert_eq!(ty.render(), "list[str | None] | None");
        assert_eq!(
            resolve(&mut resolver, &ty.render()).unwrap(),
            ty,
            "rendered signature resolves back to the same descriptor"
        );
    }

    #[test]
    fn last_annotated_name_wins() {
        let mut resolver = resolver();

        let ty = resolve(&mut resolver, r#"Annotated[str, Name("a"), Doc("x"), Name("b")]"#)
            .unwrap();

        assert_eq!(ty.metadata_text(MetadataKind::Name), Some("b"));
        assert_eq!(ty.metadata_text(MetadataKind::Doc), Some("x"));
    }

    #[test]
    fn annotated_metadata_kinds() {
        let mut resolver = resolver();

        let ty = resolve(
            &mut resolver,
            r#"Annotated[Directory, DefaultPath("."), Ignore([".git", "*.pyc"]), Deprecated(), some_other_marker]"#,
        )
        .unwrap();

        assert_eq!(ty.kind, TypeKind::External);
        assert_eq!(ty.metadata_text(MetadataKind::DefaultPath), Some("."));
        assert_eq!(
            ty.metadata_list(MetadataKind::Ignore),
            Some(&[".git".to_string(), "*.pyc".to_string()][..])
        );
        assert_eq!(ty.metadata_text(MetadataKind::Deprecated), Some(""));
    }

    #[test]
    fn annotated_metadata_requires_literals() {
        let mut resolver = resolver();

        let err = resolve(&mut resolver, "Annotated[str, Doc(DOCS)]").unwrap_err();

        assert_eq!(err.kind(), "DecoratorError");
    }

    #[test]
    fn declared_and_external_names() {
        let mut resolver = resolver();

        assert_eq!(resolve(&mut resolver, "Foo").unwrap().kind, TypeKind::Object);
        assert_eq!(
            resolve(&mut resolver, "Greeter").unwrap().kind,
            TypeKind::Interface
        );
        assert_eq!(resolve(&mut resolver, "Severity").unwrap().kind, TypeKind::Enum);
        assert_eq!(
            resolve(&mut resolver, "dagger.Container").unwrap().kind,
            TypeKind::External
        );
        assert_eq!(
            resolve(&mut resolver, "dagger.Whatever").unwrap().kind,
            TypeKind::External
        );
        assert_eq!(
            resolve(&mut resolver, "ContainerID").unwrap().kind,
            TypeKind::Scalar
        );
        assert_eq!(resolve(&mut resolver, "None").unwrap().kind, TypeKind::Void);
    }

    #[test]
    fn multi_member_unions_are_tagged() {
        let mut resolver = resolver();

        let ty = resolve(&mut resolver, "Foo | str | None").unwrap();

        assert_eq!(ty.kind, TypeKind::Union);
        assert!(ty.is_optional);
        assert_eq!(ty.render(), "Foo | str | None");
    }

    #[test]
    fn self_resolves_to_enclosing_class() {
        let mut resolver = resolver();

        assert_eq!(resolve(&mut resolver, "Self").unwrap_err().kind(), "TypeResolutionError");

        resolver.set_current_class(Some("Foo"));
        let bare = resolve(&mut resolver, "Self").unwrap();
        let quoted = resolve(&mut resolver, "'Foo'").unwrap();

        assert!(bare.is_self);
        assert_eq!(bare.base_name, "Foo");
        assert_eq!(bare, quoted);
    }

    #[test]
    fn unsupported_annotations() {
        let mut resolver = resolver();

        for annotation in ["Bar", "dict[str, str]", "tuple[int]", "list", "Callable[[], int]"] {
            let err = resolve(&mut resolver, annotation).unwrap_err();
            assert_eq!(err.kind(), "TypeResolutionError", "{annotation}");
        }
    }

    #[test]
    fn literal_defaults() {
        let resolver = resolver();
        let parse = |text: &str| SyntaxParser::new().unwrap().parse_expression(text).unwrap();
        let location = LocationMetadata::new("main.py", 1, 0);

        assert_eq!(
            resolver.resolve_default(&parse("-3"), &location).unwrap(),
            serde_json::json!(-3)
        );
        assert_eq!(
            resolver
                .resolve_default(&parse(r#"["a", 1, None, {"k": True}]"#), &location)
                .unwrap(),
            serde_json::json!(["a", 1, null, {"k": true}])
        );
        assert_eq!(
            resolver
                .resolve_default(&parse("Severity.HIGH"), &location)
                .unwrap(),
            serde_json::json!("high")
        );
        assert_eq!(
            resolver
                .resolve_default(&parse("compute()"), &location)
                .unwrap_err()
                .kind(),
            "TypeResolutionError"
        );
    }
}

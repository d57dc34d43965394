//! Recognition of marker decorators.
//!
//! Markers are matched by their final identifier only, so `@function`,
//! `@dagger.function` and `@mod.function()` are the same marker. Where the
//! marker was imported from is never checked.

use std::collections::BTreeMap;

use crate::errors::AnalysisError;
use crate::metadata::{CachePolicy, LocationMetadata};
use crate::syntax::{ClassDecl, Constant, Decorator, Expr, FunctionDecl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    ObjectType,
    Interface,
    Enum,
    Function,
    Field,
    Check,
    Classmethod,
    Staticmethod,
}

impl Marker {
    pub fn from_identifier(name: &str) -> Option<Self> {
        match name {
            "object_type" => Some(Marker::ObjectType),
            "interface" => Some(Marker::Interface),
            "enum_type" => Some(Marker::Enum),
            "function" => Some(Marker::Function),
            "field" => Some(Marker::Field),
            "check" => Some(Marker::Check),
            "classmethod" => Some(Marker::Classmethod),
            "staticmethod" => Some(Marker::Staticmethod),
            _ => None,
        }
    }

    pub fn identifier(self) -> &'static str {
        match self {
            Marker::ObjectType => "object_type",
            Marker::Interface => "interface",
            Marker::Enum => "enum_type",
            Marker::Function => "function",
            Marker::Field => "field",
            Marker::Check => "check",
            Marker::Classmethod => "classmethod",
            Marker::Staticmethod => "staticmethod",
        }
    }

    /// Markers deciding what a class declares.
    pub fn is_kind(self) -> bool {
        matches!(self, Marker::ObjectType | Marker::Interface | Marker::Enum)
    }

    fn allowed_keywords(self) -> &'static [&'static str] {
        match self {
            Marker::Function => &["name", "doc", "cache", "deprecated"],
            Marker::Field => &["default", "default_factory", "name", "init", "deprecated"],
            Marker::ObjectType | Marker::Interface => &["deprecated"],
            Marker::Enum | Marker::Check | Marker::Classmethod | Marker::Staticmethod => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecoratorInfo {
    pub marker: Marker,
    pub keywords: BTreeMap<String, Expr>,
    pub location: LocationMetadata,
}

impl DecoratorInfo {
    pub fn expr(&self, key: &str) -> Option<&Expr> {
        self.keywords.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.expr(key).and_then(Expr::as_str)
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        match self.expr(key)? {
            Expr::Constant(Constant::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn cache_policy(&self) -> Option<CachePolicy> {
        self.text("cache").and_then(CachePolicy::parse)
    }
}

/// Matches a single decorator (or a `field(...)` call) against the known
/// markers. Unknown decorators yield `None`.
pub fn extract(expr: &Expr, location: &LocationMetadata) -> Result<Option<DecoratorInfo>, AnalysisError> {
    let (callee, args, keywords) = match expr {
        Expr::Call {
            func,
            args,
            keywords,
        } => (func.as_ref(), args.as_slice(), keywords.as_slice()),
        other => (other, &[][..], &[][..]),
    };

    let Some(marker) = callee.identifier().and_then(Marker::from_identifier) else {
        return Ok(None);
    };

    if !args.is_empty() {
        return Err(AnalysisError::decorator(
            format!("`{}` does not accept positional arguments", marker.identifier()),
            location,
        ));
    }

    let mut parsed = BTreeMap::new();
    for keyword in keywords {
        let Some(name) = &keyword.arg else {
            return Err(AnalysisError::decorator(
                format!("`{}` does not accept `**` arguments", marker.identifier()),
                location,
            ));
        };
        if !marker.allowed_keywords().contains(&name.as_str()) {
            return Err(AnalysisError::decorator(
                format!(
                    "unexpected keyword argument `{name}` for `{}`",
                    marker.identifier()
                ),
                location,
            ));
        }
        validate_keyword(marker, name, &keyword.value, location)?;
        parsed.insert(name.clone(), keyword.value.clone());
    }

    Ok(Some(DecoratorInfo {
        marker,
        keywords: parsed,
        location: location.clone(),
    }))
}

fn validate_keyword(
    marker: Marker,
    name: &str,
    value: &Expr,
    location: &LocationMetadata,
) -> Result<(), AnalysisError> {
    let invalid = |expected: &str| {
        AnalysisError::decorator(
            format!(
                "`{}({name}=...)` expects {expected}, got `{value}`",
                marker.identifier()
            ),
            location,
        )
    };

    match name {
        "name" | "doc" => value.as_str().map(|_| ()).ok_or_else(|| invalid("a string literal")),
        "deprecated" => match value {
            Expr::Constant(Constant::Str(_) | Constant::None) => Ok(()),
            _ => Err(invalid("a string literal")),
        },
        "init" => match value {
            Expr::Constant(Constant::Bool(_)) => Ok(()),
            _ => Err(invalid("a boolean literal")),
        },
        "cache" => match value.as_str().and_then(CachePolicy::parse) {
            Some(_) => Ok(()),
            None => Err(invalid(r#""never", "session" or a duration such as "10m""#)),
        },
        // Default expressions are checked against the field's type later.
        _ => Ok(()),
    }
}

fn extract_all(decorators: &[Decorator]) -> Result<Vec<DecoratorInfo>, AnalysisError> {
    let mut found = vec![];
    for decorator in decorators {
        if let Some(info) = extract(&decorator.expr, &decorator.location)? {
            found.push(info);
        }
    }
    Ok(found)
}

/// The single kind marker of a class, if it has one.
pub fn extract_class_marker(class: &ClassDecl) -> Result<Option<DecoratorInfo>, AnalysisError> {
    let mut kinds = extract_all(&class.decorators)?
        .into_iter()
        .filter(|info| info.marker.is_kind());

    let first = kinds.next();
    if let (Some(first), Some(second)) = (&first, kinds.next()) {
        return Err(AnalysisError::decorator(
            format!(
                "class `{}` cannot be both `@{}` and `@{}`",
                class.name,
                first.marker.identifier(),
                second.marker.identifier()
            ),
            &second.location,
        ));
    }

    Ok(first)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionMarkers {
    pub function: Option<DecoratorInfo>,
    pub check: bool,
    pub classmethod: bool,
    pub staticmethod: bool,
}

pub fn extract_function_markers(function: &FunctionDecl) -> Result<FunctionMarkers, AnalysisError> {
    let mut markers = FunctionMarkers::default();
    let mut check_location = None;

    for info in extract_all(&function.decorators)? {
        match info.marker {
            Marker::Function => markers.function = Some(info),
            Marker::Check => {
                markers.check = true;
                check_location = Some(info.location);
            }
            Marker::Classmethod => markers.classmethod = true,
            Marker::Staticmethod => markers.staticmethod = true,
            other => {
                return Err(AnalysisError::decorator(
                    format!(
                        "`@{}` cannot decorate function `{}`",
                        other.identifier(),
                        function.name
                    ),
                    &info.location,
                ))
            }
        }
    }

    if let (Some(location), None) = (&check_location, &markers.function) {
        return Err(AnalysisError::decorator(
            format!("`@check` on `{}` requires `@function`", function.name),
            location,
        ));
    }

    Ok(markers)
}

/// Recognizes `field(...)` as the value of an annotated attribute.
pub fn extract_field_call(
    value: &Expr,
    location: &LocationMetadata,
) -> Result<Option<DecoratorInfo>, AnalysisError> {
    if !matches!(value, Expr::Call { .. }) {
        return Ok(None);
    }

    match extract(value, location)? {
        Some(info) if info.marker == Marker::Field => Ok(Some(info)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::syntax::{Stmt, SyntaxParser};

    fn class(source: &str) -> ClassDecl {
        let module = SyntaxParser::new()
            .unwrap()
            .parse_module("main.py", source)
            .unwrap();
        module
            .body
            .into_iter()
            .find_map(|stmt| match stmt {
                Stmt::Class(class) => Some(class),
                _ => None,
            })
            .unwrap()
    }

    fn method(class: &ClassDecl) -> &FunctionDecl {
        class
            .body
            .iter()
            .find_map(|stmt| match stmt {
                Stmt::Function(function) => Some(function),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn markers_match_with_or_without_call() {
        let bare = class("@object_type\nclass A:\n    pass\n");
        let called = class("@dagger.object_type(deprecated=\"old\")\nclass A:\n    pass\n");

        let bare = extract_class_marker(&bare).unwrap().unwrap();
        let called = extract_class_marker(&called).unwrap().unwrap();

        assert_eq!(bare.marker, Marker::ObjectType);
        assert_eq!(called.marker, Marker::ObjectType);
        assert_eq!(called.text("deprecated"), Some("old"));
    }

    #[test]
    fn unrelated_decorators_are_ignored() {
        let class = class("@dataclass\nclass A:\n    pass\n");

        assert_eq!(extract_class_marker(&class).unwrap(), None);
    }

    #[test]
    fn conflicting_kind_markers() {
        let class = class("@object_type\n@interface\nclass A:\n    pass\n");

        let err = extract_class_marker(&class).unwrap_err();
        assert_eq!(err.kind(), "DecoratorError");
        assert_eq!(err.location().unwrap().line, 2);
    }

    #[test]
    fn function_keywords() {
        let class = class(
            "@object_type\nclass A:\n    @function(name=\"run\", cache=\"10m\")\n    @check\n    def run_(self) -> None:\n        pass\n",
        );

        let markers = extract_function_markers(method(&class)).unwrap();
        let function = markers.function.unwrap();

        assert!(markers.check);
        assert_eq!(function.text("name"), Some("run"));
        assert_eq!(
            function.cache_policy(),
            Some(CachePolicy::Ttl("10m".into()))
        );
    }

    #[test]
    fn malformed_function_markers() {
        for decorator in [
            "@function(nme=\"x\")",
            "@function(\"x\")",
            "@function(cache=\"sometimes\")",
            "@function(name=NAME)",
        ] {
            let class = class(&format!(
                "@object_type\nclass A:\n    {decorator}\n    def f(self) -> None:\n        pass\n"
            ));
            let err = extract_function_markers(method(&class)).unwrap_err();
            assert_eq!(err.kind(), "DecoratorError", "{decorator}");
        }
    }

    #[test]
    fn check_requires_function() {
        let class = class("@object_type\nclass A:\n    @check\n    def f(self) -> None:\n        pass\n");

        let err = extract_function_markers(method(&class)).unwrap_err();
        assert_eq!(err.kind(), "DecoratorError");
    }

    #[test]
    fn field_calls() {
        let class = class(
            "@object_type\nclass A:\n    names: list[str] = dagger.field(default=list, init=False)\n    other: str = compute()\n",
        );
        let values: Vec<(&Expr, &LocationMetadata)> = class
            .body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::AnnAssign {
                    value: Some(value),
                    location,
                    ..
                } => Some((value, location)),
                _ => None,
            })
            .collect();

        let field = extract_field_call(values[0].0, values[0].1).unwrap().unwrap();
        assert_eq!(field.boolean("init"), Some(false));
        assert_eq!(field.expr("default"), Some(&Expr::Name("list".into())));
        assert_eq!(extract_field_call(values[1].0, values[1].1).unwrap(), None);
    }
}

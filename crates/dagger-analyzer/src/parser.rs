//! Static extraction of object types, interfaces and enums from module sources.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use tracing::{debug, trace};

use crate::annotations::{DeclaredNames, TypeResolver};
use crate::decorators::{
    extract_class_marker, extract_field_call, extract_function_markers, DecoratorInfo,
    FunctionMarkers, Marker,
};
use crate::errors::AnalysisError;
use crate::metadata::{
    EnumDef, EnumMemberDef, FieldDef, FunctionDef, LocationMetadata, MetadataKind, ObjectDef,
    ParameterDef,
};
use crate::naming::{api_name, is_dunder, is_private};
use crate::syntax::{
    cleandoc, docstring, ClassDecl, Constant, Expr, FunctionDecl, ParameterKind, SourceModule,
    Stmt, SyntaxParser, UnaryOperator,
};

const ENUM_BASES: [&str; 2] = ["Enum", "StrEnum"];

const DEPRECATED_DIRECTIVE: &str = ".. deprecated::";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedModule {
    pub objects: BTreeMap<String, ObjectDef>,
    pub enums: BTreeMap<String, EnumDef>,
    pub doc: Option<String>,
}

pub struct ModuleParser {
    files: Vec<PathBuf>,
    main_object: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclarationKind {
    Object,
    Interface,
    Enum,
}

struct Declaration<'m> {
    class: &'m ClassDecl,
    kind: DeclarationKind,
    info: Option<DecoratorInfo>,
}

impl ModuleParser {
    pub fn new<P: AsRef<Path>>(
        files: impl IntoIterator<Item = P>,
        main_object: impl Into<String>,
    ) -> Self {
        Self {
            files: files.into_iter().map(|f| f.as_ref().to_path_buf()).collect(),
            main_object: main_object.into(),
        }
    }

    pub fn parse(&self) -> Result<ParsedModule, AnalysisError> {
        let modules = self.parse_files()?;

        let declarations = collect_declarations(&modules)?;
        let mut names = DeclaredNames::default();
        for declaration in &declarations {
            let name = declaration.class.name.clone();
            match declaration.kind {
                DeclarationKind::Object => {
                    names.objects.insert(name);
                }
                DeclarationKind::Interface => {
                    names.interfaces.insert(name);
                }
                DeclarationKind::Enum => {
                    names.enums.insert(name, vec![]);
                }
            }
        }

        let mut extractor = Extractor {
            resolver: TypeResolver::new(names)?,
        };

        // Enums first so that member references are usable as defaults.
        let mut enums = BTreeMap::new();
        for declaration in declarations.iter().filter(|d| d.kind == DeclarationKind::Enum) {
            let enum_def = extractor.parse_enum(declaration.class)?;
            extractor.resolver.register_enum_members(
                &enum_def.name,
                enum_def
                    .members
                    .iter()
                    .map(|m| (m.name.clone(), m.value.clone()))
                    .collect(),
            );
            debug!(name = %enum_def.name, members = enum_def.members.len(), "parsed enum");
            enums.insert(enum_def.name.clone(), enum_def);
        }

        let mut objects = BTreeMap::new();
        for declaration in declarations.iter().filter(|d| d.kind != DeclarationKind::Enum) {
            let object = extractor.parse_object(
                declaration.class,
                declaration.info.as_ref(),
                declaration.kind == DeclarationKind::Interface,
            )?;
            debug!(
                name = %object.name,
                fields = object.fields.len(),
                functions = object.functions.len(),
                interface = object.is_interface,
                "parsed object"
            );
            objects.insert(object.name.clone(), object);
        }

        self.validate(&objects)?;

        Ok(ParsedModule {
            objects,
            enums,
            doc: module_doc(&modules),
        })
    }

    fn parse_files(&self) -> Result<Vec<SourceModule>, AnalysisError> {
        if self.files.is_empty() {
            return Err(AnalysisError::input("no source files given"));
        }

        let mut parser = SyntaxParser::new()?;
        let mut modules = Vec::with_capacity(self.files.len());
        for file in &self.files {
            if !file.exists() {
                return Err(AnalysisError::input(format!(
                    "`{}` does not exist",
                    file.display()
                )));
            }
            if !file.is_file() {
                return Err(AnalysisError::input(format!(
                    "`{}` is not a file",
                    file.display()
                )));
            }

            let source = std::fs::read_to_string(file).map_err(|e| {
                AnalysisError::input(format!("failed to read `{}`: {e}", file.display()))
            })?;
            trace!(file = %file.display(), bytes = source.len(), "parsing source");
            modules.push(parser.parse_module(&file.display().to_string(), &source)?);
        }

        Ok(modules)
    }

    fn validate(&self, objects: &BTreeMap<String, ObjectDef>) -> Result<(), AnalysisError> {
        let available: Vec<String> = objects
            .values()
            .filter(|o| !o.is_interface)
            .map(|o| o.name.clone())
            .collect();

        match objects.get(&self.main_object) {
            None => {
                let listed = if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                };
                return Err(AnalysisError::Validation {
                    message: format!(
                        "main object `{}` not found (available objects: {listed})",
                        self.main_object
                    ),
                    available,
                });
            }
            Some(main) if main.is_interface => {
                return Err(AnalysisError::Validation {
                    message: format!(
                        "main object `{}` is an interface, not an object type",
                        self.main_object
                    ),
                    available,
                });
            }
            Some(_) => {}
        }

        for object in objects.values() {
            check_name_conflicts(object)?;
        }

        Ok(())
    }
}

fn module_doc(modules: &[SourceModule]) -> Option<String> {
    modules
        .iter()
        .find(|m| Path::new(&m.path).file_name().is_some_and(|f| f == "__init__.py"))
        .or_else(|| modules.first())
        .and_then(SourceModule::doc)
}

fn has_enum_base(class: &ClassDecl) -> bool {
    class
        .bases
        .iter()
        .filter_map(Expr::identifier)
        .any(|base| ENUM_BASES.contains(&base))
}

fn collect_declarations(modules: &[SourceModule]) -> Result<Vec<Declaration<'_>>, AnalysisError> {
    let mut declarations = vec![];

    for module in modules {
        for stmt in &module.body {
            if let Stmt::Function(function) = stmt {
                if extract_function_markers(function)?.function.is_some() {
                    return Err(AnalysisError::declaration(
                        format!(
                            "`@function` `{}` must be declared inside an `@object_type` class",
                            function.name
                        ),
                        &function.location,
                    ));
                }
            }
        }
        collect_classes(&module.body, &mut declarations)?;
    }

    let mut seen: BTreeMap<&str, &LocationMetadata> = BTreeMap::new();
    for declaration in &declarations {
        let class = declaration.class;
        if let Some(previous) = seen.insert(&class.name, &class.location) {
            return Err(AnalysisError::declaration(
                format!(
                    "type `{}` is declared more than once (first at {previous})",
                    class.name
                ),
                &class.location,
            ));
        }
    }

    Ok(declarations)
}

fn collect_classes<'m>(
    body: &'m [Stmt],
    declarations: &mut Vec<Declaration<'m>>,
) -> Result<(), AnalysisError> {
    for stmt in body {
        let Stmt::Class(class) = stmt else {
            continue;
        };

        let info = extract_class_marker(class)?;
        let kind = match info.as_ref().map(|i| i.marker) {
            Some(Marker::ObjectType) => Some(DeclarationKind::Object),
            Some(Marker::Interface) => Some(DeclarationKind::Interface),
            Some(Marker::Enum) => Some(DeclarationKind::Enum),
            _ if has_enum_base(class) => Some(DeclarationKind::Enum),
            _ => None,
        };

        if let Some(kind) = kind {
            declarations.push(Declaration { class, kind, info });
        }

        collect_classes(&class.body, declarations)?;
    }

    Ok(())
}

fn check_name_conflicts(object: &ObjectDef) -> Result<(), AnalysisError> {
    let names = object
        .functions
        .iter()
        .map(|f| (f.api_name.as_str(), f.location.clone()))
        .chain(
            object
                .exposed_fields()
                .map(|f| (f.api_name.as_str(), f.location.clone())),
        )
        .into_group_map();

    let conflict = names
        .into_iter()
        .filter(|(_, locations)| locations.len() > 1)
        .sorted_by(|a, b| a.0.cmp(b.0))
        .next();

    match conflict {
        Some((name, locations)) => Err(AnalysisError::NameConflict {
            object: object.name.clone(),
            name: name.to_string(),
            count: locations.len(),
            locations: locations.into_iter().flatten().collect(),
        }),
        None => Ok(()),
    }
}

struct Extractor {
    resolver: TypeResolver,
}

impl Extractor {
    fn parse_object(
        &mut self,
        class: &ClassDecl,
        info: Option<&DecoratorInfo>,
        is_interface: bool,
    ) -> Result<ObjectDef, AnalysisError> {
        self.resolver.set_current_class(Some(&class.name));
        let result = self.parse_object_body(class, info, is_interface);
        self.resolver.set_current_class(None);
        result
    }

    fn parse_object_body(
        &mut self,
        class: &ClassDecl,
        info: Option<&DecoratorInfo>,
        is_interface: bool,
    ) -> Result<ObjectDef, AnalysisError> {
        let mut fields = vec![];
        let mut functions = vec![];
        let mut create = None;
        let mut init = None;

        for stmt in &class.body {
            match stmt {
                Stmt::AnnAssign {
                    target,
                    annotation,
                    value,
                    location,
                } => {
                    let Expr::Name(name) = target else {
                        continue;
                    };
                    if is_interface {
                        return Err(AnalysisError::declaration(
                            format!("interface `{}` cannot declare field `{name}`", class.name),
                            location,
                        ));
                    }
                    if is_class_var(annotation) {
                        continue;
                    }
                    if let Some(field) =
                        self.parse_field(name, annotation, value.as_ref(), location)?
                    {
                        fields.push(field);
                    }
                }
                Stmt::Function(function) => {
                    let markers = extract_function_markers(function)?;
                    if is_interface {
                        if !is_dunder(&function.name) {
                            functions.push(self.parse_function(function, &markers, false)?);
                        }
                    } else if function.name == "create" && markers.classmethod {
                        create = Some(function);
                    } else if function.name == "__init__" {
                        init = Some(function);
                    } else if markers.function.is_some() {
                        functions.push(self.parse_function(function, &markers, false)?);
                    }
                }
                _ => {}
            }
        }

        let constructor = match create.or(init) {
            Some(function) => {
                let markers = extract_function_markers(function)?;
                Some(self.parse_function(function, &markers, true)?)
            }
            None => None,
        };

        match &constructor {
            Some(constructor) => {
                for field in fields.iter_mut() {
                    if constructor.parameter(&field.original_name).is_some() {
                        field.init = false;
                    }
                }
            }
            None => {
                // Without a constructor nothing could ever assign these.
                if let Some(field) = fields
                    .iter()
                    .find(|f| !f.init && !f.has_default && !f.ty.accepts_null())
                {
                    return Err(AnalysisError::declaration(
                        format!(
                            "field `{}` of `{}` sets `init=False` but has no default",
                            field.original_name, class.name
                        ),
                        field.location.as_ref().unwrap_or(&class.location),
                    ));
                }
            }
        }

        Ok(ObjectDef {
            name: class.name.clone(),
            doc: docstring(&class.body),
            fields,
            functions,
            constructor,
            is_interface,
            deprecated: info.and_then(|i| i.text("deprecated")).map(str::to_string),
            location: Some(class.location.clone()),
        })
    }

    fn parse_field(
        &mut self,
        name: &str,
        annotation: &Expr,
        value: Option<&Expr>,
        location: &LocationMetadata,
    ) -> Result<Option<FieldDef>, AnalysisError> {
        let field_call = match value {
            Some(value) => extract_field_call(value, location)?,
            None => None,
        };

        // Private helper attributes are not part of the object's state.
        if field_call.is_none() && is_private(name) {
            return Ok(None);
        }

        let mut ty = self.resolver.resolve(annotation, location)?;

        let mut default_value = None;
        let mut default_factory = None;
        let mut init = true;
        let mut decorator_name = None;
        let mut deprecated = None;

        match (&field_call, value) {
            (Some(call), _) => {
                if let Some(default) = call.expr("default") {
                    match self.field_default(default, location)? {
                        FieldDefault::Literal(value) => default_value = Some(value),
                        FieldDefault::Factory(factory) => default_factory = Some(factory),
                    }
                }
                if let Some(factory) = call.expr("default_factory") {
                    default_factory = Some(factory.to_string());
                }
                init = call.boolean("init").unwrap_or(true);
                decorator_name = call.text("name").map(str::to_string);
                deprecated = call.text("deprecated").map(str::to_string);
            }
            (None, Some(value)) => {
                default_value = Some(self.resolver.resolve_default(value, location)?);
            }
            (None, None) => {}
        }

        if default_value.as_ref().is_some_and(serde_json::Value::is_null) {
            ty.is_optional = true;
        }

        let has_default = default_value.is_some() || default_factory.is_some();
        let alt_name =
            decorator_name.or_else(|| ty.metadata_text(MetadataKind::Name).map(str::to_string));
        let deprecated = deprecated.or_else(|| {
            ty.metadata_text(MetadataKind::Deprecated)
                .map(str::to_string)
        });

        Ok(Some(FieldDef {
            original_name: name.to_string(),
            api_name: api_name(name, alt_name.as_deref()),
            doc: ty.metadata_text(MetadataKind::Doc).map(str::to_string),
            ty,
            has_default,
            default_value,
            default_factory,
            alt_name,
            deprecated,
            exposed: field_call.is_some(),
            init,
            location: Some(location.clone()),
        }))
    }

    /// `field(default=list)` names a factory, anything else must be a literal.
    fn field_default(
        &self,
        default: &Expr,
        location: &LocationMetadata,
    ) -> Result<FieldDefault, AnalysisError> {
        match default {
            Expr::Name(name) => Ok(FieldDefault::Factory(name.clone())),
            Expr::Attribute { .. } => Ok(self
                .resolver
                .resolve_default(default, location)
                .map(FieldDefault::Literal)
                .unwrap_or_else(|_| FieldDefault::Factory(default.to_string()))),
            _ => self
                .resolver
                .resolve_default(default, location)
                .map(FieldDefault::Literal),
        }
    }

    fn parse_function(
        &mut self,
        function: &FunctionDecl,
        markers: &FunctionMarkers,
        is_constructor: bool,
    ) -> Result<FunctionDef, AnalysisError> {
        let info = markers.function.as_ref();
        let alt_name = info.and_then(|i| i.text("name")).map(str::to_string);

        let return_type = match &function.returns {
            Some(returns) => Some(self.resolver.resolve(returns, &function.location)?),
            None => None,
        };

        Ok(FunctionDef {
            original_name: function.name.clone(),
            api_name: if is_constructor {
                String::new()
            } else {
                api_name(&function.name, alt_name.as_deref())
            },
            parameters: self.parse_parameters(function, !markers.staticmethod)?,
            return_type,
            doc: info
                .and_then(|i| i.text("doc"))
                .map(cleandoc)
                .or_else(|| docstring(&function.body)),
            is_async: function.is_async,
            is_classmethod: markers.classmethod,
            is_constructor,
            is_check: markers.check,
            cache_policy: info.and_then(DecoratorInfo::cache_policy),
            deprecated: info.and_then(|i| i.text("deprecated")).map(str::to_string),
            location: Some(function.location.clone()),
        })
    }

    fn parse_parameters(
        &mut self,
        function: &FunctionDecl,
        skip_receiver: bool,
    ) -> Result<Vec<ParameterDef>, AnalysisError> {
        let mut parameters = vec![];

        for (i, parameter) in function.parameters.iter().enumerate() {
            if skip_receiver && i == 0 && matches!(parameter.name.as_str(), "self" | "cls") {
                continue;
            }

            if parameter.kind != ParameterKind::Regular {
                let star = if parameter.kind == ParameterKind::VarArgs {
                    "*"
                } else {
                    "**"
                };
                return Err(AnalysisError::declaration(
                    format!(
                        "variadic parameter `{star}{}` of `{}` is not supported",
                        parameter.name, function.name
                    ),
                    &parameter.location,
                ));
            }

            let Some(annotation) = &parameter.annotation else {
                return Err(AnalysisError::type_resolution(
                    format!(
                        "parameter `{}` of `{}` is missing a type annotation",
                        parameter.name, function.name
                    ),
                    "",
                    &parameter.location,
                ));
            };

            let mut ty = self.resolver.resolve(annotation, &parameter.location)?;
            let default_value = match &parameter.default {
                Some(default) => Some(self.resolver.resolve_default(default, &parameter.location)?),
                None => None,
            };
            if default_value.as_ref().is_some_and(serde_json::Value::is_null) {
                ty.is_optional = true;
            }
            let alt_name = ty.metadata_text(MetadataKind::Name).map(str::to_string);

            parameters.push(ParameterDef {
                name: parameter.name.clone(),
                api_name: api_name(&parameter.name, alt_name.as_deref()),
                has_default: default_value.is_some(),
                default_value,
                alt_name,
                doc: ty.metadata_text(MetadataKind::Doc).map(str::to_string),
                default_path: ty
                    .metadata_text(MetadataKind::DefaultPath)
                    .map(str::to_string),
                ignore: ty.metadata_list(MetadataKind::Ignore).map(<[String]>::to_vec),
                deprecated: ty
                    .metadata_text(MetadataKind::Deprecated)
                    .map(str::to_string),
                ty,
                location: Some(parameter.location.clone()),
            });
        }

        Ok(parameters)
    }

    fn parse_enum(&mut self, class: &ClassDecl) -> Result<EnumDef, AnalysisError> {
        let mut members = vec![];

        for (i, stmt) in class.body.iter().enumerate() {
            let Stmt::Assign { targets, value, .. } = stmt else {
                continue;
            };
            let [Expr::Name(name)] = targets.as_slice() else {
                continue;
            };
            if is_private(name) {
                continue;
            }

            let (value, inline_doc) = match value {
                Expr::Tuple(items) => match items.as_slice() {
                    [value, Expr::Constant(Constant::Str(doc))] => {
                        (literal_text(value), Some(doc.clone()))
                    }
                    _ => (None, None),
                },
                other => (literal_text(other), None),
            };

            let raw_doc = inline_doc.or_else(|| trailing_doc(&class.body, i));
            let (doc, deprecated) = match raw_doc {
                Some(raw) => split_deprecated(&cleandoc(&raw)),
                None => (None, None),
            };

            members.push(EnumMemberDef {
                name: name.clone(),
                value: value.unwrap_or_else(|| name.clone()),
                doc,
                deprecated,
            });
        }

        if members.is_empty() {
            return Err(AnalysisError::declaration(
                format!("enum `{}` has no members", class.name),
                &class.location,
            ));
        }

        Ok(EnumDef {
            name: class.name.clone(),
            doc: docstring(&class.body),
            members,
            location: Some(class.location.clone()),
        })
    }
}

enum FieldDefault {
    Literal(serde_json::Value),
    Factory(String),
}

fn is_class_var(annotation: &Expr) -> bool {
    let base = match annotation {
        Expr::Subscript { value, .. } => value.as_ref(),
        other => other,
    };
    base.identifier() == Some("ClassVar")
}

/// Wire text of a literal enum value.
fn literal_text(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Constant(Constant::Str(value)) => Some(value.clone()),
        Expr::Constant(Constant::Int(value)) => Some(value.to_string()),
        Expr::Constant(Constant::Float(value)) => Some(value.to_string()),
        Expr::Constant(Constant::Bool(true)) => Some("True".to_string()),
        Expr::Constant(Constant::Bool(false)) => Some("False".to_string()),
        Expr::UnaryOp {
            op: UnaryOperator::Neg,
            operand,
        } => literal_text(operand).map(|text| format!("-{text}")),
        _ => None,
    }
}

/// A bare string on the line right after a member assignment documents it.
/// Blank lines or comments in between mean the string belongs to nothing.
fn trailing_doc(body: &[Stmt], index: usize) -> Option<String> {
    let end_line = body[index].location().end_line;
    let mut rest = body[index + 1..].iter();

    let mut next = rest.next();
    while let Some(Stmt::Comment(location)) = next {
        if location.line != end_line {
            return None;
        }
        next = rest.next();
    }

    let candidate = next?;
    if candidate.location().line != end_line + 1 {
        return None;
    }
    candidate.as_str().map(str::to_string)
}

/// Splits a `.. deprecated::` directive out of a member doc.
///
/// A version number right after the directive is dropped; any other text on
/// that line and the indented lines below it form the deprecation reason.
fn split_deprecated(doc: &str) -> (Option<String>, Option<String>) {
    let mut description = vec![];
    let mut deprecated = vec![];
    let mut lines = doc.lines();

    while let Some(line) = lines.next() {
        let stripped = line.trim();
        let Some(remainder) = stripped.strip_prefix(DEPRECATED_DIRECTIVE) else {
            description.push(stripped);
            continue;
        };

        let remainder = remainder.trim();
        if !remainder.is_empty() && !is_version(remainder) {
            deprecated.push(remainder);
        }

        for continuation in lines.by_ref() {
            let trimmed = continuation.trim();
            if trimmed.is_empty() {
                continue;
            }
            if continuation.starts_with("   ") || continuation.starts_with('\t') {
                deprecated.push(trimmed);
                continue;
            }
            description.push(trimmed);
            break;
        }
    }

    let join = |lines: Vec<&str>| {
        let text = lines.into_iter().filter(|l| !l.is_empty()).join("\n");
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    };

    (join(description), join(deprecated))
}

fn is_version(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_digit() || c == '.')
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn deprecated_directive_is_split_out() {
        let (doc, deprecated) =
            split_deprecated("Low severity.\n\n.. deprecated:: 1.2\n   Use MINOR instead.\n");

        assert_eq!(doc.as_deref(), Some("Low severity."));
        assert_eq!(deprecated.as_deref(), Some("Use MINOR instead."));
    }

    #[test]
    fn deprecated_directive_with_inline_reason() {
        let (doc, deprecated) = split_deprecated(".. deprecated:: No longer used.");

        assert_eq!(doc, None);
        assert_eq!(deprecated.as_deref(), Some("No longer used."));
    }

    #[test]
    fn plain_member_doc() {
        assert_eq!(
            split_deprecated("Just docs."),
            (Some("Just docs.".to_string()), None)
        );
    }

    #[test]
    fn literal_enum_values() {
        assert_eq!(
            literal_text(&Expr::Constant(Constant::Int(3))),
            Some("3".into())
        );
        assert_eq!(literal_text(&Expr::Other("auto()".into())), None);
    }

    #[test]
    #[tracing_test::traced_test]
    fn logs_each_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.py");
        std::fs::write(
            &path,
            "import dagger\n\n@dagger.enum_type\nclass Mode(dagger.Enum):\n    A = \"a\"\n\n@dagger.object_type\nclass Foo:\n    pass\n",
        )
        .unwrap();

        let parsed = ModuleParser::new(&[path], "Foo").parse().unwrap();

        assert_eq!(parsed.objects.len(), 1);
        assert!(logs_contain("parsed enum"));
        assert!(logs_contain("parsed object"));
    }
}

//! Owned syntax tree for Python sources.
//!
//! Sources are parsed with tree-sitter and immediately lowered into the tagged
//! enums below. Nothing downstream looks at tree-sitter nodes or raw text; every
//! analysis step matches on these variants.

use std::fmt;

use itertools::Itertools;
use tree_sitter::Node;

use crate::errors::AnalysisError;
use crate::metadata::LocationMetadata;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceModule {
    pub path: String,
    pub body: Vec<Stmt>,
}

impl SourceModule {
    pub fn doc(&self) -> Option<String> {
        docstring(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub expr: Expr,
    pub location: LocationMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub bases: Vec<Expr>,
    pub decorators: Vec<Decorator>,
    pub body: Vec<Stmt>,
    pub location: LocationMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Regular,
    VarArgs,
    KwArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
    pub location: LocationMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub decorators: Vec<Decorator>,
    pub parameters: Vec<Parameter>,
    pub returns: Option<Expr>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    pub location: LocationMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Class(ClassDecl),
    Function(FunctionDecl),
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
        location: LocationMetadata,
    },
    Assign {
        targets: Vec<Expr>,
        value: Expr,
        location: LocationMetadata,
    },
    Expr {
        value: Expr,
        location: LocationMetadata,
    },
    Comment(LocationMetadata),
    Other(LocationMetadata),
}

impl Stmt {
    pub fn location(&self) -> &LocationMetadata {
        match self {
            Stmt::Class(class) => &class.location,
            Stmt::Function(function) => &function.location,
            Stmt::AnnAssign { location, .. }
            | Stmt::Assign { location, .. }
            | Stmt::Expr { location, .. } => location,
            Stmt::Comment(location) | Stmt::Other(location) => location,
        }
    }

    /// The literal text of a bare string statement.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Stmt::Expr { value, .. } => value.as_str(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    FormattedStr(String),
    Ellipsis,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinOperator {
    BitOr,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOperator {
    Neg,
    Pos,
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// `None` for a `**mapping` splat.
    pub arg: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        slice: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOperator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Constant(Constant),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// Anything the analyzer never needs to look inside, kept as source text.
    Other(String),
}

impl Expr {
    /// Final identifier of a dotted name: `dagger.field` -> `field`.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Expr::Name(name) => Some(name),
            Expr::Attribute { attr, .. } => Some(attr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Constant(Constant::Str(value)) => Some(value),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Expr::Constant(Constant::None))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => f.write_str("None"),
            Constant::Bool(true) => f.write_str("True"),
            Constant::Bool(false) => f.write_str("False"),
            Constant::Int(value) => write!(f, "{value}"),
            Constant::Float(value) => write!(f, "{value:?}"),
            Constant::Str(value) => write!(f, "{value:?}"),
            Constant::FormattedStr(value) => write!(f, "f\"{value}\""),
            Constant::Ellipsis => f.write_str("..."),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Name(name) => f.write_str(name),
            Expr::Attribute { value, attr } => write!(f, "{value}.{attr}"),
            Expr::Subscript { value, slice } => write!(f, "{value}[{}]", slice.iter().join(", ")),
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                let keywords = keywords.iter().map(|k| match &k.arg {
                    Some(arg) => format!("{arg}={}", k.value),
                    None => format!("**{}", k.value),
                });
                write!(
                    f,
                    "{func}({})",
                    args.iter().map(|a| a.to_string()).chain(keywords).join(", ")
                )
            }
            Expr::BinOp { left, op, right } => match op {
                BinOperator::BitOr => write!(f, "{left} | {right}"),
                BinOperator::Other(op) => write!(f, "{left} {op} {right}"),
            },
            Expr::UnaryOp { op, operand } => match op {
                UnaryOperator::Neg => write!(f, "-{operand}"),
                UnaryOperator::Pos => write!(f, "+{operand}"),
                UnaryOperator::Other(op) => write!(f, "{op} {operand}"),
            },
            Expr::Constant(constant) => write!(f, "{constant}"),
            Expr::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            Expr::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Expr::Tuple(items) => write!(f, "({})", items.iter().join(", ")),
            Expr::Dict(items) => write!(
                f,
                "{{{}}}",
                items.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
            ),
            Expr::Other(text) => f.write_str(text),
        }
    }
}

/// Docstring of a body: its first statement, when that is a bare string.
pub fn docstring(body: &[Stmt]) -> Option<String> {
    body.iter()
        .find(|stmt| !matches!(stmt, Stmt::Comment(_)))
        .and_then(Stmt::as_str)
        .map(cleandoc)
}

/// Normalizes docstring indentation the same way Python's `inspect.cleandoc`
/// does.
pub fn cleandoc(doc: &str) -> String {
    let expanded = doc.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();

    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.trim_start().to_string()
            } else {
                line.get(margin..)
                    .unwrap_or_else(|| line.trim())
                    .trim_end()
                    .to_string()
            }
        })
        .collect();

    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }

    cleaned.join("\n")
}

pub struct SyntaxParser {
    parser: tree_sitter::Parser,
}

impl SyntaxParser {
    pub fn new() -> Result<Self, AnalysisError> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| AnalysisError::input(format!("failed to load python grammar: {e}")))?;

        Ok(Self { parser })
    }

    pub fn parse_module(&mut self, path: &str, source: &str) -> Result<SourceModule, AnalysisError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| AnalysisError::Parse {
                message: "parser did not produce a tree".into(),
                location: LocationMetadata::new(path, 1, 0),
            })?;

        let lowering = Lowering { source, file: path };
        let root = tree.root_node();
        if root.has_error() {
            let node = first_error(root).unwrap_or(root);
            let message = if node.is_missing() {
                format!("missing `{}`", node.kind())
            } else {
                let text = lowering.text(node).lines().next().unwrap_or_default();
                format!("invalid syntax near `{}`", text.trim())
            };
            return Err(AnalysisError::Parse {
                message,
                location: lowering.location(node),
            });
        }

        Ok(SourceModule {
            path: path.to_string(),
            body: lowering.block(root),
        })
    }

    /// Parses a standalone expression, used for quoted annotations.
    pub fn parse_expression(&mut self, text: &str) -> Option<Expr> {
        let text = text.trim();
        let tree = self.parser.parse(text, None)?;
        let root = tree.root_node();
        if root.has_error() {
            return None;
        }

        let lowering = Lowering {
            source: text,
            file: "<annotation>",
        };
        let statements = lowering.named_children(root);
        match statements.as_slice() {
            [statement] if statement.kind() == "expression_statement" => {
                match lowering.named_children(*statement).as_slice() {
                    [expr] => Some(lowering.expr(*expr)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn first_error<'t>(node: Node<'t>) -> Option<Node<'t>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }

    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

struct Lowering<'s> {
    source: &'s str,
    file: &'s str,
}

impl<'s> Lowering<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        self.source.get(node.byte_range()).unwrap_or_default()
    }

    fn location(&self, node: Node<'_>) -> LocationMetadata {
        let start = node.start_position();
        LocationMetadata {
            file: self.file.to_string(),
            line: start.row + 1,
            column: start.column,
            end_line: node.end_position().row + 1,
        }
    }

    /// Named children without interleaved comments.
    fn named_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        let children = node
            .named_children(&mut cursor)
            .filter(|child| child.kind() != "comment")
            .collect();
        children
    }

    fn block(&self, node: Node<'_>) -> Vec<Stmt> {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        children.into_iter().map(|child| self.statement(child)).collect()
    }

    fn statement(&self, node: Node<'_>) -> Stmt {
        match node.kind() {
            "class_definition" => Stmt::Class(self.class_def(node, vec![])),
            "function_definition" => Stmt::Function(self.function_def(node, vec![])),
            "decorated_definition" => {
                let decorators = self
                    .named_children(node)
                    .into_iter()
                    .filter(|child| child.kind() == "decorator")
                    .filter_map(|decorator| {
                        let expr = self.named_children(decorator).into_iter().next()?;
                        Some(Decorator {
                            expr: self.expr(expr),
                            location: self.location(decorator),
                        })
                    })
                    .collect();

                match node.child_by_field_name("definition") {
                    Some(def) if def.kind() == "class_definition" => {
                        Stmt::Class(self.class_def(def, decorators))
                    }
                    Some(def) if def.kind() == "function_definition" => {
                        Stmt::Function(self.function_def(def, decorators))
                    }
                    _ => Stmt::Other(self.location(node)),
                }
            }
            "expression_statement" => self.expression_statement(node),
            "comment" => Stmt::Comment(self.location(node)),
            _ => Stmt::Other(self.location(node)),
        }
    }

    fn class_def(&self, node: Node<'_>, decorators: Vec<Decorator>) -> ClassDecl {
        let bases = node
            .child_by_field_name("superclasses")
            .map(|args| {
                self.named_children(args)
                    .into_iter()
                    .filter(|arg| arg.kind() != "keyword_argument")
                    .map(|arg| self.expr(arg))
                    .collect()
            })
            .unwrap_or_default();

        ClassDecl {
            name: self.field_text(node, "name"),
            bases,
            decorators,
            body: node
                .child_by_field_name("body")
                .map(|body| self.block(body))
                .unwrap_or_default(),
            location: self.location(node),
        }
    }

    fn function_def(&self, node: Node<'_>, decorators: Vec<Decorator>) -> FunctionDecl {
        FunctionDecl {
            name: self.field_text(node, "name"),
            decorators,
            parameters: node
                .child_by_field_name("parameters")
                .map(|params| self.parameters(params))
                .unwrap_or_default(),
            returns: node
                .child_by_field_name("return_type")
                .map(|ret| self.expr(ret)),
            body: node
                .child_by_field_name("body")
                .map(|body| self.block(body))
                .unwrap_or_default(),
            is_async: node.child(0).is_some_and(|first| first.kind() == "async"),
            location: self.location(node),
        }
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> String {
        node.child_by_field_name(field)
            .map(|n| self.text(n).to_string())
            .unwrap_or_default()
    }

    fn splat_name(&self, node: Node<'_>) -> String {
        self.named_children(node)
            .into_iter()
            .next()
            .map(|n| self.text(n).to_string())
            .unwrap_or_default()
    }

    fn parameters(&self, node: Node<'_>) -> Vec<Parameter> {
        let mut parameters = vec![];
        for child in self.named_children(node) {
            let location = self.location(child);
            let parameter = match child.kind() {
                "identifier" => Parameter {
                    name: self.text(child).to_string(),
                    kind: ParameterKind::Regular,
                    annotation: None,
                    default: None,
                    location,
                },
                "typed_parameter" => {
                    let Some(target) = self.named_children(child).into_iter().next() else {
                        continue;
                    };
                    let (name, kind) = match target.kind() {
                        "list_splat_pattern" => (self.splat_name(target), ParameterKind::VarArgs),
                        "dictionary_splat_pattern" => {
                            (self.splat_name(target), ParameterKind::KwArgs)
                        }
                        _ => (self.text(target).to_string(), ParameterKind::Regular),
                    };
                    Parameter {
                        name,
                        kind,
                        annotation: child.child_by_field_name("type").map(|t| self.expr(t)),
                        default: None,
                        location,
                    }
                }
                "default_parameter" | "typed_default_parameter" => Parameter {
                    name: self.field_text(child, "name"),
                    kind: ParameterKind::Regular,
                    annotation: child.child_by_field_name("type").map(|t| self.expr(t)),
                    default: child.child_by_field_name("value").map(|v| self.expr(v)),
                    location,
                },
                "list_splat_pattern" => Parameter {
                    name: self.splat_name(child),
                    kind: ParameterKind::VarArgs,
                    annotation: None,
                    default: None,
                    location,
                },
                "dictionary_splat_pattern" => Parameter {
                    name: self.splat_name(child),
                    kind: ParameterKind::KwArgs,
                    annotation: None,
                    default: None,
                    location,
                },
                // `*` and `/` separators carry no parameter.
                _ => continue,
            };
            parameters.push(parameter);
        }
        parameters
    }

    fn expression_statement(&self, node: Node<'_>) -> Stmt {
        let location = self.location(node);
        let children = self.named_children(node);
        match children.as_slice() {
            [child] if child.kind() == "assignment" => self.assignment(*child, location),
            [child] if matches!(child.kind(), "augmented_assignment" | "yield") => {
                Stmt::Other(location)
            }
            [child] => Stmt::Expr {
                value: self.expr(*child),
                location,
            },
            items => Stmt::Expr {
                value: Expr::Tuple(items.iter().map(|item| self.expr(*item)).collect()),
                location,
            },
        }
    }

    fn assignment(&self, node: Node<'_>, location: LocationMetadata) -> Stmt {
        let Some(left) = node.child_by_field_name("left") else {
            return Stmt::Other(location);
        };

        if let Some(annotation) = node.child_by_field_name("type") {
            return Stmt::AnnAssign {
                target: self.expr(left),
                annotation: self.expr(annotation),
                value: node.child_by_field_name("right").map(|v| self.expr(v)),
                location,
            };
        }

        // `a = b = value` nests assignments on the right-hand side.
        let mut targets = vec![self.expr(left)];
        let mut right = node.child_by_field_name("right");
        while let Some(current) = right.filter(|r| r.kind() == "assignment") {
            if let Some(target) = current.child_by_field_name("left") {
                targets.push(self.expr(target));
            }
            right = current.child_by_field_name("right");
        }

        match right {
            Some(value) if value.kind() != "augmented_assignment" => Stmt::Assign {
                targets,
                value: self.expr(value),
                location,
            },
            _ => Stmt::Other(location),
        }
    }

    fn first_named(&self, node: Node<'_>) -> Expr {
        match self.named_children(node).into_iter().next() {
            Some(inner) => self.expr(inner),
            None => Expr::Other(self.text(node).to_string()),
        }
    }

    fn exprs(&self, node: Node<'_>) -> Vec<Expr> {
        self.named_children(node)
            .into_iter()
            .map(|child| self.expr(child))
            .collect()
    }

    fn expr(&self, node: Node<'_>) -> Expr {
        match node.kind() {
            "identifier" => Expr::Name(self.text(node).to_string()),
            "type" | "parenthesized_expression" => self.first_named(node),
            "generic_type" => {
                let children = self.named_children(node);
                match children.as_slice() {
                    [value, params] => Expr::Subscript {
                        value: Box::new(self.expr(*value)),
                        slice: self.exprs(*params),
                    },
                    _ => Expr::Other(self.text(node).to_string()),
                }
            }
            "union_type" => {
                let children = self.named_children(node);
                match children.as_slice() {
                    [left, right] => Expr::BinOp {
                        left: Box::new(self.expr(*left)),
                        op: BinOperator::BitOr,
                        right: Box::new(self.expr(*right)),
                    },
                    _ => Expr::Other(self.text(node).to_string()),
                }
            }
            "member_type" => {
                let children = self.named_children(node);
                match children.as_slice() {
                    [value, attr] => Expr::Attribute {
                        value: Box::new(self.expr(*value)),
                        attr: self.text(*attr).to_string(),
                    },
                    _ => Expr::Other(self.text(node).to_string()),
                }
            }
            "attribute" => match node.child_by_field_name("object") {
                Some(object) => Expr::Attribute {
                    value: Box::new(self.expr(object)),
                    attr: self.field_text(node, "attribute"),
                },
                None => Expr::Other(self.text(node).to_string()),
            },
            "subscript" => {
                let mut cursor = node.walk();
                let slice: Vec<Node<'_>> = node
                    .children_by_field_name("subscript", &mut cursor)
                    .collect();
                match node.child_by_field_name("value") {
                    Some(value) => Expr::Subscript {
                        value: Box::new(self.expr(value)),
                        slice: slice.into_iter().map(|s| self.expr(s)).collect(),
                    },
                    None => Expr::Other(self.text(node).to_string()),
                }
            }
            "call" => self.call(node),
            "binary_operator" => {
                let operator = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind())
                    .unwrap_or_default();
                match (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) {
                    (Some(left), Some(right)) => Expr::BinOp {
                        left: Box::new(self.expr(left)),
                        op: match operator {
                            "|" => BinOperator::BitOr,
                            other => BinOperator::Other(other.to_string()),
                        },
                        right: Box::new(self.expr(right)),
                    },
                    _ => Expr::Other(self.text(node).to_string()),
                }
            }
            "unary_operator" => {
                let operator = node
                    .child_by_field_name("operator")
                    .map(|op| op.kind())
                    .unwrap_or_default();
                match node.child_by_field_name("argument") {
                    Some(argument) => Expr::UnaryOp {
                        op: match operator {
                            "-" => UnaryOperator::Neg,
                            "+" => UnaryOperator::Pos,
                            other => UnaryOperator::Other(other.to_string()),
                        },
                        operand: Box::new(self.expr(argument)),
                    },
                    None => Expr::Other(self.text(node).to_string()),
                }
            }
            "tuple" | "expression_list" | "pattern_list" | "tuple_pattern" | "type_parameter" => {
                Expr::Tuple(self.exprs(node))
            }
            "list" | "list_pattern" => Expr::List(self.exprs(node)),
            "dictionary" => {
                let children = self.named_children(node);
                if children.iter().any(|c| c.kind() != "pair") {
                    return Expr::Other(self.text(node).to_string());
                }
                Expr::Dict(
                    children
                        .into_iter()
                        .filter_map(|pair| {
                            let key = pair.child_by_field_name("key")?;
                            let value = pair.child_by_field_name("value")?;
                            Some((self.expr(key), self.expr(value)))
                        })
                        .collect(),
                )
            }
            "string" => self.string(node),
            "concatenated_string" => {
                let mut value = String::new();
                let mut formatted = false;
                for part in self.named_children(node) {
                    match self.string(part) {
                        Expr::Constant(Constant::Str(s)) => value.push_str(&s),
                        Expr::Constant(Constant::FormattedStr(s)) => {
                            formatted = true;
                            value.push_str(&s);
                        }
                        _ => return Expr::Other(self.text(node).to_string()),
                    }
                }
                if formatted {
                    Expr::Constant(Constant::FormattedStr(value))
                } else {
                    Expr::Constant(Constant::Str(value))
                }
            }
            "integer" => match parse_int(self.text(node)) {
                Some(value) => Expr::Constant(Constant::Int(value)),
                None => Expr::Other(self.text(node).to_string()),
            },
            "float" => match self.text(node).replace('_', "").parse::<f64>() {
                Ok(value) => Expr::Constant(Constant::Float(value)),
                Err(_) => Expr::Other(self.text(node).to_string()),
            },
            "true" => Expr::Constant(Constant::Bool(true)),
            "false" => Expr::Constant(Constant::Bool(false)),
            "none" => Expr::Constant(Constant::None),
            "ellipsis" => Expr::Constant(Constant::Ellipsis),
            _ => Expr::Other(self.text(node).to_string()),
        }
    }

    fn call(&self, node: Node<'_>) -> Expr {
        let Some(function) = node.child_by_field_name("function") else {
            return Expr::Other(self.text(node).to_string());
        };

        let mut args = vec![];
        let mut keywords = vec![];
        if let Some(arguments) = node.child_by_field_name("arguments") {
            if arguments.kind() != "argument_list" {
                args.push(Expr::Other(self.text(arguments).to_string()));
            } else {
                for argument in self.named_children(arguments) {
                    match argument.kind() {
                        "keyword_argument" => {
                            if let Some(value) = argument.child_by_field_name("value") {
                                keywords.push(Keyword {
                                    arg: Some(self.field_text(argument, "name")),
                                    value: self.expr(value),
                                });
                            }
                        }
                        "dictionary_splat" => keywords.push(Keyword {
                            arg: None,
                            value: self.first_named(argument),
                        }),
                        _ => args.push(self.expr(argument)),
                    }
                }
            }
        }

        Expr::Call {
            func: Box::new(self.expr(function)),
            args,
            keywords,
        }
    }

    fn string(&self, node: Node<'_>) -> Expr {
        let text = self.text(node);
        match parse_string_literal(text) {
            Some((prefix, value)) if prefix.contains('f') => {
                Expr::Constant(Constant::FormattedStr(value))
            }
            Some((_, value)) => Expr::Constant(Constant::Str(value)),
            None => Expr::Other(text.to_string()),
        }
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let text = text.replace('_', "").to_ascii_lowercase();
    if let Some(hex) = text.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = text.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = text.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        text.parse().ok()
    }
}

/// Splits a string literal into its lowercased prefix and decoded value.
fn parse_string_literal(text: &str) -> Option<(String, String)> {
    let prefix_len = text.find(['"', '\''])?;
    let prefix = text[..prefix_len].to_ascii_lowercase();
    let rest = &text[prefix_len..];

    let quote_len = if rest.starts_with("\"\"\"") || rest.starts_with("'''") {
        3
    } else {
        1
    };
    if rest.len() < quote_len * 2 {
        return None;
    }
    let body = rest.get(quote_len..rest.len() - quote_len)?;

    if prefix.contains('r') {
        Some((prefix, body.to_string()))
    } else {
        Some((prefix, unescape(body)))
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(kind @ ('x' | 'u' | 'U')) => {
                let width = match kind {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.by_ref().take(width).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push(kind);
                        out.push_str(&digits);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

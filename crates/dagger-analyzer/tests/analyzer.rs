use std::path::PathBuf;

use dagger_analyzer::metadata::{CachePolicy, TypeKind};
use dagger_analyzer::{analyze, AnalysisError, ModuleMetadata};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_sources(files: &[(&str, &str)]) -> (TempDir, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    let paths = files
        .iter()
        .map(|(name, source)| {
            let path = dir.path().join(name);
            std::fs::write(&path, source).unwrap();
            path
        })
        .collect();
    (dir, paths)
}

fn analyze_source(source: &str, main_object: &str) -> Result<ModuleMetadata, AnalysisError> {
    let (_dir, files) = write_sources(&[("main.py", source)]);
    analyze(&files, "test", main_object)
}

const MODULE: &str = r#""""A test module."""
from typing import Annotated, Self

import dagger
from dagger import Doc, Name, field, function, object_type


@dagger.enum_type
class Severity(dagger.Enum):
    """How bad it is."""

    LOW = "LOW"
    """Not urgent."""

    HIGH = "HIGH"

    MEDIUM = "MEDIUM"  # neither

    """Stray string."""


@object_type
class Foo:
    """Foo docs."""

    greeting: str = "Hello"
    names: list[str] = field(default=list)
    level: Severity = field(default=Severity.LOW, name="severity")

    @function
    def message(self) -> str:
        """Returns a message."""
        return f"{self.greeting}!"

    @function(cache="session")
    async def add(
        self,
        a: int,
        b: Annotated[int, Doc("second operand"), Name("second")] = 1,
    ) -> int:
        return a + b

    @function
    def child(self) -> "Bar":
        return Bar()

    @function
    def same(self) -> Self:
        return self


@object_type
class Bar:
    value: str | None = None
"#;

#[test]
fn analyzes_full_module() {
    let metadata = analyze_source(MODULE, "Foo").unwrap();

    assert_eq!(metadata.module_name, "test");
    assert_eq!(metadata.doc.as_deref(), Some("A test module."));
    assert_eq!(
        metadata.objects.keys().collect::<Vec<_>>(),
        vec!["Bar", "Foo"]
    );

    let foo = metadata.object("Foo").unwrap();
    assert_eq!(foo.doc.as_deref(), Some("Foo docs."));
    assert_eq!(foo.constructor, None);

    let fields: Vec<(&str, &str, bool)> = foo
        .fields
        .iter()
        .map(|f| (f.original_name.as_str(), f.api_name.as_str(), f.exposed))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("greeting", "greeting", false),
            ("names", "names", true),
            ("level", "severity", true),
        ]
    );
    assert_eq!(
        foo.fields[0].default_value,
        Some(serde_json::json!("Hello"))
    );
    assert_eq!(foo.fields[1].default_factory.as_deref(), Some("list"));
    assert!(foo.fields[1].has_default);
    assert_eq!(foo.fields[2].default_value, Some(serde_json::json!("LOW")));
    assert_eq!(foo.fields[2].ty.kind, TypeKind::Enum);

    let names: Vec<&str> = foo.functions.iter().map(|f| f.api_name.as_str()).collect();
    assert_eq!(names, vec!["message", "add", "child", "same"]);

    let message = foo.function("message").unwrap();
    assert_eq!(message.doc.as_deref(), Some("Returns a message."));
    assert!(!message.is_async);

    let add = foo.function("add").unwrap();
    assert!(add.is_async);
    assert_eq!(add.cache_policy, Some(CachePolicy::Session));
    assert_eq!(add.parameters.len(), 2);
    let b = &add.parameters[1];
    assert_eq!(b.name, "b");
    assert_eq!(b.api_name, "second");
    assert_eq!(b.alt_name.as_deref(), Some("second"));
    assert_eq!(b.doc.as_deref(), Some("second operand"));
    assert_eq!(b.default_value, Some(serde_json::json!(1)));
    assert!(!add.parameters[0].has_default);

    let child = foo.function("child").unwrap().return_type.as_ref().unwrap();
    assert_eq!(child.kind, TypeKind::Object);
    assert_eq!(child.base_name, "Bar");

    let same = foo.function("same").unwrap().return_type.as_ref().unwrap();
    assert!(same.is_self);
    assert_eq!(same.base_name, "Foo");

    let bar = metadata.object("Bar").unwrap();
    assert!(bar.fields[0].ty.is_optional);
    assert_eq!(bar.construction_params().len(), 1);
}

#[test]
fn enum_member_docs_follow_the_member() {
    let metadata = analyze_source(MODULE, "Foo").unwrap();

    let severity = metadata.enum_def("Severity").unwrap();
    let members: Vec<(&str, &str, Option<&str>)> = severity
        .members
        .iter()
        .map(|m| (m.name.as_str(), m.value.as_str(), m.doc.as_deref()))
        .collect();

    assert_eq!(severity.doc.as_deref(), Some("How bad it is."));
    assert_eq!(
        members,
        vec![
            ("LOW", "LOW", Some("Not urgent.")),
            ("HIGH", "HIGH", None),
            ("MEDIUM", "MEDIUM", None),
        ]
    );
}

#[test]
fn enum_doc_separated_by_comment_is_ignored() {
    let metadata = analyze_source(
        r#"import enum
import dagger


class Level(enum.Enum):
    ONE = 1
    # a comment
    """Not a doc."""
    TWO = 2  # trailing
    """Second.

    .. deprecated:: 2.0
       Use ONE.
    """


@dagger.object_type
class Foo:
    pass
"#,
        "Foo",
    )
    .unwrap();

    let level = metadata.enum_def("Level").unwrap();
    assert_eq!(level.members[0].value, "1");
    assert_eq!(level.members[0].doc, None);
    assert_eq!(level.members[1].doc.as_deref(), Some("Second."));
    assert_eq!(level.members[1].deprecated.as_deref(), Some("Use ONE."));
}

#[test]
fn parsing_is_idempotent() {
    let (_dir, files) = write_sources(&[("main.py", MODULE)]);

    let first = analyze(&files, "test", "Foo").unwrap();
    let second = analyze(&files, "test", "Foo").unwrap();

    assert_eq!(first, second);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn duplicate_api_names_conflict() {
    let err = analyze_source(
        r#"import dagger


@dagger.object_type
class Foo:
    @dagger.function
    def build(self) -> str:
        return ""

    @dagger.function(name="build")
    def build_image(self) -> str:
        return ""
"#,
        "Foo",
    )
    .unwrap_err();

    let AnalysisError::NameConflict {
        object,
        name,
        count,
        locations,
    } = &err
    else {
        panic!("expected a name conflict, got {err:?}");
    };
    assert_eq!(object, "Foo");
    assert_eq!(name, "build");
    assert_eq!(*count, 2);
    assert_eq!(
        locations.iter().map(|l| l.line).collect::<Vec<_>>(),
        vec![7, 11]
    );
}

#[test]
fn missing_main_object_lists_available_objects() {
    let err = analyze_source("import dagger\n\n\ndef helper():\n    pass\n", "Foo").unwrap_err();

    assert_eq!(err.kind(), "ValidationError");
    let AnalysisError::Validation { available, .. } = err else {
        unreachable!()
    };
    assert!(available.is_empty());
}

#[test]
fn declaration_errors() {
    let cases = [
        (
            "@dagger.interface\nclass Greeter:\n    name: str\n\n@dagger.object_type\nclass Foo:\n    pass\n",
            "DeclarationError",
        ),
        (
            "@dagger.function\ndef loose() -> str:\n    return ''\n",
            "DeclarationError",
        ),
        (
            "@dagger.object_type\nclass Foo:\n    cache: str = dagger.field(init=False)\n",
            "DeclarationError",
        ),
        (
            "@dagger.object_type\nclass Foo:\n    @dagger.function\n    def f(self, *args: str) -> str:\n        return ''\n",
            "DeclarationError",
        ),
        (
            "@dagger.object_type\nclass Foo:\n    @dagger.function\n    def f(self, value) -> str:\n        return ''\n",
            "TypeResolutionError",
        ),
        (
            "@dagger.object_type\nclass Foo:\n    @dagger.function\n    def f(self, value: str = compute()) -> str:\n        return ''\n",
            "TypeResolutionError",
        ),
        (
            "@dagger.object_type\nclass Foo:\n    @dagger.function\n    def f(self) -> Unknown:\n        pass\n",
            "TypeResolutionError",
        ),
        (
            "@dagger.object_type\n@dagger.enum_type\nclass Foo:\n    pass\n",
            "DecoratorError",
        ),
        ("@dagger.object_type\nclass Foo:\n    def (self):\n", "ParseError"),
        (
            "@dagger.interface\nclass Foo:\n    def f(self) -> str: ...\n",
            "ValidationError",
        ),
    ];

    for (source, kind) in cases {
        let source = format!("import dagger\n{source}");
        let err = analyze_source(&source, "Foo").unwrap_err();
        assert_eq!(err.kind(), kind, "{source}");
    }
}

#[test]
fn duplicate_declarations_across_files() {
    let (_dir, files) = write_sources(&[
        (
            "a.py",
            "import dagger\n\n@dagger.object_type\nclass Foo:\n    pass\n",
        ),
        (
            "b.py",
            "import dagger\n\n@dagger.object_type\nclass Foo:\n    pass\n",
        ),
    ]);

    let err = analyze(&files, "test", "Foo").unwrap_err();

    assert_eq!(err.kind(), "DeclarationError");
    assert!(err.location().unwrap().file.ends_with("b.py"));
}

#[test]
fn invalid_inputs() {
    let empty: [PathBuf; 0] = [];
    assert_eq!(analyze(&empty, "test", "Foo").unwrap_err().kind(), "AnalysisError");

    let dir = tempfile::tempdir().unwrap();
    let missing = [dir.path().join("nope.py")];
    assert_eq!(
        analyze(&missing, "test", "Foo").unwrap_err().kind(),
        "AnalysisError"
    );

    let directory = [dir.path().to_path_buf()];
    assert_eq!(
        analyze(&directory, "test", "Foo").unwrap_err().kind(),
        "AnalysisError"
    );
}

#[test]
fn explicit_constructor_shadows_fields() {
    let metadata = analyze_source(
        r#"import dagger


@dagger.object_type
class Foo:
    name: str
    count: int = 0

    @classmethod
    async def create(cls, name: str = "anonymous") -> "Foo":
        return cls(name=name)

    @dagger.function
    def hello(self) -> str:
        return self.name
"#,
        "Foo",
    )
    .unwrap();

    let foo = metadata.main().unwrap();
    let constructor = foo.constructor.as_ref().unwrap();
    assert!(constructor.is_constructor);
    assert!(constructor.is_classmethod);
    assert!(constructor.is_async);
    assert_eq!(constructor.original_name, "create");
    assert_eq!(constructor.parameters[0].name, "name");

    let name = foo.field("name").unwrap();
    assert!(!name.init);
    assert!(foo.field("count").unwrap().init);
}

#[test]
fn interface_functions() {
    let metadata = analyze_source(
        r#"import typing
import dagger


@dagger.interface
class Greeter(typing.Protocol):
    @dagger.function
    async def greet(self, name: str) -> str: ...

    def shout(self) -> str: ...


@dagger.object_type
class Foo:
    @dagger.function
    def pick(self, greeter: Greeter) -> Greeter:
        return greeter
"#,
        "Foo",
    )
    .unwrap();

    let greeter = metadata.object("Greeter").unwrap();
    assert!(greeter.is_interface);
    assert_eq!(
        greeter
            .functions
            .iter()
            .map(|f| f.api_name.as_str())
            .collect::<Vec<_>>(),
        vec!["greet", "shout"]
    );

    let pick = metadata.main().unwrap().function("pick").unwrap();
    assert_eq!(pick.parameters[0].ty.kind, TypeKind::Interface);
}

#[test]
fn none_defaults_make_the_type_optional() {
    let metadata = analyze_source(
        r#"import dagger


@dagger.object_type
class Foo:
    label: str = None
    cache: str | None = dagger.field(init=False)

    @dagger.function
    def opt(self, x: str = None) -> str:
        return x or ""
"#,
        "Foo",
    )
    .unwrap();

    let foo = metadata.object("Foo").unwrap();
    let x = foo.function("opt").unwrap().parameter("x").unwrap();
    assert!(x.ty.is_optional);
    assert!(x.is_optional());
    assert_eq!(x.default_value, Some(serde_json::Value::Null));

    let label = foo.field("label").unwrap();
    assert!(label.ty.is_optional);
    assert!(!foo.field("cache").unwrap().init);
}

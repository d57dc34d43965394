use std::path::PathBuf;

use dagger_mod::{Call, Config, DispatchError, Module, ObjectValue, Resolvers, Value};
use pretty_assertions::assert_eq;
use serde_json::{json, Map};
use tempfile::TempDir;

const SOURCE: &str = r#"import typing

import dagger
from dagger import field, function, object_type


@dagger.interface
class Greeter(typing.Protocol):
    @function
    def hello(self) -> str: ...


@object_type
class Person:
    who: str = field(default="nobody")

    @function
    def hello(self) -> str:
        return f"hello {self.who}"


@object_type
class Foo:
    cache: str | None = field(init=False)

    @function
    def pick(self, who: str) -> Greeter:
        return Person(who=who)

    @function
    def greet(self, g: Greeter) -> str:
        return g.hello()

    @function
    def opt(self, x: str = None) -> str:
        return x or "unset"
"#;

fn load() -> (TempDir, Module) {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("main.py");
    std::fs::write(&path, SOURCE).unwrap();

    let config = Config::builder()
        .module_name("foo")
        .source_files(vec![path])
        .build()
        .unwrap();

    (dir, Module::load(config).unwrap())
}

fn resolvers() -> Resolvers {
    Resolvers::new()
        .function("Foo", "pick", |call: Call| {
            let who: String = call.get("who")?;
            Ok(ObjectValue::new("Person").with_field("who", who).into())
        })
        .function("Foo", "greet", |call: Call| {
            let greeter: ObjectValue = call.get("g")?;
            let who = greeter.get("who").cloned().unwrap_or(Value::Null);
            let who = String::try_from(who)?;
            Ok(Value::String(format!("{} says hello {who}", greeter.type_name)))
        })
        .function("Foo", "opt", |call: Call| {
            let x: Option<String> = match call.arg("x") {
                Some(Value::String(x)) => Some(x.clone()),
                _ => None,
            };
            Ok(Value::String(x.unwrap_or_else(|| "unset".into())))
        })
}

fn args(value: serde_json::Value) -> Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[tokio::test]
async fn interface_results_can_be_passed_back_in() {
    let (_dir, module) = load();
    let dispatcher = module.dispatcher(resolvers());

    let greeter = dispatcher
        .invoke("Foo", None, Some("pick"), &args(json!({"who": "bob"})))
        .await
        .unwrap();
    assert_eq!(greeter, json!({"who": "bob"}));

    let greeting = dispatcher
        .invoke("Foo", None, Some("greet"), &args(json!({"g": greeter})))
        .await
        .unwrap();
    assert_eq!(greeting, json!("Person says hello bob"));
}

#[tokio::test]
async fn interface_ids_stay_references() {
    let (_dir, module) = load();
    let dispatcher = module.dispatcher(
        Resolvers::new().function("Foo", "greet", |call: Call| match call.arg("g") {
            Some(Value::Reference(reference)) => Ok(Value::String(reference.id.clone())),
            other => Err(eyre::eyre!("unexpected argument {other:?}")),
        }),
    );

    let result = dispatcher
        .invoke("Foo", None, Some("greet"), &args(json!({"g": "greeter-id"})))
        .await
        .unwrap();
    assert_eq!(result, json!("greeter-id"));
}

#[tokio::test]
async fn unknown_interface_state_is_a_mismatch() {
    let (_dir, module) = load();
    let dispatcher = module.dispatcher(resolvers());

    let err = dispatcher
        .invoke(
            "Foo",
            None,
            Some("greet"),
            &args(json!({"g": {"colour": "red"}})),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::TypeMismatch { ref name, .. } if name == "g"));
}

#[tokio::test]
async fn none_default_may_be_omitted() {
    let (_dir, module) = load();
    let dispatcher = module.dispatcher(resolvers());

    let omitted = dispatcher
        .invoke("Foo", None, Some("opt"), &Map::new())
        .await
        .unwrap();
    assert_eq!(omitted, json!("unset"));

    let given = dispatcher
        .invoke("Foo", None, Some("opt"), &args(json!({"x": "set"})))
        .await
        .unwrap();
    assert_eq!(given, json!("set"));
}

#[tokio::test]
async fn fields_outside_init_start_empty() {
    let (_dir, module) = load();
    let dispatcher = module.dispatcher(resolvers());

    let state = dispatcher.invoke("Foo", None, None, &Map::new()).await.unwrap();

    assert_eq!(state, json!({"cache": null}));
}

//! Explicit registration of the native code behind each resolver.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;

use crate::value::{ObjectValue, Value};

/// Key constructors are registered under.
pub const CONSTRUCTOR: &str = "";

/// Receiver state and decoded arguments for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Call {
    pub parent: ObjectValue,
    /// Arguments keyed by native parameter name.
    pub args: BTreeMap<String, Value>,
}

impl Call {
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Reads an argument as `T`. Absent arguments read as [`Value::Null`].
    pub fn get<T>(&self, name: &str) -> eyre::Result<T>
    where
        T: TryFrom<Value>,
        T::Error: std::error::Error + Send + Sync + 'static,
    {
        let value = self.args.get(name).cloned().unwrap_or(Value::Null);
        T::try_from(value).map_err(|e| eyre::Report::new(e).wrap_err(format!("argument `{name}`")))
    }

    /// Reads a field of the receiver as `T`.
    pub fn field<T>(&self, name: &str) -> eyre::Result<T>
    where
        T: TryFrom<Value>,
        T::Error: std::error::Error + Send + Sync + 'static,
    {
        let value = self.parent.get(name).cloned().unwrap_or(Value::Null);
        T::try_from(value).map_err(|e| eyre::Report::new(e).wrap_err(format!("field `{name}`")))
    }
}

/// An error raised by resolver code, tagged with its error class.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct FunctionError {
    pub error_type: String,
    pub message: String,
}

impl FunctionError {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Handler {
    async fn call(&self, call: Call) -> eyre::Result<Value>;
}

pub type DynHandler = Arc<dyn Handler + Send + Sync>;

struct SyncHandler<F>(F);

#[async_trait]
impl<F> Handler for SyncHandler<F>
where
    F: Fn(Call) -> eyre::Result<Value> + Send + Sync,
{
    async fn call(&self, call: Call) -> eyre::Result<Value> {
        (self.0)(call)
    }
}

struct AsyncHandler<F>(F);

#[async_trait]
impl<F> Handler for AsyncHandler<F>
where
    F: Fn(Call) -> BoxFuture<'static, eyre::Result<Value>> + Send + Sync,
{
    async fn call(&self, call: Call) -> eyre::Result<Value> {
        (self.0)(call).await
    }
}

/// Native implementations keyed by object name and native function name.
#[derive(Clone, Default)]
pub struct Resolvers {
    handlers: HashMap<(String, String), DynHandler>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, object: &str, function: &str, handler: DynHandler) {
        tracing::debug!(object = object, function = function, "registering resolver");
        self.handlers
            .insert((object.to_string(), function.to_string()), handler);
    }

    pub fn function<F>(mut self, object: &str, function: &str, f: F) -> Self
    where
        F: Fn(Call) -> eyre::Result<Value> + Send + Sync + 'static,
    {
        self.register(object, function, Arc::new(SyncHandler(f)));
        self
    }

    pub fn async_function<F, Fut>(mut self, object: &str, function: &str, f: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<Value>> + Send + 'static,
    {
        let boxed = move |call: Call| f(call).boxed();
        self.register(object, function, Arc::new(AsyncHandler(boxed)));
        self
    }

    /// Registers the code behind an explicit constructor. It receives an
    /// empty receiver and must return the constructed object.
    pub fn constructor<F>(self, object: &str, f: F) -> Self
    where
        F: Fn(Call) -> eyre::Result<Value> + Send + Sync + 'static,
    {
        self.function(object, CONSTRUCTOR, f)
    }

    pub fn async_constructor<F, Fut>(self, object: &str, f: F) -> Self
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<Value>> + Send + 'static,
    {
        self.async_function(object, CONSTRUCTOR, f)
    }

    pub fn handler(&self, object: &str, function: &str) -> Option<&DynHandler> {
        self.handlers
            .get(&(object.to_string(), function.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn sync_and_async_handlers() {
        let resolvers = Resolvers::new()
            .function("Foo", "double", |call| Ok(Value::Int(call.get::<i64>("n")? * 2)))
            .async_function("Foo", "greet", |call: Call| async move {
                let name: String = call.field("name")?;
                Ok::<_, eyre::Report>(Value::String(format!("hi {name}")))
            });

        let double = resolvers.handler("Foo", "double").unwrap();
        let greet = resolvers.handler("Foo", "greet").unwrap();

        let call = Call {
            parent: ObjectValue::new("Foo").with_field("name", "bob"),
            args: BTreeMap::from([("n".to_string(), Value::Int(4))]),
        };

        assert_eq!(double.call(call.clone()).await.unwrap(), Value::Int(8));
        assert_eq!(
            greet.call(call).await.unwrap(),
            Value::String("hi bob".into())
        );
        assert!(resolvers.handler("Foo", "missing").is_none());
        assert_eq!(resolvers.len(), 2);
    }

    #[tokio::test]
    async fn wrong_argument_type_is_an_error() {
        let resolvers =
            Resolvers::new().function("Foo", "double", |call| Ok(Value::Int(call.get::<i64>("n")?)));

        let err = resolvers
            .handler("Foo", "double")
            .unwrap()
            .call(Call::default())
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("argument `n`"));
    }
}

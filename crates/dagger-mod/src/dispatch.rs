//! Runtime dispatch of resolver calls against analyzed module metadata.

use std::sync::Arc;
use std::time::Duration;

use dagger_analyzer::metadata::{FieldDef, FunctionDef, ModuleMetadata, ObjectDef};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::codec::{Decoder, Encoder};
use crate::errors::DispatchError;
use crate::registry::{Call, FunctionError, Resolvers, CONSTRUCTOR};
use crate::value::{ObjectValue, Value};

/// A single call as delivered by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// `TypeName.functionName`, or just `TypeName` to construct it.
    pub resolver: String,
    #[serde(default)]
    pub parent: Option<serde_json::Value>,
    #[serde(default)]
    pub args: Map<String, serde_json::Value>,
}

impl InvocationRequest {
    pub fn split_resolver(&self) -> (&str, Option<&str>) {
        match self.resolver.split_once('.') {
            Some((object, function)) if !function.is_empty() => (object, Some(function)),
            Some((object, _)) => (object, None),
            None => (self.resolver.as_str(), None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl ErrorPayload {
    pub fn new(err: &DispatchError, object: Option<&str>) -> Self {
        let error_type = match err {
            DispatchError::Application { error_type, .. } => error_type.clone(),
            _ => None,
        };

        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            object: object.map(str::to_string),
            name: err.subject().map(str::to_string),
            error_type,
        }
    }
}

/// Written back to the host: either `{"result": ...}` or `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationResponse {
    Result(serde_json::Value),
    Error(ErrorPayload),
}

impl InvocationResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, InvocationResponse::Error(_))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(
                r#"{{"error":{{"kind":"InvalidRequest","message":{:?}}}}}"#,
                err.to_string()
            )
        })
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    metadata: Arc<ModuleMetadata>,
    resolvers: Arc<Resolvers>,
    execute_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(metadata: Arc<ModuleMetadata>, resolvers: Resolvers) -> Self {
        Self {
            metadata,
            resolvers: Arc::new(resolvers),
            execute_timeout: None,
        }
    }

    pub fn with_execute_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execute_timeout = timeout;
        self
    }

    pub fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    /// Resolves one call. Without a function name the object itself is
    /// constructed from `args` and its state returned.
    pub async fn invoke(
        &self,
        object: &str,
        parent: Option<&serde_json::Value>,
        function: Option<&str>,
        args: &Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, DispatchError> {
        let def = self
            .metadata
            .object(object)
            .ok_or_else(|| DispatchError::UnknownObject {
                object: object.to_string(),
            })?;

        let decoder = Decoder::new(&self.metadata);
        let encoder = Encoder::new(&self.metadata);

        let Some(function) = function.filter(|f| !f.is_empty()) else {
            tracing::debug!(object = object, "constructing object");
            let receiver = self.construct(def, args).await?;
            return encoder.encode_object(def, &receiver);
        };

        let target = match def.function(function) {
            Some(target) => Target::Function(target),
            None => match def.exposed_fields().find(|f| f.api_name == function) {
                Some(field) => Target::Field(field),
                None => {
                    return Err(DispatchError::UnknownFunction {
                        object: object.to_string(),
                        function: function.to_string(),
                    })
                }
            },
        };
        tracing::debug!(object = object, function = function, "resolved resolver");

        let receiver = match parent.filter(|p| !p.is_null()) {
            Some(state) => decoder.decode_object(def, state)?,
            None => self.construct(def, &filter_construction_args(def, args)).await?,
        };

        let target = match target {
            Target::Field(field) => {
                let value = receiver.get(&field.original_name).unwrap_or(&Value::Null);
                return encoder.encode(
                    Some(&field.ty),
                    value,
                    &format!("{}.{}", def.name, field.original_name),
                );
            }
            Target::Function(target) => target,
        };

        let call = Call {
            parent: receiver,
            args: decoder.decode_args(&target.original_name, &target.parameters, args)?,
        };
        tracing::trace!(object = object, function = function, args = ?call.args, "decoded call");

        let result = self.run(def, &target.original_name, call).await?;

        if target.is_check {
            return Ok(serde_json::Value::Null);
        }

        encoder.encode(
            target.return_type.as_ref(),
            &result,
            &format!("{}.{}", def.name, target.original_name),
        )
    }

    pub async fn invoke_request(
        &self,
        request: &InvocationRequest,
    ) -> Result<serde_json::Value, DispatchError> {
        let (object, function) = request.split_resolver();
        self.invoke(object, request.parent.as_ref(), function, &request.args)
            .await
    }

    /// Handles a raw JSON request. Every failure is reported in the
    /// response rather than returned.
    pub async fn respond(&self, input: &str) -> InvocationResponse {
        let request = match serde_json::from_str::<InvocationRequest>(input) {
            Ok(request) => request,
            Err(err) => {
                return InvocationResponse::Error(ErrorPayload::new(
                    &DispatchError::InvalidRequest(err.to_string()),
                    None,
                ))
            }
        };
        tracing::trace!(resolver = %request.resolver, "serving request");

        match self.invoke_request(&request).await {
            Ok(result) => InvocationResponse::Result(result),
            Err(err) => {
                tracing::warn!(resolver = %request.resolver, kind = err.kind(), error = %err, "invocation failed");
                let (object, _) = request.split_resolver();
                InvocationResponse::Error(ErrorPayload::new(&err, Some(object)))
            }
        }
    }

    pub async fn serve(&self, input: &str) -> String {
        self.respond(input).await.to_json()
    }

    async fn construct(
        &self,
        def: &ObjectDef,
        args: &Map<String, serde_json::Value>,
    ) -> Result<ObjectValue, DispatchError> {
        let decoder = Decoder::new(&self.metadata);
        let params = def.construction_params();
        let decoded = decoder.decode_args(&def.name, &params, args)?;

        if def.constructor.is_some() && self.resolvers.handler(&def.name, CONSTRUCTOR).is_some() {
            let call = Call {
                parent: ObjectValue::new(&def.name),
                args: decoded,
            };
            return match self.run(def, CONSTRUCTOR, call).await? {
                Value::Object(object) => Ok(object),
                Value::Null => Err(DispatchError::UnexpectedNull {
                    name: format!("{}.{}", def.name, constructor_name(def)),
                    expected: def.name.clone(),
                }),
                other => Err(DispatchError::mismatch(
                    format!("{}.{}", def.name, constructor_name(def)),
                    def.name.clone(),
                    other.type_label(),
                )),
            };
        }

        let mut object = ObjectValue::new(&def.name);
        for field in &def.fields {
            let value = match decoded.get(&field.original_name) {
                Some(value) => value.clone(),
                None => decoder.field_default(def, field)?,
            };
            object.set(&field.original_name, value);
        }

        Ok(object)
    }

    async fn run(&self, def: &ObjectDef, function: &str, call: Call) -> Result<Value, DispatchError> {
        let handler = self.resolvers.handler(&def.name, function).ok_or_else(|| {
            DispatchError::NotImplemented {
                object: def.name.clone(),
                function: function.to_string(),
            }
        })?;

        let future = handler.call(call);
        let outcome = match self.execute_timeout {
            Some(timeout) => tokio::time::timeout(timeout, future).await.map_err(|_| {
                DispatchError::Timeout {
                    name: format!("{}.{}", def.name, function),
                    timeout_ms: timeout.as_millis() as u64,
                }
            })?,
            None => future.await,
        };

        outcome.map_err(application_error)
    }
}

enum Target<'a> {
    Function(&'a FunctionDef),
    Field(&'a FieldDef),
}

fn constructor_name(def: &ObjectDef) -> &str {
    def.constructor
        .as_ref()
        .map(|c| c.original_name.as_str())
        .unwrap_or("__init__")
}

/// Keeps only the arguments the object's constructor accepts.
fn filter_construction_args(
    def: &ObjectDef,
    args: &Map<String, serde_json::Value>,
) -> Map<String, serde_json::Value> {
    let params = def.construction_params();
    args.iter()
        .filter(|(key, _)| params.iter().any(|p| &p.api_name == *key || &p.name == *key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn application_error(err: eyre::Error) -> DispatchError {
    if let Some(dispatch) = err.downcast_ref::<DispatchError>() {
        return dispatch.clone();
    }

    let error_type = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<FunctionError>())
        .map(|e| e.error_type.clone());

    DispatchError::Application {
        message: format!("{err:#}"),
        error_type,
    }
}

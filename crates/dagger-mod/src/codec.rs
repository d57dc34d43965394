//! Conversion between wire JSON and native [`Value`]s, driven by the
//! resolved type descriptors of a module.

use std::collections::BTreeMap;

use dagger_analyzer::metadata::{
    EnumDef, FieldDef, ModuleMetadata, ObjectDef, ParameterDef, TypeDescriptor, TypeKind,
};
use itertools::Itertools;
use serde_json::Map;

use crate::errors::DispatchError;
use crate::value::{EnumValue, ObjectRef, ObjectValue, Value};

/// Value produced by a builtin `default_factory`, if the factory is known.
pub fn factory_default(factory: &str) -> Option<Value> {
    match factory {
        "list" | "tuple" | "set" | "frozenset" => Some(Value::List(vec![])),
        "dict" => Some(Value::Json(serde_json::Value::Object(Map::new()))),
        "str" => Some(Value::String(String::new())),
        "int" => Some(Value::Int(0)),
        "float" => Some(Value::Float(0.0)),
        "bool" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn json_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".into(),
        serde_json::Value::Bool(_) => "bool".into(),
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "int".into(),
        serde_json::Value::Number(_) => "float".into(),
        serde_json::Value::String(s) => format!("string {s:?}"),
        serde_json::Value::Array(_) => "list".into(),
        serde_json::Value::Object(_) => "object".into(),
    }
}

pub struct Decoder<'m> {
    metadata: &'m ModuleMetadata,
}

impl<'m> Decoder<'m> {
    pub fn new(metadata: &'m ModuleMetadata) -> Self {
        Self { metadata }
    }

    pub fn decode(
        &self,
        ty: &TypeDescriptor,
        value: &serde_json::Value,
        name: &str,
    ) -> Result<Value, DispatchError> {
        if value.is_null() {
            return if ty.accepts_null() {
                Ok(Value::Null)
            } else {
                Err(DispatchError::mismatch(name, ty.render(), "null"))
            };
        }

        let mismatch = || DispatchError::mismatch(name, ty.render(), json_label(value));

        match ty.kind {
            TypeKind::Void => Ok(Value::Null),
            TypeKind::List => {
                let items = value.as_array().ok_or_else(mismatch)?;
                let element = ty.element().ok_or_else(mismatch)?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.decode(element, item, &format!("{name}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List)
            }
            TypeKind::Primitive => match (ty.base_name.as_str(), value) {
                ("str", serde_json::Value::String(s)) => Ok(Value::String(s.clone())),
                ("bool", serde_json::Value::Bool(b)) => Ok(Value::Bool(*b)),
                ("int", serde_json::Value::Number(n)) => n.as_i64().map(Value::Int).ok_or_else(mismatch),
                ("float", serde_json::Value::Number(n)) => {
                    n.as_f64().map(Value::Float).ok_or_else(mismatch)
                }
                _ => Err(mismatch()),
            },
            TypeKind::Enum => {
                let def = self.enum_def(&ty.base_name)?;
                let text = value.as_str().ok_or_else(mismatch)?;
                decode_enum(def, text).ok_or_else(|| {
                    DispatchError::mismatch(
                        name,
                        format!(
                            "one of {}",
                            def.members.iter().map(|m| m.value.as_str()).join(", ")
                        ),
                        json_label(value),
                    )
                })
            }
            TypeKind::Object => match value {
                serde_json::Value::Object(_) => {
                    let def = self.object_def(&ty.base_name)?;
                    self.decode_object(def, value).map(Value::Object)
                }
                _ => Err(mismatch()),
            },
            TypeKind::Interface if value.is_object() => {
                let def = self.implementation(&ty.base_name, value).ok_or_else(mismatch)?;
                self.decode_object(def, value).map(Value::Object)
            }
            TypeKind::Interface | TypeKind::External => match value {
                serde_json::Value::String(id) => Ok(Value::Reference(ObjectRef {
                    type_name: ty.base_name.clone(),
                    id: id.clone(),
                })),
                _ => Err(mismatch()),
            },
            TypeKind::Scalar => Ok(Value::Json(value.clone())),
            TypeKind::Union => ty
                .type_args
                .iter()
                .find_map(|member| self.decode(member, value, name).ok())
                .ok_or_else(mismatch),
        }
    }

    /// Rebuilds a receiver from its serialized state.
    pub fn decode_object(
        &self,
        def: &ObjectDef,
        state: &serde_json::Value,
    ) -> Result<ObjectValue, DispatchError> {
        let fields = state
            .as_object()
            .ok_or_else(|| DispatchError::mismatch(&def.name, "object", json_label(state)))?;

        let mut object = ObjectValue::new(&def.name);
        for field in &def.fields {
            let raw = fields
                .get(&field.api_name)
                .or_else(|| fields.get(&field.original_name));

            let value = match raw {
                Some(raw) => self.decode(&field.ty, raw, &field.original_name)?,
                None => self.field_default(def, field)?,
            };
            object.set(&field.original_name, value);
        }

        Ok(object)
    }

    /// Value of a field left out of the state.
    pub fn field_default(&self, def: &ObjectDef, field: &FieldDef) -> Result<Value, DispatchError> {
        if let Some(default) = &field.default_value {
            return self.decode(&field.ty, default, &field.original_name);
        }
        if let Some(value) = field.default_factory.as_deref().and_then(factory_default) {
            return Ok(value);
        }
        if field.ty.accepts_null() {
            return Ok(Value::Null);
        }

        Err(DispatchError::MissingField {
            object: def.name.clone(),
            field: field.original_name.clone(),
        })
    }

    /// Decodes call arguments keyed by API name into native arguments keyed
    /// by parameter name. Unknown arguments are ignored.
    pub fn decode_args(
        &self,
        function: &str,
        params: &[ParameterDef],
        args: &Map<String, serde_json::Value>,
    ) -> Result<BTreeMap<String, Value>, DispatchError> {
        let mut decoded = BTreeMap::new();

        for param in params {
            let raw = args.get(&param.api_name).or_else(|| args.get(&param.name));
            let value = match raw {
                Some(raw) => self.decode(&param.ty, raw, &param.name)?,
                None => match &param.default_value {
                    Some(default) => self.decode(&param.ty, default, &param.name)?,
                    None if param.is_optional() => Value::Null,
                    None => {
                        return Err(DispatchError::MissingArgument {
                            function: function.to_string(),
                            argument: param.name.clone(),
                        })
                    }
                },
            };
            decoded.insert(param.name.clone(), value);
        }

        for key in args.keys() {
            if !params.iter().any(|p| &p.api_name == key || &p.name == key) {
                tracing::debug!(function = function, argument = %key, "ignoring unknown argument");
            }
        }

        Ok(decoded)
    }

    /// The one declared object that implements `interface` and can hold
    /// every key of `state`. Ambiguous state resolves to nothing.
    fn implementation(&self, interface: &str, state: &serde_json::Value) -> Option<&'m ObjectDef> {
        let interface = self.metadata.object(interface).filter(|o| o.is_interface)?;
        let keys = state.as_object()?;

        let candidates = self
            .metadata
            .objects
            .values()
            .filter(|o| !o.is_interface)
            .filter(|o| {
                interface
                    .functions
                    .iter()
                    .all(|f| o.function(&f.api_name).is_some())
            })
            .filter(|o| keys.keys().all(|key| o.field(key).is_some()))
            .collect::<Vec<_>>();

        match candidates.as_slice() {
            [def] => Some(*def),
            _ => None,
        }
    }

    fn object_def(&self, name: &str) -> Result<&'m ObjectDef, DispatchError> {
        self.metadata
            .object(name)
            .ok_or_else(|| DispatchError::UnknownObject {
                object: name.to_string(),
            })
    }

    fn enum_def(&self, name: &str) -> Result<&'m EnumDef, DispatchError> {
        self.metadata
            .enum_def(name)
            .ok_or_else(|| DispatchError::UnknownObject {
                object: name.to_string(),
            })
    }
}

/// Matches a member by wire value first, then by member name.
fn decode_enum(def: &EnumDef, text: &str) -> Option<Value> {
    def.member_by_value(text)
        .or_else(|| def.member_by_name(text))
        .map(|member| {
            Value::Enum(EnumValue {
                type_name: def.name.clone(),
                name: member.name.clone(),
                value: member.value.clone(),
            })
        })
}

pub struct Encoder<'m> {
    metadata: &'m ModuleMetadata,
}

impl<'m> Encoder<'m> {
    pub fn new(metadata: &'m ModuleMetadata) -> Self {
        Self { metadata }
    }

    /// Encodes a handler result. A missing descriptor encodes as void.
    pub fn encode(
        &self,
        ty: Option<&TypeDescriptor>,
        value: &Value,
        name: &str,
    ) -> Result<serde_json::Value, DispatchError> {
        let Some(ty) = ty.filter(|ty| !ty.is_void()) else {
            return Ok(serde_json::Value::Null);
        };

        if value.is_null() {
            return if ty.accepts_null() {
                Ok(serde_json::Value::Null)
            } else {
                Err(DispatchError::UnexpectedNull {
                    name: name.to_string(),
                    expected: ty.render(),
                })
            };
        }

        let mismatch = || DispatchError::mismatch(name, ty.render(), value.type_label());

        match (ty.kind, value) {
            (TypeKind::List, Value::List(items)) => {
                let element = ty.element().ok_or_else(mismatch)?;
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.encode(Some(element), item, &format!("{name}[{i}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(serde_json::Value::Array)
            }
            (TypeKind::Primitive, value) => match (ty.base_name.as_str(), value) {
                ("str", Value::String(s)) => Ok(serde_json::Value::String(s.clone())),
                ("bool", Value::Bool(b)) => Ok(serde_json::Value::Bool(*b)),
                ("int", Value::Int(i)) => Ok((*i).into()),
                ("float", Value::Float(f)) => serde_json::Number::from_f64(*f)
                    .map(serde_json::Value::Number)
                    .ok_or_else(mismatch),
                ("float", Value::Int(i)) => Ok((*i as f64).into()),
                _ => Err(mismatch()),
            },
            (TypeKind::Enum, Value::Enum(member)) => self.encode_enum(ty, &member.name, name),
            (TypeKind::Enum, Value::String(text)) => self.encode_enum(ty, text, name),
            (TypeKind::Object | TypeKind::Interface, Value::Object(object)) => {
                let type_name = if self.metadata.object(&object.type_name).is_some() {
                    &object.type_name
                } else {
                    &ty.base_name
                };
                let def = self
                    .metadata
                    .object(type_name)
                    .ok_or_else(|| DispatchError::UnknownObject {
                        object: type_name.to_string(),
                    })?;
                self.encode_object(def, object)
            }
            (TypeKind::Interface | TypeKind::External, Value::Reference(reference)) => {
                Ok(serde_json::Value::String(reference.id.clone()))
            }
            (TypeKind::External, Value::String(id)) => Ok(serde_json::Value::String(id.clone())),
            (TypeKind::Scalar, value) => Ok(encode_untyped(value)),
            (TypeKind::Union, value) => ty
                .type_args
                .iter()
                .find_map(|member| self.encode(Some(member), value, name).ok())
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        }
    }

    /// Serializes object state keyed by API name, in declaration order.
    pub fn encode_object(
        &self,
        def: &ObjectDef,
        object: &ObjectValue,
    ) -> Result<serde_json::Value, DispatchError> {
        let mut state = Map::new();
        for field in &def.fields {
            let value = object.get(&field.original_name).unwrap_or(&Value::Null);
            let encoded = self.encode(
                Some(&field.ty),
                value,
                &format!("{}.{}", def.name, field.original_name),
            )?;
            state.insert(field.api_name.clone(), encoded);
        }
        Ok(serde_json::Value::Object(state))
    }

    fn encode_enum(
        &self,
        ty: &TypeDescriptor,
        member: &str,
        name: &str,
    ) -> Result<serde_json::Value, DispatchError> {
        let def = self
            .metadata
            .enum_def(&ty.base_name)
            .ok_or_else(|| DispatchError::UnknownObject {
                object: ty.base_name.clone(),
            })?;

        def.member_by_name(member)
            .or_else(|| def.member_by_value(member))
            .map(|m| serde_json::Value::String(m.value.clone()))
            .ok_or_else(|| DispatchError::mismatch(name, ty.render(), format!("member {member:?}")))
    }
}

/// Encodes a value with no declared type to guide it.
pub fn encode_untyped(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => (*b).into(),
        Value::Int(i) => (*i).into(),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => s.clone().into(),
        Value::List(items) => items.iter().map(encode_untyped).collect(),
        Value::Object(object) => object
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_untyped(v)))
            .collect::<Map<_, _>>()
            .into(),
        Value::Enum(member) => member.value.clone().into(),
        Value::Reference(reference) => reference.id.clone().into(),
        Value::Json(json) => json.clone(),
    }
}

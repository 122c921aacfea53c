//! Conversion of wire-format JSON schemas into validated tool parameter schemas.
//!
//! Tool catalogs arrive as loosely-typed JSON Schema. [`to_schema`] turns them
//! into a closed [`ValidatedSchema`] tree that can render itself back to JSON
//! Schema for providers and check tool-call arguments before local execution.
//! Unknown shapes are rejected rather than passed through.

use serde_json::{Map, Value};

use crate::error::RelayError;

/// Maximum nesting accepted by [`to_schema`].
pub const MAX_SCHEMA_DEPTH: usize = 32;

/// A parameter schema that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSchema {
    pub kind: SchemaKind,
    pub description: Option<String>,
    pub required: bool,
}

/// Shape of a [`ValidatedSchema`] node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    /// Properties keep the order they were declared in.
    Object {
        properties: Vec<(String, ValidatedSchema)>,
    },
    String {
        enum_values: Option<Vec<String>>,
    },
    Number,
    Boolean,
    Array {
        items: Box<ValidatedSchema>,
    },
    Any,
}

impl ValidatedSchema {
    fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
            required: true,
        }
    }

    /// An object with no declared properties.
    pub fn empty_object() -> Self {
        Self::object(Vec::new())
    }

    pub fn object(properties: Vec<(String, ValidatedSchema)>) -> Self {
        Self::new(SchemaKind::Object { properties })
    }

    pub fn string() -> Self {
        Self::new(SchemaKind::String { enum_values: None })
    }

    pub fn string_enum(values: &[&str]) -> Self {
        Self::new(SchemaKind::String {
            enum_values: Some(values.iter().map(|v| v.to_string()).collect()),
        })
    }

    pub fn number() -> Self {
        Self::new(SchemaKind::Number)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaKind::Boolean)
    }

    pub fn array(items: ValidatedSchema) -> Self {
        Self::new(SchemaKind::Array {
            items: Box::new(items),
        })
    }

    /// Accepts any JSON value.
    pub fn any() -> Self {
        Self::new(SchemaKind::Any)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Render back to JSON Schema for provider tool declarations.
    pub fn to_json_schema(&self) -> Value {
        let mut out = Map::new();
        match &self.kind {
            SchemaKind::Object { properties } => {
                out.insert("type".into(), "object".into());
                let mut props = Map::new();
                let mut required = Vec::new();
                for (name, schema) in properties {
                    props.insert(name.clone(), schema.to_json_schema());
                    if schema.required {
                        required.push(Value::String(name.clone()));
                    }
                }
                out.insert("properties".into(), Value::Object(props));
                if !required.is_empty() {
                    out.insert("required".into(), Value::Array(required));
                }
            }
            SchemaKind::String { enum_values } => {
                out.insert("type".into(), "string".into());
                if let Some(values) = enum_values {
                    out.insert("enum".into(), serde_json::json!(values));
                }
            }
            SchemaKind::Number => {
                out.insert("type".into(), "number".into());
            }
            SchemaKind::Boolean => {
                out.insert("type".into(), "boolean".into());
            }
            SchemaKind::Array { items } => {
                out.insert("type".into(), "array".into());
                out.insert("items".into(), items.to_json_schema());
            }
            SchemaKind::Any => {}
        }
        if let Some(description) = self.description.as_deref().filter(|d| !d.is_empty()) {
            out.insert("description".into(), description.into());
        }
        Value::Object(out)
    }

    /// Check a value against this schema.
    ///
    /// Returns a message describing the first violation found.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        self.validate_at("$", value)
    }

    fn validate_at(&self, path: &str, value: &Value) -> Result<(), String> {
        match &self.kind {
            SchemaKind::Any => Ok(()),
            SchemaKind::String { enum_values } => {
                let Some(text) = value.as_str() else {
                    return Err(type_mismatch(path, "string", value));
                };
                match enum_values {
                    Some(values) if !values.iter().any(|v| v == text) => Err(format!(
                        "{path}: expected one of [{}], got \"{text}\"",
                        values.join(", ")
                    )),
                    _ => Ok(()),
                }
            }
            SchemaKind::Number if value.is_number() => Ok(()),
            SchemaKind::Number => Err(type_mismatch(path, "number", value)),
            SchemaKind::Boolean if value.is_boolean() => Ok(()),
            SchemaKind::Boolean => Err(type_mismatch(path, "boolean", value)),
            SchemaKind::Array { items } => {
                let Some(elements) = value.as_array() else {
                    return Err(type_mismatch(path, "array", value));
                };
                for (index, element) in elements.iter().enumerate() {
                    items.validate_at(&format!("{path}[{index}]"), element)?;
                }
                Ok(())
            }
            SchemaKind::Object { properties } => {
                let Some(object) = value.as_object() else {
                    return Err(type_mismatch(path, "object", value));
                };
                for (name, schema) in properties {
                    match object.get(name) {
                        Some(field) => schema.validate_at(&format!("{path}.{name}"), field)?,
                        None if schema.required => {
                            return Err(format!("{path}: missing required field '{name}'"));
                        }
                        None => {}
                    }
                }
                Ok(())
            }
        }
    }
}

/// Convert a wire-format JSON schema into a [`ValidatedSchema`].
///
/// `required` marks whether the resulting node itself is required; nested
/// properties take their required-ness from the parent's `required` list.
pub fn to_schema(spec: &Value, required: bool) -> Result<ValidatedSchema, RelayError> {
    convert(spec, required, 0)
}

/// Whether a value looks like a JSON schema this module accepts at the top level.
///
/// `{}` counts as a schema (a tool without inputs).
pub fn is_json_schema(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    if object.is_empty() {
        return true;
    }
    matches!(
        object.get("type").and_then(Value::as_str),
        Some("object" | "string" | "number" | "integer" | "boolean" | "array")
    )
}

fn convert(spec: &Value, required: bool, depth: usize) -> Result<ValidatedSchema, RelayError> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(RelayError::Schema(format!(
            "schema nesting exceeds maximum depth of {MAX_SCHEMA_DEPTH}"
        )));
    }

    let Some(object) = spec.as_object() else {
        return Err(RelayError::Schema(format!(
            "schema must be a JSON object, got {}",
            json_type_name(spec)
        )));
    };

    let description = object
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let kind = match object.get("type") {
        None if object.is_empty() => SchemaKind::Object {
            properties: Vec::new(),
        },
        None if object.contains_key("properties") => convert_object(object, depth)?,
        None => {
            return Err(RelayError::Schema(
                "schema has no type and no object properties".into(),
            ))
        }
        Some(Value::String(kind)) => match kind.as_str() {
            "object" => convert_object(object, depth)?,
            "string" => SchemaKind::String {
                enum_values: string_enum(object),
            },
            "number" | "integer" => SchemaKind::Number,
            "boolean" => SchemaKind::Boolean,
            "array" => {
                let items = object
                    .get("items")
                    .ok_or_else(|| RelayError::Schema("array type must declare items".into()))?;
                SchemaKind::Array {
                    items: Box::new(convert(items, true, depth + 1)?),
                }
            }
            other => {
                return Err(RelayError::Schema(format!(
                    "unsupported schema type \"{other}\""
                )))
            }
        },
        Some(other) => {
            return Err(RelayError::Schema(format!(
                "schema type must be a string, got {}",
                json_type_name(other)
            )))
        }
    };

    Ok(ValidatedSchema {
        kind,
        description,
        required,
    })
}

fn convert_object(object: &Map<String, Value>, depth: usize) -> Result<SchemaKind, RelayError> {
    let required_names: Vec<&str> = object
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut properties = Vec::new();
    if let Some(declared) = object.get("properties") {
        let declared = declared.as_object().ok_or_else(|| {
            RelayError::Schema("object properties must be a JSON object".into())
        })?;
        for (name, property) in declared {
            let is_required = required_names.contains(&name.as_str());
            let schema = convert(property, is_required, depth + 1)
                .map_err(|err| nest_error(name, err))?;
            properties.push((name.clone(), schema));
        }
    }

    Ok(SchemaKind::Object { properties })
}

fn string_enum(object: &Map<String, Value>) -> Option<Vec<String>> {
    let values = object.get("enum")?.as_array()?;
    let values: Vec<String> = values
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    (!values.is_empty()).then_some(values)
}

fn nest_error(property: &str, err: RelayError) -> RelayError {
    match err {
        RelayError::Schema(message) => RelayError::Schema(format!("property '{property}': {message}")),
        other => other,
    }
}

fn type_mismatch(path: &str, expected: &str, value: &Value) -> String {
    format!("{path}: expected {expected}, got {}", json_type_name(value))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Schema normalization for strict structured output and tool calling
//!
//! The `OpenAI` API expects lower-case JSON-schema type names and, in strict
//! mode, an explicit `additionalProperties: false` on every object.

use std::collections::BTreeMap;

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::types::Schema;

/// Fallback name for structured-output schemas without a usable title
const DEFAULT_SCHEMA_NAME: &str = "response";

/// Longest schema name the API accepts
const MAX_SCHEMA_NAME_LEN: usize = 64;

/// Create a normalized deep copy of a schema
///
/// The type name of every node is lower-cased; all other fields are copied
/// verbatim. The input is left untouched and the output shares no nodes with it.
pub fn normalize(schema: &Schema) -> Schema {
    Schema {
        any_of: schema.any_of.iter().map(normalize).collect(),
        default: schema.default.clone(),
        description: schema.description.clone(),
        enum_values: schema.enum_values.clone(),
        example: schema.example.clone(),
        format: schema.format.clone(),
        items: schema.items.as_deref().map(|items| Box::new(normalize(items))),
        max_items: schema.max_items,
        maximum: schema.maximum,
        min_items: schema.min_items,
        minimum: schema.minimum,
        properties: normalize_properties(&schema.properties),
        property_ordering: schema.property_ordering.clone(),
        required: schema.required.clone(),
        title: schema.title.clone(),
        schema_type: schema.schema_type.to_lowercase(),
    }
}

/// Normalize every schema in a property map
pub fn normalize_properties(properties: &BTreeMap<String, Schema>) -> BTreeMap<String, Schema> {
    properties
        .iter()
        .map(|(name, schema)| (name.clone(), normalize(schema)))
        .collect()
}

/// Default `additionalProperties` to `false` on every object schema
///
/// Works on the serialized form so an explicit `additionalProperties` already
/// present in the document is kept as is. Recurses through `properties` of
/// object nodes and through `items` and `anyOf` of any node.
pub fn enforce_strict_objects(value: &mut Value) {
    let Value::Object(obj) = value else {
        return;
    };

    if obj.get("type").and_then(Value::as_str) == Some("object") {
        obj.entry("additionalProperties").or_insert(Value::Bool(false));

        if let Some(Value::Object(properties)) = obj.get_mut("properties") {
            properties.values_mut().for_each(enforce_strict_objects);
        }
    }

    if let Some(items) = obj.get_mut("items") {
        match items {
            Value::Array(entries) => entries.iter_mut().for_each(enforce_strict_objects),
            other => enforce_strict_objects(other),
        }
    }

    if let Some(Value::Array(any_of)) = obj.get_mut("anyOf") {
        any_of.iter_mut().for_each(enforce_strict_objects);
    }
}

/// Serialize a schema into a strict JSON-schema object
///
/// A schema that fails to serialize is a bug in whoever built it, reported
/// as [`LlmError::Internal`].
pub fn to_strict_json_object(schema: &Schema) -> Result<Map<String, Value>, LlmError> {
    let mut value = serde_json::to_value(schema).context("failed to serialize schema")?;
    enforce_strict_objects(&mut value);

    match value {
        Value::Object(obj) => Ok(obj),
        other => Err(LlmError::Internal(anyhow::anyhow!(
            "schema serialized to a non-object value: {other}"
        ))),
    }
}

/// Derive an API-safe name for a structured-output schema
///
/// Uses the schema title, keeping ASCII letters, digits, `_` and `-`, turning
/// spaces into `_` and dropping everything else. The result is capped at 64
/// characters and falls back to `"response"` when nothing usable remains.
pub fn response_schema_name(schema: &Schema) -> String {
    let title = if schema.title.is_empty() {
        DEFAULT_SCHEMA_NAME
    } else {
        schema.title.as_str()
    };

    let name: String = title
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => Some(c),
            ' ' => Some('_'),
            _ => None,
        })
        .take(MAX_SCHEMA_NAME_LEN)
        .collect();

    if name.is_empty() {
        DEFAULT_SCHEMA_NAME.to_owned()
    } else {
        name
    }
}

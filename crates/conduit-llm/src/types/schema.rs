use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// JSON-schema type name
///
/// Authored schemas are not consistent about casing ("OBJECT", "object",
/// "Object"); the value is kept verbatim here and lower-cased when the schema
/// is normalized for the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaType(Cow<'static, str>);

impl SchemaType {
    pub const STRING: Self = Self(Cow::Borrowed("STRING"));
    pub const NUMBER: Self = Self(Cow::Borrowed("NUMBER"));
    pub const INTEGER: Self = Self(Cow::Borrowed("INTEGER"));
    pub const BOOLEAN: Self = Self(Cow::Borrowed("BOOLEAN"));
    pub const ARRAY: Self = Self(Cow::Borrowed("ARRAY"));
    pub const OBJECT: Self = Self(Cow::Borrowed("OBJECT"));
    pub const NULL: Self = Self(Cow::Borrowed("NULL"));

    /// Create a type from an arbitrary name
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lower-cased copy of this type name
    pub fn to_lowercase(&self) -> Self {
        Self(Cow::Owned(self.0.to_lowercase()))
    }
}

/// Recursive JSON-schema node used for tool parameters and structured output
///
/// Every node owns its children, so cloning or normalizing a schema never
/// shares nodes between the copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Alternatives, any one of which must match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<Schema>,
    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Allowed values
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Example value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_json::Value>,
    /// Format hint (e.g. "date-time")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    /// Schema of array items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Maximum array length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<i64>,
    /// Inclusive numeric upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Minimum array length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<i64>,
    /// Inclusive numeric lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Object properties by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    /// Preferred property order for display
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub property_ordering: Vec<String>,
    /// Names of required properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Title, also used to name structured-output schemas
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Type name
    #[serde(default, rename = "type", skip_serializing_if = "SchemaType::is_empty")]
    pub schema_type: SchemaType,
}

impl Schema {
    /// Create a schema node of the given type
    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            ..Self::default()
        }
    }

    /// Create an object schema with the given properties
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, Self)>,
        K: Into<String>,
    {
        Self {
            schema_type: SchemaType::OBJECT,
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Self::default()
        }
    }

    /// Create an array schema with the given item schema
    pub fn array(items: Self) -> Self {
        Self {
            schema_type: SchemaType::ARRAY,
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

//! Dynamic form engine.
//!
//! Server-supplied JSON Schemas (elicitation requests and tool input
//! schemas) are turned into editable [`FormState`], mutated in place by the
//! operations in [`mutate`], and gated at submission by [`validate`].
//! State is built fresh for every incoming schema; a new build replaces,
//! never merges, prior state.

pub mod builder;
pub mod mutate;
pub mod validate;

use serde_json::Value;

use crate::schema::FieldDescriptor;

/// Explicit value-type tag carried by each key/value row of a schema-less
/// object field, used to coerce the string input back to a typed value at
/// submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
}

impl ValueType {
    pub fn from_json(value: &Value) -> Self {
        if value.is_number() {
            ValueType::Number
        } else if value.is_boolean() {
            ValueType::Boolean
        } else {
            ValueType::String
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
        }
    }
}

/// One editable key/value row of an object-as-list field.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRow {
    pub key: String,
    pub value: String,
    pub value_type: ValueType,
}

impl ObjectRow {
    pub fn blank() -> Self {
        ObjectRow {
            key: String::new(),
            value: String::new(),
            value_type: ValueType::String,
        }
    }
}

/// Mutable value of a single field, shaped by its descriptor kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Value),
    /// Ordered list of scalar values.
    List(Vec<Value>),
    /// Ordered list of ordered lists.
    Nested(Vec<Vec<Value>>),
    /// Key/value rows for schema-less objects.
    Rows(Vec<ObjectRow>),
    /// Nested form for object fields with their own properties.
    Form(FormState),
}

/// One field of a form: its normalized descriptor plus current value.
#[derive(Debug, Clone)]
pub struct FormField {
    pub descriptor: FieldDescriptor,
    pub value: FieldValue,
}

/// Editable form state built from one schema. Field order follows the
/// parsed property order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    pub fields: Vec<FormField>,
}

impl PartialEq for FormField {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.name == other.descriptor.name && self.value == other.value
    }
}

impl FormState {
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.descriptor.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FormField> {
        self.fields.iter_mut().find(|f| f.descriptor.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.descriptor.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

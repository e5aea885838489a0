//! Recursive construction of [`FormState`] from a JSON Schema.
//!
//! Seeding rules:
//! - scalars take the schema default, else null;
//! - arrays take one state entry per default item, else one zero-valued
//!   seed when the field is required, else start empty;
//! - nested arrays apply the same rule one level deeper (`[[zero]]` when
//!   required and no default);
//! - schema-less objects become key/value rows derived from the default
//!   object (one blank row when required and empty);
//! - object fields with their own properties recurse into a nested form.
//!
//! Malformed schema branches never fail the build; they yield an empty
//! state for that branch.

use serde_json::Value;

use crate::form::{FieldValue, FormField, FormState, ObjectRow, ValueType};
use crate::schema::{self, FieldKind, ScalarType};

/// Build editable form state from a schema node. Replaces, never merges,
/// any prior state for the same form.
pub fn build(schema: &Value) -> FormState {
    let fields = schema::parse_fields(schema)
        .into_iter()
        .map(|descriptor| {
            let value = initial_value(&descriptor);
            FormField { descriptor, value }
        })
        .collect();
    FormState { fields }
}

fn initial_value(descriptor: &crate::schema::FieldDescriptor) -> FieldValue {
    let default = descriptor.property.get("default");
    match &descriptor.kind {
        FieldKind::Scalar(_) => {
            FieldValue::Scalar(default.cloned().unwrap_or(Value::Null))
        }
        FieldKind::Array(item) => FieldValue::List(seed_list(default, *item, descriptor.required)),
        FieldKind::NestedArray(item) => {
            FieldValue::Nested(seed_nested(default, *item, descriptor.required))
        }
        FieldKind::ObjectList => FieldValue::Rows(seed_rows(default, descriptor.required)),
        FieldKind::Object => FieldValue::Form(build(&descriptor.property)),
    }
}

fn seed_list(default: Option<&Value>, item: ScalarType, required: bool) -> Vec<Value> {
    if let Some(items) = default.and_then(Value::as_array) {
        if !items.is_empty() {
            return items.clone();
        }
    }
    if required {
        vec![item.zero()]
    } else {
        Vec::new()
    }
}

fn seed_nested(default: Option<&Value>, item: ScalarType, required: bool) -> Vec<Vec<Value>> {
    if let Some(rows) = default.and_then(Value::as_array) {
        let seeded: Vec<Vec<Value>> = rows
            .iter()
            .filter_map(Value::as_array)
            .map(|inner| inner.clone())
            .collect();
        if !seeded.is_empty() {
            return seeded;
        }
    }
    if required {
        vec![vec![item.zero()]]
    } else {
        Vec::new()
    }
}

fn seed_rows(default: Option<&Value>, required: bool) -> Vec<ObjectRow> {
    let mut rows: Vec<ObjectRow> = Vec::new();
    if let Some(entries) = default.and_then(Value::as_object) {
        for (key, value) in entries {
            let value_type = ValueType::from_json(value);
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rows.push(ObjectRow {
                key: key.clone(),
                value: rendered,
                value_type,
            });
        }
    }
    if rows.is_empty() && required {
        rows.push(ObjectRow::blank());
    }
    rows
}

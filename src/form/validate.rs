//! Submission gating and payload assembly.
//!
//! Validation is split in two, and deliberately so:
//!
//! - **Control validators** (this module's [`control_errors`]) enforce the
//!   type-specific bounds attached during form construction -- numeric
//!   min/max, string length bounds, email format. They produce field-level
//!   messages and fail earlier and independently of the shallow gate.
//! - **The submission gate** ([`is_valid`]) only checks presence and
//!   non-emptiness of `schema.required` names, recursing into object-typed
//!   properties. Enum membership, numeric bounds and patterns are NOT
//!   checked here.

use serde_json::{Map, Value};

use crate::form::{FieldValue, FormField, FormState, ValueType};

/// Shallow presence/non-empty check against `schema.required`.
///
/// Fails when a required name is missing, null, an empty string, or an
/// empty array. Object-typed required values recurse into the property's
/// own schema. Nothing else is enforced at this layer.
pub fn is_valid(data: &Value, schema: &Value) -> bool {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return true;
    };
    for name in required.iter().filter_map(Value::as_str) {
        let Some(value) = data.get(name) else {
            return false;
        };
        match value {
            Value::Null => return false,
            Value::String(s) if s.is_empty() => return false,
            Value::Array(items) if items.is_empty() => return false,
            Value::Object(_) => {
                let prop = schema
                    .get("properties")
                    .and_then(|p| p.get(name))
                    .cloned()
                    .unwrap_or(Value::Null);
                let is_object_prop =
                    prop.get("type").and_then(Value::as_str) == Some("object");
                if is_object_prop && !is_valid(value, &prop) {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// Run the per-control validators over current state. Returns one
/// `"field: message"` entry per violation; empty means the controls pass.
pub fn control_errors(state: &FormState) -> Vec<String> {
    let mut errors = Vec::new();
    for field in &state.fields {
        collect_field_errors(field, &mut errors);
    }
    errors
}

fn collect_field_errors(field: &FormField, errors: &mut Vec<String>) {
    let name = &field.descriptor.name;
    let constraints = &field.descriptor.constraints;
    match &field.value {
        FieldValue::Scalar(value) => {
            if let Some(n) = value.as_f64() {
                if let Some(min) = constraints.minimum {
                    if n < min {
                        errors.push(format!("{name}: Minimum value is {min}"));
                    }
                }
                if let Some(max) = constraints.maximum {
                    if n > max {
                        errors.push(format!("{name}: Maximum value is {max}"));
                    }
                }
            }
            if let Some(s) = value.as_str() {
                if !s.is_empty() {
                    if let Some(min) = constraints.min_length {
                        if s.chars().count() < min {
                            errors.push(format!("{name}: Minimum length is {min}"));
                        }
                    }
                    if let Some(max) = constraints.max_length {
                        if s.chars().count() > max {
                            errors.push(format!("{name}: Maximum length is {max}"));
                        }
                    }
                    if constraints.format.as_deref() == Some("email") && !looks_like_email(s) {
                        errors.push(format!("{name}: Invalid email format"));
                    }
                }
            }
        }
        FieldValue::Form(inner) => {
            for nested in &inner.fields {
                collect_field_errors(nested, errors);
            }
        }
        _ => {}
    }
}

/// Structural email check mirroring a form-control email validator:
/// one `@` with non-empty local part and a dotted domain.
fn looks_like_email(s: &str) -> bool {
    let mut parts = s.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let Some(domain) = parts.next() else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Assemble the outgoing payload from current state. Object-list rows are
/// coerced by their value-type tag; rows with empty keys are dropped;
/// nested forms recurse.
pub fn submission_value(state: &FormState) -> Value {
    let mut out = Map::new();
    for field in &state.fields {
        let value = match &field.value {
            FieldValue::Scalar(v) => v.clone(),
            FieldValue::List(items) => Value::Array(items.clone()),
            FieldValue::Nested(rows) => Value::Array(
                rows.iter()
                    .map(|inner| Value::Array(inner.clone()))
                    .collect(),
            ),
            FieldValue::Rows(rows) => {
                let mut obj = Map::new();
                for row in rows {
                    if row.key.is_empty() {
                        continue;
                    }
                    obj.insert(row.key.clone(), coerce(&row.value, row.value_type));
                }
                Value::Object(obj)
            }
            FieldValue::Form(inner) => submission_value(inner),
        };
        out.insert(field.descriptor.name.clone(), value);
    }
    Value::Object(out)
}

/// Coerce a row's string input by its explicit value-type tag. Inputs that
/// fail to parse stay strings.
fn coerce(raw: &str, value_type: ValueType) -> Value {
    match value_type {
        ValueType::String => Value::from(raw),
        ValueType::Number => match raw.parse::<f64>() {
            Ok(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::from(raw)),
            Err(_) => Value::from(raw),
        },
        ValueType::Boolean => {
            let lower = raw.to_lowercase();
            Value::Bool(lower == "true" || lower == "1")
        }
    }
}

/// Full submission pipeline: control validators, then the shallow required
/// gate against the originating schema, then null/empty stripping of the
/// outgoing payload. No partial submission: any error blocks the whole
/// payload.
pub fn submit(state: &FormState, schema: &Value) -> Result<Value, Vec<String>> {
    let errors = control_errors(state);
    if !errors.is_empty() {
        return Err(errors);
    }
    let payload = submission_value(state);
    if !is_valid(&payload, schema) {
        return Err(vec![
            "Data does not match the required schema.".to_string()
        ]);
    }
    Ok(strip_empty(payload, state))
}

/// Drop null and empty-string entries from the outgoing payload so
/// optional untouched fields are omitted rather than sent blank.
fn strip_empty(payload: Value, state: &FormState) -> Value {
    let Value::Object(entries) = payload else {
        return payload;
    };
    let mut out = Map::new();
    for (key, value) in entries {
        match &value {
            Value::Null => continue,
            Value::String(s) if s.is_empty() => continue,
            Value::Object(_) => {
                let stripped = match state.field(&key) {
                    Some(field) => match &field.value {
                        FieldValue::Form(inner) => strip_empty(value, inner),
                        _ => value,
                    },
                    None => value,
                };
                out.insert(key, stripped);
            }
            _ => {
                out.insert(key, value);
            }
        }
    }
    Value::Object(out)
}

/// Mask sensitive values before echoing a submission back to the user.
/// Passwords keep their first three characters at most.
pub fn mask_sensitive(data: &Value) -> Value {
    let Value::Object(entries) = data else {
        return data.clone();
    };
    let mut out = entries.clone();
    if let Some(Value::String(password)) = entries.get("password") {
        let masked = if password.chars().count() > 2 {
            let prefix: String = password.chars().take(3).collect();
            format!("{prefix}****")
        } else {
            "****".to_string()
        };
        out.insert("password".to_string(), Value::from(masked));
    }
    Value::Object(out)
}

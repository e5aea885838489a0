//! In-memory mutation of [`FormState`].
//!
//! Every operation preserves the kind of the field it touches; mutators
//! never change a field from one kind to another. Removals do not enforce
//! a floor of one entry -- the submission gate, not mutation, decides
//! whether an empty required list blocks submission. Out-of-range indices
//! and kind mismatches are no-ops.

use crate::form::{FieldValue, FormState, ObjectRow};
use crate::schema::ScalarType;

/// Append one zero-valued entry to a flat array field, honoring the
/// declared item type.
pub fn add_array_item(state: &mut FormState, field: &str) {
    let Some(entry) = state.field_mut(field) else {
        return;
    };
    let item = entry.descriptor.item_type().unwrap_or(ScalarType::String);
    if let FieldValue::List(items) = &mut entry.value {
        items.push(item.zero());
    }
}

/// Remove the entry at `index` from a flat array field.
pub fn remove_array_item(state: &mut FormState, field: &str, index: usize) {
    if let Some(entry) = state.field_mut(field) {
        if let FieldValue::List(items) = &mut entry.value {
            if index < items.len() {
                items.remove(index);
            }
        }
    }
}

/// Append a new inner list (seeded with one zero value) to a nested-array
/// field.
pub fn add_nested_row(state: &mut FormState, field: &str) {
    let Some(entry) = state.field_mut(field) else {
        return;
    };
    let item = entry.descriptor.item_type().unwrap_or(ScalarType::String);
    if let FieldValue::Nested(rows) = &mut entry.value {
        rows.push(vec![item.zero()]);
    }
}

/// Remove one inner list from a nested-array field.
pub fn remove_nested_row(state: &mut FormState, field: &str, row: usize) {
    if let Some(entry) = state.field_mut(field) {
        if let FieldValue::Nested(rows) = &mut entry.value {
            if row < rows.len() {
                rows.remove(row);
            }
        }
    }
}

/// Append one zero-valued entry to the inner list at `parent`.
pub fn add_nested_item(state: &mut FormState, field: &str, parent: usize) {
    let Some(entry) = state.field_mut(field) else {
        return;
    };
    let item = entry.descriptor.item_type().unwrap_or(ScalarType::String);
    if let FieldValue::Nested(rows) = &mut entry.value {
        if let Some(inner) = rows.get_mut(parent) {
            inner.push(item.zero());
        }
    }
}

/// Remove the entry at `child` from the inner list at `parent`.
pub fn remove_nested_item(state: &mut FormState, field: &str, parent: usize, child: usize) {
    if let Some(entry) = state.field_mut(field) {
        if let FieldValue::Nested(rows) = &mut entry.value {
            if let Some(inner) = rows.get_mut(parent) {
                if child < inner.len() {
                    inner.remove(child);
                }
            }
        }
    }
}

/// Append one blank key/value row to an object-as-list field.
pub fn add_object_row(state: &mut FormState, field: &str) {
    if let Some(entry) = state.field_mut(field) {
        if let FieldValue::Rows(rows) = &mut entry.value {
            rows.push(ObjectRow::blank());
        }
    }
}

/// Remove the key/value row at `index` from an object-as-list field.
pub fn remove_object_row(state: &mut FormState, field: &str, index: usize) {
    if let Some(entry) = state.field_mut(field) {
        if let FieldValue::Rows(rows) = &mut entry.value {
            if index < rows.len() {
                rows.remove(index);
            }
        }
    }
}

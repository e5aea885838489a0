//! Rendering directives attached to chat messages.
//!
//! Tools return structured `layouts` payloads alongside (or instead of)
//! text; each layout is a typed directive the render layer turns into a
//! widget. The core only carries these as data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tagged rendering directive. Unknown shapes inside `data` are tolerated;
/// only the `type` tag is structural.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Layout {
    Table { data: TableData },
    Button { data: ButtonData },
    Map { data: MapData },
    Form { data: FormLayoutData },
    Kanban { data: Value },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TableData {
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub column_names: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ButtonData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deeplink: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MapData {
    #[serde(default)]
    pub features: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A form layout re-enters the form engine: `schema` feeds the builder and
/// `actions.submit` names the tool (or API endpoint) the payload goes to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FormLayoutData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<FormActions>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormActions {
    pub submit: FormAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel: Option<FormAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Layout {
    /// Parse a `layouts` array, skipping entries that do not decode.
    pub fn parse_list(value: &Value) -> Vec<Layout> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Layout::Table { .. } => "table",
            Layout::Button { .. } => "button",
            Layout::Map { .. } => "map",
            Layout::Form { .. } => "form",
            Layout::Kanban { .. } => "kanban",
        }
    }
}

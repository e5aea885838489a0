//! Tool result interpretation.
//!
//! A tool returns raw text. It may be plain prose, arbitrary JSON, or a
//! JSON object carrying a `layouts` array of rendering directives. This
//! module decides the chat-rendering shape: what text to show and which
//! layouts to attach. JSON results without layouts are always shown as a
//! fenced code block, never silently dropped.

use serde_json::Value;

use crate::layout::Layout;

/// Result of interpreting one raw tool output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interpreted {
    pub display_text: String,
    pub layouts: Vec<Layout>,
}

/// Decide the rendering shape of a raw tool result.
///
/// 1. Text that does not parse as JSON passes through untouched.
/// 2. A JSON object with a `layouts` key splits: layouts attach as given,
///    and any remaining keys become a pretty-printed code block (empty
///    display text when nothing remains).
/// 3. Any other successful parse -- object without `layouts`, bare scalar,
///    array -- renders as a pretty-printed code block.
pub fn interpret(raw: &str) -> Interpreted {
    let Ok(parsed) = serde_json::from_str::<Value>(raw) else {
        return Interpreted {
            display_text: raw.to_string(),
            layouts: Vec::new(),
        };
    };

    if let Value::Object(entries) = &parsed {
        if let Some(layouts_value) = entries.get("layouts") {
            let layouts = Layout::parse_list(layouts_value);
            let mut rest = entries.clone();
            rest.remove("layouts");
            let display_text = if rest.is_empty() {
                String::new()
            } else {
                code_block(&Value::Object(rest))
            };
            return Interpreted {
                display_text,
                layouts,
            };
        }
    }

    Interpreted {
        display_text: code_block(&parsed),
        layouts: Vec::new(),
    }
}

fn code_block(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{pretty}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_text_passes_through() {
        let out = interpret("plain text");
        assert_eq!(out.display_text, "plain text");
        assert!(out.layouts.is_empty());
    }

    #[test]
    fn test_layouts_only_yields_empty_text() {
        let raw = r#"{"layouts":[{"type":"button","data":{"title":"Go","link":"https://x"}}]}"#;
        let out = interpret(raw);
        assert_eq!(out.display_text, "");
        assert_eq!(out.layouts.len(), 1);
        assert_eq!(out.layouts[0].type_name(), "button");
    }

    #[test]
    fn test_layouts_with_rest_keys_renders_code_block() {
        let raw = r#"{"layouts":[{"type":"button","data":{"title":"Go","link":"u"}}],"status":"ok"}"#;
        let out = interpret(raw);
        assert!(out.display_text.starts_with("```json"));
        assert!(out.display_text.contains("\"status\": \"ok\""));
        assert!(!out.display_text.contains("layouts"));
        assert_eq!(out.layouts.len(), 1);
    }

    #[test]
    fn test_json_without_layouts_renders_code_block() {
        let out = interpret(r#"{"temp":18}"#);
        assert!(out.display_text.starts_with("```json"));
        assert!(out.display_text.contains("\"temp\": 18"));
        assert!(out.layouts.is_empty());
    }

    #[test]
    fn test_scalar_json_falls_back_to_code_block() {
        // "5" parses to the number 5; no layouts to find
        let out = interpret("5");
        assert_eq!(out.display_text, "```json\n5\n```");
        assert!(out.layouts.is_empty());
    }

    #[test]
    fn test_array_json_renders_code_block() {
        let out = interpret("[1,2]");
        assert!(out.display_text.starts_with("```json"));
        assert!(out.layouts.is_empty());
    }

    #[test]
    fn test_layouts_value_not_an_array() {
        // Malformed layouts payload: key consumed, nothing attaches
        let out = interpret(r#"{"layouts":"oops"}"#);
        assert_eq!(out.display_text, "");
        assert!(out.layouts.is_empty());
    }

    #[test]
    fn test_matches_reference_shapes() {
        let with_layouts = interpret(
            &json!({"layouts": [{"type": "button", "data": {"title": "b", "link": "l"}}]})
                .to_string(),
        );
        assert_eq!(with_layouts.display_text, "");
        let plain = interpret("plain text");
        assert!(plain.layouts.is_empty());
    }
}

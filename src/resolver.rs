//! Cross-step references of the form `<step>.response.<path>`.

use serde_json::{Map, Value};

/// Responses of completed steps in one case execution, keyed by
/// step id. Each entry is `{"response": <object>}`.
pub type ResponseRegistry = Map<String, Value>;

/// Segment that marks a string as a cross-step reference.
const RESPONSE_SEGMENT: &str = "response";

/// Resolve `value` against the registry.
///
/// Only strings shaped like `<step>.response.<path...>` whose step
/// is registered are treated as references. Everything else,
/// including dotted strings of any other shape, comes back
/// unchanged. A reference whose path cannot be walked resolves to
/// `null`.
pub fn resolve(value: &Value, registry: &ResponseRegistry) -> Value {
    match value {
        Value::String(text) => {
            resolve_reference(text, registry).unwrap_or_else(|| value.clone())
        }
        _ => value.clone(),
    }
}

/// Resolve `text` if it is a reference to a registered step.
///
/// Returns `None` when `text` is not a reference, so callers can
/// keep the literal.
pub fn resolve_reference(text: &str, registry: &ResponseRegistry) -> Option<Value> {
    let parts: Vec<&str> = text.split('.').collect();
    if parts.len() < 3 || parts[1] != RESPONSE_SEGMENT {
        return None;
    }

    let entry = registry.get(parts[0])?;
    let path = parts[1..].join(".");
    Some(get_value_by_path(entry, &path).cloned().unwrap_or(Value::Null))
}

/// Walk a dot-separated path through objects and arrays. Array
/// components are decimal indices.
pub fn get_value_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    if path.is_empty() {
        return Some(current);
    }

    for part in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part)?;
            }
            Value::Array(array) => {
                let index = part.parse::<usize>().ok()?;
                current = array.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ResponseRegistry {
        let mut registry = ResponseRegistry::new();
        registry.insert(
            "A".into(),
            json!({"response": {"receipt": "0x1", "result": {"logs": [{"topic": "t0"}]}}}),
        );
        registry
    }

    #[test]
    fn test_reference_walks_response() {
        let resolved = resolve(&json!("A.response.receipt"), &registry());
        assert_eq!(resolved, json!("0x1"));
    }

    #[test]
    fn test_reference_walks_arrays() {
        let resolved = resolve(&json!("A.response.result.logs.0.topic"), &registry());
        assert_eq!(resolved, json!("t0"));
    }

    #[test]
    fn test_missing_component_resolves_to_null() {
        let registry = registry();
        assert_eq!(resolve(&json!("A.response.nope"), &registry), Value::Null);
        assert_eq!(
            resolve(&json!("A.response.receipt.deeper"), &registry),
            Value::Null
        );
        assert_eq!(
            resolve(&json!("A.response.result.logs.9"), &registry),
            Value::Null
        );
    }

    #[test]
    fn test_unknown_step_passes_through() {
        let resolved = resolve(&json!("B.response.receipt"), &registry());
        assert_eq!(resolved, json!("B.response.receipt"));
    }

    #[test]
    fn test_non_reference_strings_pass_through() {
        let registry = registry();
        for text in ["plain", "1.5", "A.result.receipt", "A.response", "x.y.z"] {
            assert_eq!(resolve(&json!(text), &registry), json!(text));
            assert_eq!(resolve(&json!(text), &ResponseRegistry::new()), json!(text));
        }
    }

    #[test]
    fn test_non_string_values_pass_through() {
        let registry = registry();
        for value in [json!(1), json!(null), json!(["A.response.receipt"]), json!({"k": 1})] {
            assert_eq!(resolve(&value, &registry), value);
        }
    }

    #[test]
    fn test_get_value_by_path_empty_path_is_root() {
        let value = json!({"a": 1});
        assert_eq!(get_value_by_path(&value, ""), Some(&value));
    }
}

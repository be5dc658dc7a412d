//! `{{dotted.path}}` placeholder resolution against an execution context.
//!
//! Unresolved placeholders are left in the output verbatim, so a typo in a
//! template shows up in the rendered text instead of raising an error.

use serde_json::{Map, Value};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Walk `path` (split on `.`) through `context`.
///
/// Arrays are indexed by numeric segments, so `items.0.name` works.
/// Returns `None` as soon as a segment is missing.
pub fn resolve_path<'a>(context: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = context.get(first)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Interpolate a single template string.
///
/// String values are inserted as-is; any other JSON value is inserted in its
/// serialized form.
pub fn interpolate_str(template: &str, context: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        out.push_str(&rest[..start]);
        let token = &rest[start..start + OPEN.len() + end + CLOSE.len()];
        let path = after_open[..end].trim();

        match resolve_path(context, path) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str(token),
        }

        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

/// Interpolate `template` if it is a string; every other value passes
/// through untouched.
pub fn interpolate(template: &Value, context: &Map<String, Value>) -> Value {
    match template {
        Value::String(s) => Value::String(interpolate_str(s, context)),
        other => other.clone(),
    }
}

/// Deep variant used by the built-in actions on their whole `config`.
///
/// Strings nested inside arrays and objects are interpolated. A string that
/// is exactly one placeholder resolves to the referenced value itself, keeping
/// its JSON type (`"{{data.count}}"` yields `3`, not `"3"`).
pub fn interpolate_value(template: &Value, context: &Map<String, Value>) -> Value {
    match template {
        Value::String(s) => {
            if let Some(path) = single_token(s) {
                if let Some(value) = resolve_path(context, path) {
                    return value.clone();
                }
            }
            Value::String(interpolate_str(s, context))
        }
        Value::Array(items) => Value::Array(
            items.iter().map(|item| interpolate_value(item, context)).collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn single_token(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(OPEN) || inner.contains(CLOSE) {
        return None;
    }
    Some(inner.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn resolves_nested_path() {
        let context = ctx(json!({ "user": { "name": "Ada" } }));
        assert_eq!(
            interpolate(&json!("Hello {{user.name}}"), &context),
            json!("Hello Ada")
        );
    }

    #[test]
    fn missing_path_is_left_verbatim() {
        let context = Map::new();
        assert_eq!(interpolate_str("{{missing}}", &context), "{{missing}}");
        assert_eq!(
            interpolate_str("a {{user.name}} b", &ctx(json!({ "user": {} }))),
            "a {{user.name}} b"
        );
    }

    #[test]
    fn multiple_tokens_and_non_string_values() {
        let context = ctx(json!({ "order": { "id": 42, "items": ["x", "y"] }, "who": "bob" }));
        assert_eq!(
            interpolate_str("{{who}}: order {{order.id}} / {{order.items.1}}", &context),
            "bob: order 42 / y"
        );
    }

    #[test]
    fn unterminated_token_is_kept() {
        let context = ctx(json!({ "a": "b" }));
        assert_eq!(interpolate_str("x {{a", &context), "x {{a");
    }

    #[test]
    fn non_string_templates_pass_through() {
        let context = ctx(json!({ "a": "b" }));
        let template = json!({ "nested": "{{a}}" });
        assert_eq!(interpolate(&template, &context), template);
        assert_eq!(interpolate(&json!(7), &context), json!(7));
    }

    #[test]
    fn deep_interpolation_keeps_single_token_types() {
        let context = ctx(json!({ "data": { "count": 3, "name": "widget" } }));
        let rendered = interpolate_value(
            &json!({
                "count": "{{data.count}}",
                "label": "{{data.name}} x{{data.count}}",
                "list": ["{{data.name}}", 1],
                "missing": "{{data.nope}}"
            }),
            &context,
        );
        assert_eq!(
            rendered,
            json!({
                "count": 3,
                "label": "widget x3",
                "list": ["widget", 1],
                "missing": "{{data.nope}}"
            })
        );
    }
}

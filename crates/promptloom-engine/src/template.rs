//! Placeholder resolution for node configuration strings.
//!
//! Placeholders look like `{{ path.to.value }}` and are resolved against the
//! run's variable context with dotted-path descent into nested objects and
//! arrays. Resolution is fail-open: a placeholder whose path cannot be fully
//! resolved is left untouched, so partially-populated contexts do not
//! destroy message structure.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use promptloom_core::run::Variables;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder regex is valid"))
}

/// Resolve all placeholders in `text` against `context`.
pub fn resolve(text: &str, context: &Variables) -> String {
    resolve_inner(text, context, false)
}

/// Like [`resolve`], but percent-encodes each substituted value. Used for
/// URLs, where raw variable content would break the request line.
pub fn resolve_url(text: &str, context: &Variables) -> String {
    resolve_inner(text, context, true)
}

fn resolve_inner(text: &str, context: &Variables, encode: bool) -> String {
    // Fast path: nothing to resolve
    if !text.contains("{{") {
        return text.to_string();
    }

    placeholder_re()
        .replace_all(text, |caps: &Captures| {
            let path = caps[1].trim();
            match lookup(context, path) {
                Some(value) => {
                    let s = stringify(value);
                    if encode {
                        urlencoding::encode(&s).into_owned()
                    } else {
                        s
                    }
                }
                // Path not found: keep the original placeholder
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Walk a dotted path into the context. Objects descend by key, arrays by
/// numeric index. Returns None as soon as any segment is missing.
pub(crate) fn lookup<'a>(context: &'a Variables, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Stringification policy: strings verbatim, numbers in their JSON form,
/// booleans as `true`/`false`, null as the empty string, composites as
/// canonical JSON.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        composite => composite.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: Value) -> Variables {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_simple_substitution() {
        let ctx = context(json!({"name": "World"}));
        assert_eq!(resolve("Hello {{name}}", &ctx), "Hello World");
        assert_eq!(resolve("Hello {{ name }}", &ctx), "Hello World");
    }

    #[test]
    fn test_missing_placeholder_left_untouched() {
        let ctx = Variables::new();
        assert_eq!(resolve("{{missing}}", &ctx), "{{missing}}");

        let ctx = context(json!({"user": {"name": "Ada"}}));
        assert_eq!(resolve("{{user.email}}", &ctx), "{{user.email}}");
    }

    #[test]
    fn test_dotted_path_descent() {
        let ctx = context(json!({
            "user": {"name": "Ada", "tags": ["admin", "ops"]},
        }));
        assert_eq!(resolve("{{user.name}}", &ctx), "Ada");
        assert_eq!(resolve("{{user.tags.1}}", &ctx), "ops");
    }

    #[test]
    fn test_scalar_policy() {
        let ctx = context(json!({"n": 3.5, "i": 42, "b": true, "nothing": null}));
        assert_eq!(resolve("{{n}}/{{i}}/{{b}}/{{nothing}}", &ctx), "3.5/42/true/");
    }

    #[test]
    fn test_composite_serialized_as_json() {
        let ctx = context(json!({"obj": {"a": 1}, "arr": [1, 2]}));
        assert_eq!(resolve("{{obj}}", &ctx), r#"{"a":1}"#);
        assert_eq!(resolve("{{arr}}", &ctx), "[1,2]");
    }

    #[test]
    fn test_no_placeholder_fast_path() {
        let ctx = context(json!({"x": "y"}));
        assert_eq!(resolve("plain text", &ctx), "plain text");
    }

    #[test]
    fn test_url_resolution_percent_encodes() {
        let ctx = context(json!({"q": "a b&c"}));
        assert_eq!(
            resolve_url("https://api.test/search?q={{q}}", &ctx),
            "https://api.test/search?q=a%20b%26c"
        );
    }

    #[test]
    fn test_multiple_placeholders() {
        let ctx = context(json!({"a": "1", "b": "2"}));
        assert_eq!(resolve("{{a}}+{{b}}={{c}}", &ctx), "1+2={{c}}");
    }
}

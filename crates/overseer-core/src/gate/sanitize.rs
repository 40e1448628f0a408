//! Input sanitisation. Values headed for storage are scrubbed of script fragments,
//! HTML, and NUL bytes, and long strings are truncated; maps and lists are handled
//! recursively, keys included.

use crate::config::SecurityConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("script pattern is valid")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// Sanitise a single string according to the security policy
pub fn sanitize_string(input: &str, config: &SecurityConfig) -> String {
    let mut text = input.replace('\0', "");
    // script bodies are dropped even when html is allowed
    text = SCRIPT_RE.replace_all(&text, "").into_owned();
    if !config.allow_html {
        text = TAG_RE.replace_all(&text, "").into_owned();
    }
    truncate_chars(&text, config.max_string_length)
}

/// Recursively sanitise a JSON value in place
pub fn sanitize_value(value: &mut Value, config: &SecurityConfig) {
    match value {
        Value::String(s) => *s = sanitize_string(s, config),
        Value::Array(items) => {
            for item in items {
                sanitize_value(item, config);
            }
        }
        Value::Object(map) => {
            let entries = std::mem::replace(map, Map::new());
            for (key, mut inner) in entries {
                sanitize_value(&mut inner, config);
                map.insert(sanitize_string(&key, config), inner);
            }
        }
        _ => {}
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

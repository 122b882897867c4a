use serde::{Deserialize, Deserializer};

/// Merge two JSON values. If both values are objects, the entries of `b` are
/// inserted into `a` (overwriting on key collision). Otherwise `a` wins.
pub fn merge(a: serde_json::Value, b: serde_json::Value) -> serde_json::Value {
    match (a, b) {
        (serde_json::Value::Object(mut a_map), serde_json::Value::Object(b_map)) => {
            b_map.into_iter().for_each(|(key, value)| {
                a_map.insert(key, value);
            });
            serde_json::Value::Object(a_map)
        }
        (a, _) => a,
    }
}

pub fn merge_inplace(a: &mut serde_json::Value, b: serde_json::Value) {
    if let (serde_json::Value::Object(a_map), serde_json::Value::Object(b_map)) = (a, b) {
        b_map.into_iter().for_each(|(key, value)| {
            a_map.insert(key, value);
        });
    }
}

/// Deserialize a field that some providers send as `null` instead of `[]`.
pub fn null_or_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

// Placeholder used while unescaping so that literal backslashes survive the
// quote/newline passes. NUL bytes cannot appear in JSON text.
const BACKSLASH_SENTINEL: &str = "\u{0}\u{0}";

/// Canonicalize tool-call argument text before it is parsed as JSON.
///
/// Some models double-encode their function arguments, returning the JSON
/// object wrapped in one extra layer of string quoting
/// (`"{\"key\": \"value\"}"`), and some pretty-print with CRLF line endings.
/// Both quirks are undone here; nothing else is touched, and the function is
/// idempotent. This does *not* validate the result as JSON — a later parse
/// failure is its own error, not masked here.
pub fn normalize_tool_arguments(raw: &str) -> String {
    if raw.is_empty() {
        return raw.to_string();
    }

    let mut text = raw.to_string();

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        let inner = &text[1..text.len() - 1];
        // Only unwrap when the inner content actually shows escape markers,
        // otherwise a legitimate JSON string argument would be corrupted.
        if inner.contains("\\\"") || inner.contains("\\n") {
            // Escaped backslashes must be protected before the quote pass:
            // unescaping quotes first corrupts `\\\"` sequences.
            text = inner
                .replace("\\\\", BACKSLASH_SENTINEL)
                .replace("\\\"", "\"")
                .replace("\\n", "\n")
                .replace("\\r", "\r")
                .replace("\\t", "\t")
                .replace(BACKSLASH_SENTINEL, "\\");
        }
    }

    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let a = serde_json::json!({"key1": "value1"});
        let b = serde_json::json!({"key2": "value2"});
        let result = merge(a, b);
        let expected = serde_json::json!({"key1": "value1", "key2": "value2"});
        assert_eq!(result, expected);
    }

    #[test]
    fn test_merge_inplace() {
        let mut a = serde_json::json!({"key1": "value1"});
        merge_inplace(&mut a, serde_json::json!({"key1": "override", "key2": "value2"}));
        assert_eq!(
            a,
            serde_json::json!({"key1": "override", "key2": "value2"})
        );
    }

    #[test]
    fn test_null_or_vec() {
        #[derive(serde::Deserialize)]
        struct Holder {
            #[serde(default, deserialize_with = "null_or_vec")]
            items: Vec<u32>,
        }

        let holder: Holder = serde_json::from_str(r#"{"items": null}"#).unwrap();
        assert!(holder.items.is_empty());

        let holder: Holder = serde_json::from_str(r#"{"items": [1, 2]}"#).unwrap();
        assert_eq!(holder.items, vec![1, 2]);

        let holder: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert!(holder.items.is_empty());
    }

    #[test]
    fn test_normalize_empty_unchanged() {
        assert_eq!(normalize_tool_arguments(""), "");
    }

    #[test]
    fn test_normalize_clean_json_unchanged() {
        let clean = r#"{"location": "Boston"}"#;
        assert_eq!(normalize_tool_arguments(clean), clean);
    }

    #[test]
    fn test_normalize_double_encoded() {
        // The wire text is the JSON object re-encoded as a JSON string.
        let raw = "\"{\\n  \\\"location\\\": \\\"Boston\\\"\\n}\"";
        let expected = "{\n  \"location\": \"Boston\"\n}";
        assert_eq!(normalize_tool_arguments(raw), expected);
    }

    #[test]
    fn test_normalize_protects_escaped_backslashes() {
        // `C:\\path` inside a double-encoded string must come out as `C:\path`
        // in the inner JSON text, not lose its backslash entirely.
        let raw = "\"{\\\"dir\\\": \\\"C:\\\\\\\\tmp\\\"}\"";
        let expected = "{\"dir\": \"C:\\\\tmp\"}";
        assert_eq!(normalize_tool_arguments(raw), expected);
        // And the result must still parse.
        let value: serde_json::Value =
            serde_json::from_str(&normalize_tool_arguments(raw)).unwrap();
        assert_eq!(value["dir"], "C:\\tmp");
    }

    #[test]
    fn test_normalize_crlf() {
        let raw = "{\r\n  \"a\": 1,\r  \"b\": 2\r\n}";
        assert_eq!(normalize_tool_arguments(raw), "{\n  \"a\": 1,\n  \"b\": 2\n}");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "",
            r#"{"location": "Boston"}"#,
            "\"{\\n  \\\"location\\\": \\\"Boston\\\"\\n}\"",
            "{\r\n  \"pretty\": true\r\n}",
            r#""just a string argument""#,
        ];
        for sample in samples {
            let once = normalize_tool_arguments(sample);
            let twice = normalize_tool_arguments(&once);
            assert_eq!(once, twice, "normalize must be idempotent for {sample:?}");
        }
    }
}

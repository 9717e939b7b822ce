use std::borrow::Cow;

use serde_json::Value;

/// Escapes `& < > " '` to their entity form. `&` goes first so the entities
/// produced for the others are not escaped again.
///
/// Not idempotent: escaping an already escaped string double-escapes `&`.
///
/// ```
/// use reweave::escape;
///
/// assert_eq!(escape("<b>&'\"</b>"), "&lt;b&gt;&amp;&#39;&quot;&lt;/b&gt;");
/// assert_eq!(escape("plain"), "plain");
/// ```
pub fn escape(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }

    let mut output = String::with_capacity(input.len() + input.len() / 4);
    for c in input.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            other => output.push(other),
        }
    }
    Cow::Owned(output)
}

/// Turns a state value into text for substitution into markup.
///
/// Strings are escaped. Numbers, booleans and `null` carry no markup and are
/// written as-is. Sequences are joined with `,` and mappings are written as
/// `[object Object]`, matching how the values stringify in a browser; the
/// joined text of a sequence is escaped since its items may be strings.
pub fn sanitize(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => escape(s),
        Value::Null => Cow::Borrowed("null"),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(stringify)
                .collect::<Vec<_>>()
                .join(",");
            Cow::Owned(escape(&joined).into_owned())
        }
        Value::Object(_) => Cow::Borrowed("[object Object]"),
    }
}

/// Unescaped string form of a sequence item. `null` items are empty.
fn stringify(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed(""),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Array(items) => Cow::Owned(
            items
                .iter()
                .map(stringify)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Cow::Borrowed("[object Object]"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_escape_removes_markup_characters() {
        let escaped = escape("<b>&'\"</b>");
        for raw in ['<', '>', '"', '\''] {
            assert!(!escaped.contains(raw), "{raw} survived escaping");
        }
        // Every remaining `&` starts an entity.
        assert_eq!(
            escaped.matches('&').count(),
            escaped.matches(';').count(),
            "stray ampersand in {escaped}"
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escape_ampersand_first() {
        assert_eq!(escape("&lt;"), "&amp;lt;");
        assert_eq!(escape(&escape("&")), "&amp;amp;");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_escape_borrows_clean_input() {
        assert!(matches!(escape("nothing to do"), Cow::Borrowed(_)));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_sanitize_scalars() {
        assert_eq!(sanitize(&json!("<i>")), "&lt;i&gt;");
        assert_eq!(sanitize(&json!(42)), "42");
        assert_eq!(sanitize(&json!(1.5)), "1.5");
        assert_eq!(sanitize(&json!(true)), "true");
        assert_eq!(sanitize(&Value::Null), "null");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_sanitize_composites() {
        assert_eq!(sanitize(&json!(["a", 1, null, "<"])), "a,1,,&lt;");
        assert_eq!(sanitize(&json!({ "a": 1 })), "[object Object]");
    }
}

//! HTML escaping and safe-string handling.
//!
//! Escaped characters: `&`, `"`, `'`, `<` and `>`.

use crate::types::Value;

/// Escape HTML special characters.
///
/// # Example
///
/// ```
/// use weft::escape_html;
///
/// assert_eq!(escape_html("<b>\"Tom\" & 'Jerry'</b>"),
///            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;");
/// ```
pub fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render a value for output.
///
/// Safe values are written as-is; everything else is escaped when
/// `autoescape` is on. Decided per value on every call.
pub fn suppress_value(value: &Value, autoescape: bool) -> String {
    match value {
        Value::Safe(s) => s.to_string(),
        other if autoescape => escape_html(&other.to_string()),
        other => other.to_string(),
    }
}

/// Mark output captured from a template body.
///
/// With autoescaping on, the body was already escaped as it was rendered,
/// so it must not be escaped again.
pub(crate) fn captured(output: String, autoescape: bool) -> Value {
    if autoescape {
        Value::Safe(output.into())
    } else {
        Value::String(output.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_all_special_characters() {
        assert_eq!(escape_html("a & b"), "a &amp; b");
        assert_eq!(escape_html("<i>"), "&lt;i&gt;");
        assert_eq!(escape_html("\"'"), "&quot;&#39;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn safe_values_bypass_escaping() {
        assert_eq!(suppress_value(&Value::safe("<b>"), true), "<b>");
        assert_eq!(suppress_value(&Value::from("<b>"), true), "&lt;b&gt;");
        assert_eq!(suppress_value(&Value::from("<b>"), false), "<b>");
    }

    #[test]
    fn undefined_renders_empty() {
        assert_eq!(suppress_value(&Value::Undefined, true), "");
        assert_eq!(suppress_value(&Value::None, true), "");
    }
}

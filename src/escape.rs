//! Quoting helpers for identifiers and string literals embedded in catalog queries.

/// Quote an identifier with backticks, doubling any embedded backtick.
pub fn escape_id(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal with single quotes.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render `('a', 'b', ...)` for an `IN` clause. Callers must not pass an empty slice.
pub fn in_list(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| escape_string(v)).collect();
    format!("({})", quoted.join(", "))
}

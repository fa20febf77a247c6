//! SQL identifier quoting
//!
//! Database names cannot be bound as statement parameters, so every name
//! that ends up in DDL goes through [`quote_ident`].

/// Quote `name` as a PostgreSQL identifier
///
/// The result is wrapped in double quotes with embedded quotes doubled and
/// NUL bytes removed, so it is always a single identifier token.
///
/// # Example
/// ```
/// use ephemeral_pg::database::quote_ident;
///
/// assert_eq!(quote_ident("kv"), "\"kv\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        match c {
            '\0' => {}
            '"' => quoted.push_str("\"\""),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quote_plain_name() {
        assert_eq!(quote_ident("ephemeral_template_abc"), "\"ephemeral_template_abc\"");
    }

    #[test]
    fn test_quote_keeps_case_and_spaces() {
        assert_eq!(quote_ident("Mixed Case"), "\"Mixed Case\"");
    }

    #[test]
    fn test_quote_neutralizes_injection() {
        let quoted = quote_ident("x\"; DROP DATABASE postgres; --");
        assert_eq!(quoted, "\"x\"\"; DROP DATABASE postgres; --\"");
    }

    #[test]
    fn test_quote_strips_nul() {
        assert_eq!(quote_ident("a\0b"), "\"ab\"");
    }
}

//! SQL identifier quoting.
//!
//! Identifiers are emitted bare when they are plain lower-case names, and
//! double-quoted otherwise. When reserved-word quoting is enabled the
//! reserved-word list comes from the server (`pg_get_keywords()`), not from
//! a baked-in table, so it always matches the connected version.

use std::collections::HashSet;

/// Quoting policy shared by every statement renderer.
#[derive(Debug, Clone, Default)]
pub struct Quoter {
    reserved: HashSet<String>,
}

impl Quoter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quote identifiers colliding with the given reserved words.
    pub fn with_reserved(reserved: HashSet<String>) -> Self {
        Self { reserved }
    }

    /// Render one identifier, quoting when necessary.
    pub fn ident(&self, name: &str) -> String {
        if is_plain(name) && !self.reserved.contains(name) {
            name.to_string()
        } else {
            format!("\"{}\"", name.replace('"', "\"\""))
        }
    }

    /// Render a schema-qualified name.
    pub fn qualname(&self, schema: &str, name: &str) -> String {
        format!("{}.{}", self.ident(schema), self.ident(name))
    }
}

fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Escape a string literal (single quotes doubled).
pub fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_stay_bare() {
        let q = Quoter::new();
        assert_eq!(q.ident("orders"), "orders");
        assert_eq!(q.ident("_tmp2"), "_tmp2");
    }

    #[test]
    fn odd_names_get_quoted() {
        let q = Quoter::new();
        assert_eq!(q.ident("Orders"), "\"Orders\"");
        assert_eq!(q.ident("has space"), "\"has space\"");
        assert_eq!(q.ident("qu\"ote"), "\"qu\"\"ote\"");
        assert_eq!(q.ident("1st"), "\"1st\"");
    }

    #[test]
    fn reserved_words_quote_only_when_listed() {
        let bare = Quoter::new();
        assert_eq!(bare.ident("user"), "user");

        let mut words = HashSet::new();
        words.insert("user".to_string());
        let strict = Quoter::with_reserved(words);
        assert_eq!(strict.ident("user"), "\"user\"");
        assert_eq!(strict.ident("orders"), "orders");
    }

    #[test]
    fn qualname_quotes_both_parts() {
        let q = Quoter::new();
        assert_eq!(q.qualname("public", "orders"), "public.orders");
        assert_eq!(q.qualname("public", "My Table"), "public.\"My Table\"");
    }

    #[test]
    fn literal_escapes_quotes() {
        assert_eq!(literal("it's"), "'it''s'");
    }
}

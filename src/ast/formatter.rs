/// Layout of rendered SQL text.
///
/// The compiler renders every statement through the same traversal; the
/// layout only decides how clauses and lists are joined. Placeholder
/// numbering is therefore identical in both layouts, which is what lets
/// log records show the pretty form with the arguments of the compact one.
use std::borrow::Cow;

const INDENT: &str = "    ";

const RESERVED: &[&str] = &[
    "all", "and", "any", "array", "as", "asc", "between", "case", "check", "column",
    "constraint", "create", "default", "desc", "distinct", "do", "else", "end", "except",
    "false", "for", "foreign", "from", "grant", "group", "having", "in", "into", "is", "join",
    "like", "limit", "not", "null", "offset", "on", "or", "order", "primary", "references",
    "select", "table", "then", "to", "true", "union", "unique", "user", "using", "when",
    "where", "with",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlLayout {
    /// Single line, as sent to the server.
    #[default]
    Compact,
    /// One clause per line with nested indentation, for humans.
    Pretty,
}

pub(crate) fn indent(level: usize) -> String {
    INDENT.repeat(level)
}

impl SqlLayout {
    /// Join the clauses of a statement rendered at `depth`.
    pub(crate) fn clauses(self, clauses: Vec<String>, depth: usize) -> String {
        match self {
            SqlLayout::Compact => clauses.join(" "),
            SqlLayout::Pretty => clauses
                .into_iter()
                .map(|clause| format!("{}{}", indent(depth), clause))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// A comma separated list following a keyword, including the leading
    /// separator.
    pub(crate) fn list(self, items: Vec<String>, depth: usize) -> String {
        match self {
            SqlLayout::Pretty if items.len() > 1 => {
                let prefix = indent(depth + 1);
                let lines: Vec<String> = items
                    .into_iter()
                    .map(|item| format!("{}{}", prefix, item))
                    .collect();
                format!("\n{}", lines.join(",\n"))
            }
            _ => format!(" {}", items.join(", ")),
        }
    }

    /// Parenthesize a subquery rendered at `depth + 1`.
    pub(crate) fn subquery(self, inner: String, depth: usize) -> String {
        match self {
            SqlLayout::Compact => format!("({})", inner),
            SqlLayout::Pretty => format!("(\n{}\n{})", inner, indent(depth)),
        }
    }

    /// Separator before a logical operator inside a WHERE clause.
    pub(crate) fn logical_break(self, depth: usize) -> String {
        match self {
            SqlLayout::Compact => " ".to_string(),
            SqlLayout::Pretty => format!("\n{}", indent(depth + 1)),
        }
    }
}

/// Quote an identifier when PostgreSQL would not accept it bare.
pub fn quote_ident(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) => {
            (first.is_ascii_lowercase() || first == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
        }
        None => false,
    };
    if plain && !RESERVED.contains(&name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_clauses() {
        let sql = SqlLayout::Compact.clauses(vec!["SELECT 1".into(), "FROM t".into()], 0);
        assert_eq!(sql, "SELECT 1 FROM t");
    }

    #[test]
    fn test_pretty_clauses_are_indented() {
        let sql = SqlLayout::Pretty.clauses(vec!["SELECT 1".into(), "FROM t".into()], 1);
        assert_eq!(sql, "    SELECT 1\n    FROM t");
    }

    #[test]
    fn test_lists() {
        let items = || vec!["a".to_string(), "b".to_string()];
        assert_eq!(SqlLayout::Compact.list(items(), 0), " a, b");
        assert_eq!(SqlLayout::Pretty.list(items(), 0), "\n    a,\n    b");
        assert_eq!(SqlLayout::Pretty.list(vec!["a".into()], 0), " a");
    }

    #[test]
    fn test_subquery() {
        assert_eq!(SqlLayout::Compact.subquery("SELECT 1".into(), 0), "(SELECT 1)");
        assert_eq!(
            SqlLayout::Pretty.subquery("    SELECT 1".into(), 0),
            "(\n    SELECT 1\n)"
        );
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "users");
        assert_eq!(quote_ident("user_name2"), "user_name2");
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("Name"), "\"Name\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_ident("2fa"), "\"2fa\"");
    }
}

//! Reserved-word escaping for Malloy identifiers.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Keywords that collide with bare identifiers in Malloy field expressions.
static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "all", "and", "as", "asc", "avg", "by", "cast", "count", "day", "desc", "dimension",
        "distinct", "else", "except", "extend", "false", "for", "from", "group_by", "having",
        "hour", "import", "index", "is", "join_cross", "join_many", "join_one", "limit", "max",
        "measure", "min", "minute", "month", "nest", "not", "null", "on", "or", "order_by",
        "pick", "primary_key", "quarter", "query", "rename", "run", "second", "select", "source",
        "sql", "sum", "table", "then", "to", "top", "true", "view", "week", "when", "where",
        "with", "year",
    ]
    .into_iter()
    .collect()
});

/// Wrap `name` in the host quote character when it collides with a reserved
/// word or is not a bare identifier; pass-through otherwise.
pub fn escape_identifier(name: &str) -> String {
    if needs_quoting(name) {
        format!("`{name}`")
    } else {
        name.to_string()
    }
}

fn needs_quoting(name: &str) -> bool {
    if RESERVED.contains(name) {
        return true;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return true,
    }
    !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

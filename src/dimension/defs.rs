//! Parsing of user-authored dimension definitions.
//!
//! A definition is either a simple alias to a raw column, or a multi-branch
//! labeled bucketing:
//!
//! ```text
//! agegroup is (Minor when age < 18 | Adult when age < 65 | else Senior)
//! ```
//!
//! Percentile SQL must `PARTITION BY` the raw column or a CASE equivalent,
//! because the bucketing label is not addressable in the derived source.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// A raw user definition as supplied to the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionDefinition {
    pub name: String,
    /// Alias target or bucketing body (without the enclosing parentheses).
    pub definition: String,
}

impl DimensionDefinition {
    pub fn new(name: &str, definition: &str) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
        }
    }
}

/// One labeled branch of a bucketing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketBranch {
    pub label: String,
    /// Condition in host-language syntax, as written by the user.
    pub condition: String,
}

/// A parsed definition, ready for SQL translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDimension {
    pub name: String,
    /// The alias target for simple aliases; None for bucketings.
    pub raw_column: Option<String>,
    /// SQL expression equivalent: the raw column, or a CASE over the
    /// translated branch conditions.
    pub sql_expression: String,
    pub branches: Vec<BucketBranch>,
    pub else_label: Option<String>,
}

impl ParsedDimension {
    pub fn is_bucketing(&self) -> bool {
        !self.branches.is_empty()
    }
}

/// Parse one definition into its SQL mapping.
pub fn parse_dimension(name: &str, definition: &str) -> CompileResult<ParsedDimension> {
    let body = definition.trim();
    if body.is_empty() {
        return Err(CompileError::Dimension {
            name: name.to_string(),
            message: "empty definition".to_string(),
        });
    }

    if !body.contains(" when ") && !body.starts_with("else ") {
        // Simple alias to a raw column.
        return Ok(ParsedDimension {
            name: name.to_string(),
            raw_column: Some(body.to_string()),
            sql_expression: format!("\"{body}\""),
            branches: Vec::new(),
            else_label: None,
        });
    }

    let mut branches = Vec::new();
    let mut else_label = None;
    for part in split_top_level(body) {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("else ") {
            if else_label.is_some() {
                return Err(CompileError::Dimension {
                    name: name.to_string(),
                    message: "more than one else branch".to_string(),
                });
            }
            else_label = Some(unquote(rest.trim()));
            continue;
        }
        let Some(at) = find_when(part) else {
            return Err(CompileError::Dimension {
                name: name.to_string(),
                message: format!("branch '{part}' has no when clause"),
            });
        };
        let label = unquote(part[..at].trim());
        let condition = part[at + 6..].trim().to_string();
        if label.is_empty() || condition.is_empty() {
            return Err(CompileError::Dimension {
                name: name.to_string(),
                message: format!("malformed branch '{part}'"),
            });
        }
        branches.push(BucketBranch { label, condition });
    }

    if branches.is_empty() {
        return Err(CompileError::Dimension {
            name: name.to_string(),
            message: "bucketing has no conditional branch".to_string(),
        });
    }

    let sql_expression = case_expression(&branches, else_label.as_deref());
    Ok(ParsedDimension {
        name: name.to_string(),
        raw_column: None,
        sql_expression,
        branches,
        else_label,
    })
}

/// Build the SQL `CASE` for a bucketing. Without an `else` branch the CASE
/// has no `ELSE` clause.
fn case_expression(branches: &[BucketBranch], else_label: Option<&str>) -> String {
    let mut sql = String::from("CASE");
    for branch in branches {
        sql.push_str(&format!(
            " WHEN {} THEN '{}'",
            translate_condition(&branch.condition),
            branch.label.replace('\'', "''")
        ));
    }
    if let Some(label) = else_label {
        sql.push_str(&format!(" ELSE '{}'", label.replace('\'', "''")));
    }
    sql.push_str(" END");
    sql
}

/// Translate a host-language condition to SQL: logical connectors uppercased,
/// host quote characters to SQL double quotes, literals preserved.
pub fn translate_condition(condition: &str) -> String {
    let mut out = String::with_capacity(condition.len());
    let mut chars = condition.chars().peekable();
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        match word.as_str() {
            "and" => out.push_str("AND"),
            "or" => out.push_str("OR"),
            "not" => out.push_str("NOT"),
            other => out.push_str(other),
        }
        word.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                // String literal: copy verbatim through the closing quote.
                flush(&mut word, &mut out);
                out.push('\'');
                for s in chars.by_ref() {
                    out.push(s);
                    if s == '\'' {
                        break;
                    }
                }
            }
            '`' => {
                // Host identifier quote becomes the SQL double quote.
                flush(&mut word, &mut out);
                out.push('"');
                for s in chars.by_ref() {
                    if s == '`' {
                        out.push('"');
                        break;
                    }
                    out.push(s);
                }
            }
            c if c.is_ascii_alphanumeric() || c == '_' => word.push(c),
            c => {
                flush(&mut word, &mut out);
                out.push(c);
            }
        }
    }
    flush(&mut word, &mut out);
    out
}

/// Split a bucketing body on `|` outside quotes and parentheses.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    for c in body.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                current.push(c);
            }
            '(' if !in_string => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '|' if !in_string && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Locate the ` when ` separating a branch label from its condition,
/// skipping string literals (a label may itself contain the word).
fn find_when(part: &str) -> Option<usize> {
    let bytes = part.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i + 6 <= bytes.len() {
        if bytes[i] == b'\'' {
            in_string = !in_string;
        } else if !in_string && &bytes[i..i + 6] == b" when " {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

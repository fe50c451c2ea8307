//! Aggregate and percentage expression builders, plus the format-pattern
//! parser.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::malloy::reserved::escape_identifier;
use crate::tpl::DenominatorScope;

/// Well-known aggregation aliases.
static FUNCTION_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [("mean", "avg"), ("stdev", "stddev"), ("n", "count")]
        .into_iter()
        .collect()
});

/// Emit the Malloy expression for `(measure, function)`.
///
/// `count` without a measure is a row count; `count` with a measure is a
/// distinct count over that field. The distinction is semantic, not
/// syntactic: `field.count` and standalone `count` may sit side by side and
/// produce different values.
pub fn aggregate_expression(measure: Option<&str>, function: &str) -> String {
    let function = FUNCTION_ALIASES
        .get(function)
        .copied()
        .unwrap_or(function);
    match (measure, function) {
        (None, "count") => "count()".to_string(),
        (Some(m), "count") => format!("count({})", escape_identifier(m)),
        (None, f) => format!("{f}()"),
        (Some(m), f) => format!("{}.{f}()", escape_identifier(m)),
    }
}

/// Emit `100.0 * <agg> / all(<agg>, <scope dims>)`.
///
/// Scope resolution: `all` keeps nothing; `rows` keeps the column
/// dimensions; `cols` keeps the row dimensions; an explicit list keeps
/// exactly those. Dimension references inside `all(...)` use the output
/// names (labels when aliased), looked up through `alias_map`.
pub fn percentage_expression(
    measure: Option<&str>,
    function: &str,
    scope: &DenominatorScope,
    row_dims: &[String],
    col_dims: &[String],
    alias_map: &HashMap<String, String>,
) -> String {
    let agg = aggregate_expression(measure, function);
    let scope_dims: Vec<&String> = match scope {
        DenominatorScope::All => Vec::new(),
        DenominatorScope::Rows => col_dims.iter().collect(),
        DenominatorScope::Cols => row_dims.iter().collect(),
        DenominatorScope::Dimensions(dims) => dims.iter().collect(),
    };

    if scope_dims.is_empty() {
        format!("100.0 * {agg} / all({agg})")
    } else {
        let names: Vec<String> = scope_dims
            .iter()
            .map(|dim| {
                let output = alias_map.get(dim.as_str()).unwrap_or(dim);
                escape_identifier(output)
            })
            .collect();
        format!("100.0 * {agg} / all({agg}, {})", names.join(", "))
    }
}

// ============================================================================
// Format patterns
// ============================================================================

/// A parsed user format pattern `'<prefix>#[.<precision>]<suffix>'`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormatPattern {
    pub prefix: String,
    pub suffix: String,
    pub precision: Option<u32>,
}

static FORMAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<prefix>[^#]*)#(?:\.(?P<precision>\d+))?(?P<suffix>.*)$").unwrap());

/// Parse a format pattern. If `#` is absent, the whole string becomes the
/// suffix.
pub fn parse_format(pattern: &str) -> FormatPattern {
    match FORMAT_RE.captures(pattern) {
        Some(caps) => FormatPattern {
            prefix: caps["prefix"].to_string(),
            suffix: caps["suffix"].to_string(),
            precision: caps
                .name("precision")
                .and_then(|m| m.as_str().parse().ok()),
        },
        None => FormatPattern {
            prefix: String::new(),
            suffix: pattern.to_string(),
            precision: None,
        },
    }
}

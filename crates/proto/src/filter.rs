//! The metadata query filter mini-language.
//!
//! String values in a query's `meta` block may carry a `:<filter>:<operand>`
//! prefix selecting a comparison other than literal equality. The grammar is
//! parsed here into a tagged [`MetaFilter`]; each record store translates
//! the variants into its own native query form.
//!
//! Recognised forms:
//!
//! - `":range:<min>:<max>"`: inclusive numeric range
//! - `":lte:<n>"` / `":gte:<n>"`: relative numeric comparison
//! - `":re:<pattern>"` / `":re.i:<pattern>"`: regular expression, the
//!   second form case-insensitive
//! - `":like:<pattern>"` / `":ilike:<pattern>"`: SQL-LIKE with `%`
//!   wildcards
//! - `"::<literal>"`: escape hatch, one leading colon is stripped and no
//!   filter parsing occurs
//!
//! A leading colon without the full `:<name>:<operand>` shape is not filter
//! structure and falls back to literal equality, so stray values never
//! change meaning silently. An unknown filter name is an error.

use crate::error::{ErrorKind, Result};

/// One parsed metadata comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaFilter {
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
    /// Numeric greater-than-or-equal.
    Gte(f64),
    /// Numeric less-than-or-equal.
    Lte(f64),
    /// Regular expression match.
    Regex { pattern: String, case_insensitive: bool },
    /// SQL-LIKE pattern with `%` wildcards.
    Like { pattern: String, case_insensitive: bool },
    /// Literal string equality.
    Literal(String),
}

fn numeric(operand: &str) -> Result<f64> {
    operand.parse().map_err(|_| exn::Exn::from(ErrorKind::BadOperand(operand.to_string())))
}

/// Parse one `meta` string value into its comparison.
///
/// # Examples
///
/// ```
/// use hoard_proto::filter::{MetaFilter, parse_meta_filter};
///
/// assert_eq!(
///     parse_meta_filter(":range:1:10").unwrap(),
///     MetaFilter::Range { min: 1.0, max: 10.0 },
/// );
/// assert_eq!(
///     parse_meta_filter("::range:1:10").unwrap(),
///     MetaFilter::Literal(":range:1:10".to_string()),
/// );
/// assert_eq!(
///     parse_meta_filter("plain value").unwrap(),
///     MetaFilter::Literal("plain value".to_string()),
/// );
/// ```
pub fn parse_meta_filter(value: &str) -> Result<MetaFilter> {
    let Some(rest) = value.strip_prefix(':') else {
        return Ok(MetaFilter::Literal(value.to_string()));
    };
    if rest.starts_with(':') {
        // Escape hatch: strip exactly one colon, take the rest verbatim.
        return Ok(MetaFilter::Literal(rest.to_string()));
    }
    // A filter needs a non-empty name, a second colon and a non-empty
    // operand; anything less is an ordinary literal that happens to start
    // with a colon.
    let Some((name, operand)) = rest.split_once(':') else {
        return Ok(MetaFilter::Literal(value.to_string()));
    };
    if name.is_empty() || operand.is_empty() {
        return Ok(MetaFilter::Literal(value.to_string()));
    }
    Ok(match name {
        "range" => {
            let (min, max) = operand
                .split_once(':')
                .ok_or_else(|| exn::Exn::from(ErrorKind::BadOperand(operand.to_string())))?;
            MetaFilter::Range { min: numeric(min)?, max: numeric(max)? }
        },
        "lte" => MetaFilter::Lte(numeric(operand)?),
        "gte" => MetaFilter::Gte(numeric(operand)?),
        "re" => MetaFilter::Regex { pattern: operand.to_string(), case_insensitive: false },
        "re.i" => MetaFilter::Regex { pattern: operand.to_string(), case_insensitive: true },
        "like" => MetaFilter::Like { pattern: operand.to_string(), case_insensitive: false },
        "ilike" => MetaFilter::Like { pattern: operand.to_string(), case_insensitive: true },
        _ => exn::bail!(ErrorKind::BadFilter(name.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(":range:1:10", MetaFilter::Range { min: 1.0, max: 10.0 })]
    #[case(":range:-1.5:2.25", MetaFilter::Range { min: -1.5, max: 2.25 })]
    #[case(":lte:42", MetaFilter::Lte(42.0))]
    #[case(":gte:0.5", MetaFilter::Gte(0.5))]
    #[case(":re:^a.c$", MetaFilter::Regex { pattern: "^a.c$".to_string(), case_insensitive: false })]
    #[case(":re.i:^a.c$", MetaFilter::Regex { pattern: "^a.c$".to_string(), case_insensitive: true })]
    #[case(":like:foo%", MetaFilter::Like { pattern: "foo%".to_string(), case_insensitive: false })]
    #[case(":ilike:%bar%", MetaFilter::Like { pattern: "%bar%".to_string(), case_insensitive: true })]
    fn test_parse_filters(#[case] input: &str, #[case] expected: MetaFilter) {
        assert_eq!(parse_meta_filter(input).unwrap(), expected);
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("::lte:5", ":lte:5")] // escape hatch strips one colon
    #[case("::plain", ":plain")]
    #[case(":not-a-filter", ":not-a-filter")] // no second colon: literal
    #[case(":lte:", ":lte:")] // empty operand: literal
    #[case("::", ":")]
    fn test_parse_literals(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse_meta_filter(input).unwrap(), MetaFilter::Literal(expected.to_string()));
    }

    #[test]
    fn test_unknown_filter_is_an_error() {
        let err = parse_meta_filter(":between:1:2").unwrap_err();
        assert_eq!(*err, ErrorKind::BadFilter("between".to_string()));
    }

    #[rstest]
    #[case(":range:a:b")]
    #[case(":range:1")]
    #[case(":lte:abc")]
    #[case(":gte:ten")]
    fn test_bad_operands(#[case] input: &str) {
        assert!(parse_meta_filter(input).is_err());
    }
}

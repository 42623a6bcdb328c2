//! Constraining facets of simple type restrictions.

use std::cmp::Ordering;

use regex::Regex;

use crate::error::{Result, SchemaError};
use crate::xs::{digits, Atomic, WhiteSpace, Xs};

#[derive(Debug, Clone, Default)]
pub(crate) struct Facets {
    /// Normalized lexical forms, with their values where the base type has
    /// an ordered value space.
    pub(crate) enumeration: Vec<(String, Option<Atomic>)>,
    /// Patterns given in one restriction step; a value must match any one
    /// of them.
    pub(crate) pattern: Option<(Vec<String>, Regex)>,
    pub(crate) length: Option<usize>,
    pub(crate) min_length: Option<usize>,
    pub(crate) max_length: Option<usize>,
    pub(crate) min_inclusive: Option<Atomic>,
    pub(crate) max_inclusive: Option<Atomic>,
    pub(crate) min_exclusive: Option<Atomic>,
    pub(crate) max_exclusive: Option<Atomic>,
    pub(crate) total_digits: Option<u32>,
    pub(crate) fraction_digits: Option<u32>,
    pub(crate) white_space: Option<WhiteSpace>,
}

impl Facets {
    pub(crate) fn set_pattern(&mut self, patterns: Vec<String>) -> Result<()> {
        if patterns.is_empty() {
            return Ok(());
        }
        let translated = patterns
            .iter()
            .map(|pattern| translate_pattern(pattern))
            .collect::<Result<Vec<_>>>()?;
        let source = format!("^(?:{})$", translated.join("|"));
        let regex = Regex::new(&source).map_err(|source| SchemaError::Pattern {
            pattern: patterns.join("|"),
            source,
        })?;
        self.pattern = Some((patterns, regex));
        Ok(())
    }

    /// Check a normalized value. `length` is the value's length as the
    /// length facets count it, `value` its parsed form if any.
    pub(crate) fn check(
        &self,
        lexical: &str,
        length: usize,
        value: Option<&Atomic>,
    ) -> std::result::Result<(), String> {
        if let Some((patterns, regex)) = &self.pattern {
            if !regex.is_match(lexical) {
                return Err(format!(
                    "'{}' does not match the pattern '{}'",
                    lexical,
                    patterns.join("|")
                ));
            }
        }
        if !self.enumeration.is_empty() {
            let found = self.enumeration.iter().any(|(text, atomic)| match (atomic, value) {
                (Some(a), Some(b)) => a.compare(b) == Some(Ordering::Equal),
                _ => text == lexical,
            });
            if !found {
                let allowed = self
                    .enumeration
                    .iter()
                    .map(|(text, _)| format!("'{}'", text))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(format!(
                    "'{}' is not one of the allowed values {}",
                    lexical, allowed
                ));
            }
        }
        if let Some(expected) = self.length {
            if length != expected {
                return Err(format!(
                    "'{}' has length {}, but the required length is {}",
                    lexical, length, expected
                ));
            }
        }
        if let Some(min) = self.min_length {
            if length < min {
                return Err(format!(
                    "'{}' is shorter than the minimum length {}",
                    lexical, min
                ));
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(format!("'{}' is longer than the maximum length {}", lexical, max));
            }
        }
        if let Some(value) = value {
            self.check_bounds(lexical, value)?;
            if let Atomic::Decimal(decimal) = value {
                let (total, fraction) = digits(decimal);
                if let Some(max) = self.total_digits {
                    if total > max {
                        return Err(format!("'{}' has more than {} digits", lexical, max));
                    }
                }
                if let Some(max) = self.fraction_digits {
                    if fraction > max {
                        return Err(format!(
                            "'{}' has more than {} fraction digits",
                            lexical, max
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_bounds(&self, lexical: &str, value: &Atomic) -> std::result::Result<(), String> {
        let bounds = [
            (&self.min_inclusive, "at least", [Ordering::Greater, Ordering::Equal]),
            (&self.max_inclusive, "at most", [Ordering::Less, Ordering::Equal]),
            (&self.min_exclusive, "greater than", [Ordering::Greater, Ordering::Greater]),
            (&self.max_exclusive, "less than", [Ordering::Less, Ordering::Less]),
        ];
        for (bound, relation, allowed) in bounds {
            let Some(bound) = bound else {
                continue;
            };
            let ordering = value.compare(bound);
            if !ordering.is_some_and(|ordering| allowed.contains(&ordering)) {
                return Err(format!(
                    "'{}' must be {} {}",
                    lexical,
                    relation,
                    display(bound)
                ));
            }
        }
        Ok(())
    }
}

fn display(atomic: &Atomic) -> String {
    match atomic {
        Atomic::Decimal(d) => d.to_string(),
        Atomic::Double(f) => f.to_string(),
        Atomic::Boolean(b) => b.to_string(),
        Atomic::Text(s) => s.clone(),
    }
}

/// Parse a facet value that must be a non-negative integer.
pub(crate) fn facet_count(facet: &str, value: &str) -> Result<usize> {
    value.trim().parse::<usize>().map_err(|_| SchemaError::BadFacet {
        facet: facet.to_string(),
        value: value.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}

/// Parse a bound facet in the value space of `xs`.
pub(crate) fn facet_bound(facet: &str, value: &str, xs: Xs) -> Result<Atomic> {
    let normalized = xs.white_space().apply(value);
    xs.parse(&normalized).map_err(|reason| SchemaError::BadFacet {
        facet: facet.to_string(),
        value: value.to_string(),
        reason,
    })
}

/// Translate an XML Schema regular expression to the `regex` dialect.
///
/// Schema patterns are implicitly anchored, have the `\i` and `\c` name
/// character escapes, and treat `^` and `$` as ordinary characters outside
/// character classes.
pub(crate) fn translate_pattern(pattern: &str) -> Result<String> {
    let mut result = String::new();
    let mut chars = pattern.chars().peekable();
    let mut class_depth = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let Some(escaped) = chars.next() else {
                    return Err(bad_pattern(pattern, "trailing backslash"));
                };
                let class = match escaped {
                    'i' => Some((r"\p{L}_:", false)),
                    'I' => Some((r"\p{L}_:", true)),
                    'c' => Some((r"\p{L}\p{N}\p{M}._:\-\x{B7}", false)),
                    'C' => Some((r"\p{L}\p{N}\p{M}._:\-\x{B7}", true)),
                    _ => None,
                };
                match class {
                    Some((members, negated)) if class_depth == 0 => {
                        result.push('[');
                        if negated {
                            result.push('^');
                        }
                        result.push_str(members);
                        result.push(']');
                    }
                    Some((members, false)) => result.push_str(members),
                    Some((_, true)) => {
                        return Err(bad_pattern(
                            pattern,
                            "negated name escapes inside character classes are not supported",
                        ))
                    }
                    None => {
                        result.push('\\');
                        result.push(escaped);
                    }
                }
            }
            '[' => {
                class_depth += 1;
                result.push('[');
            }
            ']' => {
                class_depth = class_depth.saturating_sub(1);
                result.push(']');
            }
            '-' if class_depth > 0 && chars.peek() == Some(&'[') => {
                return Err(bad_pattern(
                    pattern,
                    "character class subtraction is not supported",
                ));
            }
            '^' | '$' if class_depth == 0 => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }
    Ok(result)
}

fn bad_pattern(pattern: &str, reason: &str) -> SchemaError {
    SchemaError::BadFacet {
        facet: "pattern".to_string(),
        value: pattern.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_pattern(patterns: &[&str]) -> Facets {
        let mut facets = Facets::default();
        facets
            .set_pattern(patterns.iter().map(|p| p.to_string()).collect())
            .unwrap();
        facets
    }

    #[test]
    fn test_pattern_is_anchored() {
        let facets = with_pattern(&["[A-Z]{2}\\d"]);
        assert!(facets.check("AB1", 3, None).is_ok());
        assert!(facets.check("xAB1", 4, None).is_err());
    }

    #[test]
    fn test_patterns_in_one_step_are_alternatives() {
        let facets = with_pattern(&["a+", "b+"]);
        assert!(facets.check("bbb", 3, None).is_ok());
        assert!(facets.check("ab", 2, None).is_err());
    }

    #[test]
    fn test_name_escapes() {
        let facets = with_pattern(&["\\i\\c*"]);
        assert!(facets.check("x-1", 3, None).is_ok());
        assert!(facets.check("1x", 2, None).is_err());
    }

    #[test]
    fn test_caret_is_literal() {
        assert_eq!(translate_pattern("a^b").unwrap(), "a\\^b");
        assert_eq!(translate_pattern("[^a]").unwrap(), "[^a]");
    }

    #[test]
    fn test_subtraction_rejected() {
        assert!(translate_pattern("[a-z-[aeiou]]").is_err());
    }

    #[test]
    fn test_bounds() {
        let facets = Facets {
            min_inclusive: Some(facet_bound("minInclusive", "1", Xs::Integer).unwrap()),
            max_exclusive: Some(facet_bound("maxExclusive", "10", Xs::Integer).unwrap()),
            ..Default::default()
        };
        let check = |text: &str| {
            let value = Xs::Integer.parse(text).unwrap();
            facets.check(text, text.len(), Some(&value))
        };
        assert!(check("1").is_ok());
        assert!(check("9").is_ok());
        assert_eq!(check("10").unwrap_err(), "'10' must be less than 10");
        assert_eq!(check("0").unwrap_err(), "'0' must be at least 1");
    }

    #[test]
    fn test_digits() {
        let facets = Facets {
            total_digits: Some(4),
            fraction_digits: Some(1),
            ..Default::default()
        };
        let check = |text: &str| {
            let value = Xs::Decimal.parse(text).unwrap();
            facets.check(text, text.len(), Some(&value))
        };
        assert!(check("123.4").is_ok());
        assert!(check("12.34").is_err());
        assert!(check("12345").is_err());
    }
}

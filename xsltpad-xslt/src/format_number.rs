//! `format-number()` and `xsl:decimal-format`.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use xsltpad_xpath::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DecimalFormat {
    pub(crate) decimal_separator: char,
    pub(crate) grouping_separator: char,
    pub(crate) infinity: String,
    pub(crate) minus_sign: char,
    pub(crate) nan: String,
    pub(crate) percent: char,
    pub(crate) per_mille: char,
    pub(crate) zero_digit: char,
    pub(crate) digit: char,
    pub(crate) pattern_separator: char,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            infinity: "Infinity".to_string(),
            minus_sign: '-',
            nan: "NaN".to_string(),
            percent: '%',
            per_mille: '\u{2030}',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
        }
    }
}

#[derive(Debug, Default)]
struct SubPicture {
    prefix: String,
    suffix: String,
    min_integer: usize,
    /// Digits between grouping separators, if the integer part is grouped.
    grouping: Option<usize>,
    min_fraction: usize,
    max_fraction: usize,
    multiplier: u32,
}

impl DecimalFormat {
    fn is_active(&self, c: char) -> bool {
        c == self.digit
            || c == self.zero_digit
            || c == self.decimal_separator
            || c == self.grouping_separator
    }

    fn sub_picture(&self, picture: &str) -> Result<SubPicture, Error> {
        let chars: Vec<char> = picture.chars().collect();
        let first = chars.iter().position(|c| self.is_active(*c));
        let last = chars.iter().rposition(|c| self.is_active(*c));
        let (first, last) = match (first, last) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Error::XTDE1310),
        };
        let prefix: String = chars[..first].iter().collect();
        let suffix: String = chars[last + 1..].iter().collect();
        let mut multiplier = 1;
        for c in prefix.chars().chain(suffix.chars()) {
            if c == self.percent {
                multiplier = 100;
            } else if c == self.per_mille {
                multiplier = 1000;
            }
        }

        let mut sub = SubPicture {
            prefix,
            suffix,
            multiplier,
            ..Default::default()
        };
        let mut in_fraction = false;
        let mut last_grouping = None;
        let mut integer_digits = 0;
        for c in &chars[first..=last] {
            let c = *c;
            if c == self.decimal_separator {
                if in_fraction {
                    return Err(Error::XTDE1310);
                }
                in_fraction = true;
            } else if c == self.grouping_separator {
                if in_fraction {
                    return Err(Error::XTDE1310);
                }
                last_grouping = Some(integer_digits);
            } else if c == self.zero_digit {
                if in_fraction {
                    if sub.max_fraction > sub.min_fraction {
                        // an optional digit before a mandatory one
                        return Err(Error::XTDE1310);
                    }
                    sub.min_fraction += 1;
                    sub.max_fraction += 1;
                } else {
                    sub.min_integer += 1;
                    integer_digits += 1;
                }
            } else if c == self.digit {
                if in_fraction {
                    sub.max_fraction += 1;
                } else {
                    if sub.min_integer > 0 {
                        return Err(Error::XTDE1310);
                    }
                    integer_digits += 1;
                }
            } else {
                return Err(Error::XTDE1310);
            }
        }
        if let Some(position) = last_grouping {
            let size = integer_digits - position;
            if size > 0 {
                sub.grouping = Some(size);
            }
        }
        if sub.min_integer == 0 && sub.max_fraction == 0 {
            sub.min_integer = 1;
        }
        Ok(sub)
    }

    /// Format a number with a JDK-style picture string.
    pub(crate) fn format(&self, number: f64, picture: &str) -> Result<String, Error> {
        let mut pictures = picture.split(self.pattern_separator);
        let positive = self.sub_picture(pictures.next().unwrap_or(""))?;
        let negative = pictures.next().map(|p| self.sub_picture(p)).transpose()?;
        if pictures.next().is_some() {
            return Err(Error::XTDE1310);
        }
        if number.is_nan() {
            return Ok(self.nan.clone());
        }
        let is_negative = number < 0.0 || (number == 0.0 && number.is_sign_negative());
        let (sub, prefix) = match (&negative, is_negative) {
            (Some(negative), true) => (negative, negative.prefix.clone()),
            (None, true) => (&positive, format!("{}{}", self.minus_sign, positive.prefix)),
            (_, false) => (&positive, positive.prefix.clone()),
        };
        let digits = if number.is_infinite() {
            self.infinity.clone()
        } else {
            self.digits(number.abs() * sub.multiplier as f64, sub)
        };
        Ok(format!("{}{}{}", prefix, digits, sub.suffix))
    }

    fn digits(&self, number: f64, sub: &SubPicture) -> String {
        let decimal = Decimal::from_f64(number)
            .unwrap_or_default()
            .round_dp_with_strategy(sub.max_fraction as u32, RoundingStrategy::MidpointNearestEven);
        let text = decimal.abs().to_string();
        let (integer, fraction) = text.split_once('.').unwrap_or((&text, ""));

        let integer = integer.trim_start_matches('0');
        let mut integer: String = if integer.len() < sub.min_integer {
            "0".repeat(sub.min_integer - integer.len()) + integer
        } else {
            integer.to_string()
        };
        if let Some(size) = sub.grouping {
            integer = group(&integer, size, self.grouping_separator);
        }

        let mut fraction = fraction.to_string();
        while fraction.len() > sub.min_fraction && fraction.ends_with('0') {
            fraction.pop();
        }
        while fraction.len() < sub.min_fraction {
            fraction.push('0');
        }
        if integer.is_empty() && fraction.is_empty() {
            integer.push('0');
        }

        let mut result = self.localize_digits(&integer);
        if !fraction.is_empty() {
            result.push(self.decimal_separator);
            result.push_str(&self.localize_digits(&fraction));
        }
        result
    }

    fn localize_digits(&self, digits: &str) -> String {
        let zero = self.zero_digit as u32;
        digits
            .chars()
            .map(|c| match c.to_digit(10) {
                Some(d) => char::from_u32(zero + d).unwrap_or(c),
                None => c,
            })
            .collect()
    }
}

fn group(integer: &str, size: usize, separator: char) -> String {
    let chars: Vec<char> = integer.chars().collect();
    let mut result = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % size == 0 {
            result.push(separator);
        }
        result.push(*c);
    }
    result
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1234.5, "#,##0.00", "1,234.50")]
    #[case(0.5, "0.###", "0.5")]
    #[case(2.0, "0.###", "2")]
    #[case(0.25, "#%", "25%")]
    #[case(-3.0, "0", "-3")]
    #[case(-3.0, "0;(0)", "(3)")]
    #[case(7.0, "000", "007")]
    #[case(1234567.0, "#,###", "1,234,567")]
    #[case(2.5, "0", "2")]
    #[case(3.5, "0", "4")]
    #[case(0.0, "#.##", "0")]
    #[case(f64::INFINITY, "0", "Infinity")]
    #[case(f64::NAN, "0", "NaN")]
    fn test_format(#[case] number: f64, #[case] picture: &str, #[case] expected: &str) {
        assert_eq!(
            DecimalFormat::default().format(number, picture).unwrap(),
            expected
        );
    }

    #[test]
    fn test_invalid_picture() {
        let format = DecimalFormat::default();
        assert_eq!(format.format(1.0, "0.0.0"), Err(Error::XTDE1310));
        assert_eq!(format.format(1.0, "abc"), Err(Error::XTDE1310));
    }

    #[test]
    fn test_european_format() {
        let format = DecimalFormat {
            decimal_separator: ',',
            grouping_separator: '.',
            ..Default::default()
        };
        assert_eq!(format.format(1234.5, "#.##0,00").unwrap(), "1.234,50");
    }
}

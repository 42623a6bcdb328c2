//! Formatting for `xsl:number`.

/// Format a list of numbers with an `xsl:number` format string.
///
/// The format is split into alphanumeric format tokens and the separators
/// between them. Numbers beyond the last token reuse it, and separators
/// beyond the last one use ".".
pub(crate) fn format_numbers(numbers: &[u64], format: &str, grouping: Option<(String, usize)>) -> String {
    let (prefix, tokens, separators, suffix) = tokenize(format);
    let mut result = prefix;
    for (i, number) in numbers.iter().enumerate() {
        if i > 0 {
            let separator = separators
                .get(i - 1)
                .or(separators.last())
                .map(String::as_str)
                .unwrap_or(".");
            result.push_str(separator);
        }
        let token = tokens.get(i).or(tokens.last()).map(String::as_str).unwrap_or("1");
        result.push_str(&format_token(*number, token, grouping.as_ref()));
    }
    result.push_str(&suffix);
    result
}

/// Split into (prefix, tokens, inner separators, suffix).
fn tokenize(format: &str) -> (String, Vec<String>, Vec<String>, String) {
    let mut pieces: Vec<(bool, String)> = Vec::new();
    for c in format.chars() {
        let alphanumeric = c.is_alphanumeric();
        match pieces.last_mut() {
            Some((last_alphanumeric, piece)) if *last_alphanumeric == alphanumeric => piece.push(c),
            _ => pieces.push((alphanumeric, c.to_string())),
        }
    }
    let mut prefix = String::new();
    let mut suffix = String::new();
    if matches!(pieces.first(), Some((false, _))) {
        prefix = pieces.remove(0).1;
    }
    if matches!(pieces.last(), Some((false, _))) {
        suffix = pieces.pop().map(|(_, piece)| piece).unwrap_or_default();
    }
    let mut tokens = Vec::new();
    let mut separators = Vec::new();
    for (alphanumeric, piece) in pieces {
        if alphanumeric {
            tokens.push(piece);
        } else {
            separators.push(piece);
        }
    }
    (prefix, tokens, separators, suffix)
}

fn format_token(number: u64, token: &str, grouping: Option<&(String, usize)>) -> String {
    match token {
        "a" => alphabetic(number, 'a'),
        "A" => alphabetic(number, 'A'),
        "i" => roman(number).to_lowercase(),
        "I" => roman(number),
        _ => {
            // decimal, padded to the token's width: "01" gives 01, 02, ...
            let width = if token.chars().all(|c| c.is_ascii_digit()) {
                token.len()
            } else {
                1
            };
            let digits = format!("{:0width$}", number, width = width);
            match grouping {
                Some((separator, size)) if *size > 0 => group(&digits, separator, *size),
                _ => digits,
            }
        }
    }
}

fn group(digits: &str, separator: &str, size: usize) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut result = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % size == 0 {
            result.push_str(separator);
        }
        result.push(*c);
    }
    result
}

fn alphabetic(number: u64, first: char) -> String {
    if number == 0 {
        return "0".to_string();
    }
    let mut number = number;
    let mut letters = Vec::new();
    while number > 0 {
        number -= 1;
        letters.push((first as u8 + (number % 26) as u8) as char);
        number /= 26;
    }
    letters.iter().rev().collect()
}

fn roman(number: u64) -> String {
    if number == 0 || number >= 4000 {
        return number.to_string();
    }
    const NUMERALS: [(u64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut number = number;
    let mut result = String::new();
    for (value, numeral) in NUMERALS {
        while number >= value {
            result.push_str(numeral);
            number -= value;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[3], "1", "3")]
    #[case(&[3], "01", "03")]
    #[case(&[3], "a", "c")]
    #[case(&[28], "A", "AB")]
    #[case(&[1994], "I", "MCMXCIV")]
    #[case(&[4], "i", "iv")]
    #[case(&[1, 2, 3], "1.", "1.2.3.")]
    #[case(&[2, 1], "1.a", "2.a")]
    #[case(&[2, 1], "(1) ", "(2.1) ")]
    #[case(&[1, 2], "1-a-i", "1-b")]
    fn test_format_numbers(#[case] numbers: &[u64], #[case] format: &str, #[case] expected: &str) {
        assert_eq!(format_numbers(numbers, format, None), expected);
    }

    #[test]
    fn test_grouping() {
        assert_eq!(
            format_numbers(&[1234567], "1", Some((",".to_string(), 3))),
            "1,234,567"
        );
    }
}

use xsltpad_xpath::{parse_expr, Error, Namespaces, SourceSpan, SpannedError};

use crate::ast::{Avt, AvtPart, Expression};

/// Parse an attribute value template. `span` is where the attribute value
/// sits in the stylesheet text; expression spans are made relative to it.
pub(crate) fn parse_avt(
    value: &str,
    span: SourceSpan,
    namespaces: &Namespaces,
) -> Result<Avt, SpannedError> {
    let start = span.range().start;
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = value.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek().map(|(_, c)| *c) == Some('}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let expression_start = index + 1;
                let expression_end = closing_brace(value, expression_start).ok_or_else(|| {
                    Error::XTSE0350.with_span(SourceSpan::new(start + index, start + value.len()))
                })?;
                if !text.is_empty() {
                    parts.push(AvtPart::Text(std::mem::take(&mut text)));
                }
                let source = &value[expression_start..expression_end];
                let expr = parse_expr(source, namespaces).map_err(|e| SpannedError {
                    error: e.error,
                    span: e.span.map(|s| s.offset(start + expression_start)),
                })?;
                parts.push(AvtPart::Expression(Expression {
                    expr,
                    span: SourceSpan::new(start + expression_start, start + expression_end),
                }));
                while chars.peek().is_some_and(|(i, _)| *i <= expression_end) {
                    chars.next();
                }
            }
            '}' => {
                return Err(Error::XTSE0350.with_span(SourceSpan::new(
                    start + index,
                    start + index + 1,
                )));
            }
            c => text.push(c),
        }
    }
    if !text.is_empty() {
        parts.push(AvtPart::Text(text));
    }
    Ok(Avt { parts })
}

/// Find the `}` ending an expression, skipping over string literals.
fn closing_brace(value: &str, from: usize) -> Option<usize> {
    let mut quote = None;
    for (index, c) in value[from..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '}') => return Some(from + index),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: &str) -> Result<Avt, SpannedError> {
        parse_avt(value, SourceSpan::new(10, 10 + value.len()), &Namespaces::new())
    }

    #[test]
    fn test_static() {
        let avt = parse("plain {{text}}").unwrap();
        assert!(matches!(&avt.parts[..], [AvtPart::Text(text)] if text == "plain {text}"));
    }

    #[test]
    fn test_expressions() {
        let avt = parse("a{@x}b{'}'}").unwrap();
        assert_eq!(avt.parts.len(), 4);
        match &avt.parts[1] {
            AvtPart::Expression(expression) => {
                assert_eq!(expression.span, SourceSpan::new(12, 14))
            }
            part => panic!("unexpected {:?}", part),
        }
    }

    #[test]
    fn test_unbalanced() {
        assert_eq!(parse("a{b").unwrap_err().error, Error::XTSE0350);
        assert_eq!(parse("a}b").unwrap_err().error, Error::XTSE0350);
    }

    #[test]
    fn test_error_span_is_offset() {
        let error = parse("x{1 +}").unwrap_err();
        assert_eq!(error.error, Error::XPST0003);
        assert_eq!(error.span, Some(SourceSpan::new(15, 15)));
    }
}

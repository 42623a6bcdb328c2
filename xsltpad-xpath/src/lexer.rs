use logos::{Lexer, Logos, Span};

use crate::error::{Error, SpannedError};
use crate::span::SourceSpan;

// Operator names such as `and` or `div`, axis names and node type names all
// lex as plain names. Whether a name is an operator depends on what the
// parser expects at that point, which is how XPath 1.0 disambiguates them.
#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(subpattern name_start_char = r"[A-Za-z_\u{c0}-\u{d6}\u{d8}-\u{f6}\u{f8}-\u{2ff}\u{370}-\u{37d}\u{37f}-\u{1fff}\u{200c}-\u{200d}\u{2070}-\u{218f}\u{2c00}-\u{2fef}\u{3001}-\u{d7ff}\u{f900}-\u{fdcf}\u{fdf0}-\u{fffd}\u{10000}-\u{effff}]")]
#[logos(subpattern name_char = r"(?&name_start_char)|[\-\.0-9\u{b7}\u{300}-\u{36F}\u{203f}-\u{2040}]")]
#[logos(subpattern ncname = r"(?&name_start_char)(?&name_char)*")]
pub(crate) enum Token<'a> {
    #[regex(r"[0-9]+(\.[0-9]*)?|\.[0-9]+", number)]
    Number(f64),
    #[regex(r#""[^"]*"|'[^']*'"#, literal)]
    Literal(&'a str),
    #[regex(r"(?&ncname)")]
    NCName(&'a str),
    #[regex(r"(?&ncname):(?&ncname)")]
    QName(&'a str),
    #[regex(r"(?&ncname):\*", prefix_wildcard)]
    PrefixWildcard(&'a str),

    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("@")]
    At,
    #[token(",")]
    Comma,
    #[token("::")]
    DoubleColon,
    #[token("|")]
    Pipe,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("=")]
    Equal,
    #[token("!=")]
    NotEqual,
    #[token("<")]
    LessThan,
    #[token("<=")]
    LessThanEqual,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterThanEqual,
    #[token("*")]
    Star,
    #[token("$")]
    Dollar,
}

fn number<'a>(lex: &mut Lexer<'a, Token<'a>>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn literal<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[1..slice.len() - 1]
}

fn prefix_wildcard<'a>(lex: &mut Lexer<'a, Token<'a>>) -> &'a str {
    let slice = lex.slice();
    &slice[..slice.len() - 2]
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<(Token<'_>, Span)>, SpannedError> {
    let mut tokens = Vec::new();
    for (token, span) in Token::lexer(input).spanned() {
        match token {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(Error::XPST0003.with_span(SourceSpan::from(span))),
        }
    }
    Ok(tokens)
}

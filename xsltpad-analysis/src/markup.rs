//! A tolerant markup tokenizer for text that is still being edited.
//!
//! Only tag boundaries matter here. Character data is skipped, and comments,
//! CDATA sections, processing instructions and declarations are consumed
//! whole so that markup inside them is never mistaken for a tag.

use logos::{Lexer, Logos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StartTag<'a> {
    pub(crate) name: &'a str,
    pub(crate) self_closing: bool,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[^<]+")]
#[logos(subpattern name_start_char = r"[A-Za-z_:\u{c0}-\u{d6}\u{d8}-\u{f6}\u{f8}-\u{2ff}\u{370}-\u{37d}\u{37f}-\u{1fff}\u{200c}-\u{200d}\u{2070}-\u{218f}\u{2c00}-\u{2fef}\u{3001}-\u{d7ff}\u{f900}-\u{fdcf}\u{fdf0}-\u{fffd}\u{10000}-\u{effff}]")]
#[logos(subpattern name_char = r"(?&name_start_char)|[\-\.0-9\u{b7}\u{300}-\u{36F}\u{203f}-\u{2040}]")]
#[logos(subpattern name = r"(?&name_start_char)(?&name_char)*")]
pub(crate) enum Markup<'a> {
    #[regex(r"<(?&name)", start_tag)]
    StartTag(StartTag<'a>),
    #[regex(r"</(?&name)[ \t\r\n]*>", end_tag)]
    EndTag(&'a str),
    #[token("<!--", comment)]
    Comment,
    #[token("<![CDATA[", cdata)]
    CData,
    #[token("<?", processing_instruction)]
    ProcessingInstruction,
    #[token("<!", declaration)]
    Declaration,
}

fn start_tag<'a>(lex: &mut Lexer<'a, Markup<'a>>) -> Option<StartTag<'a>> {
    let name = &lex.slice()[1..];
    let rest = lex.remainder();
    let mut quote = None;
    for (i, c) in rest.char_indices() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                // a new tag starts before this one ended
                '<' => return None,
                '>' => {
                    let self_closing = rest[..i].trim_end().ends_with('/');
                    lex.bump(i + 1);
                    return Some(StartTag { name, self_closing });
                }
                _ => {}
            },
        }
    }
    None
}

fn end_tag<'a>(lex: &mut Lexer<'a, Markup<'a>>) -> &'a str {
    let slice = lex.slice();
    slice[2..slice.len() - 1].trim_end()
}

fn skip_past<'a>(lex: &mut Lexer<'a, Markup<'a>>, terminator: &str) -> bool {
    match lex.remainder().find(terminator) {
        Some(index) => {
            lex.bump(index + terminator.len());
            true
        }
        None => false,
    }
}

fn comment<'a>(lex: &mut Lexer<'a, Markup<'a>>) -> bool {
    skip_past(lex, "-->")
}

fn cdata<'a>(lex: &mut Lexer<'a, Markup<'a>>) -> bool {
    skip_past(lex, "]]>")
}

fn processing_instruction<'a>(lex: &mut Lexer<'a, Markup<'a>>) -> bool {
    skip_past(lex, "?>")
}

// A doctype may carry an internal subset in brackets, which contains `>`.
fn declaration<'a>(lex: &mut Lexer<'a, Markup<'a>>) -> bool {
    let rest = lex.remainder();
    let mut depth = 0usize;
    let mut quote = None;
    for (i, c) in rest.char_indices() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '>' if depth == 0 => {
                    lex.bump(i + 1);
                    return true;
                }
                _ => {}
            },
        }
    }
    false
}

/// Tokenize `text`, stopping at the first thing that can't be read as
/// markup.
pub(crate) fn tokenize(text: &str) -> Result<Vec<Markup<'_>>, usize> {
    let mut tokens = Vec::new();
    for (token, span) in Markup::lexer(text).spanned() {
        match token {
            Ok(token) => tokens.push(token),
            Err(()) => return Err(span.start),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(
            tokenize(r#"<a x="1>2"><b/>text<c:d y='/'></c:d ></a>"#).unwrap(),
            vec![
                Markup::StartTag(StartTag {
                    name: "a",
                    self_closing: false
                }),
                Markup::StartTag(StartTag {
                    name: "b",
                    self_closing: true
                }),
                Markup::StartTag(StartTag {
                    name: "c:d",
                    self_closing: false
                }),
                Markup::EndTag("c:d"),
                Markup::EndTag("a"),
            ]
        );
    }

    #[test]
    fn test_markup_inside_comments_and_cdata() {
        assert_eq!(
            tokenize("<!-- <x> --><![CDATA[<y>]]><?pi <z>?><!DOCTYPE a [<!ENTITY e '>'>]>").unwrap(),
            vec![
                Markup::Comment,
                Markup::CData,
                Markup::ProcessingInstruction,
                Markup::Declaration,
            ]
        );
    }

    #[test]
    fn test_unterminated() {
        assert!(tokenize("<a><!-- open").is_err());
        assert!(tokenize("<a x='1'").is_err());
        assert!(tokenize("<a <b>").is_err());
        assert!(tokenize("a < b").is_err());
    }
}

use std::ops::Range;

use xsltpad_xpath::SpannedError;

// ariadne counts chars, xot and the engines count bytes
fn char_range(src: &str, range: Range<usize>) -> Range<usize> {
    let start = range.start.min(src.len());
    let end = range.end.clamp(start, src.len());
    let chars = |offset: usize| {
        src.char_indices()
            .take_while(|(index, _)| *index < offset)
            .count()
    };
    chars(start)..chars(end)
}

pub(crate) fn render_spanned_error(
    name: &str,
    src: &str,
    e: &SpannedError,
) -> std::io::Result<()> {
    let red = ariadne::Color::Red;

    let mut report =
        ariadne::Report::build(ariadne::ReportKind::Error, name, 0).with_code(e.error.code());

    if let Some(span) = e.span {
        report = report.with_label(
            ariadne::Label::new((name, char_range(src, span.range())))
                .with_message(e.error.message())
                .with_color(red),
        )
    } else {
        report = report.with_message(e.error.message());
    }
    report
        .finish()
        .eprint((name, ariadne::Source::from(src)))?;
    eprintln!("{}", e.error.note());
    Ok(())
}

pub(crate) fn render_parse_error(name: &str, src: &str, e: &xot::ParseError) -> std::io::Result<()> {
    let red = ariadne::Color::Red;
    let report = ariadne::Report::build(ariadne::ReportKind::Error, name, 0).with_label(
        ariadne::Label::new((name, char_range(src, e.span().range())))
            .with_message(e)
            .with_color(red),
    );

    report
        .finish()
        .eprint((name, ariadne::Source::from(src)))
}

/// Render an error of the XSLT engine against the text it is about. Returns
/// false when the error points at neither the stylesheet nor the document,
/// and so has not been rendered.
pub(crate) fn render_xslt_error(
    stylesheet: (&str, &str),
    document: (&str, &str),
    e: &xsltpad_xslt::Error,
) -> std::io::Result<bool> {
    match e {
        xsltpad_xslt::Error::Spanned(e) => {
            render_spanned_error(stylesheet.0, stylesheet.1, e)?;
            Ok(true)
        }
        xsltpad_xslt::Error::Xml { document: name, source } => {
            // included modules come wrapped in Error::Module
            let (name, src) = if name == "source document" {
                document
            } else {
                stylesheet
            };
            render_parse_error(name, src, source)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

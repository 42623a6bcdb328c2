use xsltpad_xpath::SpannedError;

/// An error compiling or running a stylesheet.
///
/// Errors in XPath expressions and XSLT instructions carry a W3C error code
/// and a span in the stylesheet text. Errors in other stylesheet modules are
/// wrapped with the module's location, since their spans refer to another
/// text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{document} is not well-formed XML")]
    Xml {
        document: String,
        #[source]
        source: xot::ParseError,
    },
    #[error(transparent)]
    Spanned(#[from] SpannedError),
    #[error("error in stylesheet module {href}")]
    Module {
        href: String,
        #[source]
        source: Box<Error>,
    },
    #[error("cannot load {href}")]
    Load {
        href: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transform terminated: {0}")]
    Terminated(String),
    #[error("cannot serialize the result")]
    Serialize(#[source] xot::Error),
}

impl From<xsltpad_xpath::Error> for Error {
    fn from(error: xsltpad_xpath::Error) -> Self {
        Error::Spanned(error.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

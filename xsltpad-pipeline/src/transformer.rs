use std::any::Any;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use xsltpad_xslt::{FileResolver, Resolver, Stylesheet};

use crate::parameter::XsltParameter;

/// Deep template recursion needs more stack than a default thread has.
const STACK_SIZE: usize = 128 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("cannot compile the stylesheet")]
    Compile(#[source] xsltpad_xslt::Error),
    #[error("the transform failed")]
    Run(#[source] xsltpad_xslt::Error),
    #[error("the transform panicked: {0}")]
    Panicked(String),
    #[error("cannot start the transform thread")]
    Thread(#[source] io::Error),
}

/// Runs a stylesheet over a document.
///
/// Relative references in `xsl:include`, `xsl:import` and `document()` are
/// resolved against the stylesheet's file, or the working directory for a
/// stylesheet that was never saved.
#[derive(Clone)]
pub struct Transformer {
    resolver: Arc<dyn Resolver>,
    stylesheet_uri: Option<String>,
}

impl Transformer {
    pub fn new(stylesheet_path: Option<&Path>) -> Self {
        match stylesheet_path {
            Some(path) => Self {
                resolver: Arc::new(FileResolver::for_file(path)),
                stylesheet_uri: Some(path.to_string_lossy().into_owned()),
            },
            None => Self {
                resolver: Arc::new(FileResolver::new(PathBuf::from("."))),
                stylesheet_uri: None,
            },
        }
    }

    pub fn with_resolver(resolver: Arc<dyn Resolver>, stylesheet_uri: Option<String>) -> Self {
        Self {
            resolver,
            stylesheet_uri,
        }
    }

    /// Transform `xml`. The output is normalized by re-indenting it when it
    /// is a well-formed document, and returned as produced otherwise.
    pub fn transform(
        &self,
        xml: &str,
        xslt: &str,
        parameters: &[XsltParameter],
    ) -> Result<String, TransformError> {
        let xml = xml.to_string();
        let xslt = xslt.to_string();
        let parameters: Vec<(String, String)> = parameters
            .iter()
            .filter(|parameter| parameter.is_applied())
            .map(|parameter| (parameter.name.clone(), parameter.value.clone()))
            .collect();
        let transformer = self.clone();
        let handle = std::thread::Builder::new()
            .name("xsltpad-transform".to_string())
            .stack_size(STACK_SIZE)
            .spawn(move || transformer.run(&xml, &xslt, &parameters))
            .map_err(TransformError::Thread)?;
        let output = handle
            .join()
            .map_err(|payload| TransformError::Panicked(panic_message(payload)))??;
        Ok(normalize(output))
    }

    fn run(
        &self,
        xml: &str,
        xslt: &str,
        parameters: &[(String, String)],
    ) -> Result<String, TransformError> {
        let stylesheet = Stylesheet::compile(xslt, self.stylesheet_uri.as_deref(), &*self.resolver)
            .map_err(TransformError::Compile)?;
        stylesheet
            .transform(xml, parameters, &*self.resolver)
            .map_err(TransformError::Run)
    }
}

fn normalize(output: String) -> String {
    let output = match output.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => output,
    };
    match xsltpad_analysis::pretty_print(&output) {
        Ok(normalized) => normalized,
        Err(e) => {
            debug!(error = %e, "output is not a document, leaving it as is");
            output
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

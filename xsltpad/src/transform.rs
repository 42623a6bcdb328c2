use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use xsltpad_pipeline::{message_chain, TransformError, Transformer, Validator, XsltParameter};

use crate::common::{parse_parameter, read_input, write_output};
use crate::error::render_xslt_error;

#[derive(Debug, Parser)]
pub(crate) struct Transform {
    /// Input XML file
    pub(crate) infile: PathBuf,
    /// XSLT stylesheet file
    pub(crate) stylesheet: PathBuf,
    /// Output file (default stdout)
    #[arg(long, short)]
    pub(crate) output: Option<PathBuf>,
    /// Stylesheet parameter as name=value (can be repeated). Values are
    /// passed as strings.
    #[arg(long = "param", short = 'p', value_parser = parse_parameter)]
    pub(crate) parameters: Vec<XsltParameter>,
    /// Validate the output against this XML schema
    #[arg(long)]
    pub(crate) schema: Option<PathBuf>,
}

impl Transform {
    pub(crate) fn run(&self) -> anyhow::Result<ExitCode> {
        let xml = read_input(&self.infile)?;
        let xslt = std::fs::read_to_string(&self.stylesheet).with_context(|| {
            format!(
                "Failed to read stylesheet file: {}",
                self.stylesheet.display()
            )
        })?;

        let output = match Transformer::new(Some(&self.stylesheet)).transform(
            &xml,
            &xslt,
            &self.parameters,
        ) {
            Ok(output) => output,
            Err(TransformError::Compile(e) | TransformError::Run(e)) => {
                let stylesheet_name = self.stylesheet.display().to_string();
                let document_name = self.infile.display().to_string();
                let rendered = render_xslt_error(
                    (&stylesheet_name, &xslt),
                    (&document_name, &xml),
                    &e,
                )?;
                if !rendered {
                    eprintln!("error: {}", message_chain(&e));
                }
                return Ok(ExitCode::FAILURE);
            }
            Err(e) => return Err(e.into()),
        };

        write_output(self.output.as_ref(), &output)?;

        match Validator.validate(&output, self.schema.as_deref()) {
            Ok(None) => Ok(ExitCode::SUCCESS),
            Ok(Some(message)) => {
                eprintln!("warning: {}", message);
                Ok(ExitCode::FAILURE)
            }
            Err(e) => {
                eprintln!("error: {}", message_chain(&e));
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

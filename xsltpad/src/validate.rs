use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use xsltpad_xsd::Schema;

use crate::common::read_input;
use crate::error::render_parse_error;

#[derive(Debug, Parser)]
pub(crate) struct Validate {
    /// Input XML file
    infile: PathBuf,
    /// XML schema file
    schema: PathBuf,
    /// Report every problem instead of the last one
    #[arg(long)]
    all: bool,
}

impl Validate {
    pub(crate) fn run(&self) -> anyhow::Result<ExitCode> {
        let schema = Schema::from_path(&self.schema)?;
        let xml = read_input(&self.infile)?;
        let messages = match schema.validate_str(&xml) {
            Ok(messages) => messages,
            Err(e) => {
                render_parse_error(&self.infile.display().to_string(), &xml, &e)?;
                return Ok(ExitCode::FAILURE);
            }
        };
        let shown = if self.all {
            &messages[..]
        } else {
            &messages[messages.len().saturating_sub(1)..]
        };
        for message in shown {
            println!("{}", message);
        }
        Ok(if messages.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use xsltpad_analysis::{pretty_print, PrettyPrintError};

use crate::common::{read_input, write_output};
use crate::error::render_parse_error;

#[derive(Debug, Parser)]
pub(crate) struct Indent {
    /// input xml file
    infile: PathBuf,
    /// output xml file (default stdout)
    outfile: Option<PathBuf>,
}

impl Indent {
    pub(crate) fn run(&self) -> anyhow::Result<ExitCode> {
        let xml = read_input(&self.infile)?;
        match pretty_print(&xml) {
            Ok(indented) => {
                write_output(self.outfile.as_ref(), &indented)?;
                Ok(ExitCode::SUCCESS)
            }
            Err(PrettyPrintError::Parse(e)) => {
                render_parse_error(&self.infile.display().to_string(), &xml, &e)?;
                Ok(ExitCode::FAILURE)
            }
            Err(e) => Err(e.into()),
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use xsltpad_analysis::{locate, LocateError};

use crate::common::read_input;
use crate::error::render_parse_error;

#[derive(Debug, Parser)]
pub(crate) struct XPathAt {
    /// Input XML file
    infile: PathBuf,
    /// 1-based line
    line: usize,
    /// 1-based column, in characters
    column: usize,
    /// Leave out positional predicates like [2]
    #[arg(long)]
    no_indexes: bool,
}

impl XPathAt {
    pub(crate) fn run(&self) -> anyhow::Result<ExitCode> {
        let xml = read_input(&self.infile)?;
        match locate(&xml, self.line, self.column, !self.no_indexes) {
            Ok(xpath) => {
                println!("{}", xpath);
                Ok(ExitCode::SUCCESS)
            }
            Err(LocateError::Parse(e)) => {
                render_parse_error(&self.infile.display().to_string(), &xml, &e)?;
                Ok(ExitCode::FAILURE)
            }
            Err(e) => {
                eprintln!("error: {}", e);
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

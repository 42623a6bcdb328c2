use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use xsltpad_analysis::closing_tag;

use crate::common::read_input;

#[derive(Debug, Parser)]
pub(crate) struct CloseTag {
    /// Input file
    infile: PathBuf,
    /// Cursor position in characters, just after the typed `</`
    offset: usize,
}

impl CloseTag {
    pub(crate) fn run(&self) -> anyhow::Result<ExitCode> {
        let text = read_input(&self.infile)?;
        match closing_tag(&text, self.offset) {
            Some(name) => {
                println!("{}", name);
                Ok(ExitCode::SUCCESS)
            }
            None => Ok(ExitCode::FAILURE),
        }
    }
}

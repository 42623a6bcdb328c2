use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use xsltpad_analysis::extract_parameters;

use crate::common::read_input;

#[derive(Debug, Parser)]
pub(crate) struct Params {
    /// XSLT stylesheet file
    stylesheet: PathBuf,
}

impl Params {
    pub(crate) fn run(&self) -> anyhow::Result<ExitCode> {
        let xslt = read_input(&self.stylesheet)?;
        for name in extract_parameters(&xslt) {
            println!("{}", name);
        }
        Ok(ExitCode::SUCCESS)
    }
}

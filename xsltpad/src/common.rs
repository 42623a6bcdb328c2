use std::path::{Path, PathBuf};

use anyhow::Context;
use xsltpad_pipeline::XsltParameter;

pub(crate) fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Write to a file, or stdout without one.
pub(crate) fn write_output(outfile: Option<&PathBuf>, output: &str) -> anyhow::Result<()> {
    match outfile {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("Failed to write output to file: {}", path.display())),
        None => {
            println!("{}", output);
            Ok(())
        }
    }
}

/// Parse `name=value`. The value may itself contain `=`.
pub(crate) fn parse_parameter(text: &str) -> Result<XsltParameter, String> {
    match text.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok(XsltParameter::new(name.trim(), value))
        }
        _ => Err(format!("expected name=value, got '{}'", text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("p=42", "p", "42")]
    #[case("p=", "p", "")]
    #[case("expr=a=b", "expr", "a=b")]
    #[case(" p =x", "p", "x")]
    fn test_parse_parameter(#[case] text: &str, #[case] name: &str, #[case] value: &str) {
        assert_eq!(parse_parameter(text), Ok(XsltParameter::new(name, value)));
    }

    #[rstest]
    #[case("p")]
    #[case("=42")]
    fn test_parse_parameter_error(#[case] text: &str) {
        assert!(parse_parameter(text).is_err());
    }
}

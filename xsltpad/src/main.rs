mod close_tag;
mod common;
mod error;
mod indent;
mod params;
mod transform;
mod validate;
mod watch;
mod xpath_at;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr. RUST_LOG overrides this.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform an XML document with an XSLT 1.0 stylesheet.
    Transform(transform::Transform),
    /// List the top-level parameters a stylesheet declares.
    Params(params::Params),
    /// Validate an XML document against an XML schema.
    Validate(validate::Validate),
    /// Print the path of the element at a line and column.
    XpathAt(xpath_at::XPathAt),
    /// Print the name of the tag that `</` typed at an offset closes.
    CloseTag(close_tag::CloseTag),
    /// Re-indent an XML document.
    Indent(indent::Indent),
    /// Re-run a transform whenever the stylesheet or the document changes.
    Watch(watch::Watch),
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Transform(transform) => transform.run(),
        Commands::Params(params) => params.run(),
        Commands::Validate(validate) => validate.run(),
        Commands::XpathAt(xpath_at) => xpath_at.run(),
        Commands::CloseTag(close_tag) => close_tag.run(),
        Commands::Indent(indent) => indent.run(),
        Commands::Watch(watch) => watch.run(),
    }
}

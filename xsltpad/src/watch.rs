use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use xsltpad_pipeline::{
    DocumentError, MemoryBuffer, ParameterMergePolicy, PipelineConfig, Session, SessionUpdate, SourceDocument,
    StylesheetDocument, TracingSink, XsltParameter,
};

use crate::common::parse_parameter;

#[derive(Debug, Parser)]
pub(crate) struct Watch {
    /// Input XML file
    infile: PathBuf,
    /// XSLT stylesheet file
    stylesheet: PathBuf,
    /// Stylesheet parameter as name=value (can be repeated)
    #[arg(long = "param", short = 'p', value_parser = parse_parameter)]
    parameters: Vec<XsltParameter>,
    /// Validate every output against this XML schema
    #[arg(long)]
    schema: Option<PathBuf>,
    /// Keep typed parameter values when the stylesheet is reloaded
    #[arg(long)]
    keep_values: bool,
}

impl Watch {
    pub(crate) fn run(&self) -> anyhow::Result<ExitCode> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start the runtime")?;
        runtime.block_on(self.watch())?;
        Ok(ExitCode::SUCCESS)
    }

    async fn watch(&self) -> anyhow::Result<()> {
        let stylesheet_path = canonical(&self.stylesheet)?;
        let source_path = canonical(&self.infile)?;

        let source = SourceDocument::new(Arc::new(MemoryBuffer::default()));
        source.load(&source_path)?;
        let stylesheet =
            StylesheetDocument::open_in(Arc::new(MemoryBuffer::default()), &stylesheet_path)?;
        let config = PipelineConfig {
            schema: self.schema.clone(),
            merge_policy: if self.keep_values {
                ParameterMergePolicy::PreserveValues
            } else {
                ParameterMergePolicy::Discard
            },
        };
        let mut session = Session::new(source, stylesheet, Arc::new(TracingSink), config);
        session.edit_parameters(|parameters| apply_values(parameters, &self.parameters));

        let (changes_sender, mut changes) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = changes_sender.send(res);
            },
            Config::default(),
        )?;
        // editors often replace a file on save, so watch the directories
        let mut dirs = HashSet::new();
        for path in [&stylesheet_path, &source_path] {
            if let Some(dir) = path.parent() {
                if dirs.insert(dir.to_path_buf()) {
                    watcher.watch(dir, RecursiveMode::NonRecursive)?;
                }
            }
        }
        info!(stylesheet = %stylesheet_path.display(), source = %source_path.display(), "watching");

        loop {
            tokio::select! {
                Some(change) = changes.recv() => match change {
                    Ok(event) => reload(
                        &mut session,
                        &event,
                        (stylesheet_path.as_path(), source_path.as_path()),
                        &self.parameters,
                    ),
                    Err(e) => warn!(error = %e, "file watcher error"),
                },
                update = session.next_update() => match update {
                    Some(SessionUpdate::Applied(run)) => {
                        debug!(%run, "showing outcome");
                        print_outcome(&session);
                    }
                    Some(_) => {}
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Pick up a file that changed on disk. A new stylesheet is opened afresh,
/// so its parameters are extracted again.
fn reload(
    session: &mut Session,
    event: &Event,
    (stylesheet, source): (&Path, &Path),
    values: &[XsltParameter],
) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in &event.paths {
        let result = if path == stylesheet {
            match std::fs::read_to_string(path) {
                Ok(text) if text == session.stylesheet().text() => Ok(()),
                Ok(_) => session.open_stylesheet(path).map(|()| {
                    session.edit_parameters(|parameters| apply_values(parameters, values));
                }),
                Err(e) => Err(DocumentError::Read {
                    path: path.clone(),
                    source: e,
                }),
            }
        } else if path == source {
            session.source().load(path)
        } else {
            continue;
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "cannot reload file");
        }
    }
}

fn canonical(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("Failed to find {}", path.display()))
}

/// Fill in values given on the command line for the parameters the
/// stylesheet declares.
fn apply_values(parameters: &mut [XsltParameter], values: &[XsltParameter]) {
    for value in values {
        match parameters.iter_mut().find(|parameter| parameter.name == value.name) {
            Some(parameter) => parameter.value = value.value.clone(),
            None => warn!(name = %value.name, "the stylesheet declares no such parameter"),
        }
    }
}

fn print_outcome(session: &Session) {
    println!("{}", session.output());
    if session.has_errors() {
        eprintln!("error: {}", session.errors());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_values() {
        let mut parameters = vec![XsltParameter::new("a", ""), XsltParameter::new("b", "")];
        apply_values(
            &mut parameters,
            &[XsltParameter::new("b", "2"), XsltParameter::new("c", "3")],
        );
        assert_eq!(
            parameters,
            vec![XsltParameter::new("a", ""), XsltParameter::new("b", "2")]
        );
    }
}

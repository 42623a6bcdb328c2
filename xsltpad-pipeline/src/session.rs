use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use xsltpad_analysis::{closing_tag, extract_parameters, locate, pretty_print, LocateError};

use crate::buffer::{NotificationSink, TextBuffer};
use crate::config::PipelineConfig;
use crate::debouncer::{ChangeDebouncer, Trigger};
use crate::document::{DocumentError, SourceDocument, StylesheetDocument};
use crate::parameter::{reload_parameters, XsltParameter};
use crate::worker::{Job, RunGuard, RunId, Runner, TransformOutcome, TransformWorker, WorkerEvent};

const TITLE: &str = "xsltpad";

/// One of the two edited buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Source,
    Stylesheet,
}

/// What [`Session::next_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The debouncer fired but a buffer was blank.
    Skipped,
    Started(RunId),
    /// The run's outcome is now the session's output and errors.
    Applied(RunId),
    /// The run was overtaken by a newer one; its outcome was dropped.
    Stale(RunId),
    Completed(RunId),
}

enum Incoming {
    Trigger,
    Worker(WorkerEvent),
}

/// The state of one editing session.
///
/// Edits to either buffer, and changes to the parameters or the schema,
/// schedule a run. The host drives the session by awaiting
/// [`next_update`](Self::next_update) in a loop.
pub struct Session {
    source: SourceDocument,
    stylesheet: StylesheetDocument,
    parameters: Vec<XsltParameter>,
    config: PipelineConfig,
    notifier: Arc<dyn NotificationSink>,
    output: String,
    errors: String,
    debouncer: Arc<ChangeDebouncer>,
    watchers: Vec<JoinHandle<()>>,
    triggers: mpsc::UnboundedReceiver<Trigger>,
    worker: TransformWorker,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    guard: RunGuard,
}

impl Session {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        source: SourceDocument,
        stylesheet: StylesheetDocument,
        notifier: Arc<dyn NotificationSink>,
        config: PipelineConfig,
    ) -> Self {
        let (events_sender, events) = mpsc::unbounded_channel();
        Self::with_worker(
            source,
            stylesheet,
            notifier,
            config,
            TransformWorker::new(events_sender),
            events,
        )
    }

    /// A session whose runs are carried out by `runner`.
    pub fn with_runner(
        source: SourceDocument,
        stylesheet: StylesheetDocument,
        notifier: Arc<dyn NotificationSink>,
        config: PipelineConfig,
        runner: Runner,
    ) -> Self {
        let (events_sender, events) = mpsc::unbounded_channel();
        Self::with_worker(
            source,
            stylesheet,
            notifier,
            config,
            TransformWorker::with_runner(events_sender, runner),
            events,
        )
    }

    fn with_worker(
        source: SourceDocument,
        stylesheet: StylesheetDocument,
        notifier: Arc<dyn NotificationSink>,
        config: PipelineConfig,
        worker: TransformWorker,
        events: mpsc::UnboundedReceiver<WorkerEvent>,
    ) -> Self {
        let (triggers_sender, triggers) = mpsc::unbounded_channel();
        let debouncer = Arc::new(ChangeDebouncer::new(triggers_sender));
        let watchers = vec![
            debouncer.watch(source.buffer().subscribe()),
            debouncer.watch(stylesheet.buffer().subscribe()),
        ];
        let parameters = reload_parameters(
            &[],
            extract_parameters(&stylesheet.text()),
            config.merge_policy,
        );
        Self {
            source,
            stylesheet,
            parameters,
            config,
            notifier,
            output: String::new(),
            errors: String::new(),
            debouncer,
            watchers,
            triggers,
            worker,
            events,
            guard: RunGuard::default(),
        }
    }

    /// Wait for the next thing to happen: the debouncer firing, or a run
    /// reporting back.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let incoming = tokio::select! {
            Some(Trigger) = self.triggers.recv() => Incoming::Trigger,
            Some(event) = self.events.recv() => Incoming::Worker(event),
            else => return None,
        };
        Some(match incoming {
            Incoming::Trigger => {
                let job = self.job();
                match self.worker.start(job) {
                    Some(run) => SessionUpdate::Started(run),
                    None => SessionUpdate::Skipped,
                }
            }
            Incoming::Worker(event) => self.apply(event),
        })
    }

    /// A snapshot of what a run would work on now.
    pub fn job(&self) -> Job {
        Job {
            xml: self.source.text(),
            xslt: self.stylesheet.text(),
            parameters: self
                .parameters
                .iter()
                .filter(|parameter| parameter.is_applied())
                .cloned()
                .collect(),
            schema: self.config.schema.clone(),
            stylesheet_path: self.stylesheet.file_path().map(Path::to_path_buf),
        }
    }

    fn apply(&mut self, event: WorkerEvent) -> SessionUpdate {
        match event {
            WorkerEvent::Finished { run, outcome } => {
                if !self.guard.accept(run) {
                    return SessionUpdate::Stale(run);
                }
                match outcome {
                    TransformOutcome::Success { output, validation } => {
                        self.output = output;
                        self.errors = validation.unwrap_or_default();
                    }
                    TransformOutcome::Failure(message) => {
                        self.output.clear();
                        self.errors = message;
                    }
                }
                SessionUpdate::Applied(run)
            }
            WorkerEvent::Completed(run) => SessionUpdate::Completed(run),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// The failure or validation message of the last applied run.
    pub fn errors(&self) -> &str {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn source(&self) -> &SourceDocument {
        &self.source
    }

    pub fn stylesheet(&self) -> &StylesheetDocument {
        &self.stylesheet
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn parameters(&self) -> &[XsltParameter] {
        &self.parameters
    }

    /// Change the parameter list and schedule a run.
    pub fn edit_parameters(&mut self, edit: impl FnOnce(&mut Vec<XsltParameter>)) {
        edit(&mut self.parameters);
        self.debouncer.notify();
    }

    /// Change the schema and schedule a run.
    pub fn set_schema(&mut self, schema: Option<PathBuf>) {
        self.config.schema = schema;
        self.debouncer.notify();
    }

    /// Replace the stylesheet with an empty, unsaved one.
    pub fn new_stylesheet(&mut self) {
        let document = StylesheetDocument::new_in(Arc::clone(self.stylesheet.buffer()));
        self.replace_stylesheet(document);
    }

    pub fn open_stylesheet(&mut self, path: &Path) -> Result<(), DocumentError> {
        let document = StylesheetDocument::open_in(Arc::clone(self.stylesheet.buffer()), path)?;
        self.replace_stylesheet(document);
        Ok(())
    }

    fn replace_stylesheet(&mut self, document: StylesheetDocument) {
        self.parameters = reload_parameters(
            &self.parameters,
            extract_parameters(&document.text()),
            self.config.merge_policy,
        );
        self.stylesheet = document;
        self.debouncer.notify();
    }

    pub fn save_stylesheet(&mut self) -> Result<(), DocumentError> {
        let result = self.stylesheet.save();
        self.report_save(&result);
        result
    }

    pub fn save_stylesheet_as(&mut self, path: &Path) -> Result<(), DocumentError> {
        let result = self.stylesheet.save_as(path);
        self.report_save(&result);
        result
    }

    fn report_save(&self, result: &Result<(), DocumentError>) {
        match result {
            Ok(()) => self.notifier.show_success("Saved"),
            Err(e) => self.notifier.show_error(&format!("Failed to save: {}", e)),
        }
    }

    pub fn window_title(&self) -> String {
        format!("{} - {}", self.stylesheet.display_name(), TITLE)
    }

    /// Re-indent both buffers. A buffer that isn't well-formed is left as
    /// it is.
    pub fn pretty_print_buffers(&self) {
        for buffer in [self.source.buffer(), self.stylesheet.buffer()] {
            match pretty_print(&buffer.text()) {
                Ok(text) => {
                    buffer.set_text(&text);
                    self.notifier.show_success("Document formatted");
                }
                Err(e) => {
                    debug!(error = %e, "cannot pretty print buffer");
                    self.notifier
                        .show_error(&format!("Failed to pretty print: {}", e));
                }
            }
        }
    }

    /// The path of the element under the cursor in the source buffer.
    pub fn xpath_at_cursor(&self, include_indexes: bool) -> Result<String, LocateError> {
        let buffer = self.source.buffer();
        let (line, column) = buffer.line_column(buffer.cursor());
        locate(&buffer.text(), line, column, include_indexes)
    }

    /// Hand the path of the element under the cursor to `clipboard`.
    pub fn copy_xpath(&self, include_indexes: bool, clipboard: impl FnOnce(&str)) {
        match self.xpath_at_cursor(include_indexes) {
            Ok(xpath) => {
                clipboard(&xpath);
                self.notifier.show_success("XPath copied");
            }
            Err(e) => self
                .notifier
                .show_error(&format!("Failed to copy XPath: {}", e)),
        }
    }

    /// The tag to close when `</` was just typed at the cursor of `pane`.
    pub fn closing_tag(&self, pane: Pane) -> Option<String> {
        let buffer = self.buffer(pane);
        closing_tag(&buffer.text(), buffer.cursor())
    }

    fn buffer(&self, pane: Pane) -> &Arc<dyn TextBuffer> {
        match pane {
            Pane::Source => self.source.buffer(),
            Pane::Stylesheet => self.stylesheet.buffer(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for watcher in &self.watchers {
            watcher.abort();
        }
    }
}

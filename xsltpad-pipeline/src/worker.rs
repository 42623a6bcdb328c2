use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{innermost_message, message_chain};
use crate::parameter::XsltParameter;
use crate::transformer::{panic_message, Transformer};
use crate::validator::Validator;

/// Identifies one run. Later runs have larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything one run needs, copied out of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Job {
    pub xml: String,
    pub xslt: String,
    pub parameters: Vec<XsltParameter>,
    pub schema: Option<PathBuf>,
    pub stylesheet_path: Option<PathBuf>,
}

impl Job {
    pub fn is_blank(&self) -> bool {
        self.xml.trim().is_empty() || self.xslt.trim().is_empty()
    }
}

/// The result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The transform succeeded. `validation` is the last problem the schema
    /// found in the output.
    Success {
        output: String,
        validation: Option<String>,
    },
    Failure(String),
}

impl TransformOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransformOutcome::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Finished {
        run: RunId,
        outcome: TransformOutcome,
    },
    /// Sent after `Finished`, whatever happened in the run.
    Completed(RunId),
}

/// Turns a job into an outcome; runs on a blocking thread.
pub type Runner = Arc<dyn Fn(&Job) -> TransformOutcome + Send + Sync>;

/// Transform, then validate the output.
pub fn run_job(job: &Job) -> TransformOutcome {
    let transformer = Transformer::new(job.stylesheet_path.as_deref());
    let output = match transformer.transform(&job.xml, &job.xslt, &job.parameters) {
        Ok(output) => output,
        Err(e) => return TransformOutcome::Failure(innermost_message(&e)),
    };
    match Validator.validate(&output, job.schema.as_deref()) {
        Ok(validation) => TransformOutcome::Success { output, validation },
        Err(e) => TransformOutcome::Failure(message_chain(&e)),
    }
}

/// Starts runs in the background and reports on a channel.
///
/// Runs are never cancelled; one that is overtaken still reports, and it is
/// up to the receiver to ignore it, see [`RunGuard`].
pub struct TransformWorker {
    events: mpsc::UnboundedSender<WorkerEvent>,
    runner: Runner,
    last_run: u64,
}

impl TransformWorker {
    pub fn new(events: mpsc::UnboundedSender<WorkerEvent>) -> Self {
        Self::with_runner(events, Arc::new(run_job))
    }

    pub fn with_runner(events: mpsc::UnboundedSender<WorkerEvent>, runner: Runner) -> Self {
        Self {
            events,
            runner,
            last_run: 0,
        }
    }

    /// Start a run. Blank jobs are skipped: they get no id and report
    /// nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, job: Job) -> Option<RunId> {
        if job.is_blank() {
            debug!("skipping run, the xml or the stylesheet is blank");
            return None;
        }
        self.last_run += 1;
        let run = RunId(self.last_run);
        info!(%run, "transform started");
        let events = self.events.clone();
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let outcome = match tokio::task::spawn_blocking(move || runner(&job)).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => TransformOutcome::Failure(format!(
                    "the transform panicked: {}",
                    panic_message(e.into_panic())
                )),
                Err(e) => TransformOutcome::Failure(e.to_string()),
            };
            info!(%run, success = outcome.is_success(), "transform finished");
            // a closed channel means nobody is waiting for the result
            let _ = events.send(WorkerEvent::Finished { run, outcome });
            let _ = events.send(WorkerEvent::Completed(run));
        });
        Some(run)
    }
}

/// Decides which outcomes may still be shown.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunGuard {
    newest: Option<RunId>,
}

impl RunGuard {
    /// Whether the outcome of `run` may be applied. Accepting a run makes
    /// every older run stale.
    pub fn accept(&mut self, run: RunId) -> bool {
        if let Some(newest) = self.newest {
            if run < newest {
                warn!(%run, %newest, "discarding outcome of a stale run");
                return false;
            }
        }
        self.newest = Some(run);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn job(xml: &str) -> Job {
        Job {
            xml: xml.to_string(),
            xslt: "<s/>".to_string(),
            ..Default::default()
        }
    }

    fn echo(job: &Job) -> TransformOutcome {
        TransformOutcome::Success {
            output: job.xml.clone(),
            validation: None,
        }
    }

    #[tokio::test]
    async fn test_blank_job_is_skipped() {
        let (sender, mut events) = mpsc::unbounded_channel();
        let mut worker = TransformWorker::with_runner(sender, Arc::new(echo));
        assert_eq!(worker.start(job("  ")), None);
        assert_eq!(
            worker.start(Job {
                xslt: String::new(),
                ..job("<a/>")
            }),
            None
        );
        drop(worker);
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_outcome_then_completion() {
        let (sender, mut events) = mpsc::unbounded_channel();
        let mut worker = TransformWorker::with_runner(sender, Arc::new(echo));
        let run = worker.start(job("<a/>")).unwrap();
        assert_eq!(
            events.recv().await,
            Some(WorkerEvent::Finished {
                run,
                outcome: TransformOutcome::Success {
                    output: "<a/>".to_string(),
                    validation: None
                }
            })
        );
        assert_eq!(events.recv().await, Some(WorkerEvent::Completed(run)));
    }

    #[tokio::test]
    async fn test_panicking_run_still_reports() {
        let (sender, mut events) = mpsc::unbounded_channel();
        let runner: Runner = Arc::new(|_: &Job| -> TransformOutcome { panic!("runaway") });
        let mut worker = TransformWorker::with_runner(sender, runner);
        let run = worker.start(job("<a/>")).unwrap();
        assert_eq!(
            events.recv().await,
            Some(WorkerEvent::Finished {
                run,
                outcome: TransformOutcome::Failure("the transform panicked: runaway".to_string())
            })
        );
        assert_eq!(events.recv().await, Some(WorkerEvent::Completed(run)));
    }

    #[tokio::test]
    async fn test_overtaken_run_is_stale() {
        let (sender, mut events) = mpsc::unbounded_channel();
        let (release, released) = std::sync::mpsc::channel::<()>();
        let released = Mutex::new(released);
        let runner: Runner = Arc::new(move |job: &Job| {
            if job.xml == "<slow/>" {
                let _ = released.lock().unwrap().recv();
            }
            echo(job)
        });
        let mut worker = TransformWorker::with_runner(sender, runner);
        let slow = worker.start(job("<slow/>")).unwrap();
        let fast = worker.start(job("<fast/>")).unwrap();
        assert!(slow < fast);

        let mut guard = RunGuard::default();
        let Some(WorkerEvent::Finished { run, .. }) = events.recv().await else {
            panic!("expected an outcome");
        };
        assert_eq!(run, fast);
        assert!(guard.accept(run));
        assert_eq!(events.recv().await, Some(WorkerEvent::Completed(fast)));

        release.send(()).unwrap();
        let Some(WorkerEvent::Finished { run, .. }) = events.recv().await else {
            panic!("expected an outcome");
        };
        assert_eq!(run, slow);
        assert!(!guard.accept(run));
        assert_eq!(events.recv().await, Some(WorkerEvent::Completed(slow)));
    }

    #[test]
    fn test_guard_accepts_newer_runs() {
        let mut guard = RunGuard::default();
        assert!(guard.accept(RunId(2)));
        assert!(guard.accept(RunId(2)));
        assert!(guard.accept(RunId(5)));
        assert!(!guard.accept(RunId(3)));
    }
}

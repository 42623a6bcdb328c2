//! The live transformation pipeline behind the editor.
//!
//! Edits to either buffer re-arm a [`ChangeDebouncer`]. When it fires, a
//! [`Session`] snapshots its documents and hands them to the
//! [`TransformWorker`], which runs the [`Transformer`] and then the
//! [`Validator`] on a blocking task and reports back over a channel. Every
//! run carries a [`RunId`] so the session never lets an older run overwrite
//! a newer one.

mod buffer;
mod config;
mod debouncer;
mod document;
mod error;
mod parameter;
mod session;
mod transformer;
mod validator;
mod worker;

pub use buffer::{char_offset, line_column, MemoryBuffer, NotificationSink, TextBuffer, TracingSink};
pub use config::PipelineConfig;
pub use debouncer::{ChangeDebouncer, DebounceState, Trigger, QUIET_PERIOD};
pub use document::{DocumentError, SourceDocument, StylesheetDocument};
pub use error::{innermost_message, message_chain};
pub use parameter::{reload_parameters, ParameterMergePolicy, XsltParameter};
pub use session::{Pane, Session, SessionUpdate};
pub use transformer::{TransformError, Transformer};
pub use validator::{ValidationError, Validator};
pub use worker::{run_job, Job, RunGuard, RunId, Runner, TransformOutcome, TransformWorker, WorkerEvent};

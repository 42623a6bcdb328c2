use std::path::PathBuf;

use crate::parameter::ParameterMergePolicy;

/// Runtime settings of a [`Session`](crate::Session).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Schema to validate transform output against. Without one, validation
    /// is skipped.
    pub schema: Option<PathBuf>,
    pub merge_policy: ParameterMergePolicy,
}

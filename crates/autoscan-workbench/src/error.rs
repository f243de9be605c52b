use autoscan_processing::ProcessingError;

use crate::{config::ConfigError, pipeline::Stage, store::StoreError};

/// Error types for the workbench.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WorkbenchError {
    /// The stage needs a different number of selected elements.
    #[error("{stage} needs {expected} selected point clouds, found {found}")]
    InvalidSelection {
        /// The stage that was requested.
        stage: Stage,
        /// The number of selected elements the stage needs.
        expected: usize,
        /// The number of selected elements.
        found: usize,
    },

    /// A captured frame was given an empty name or one already in use.
    #[error("Name is empty or already exists: {0:?}")]
    DuplicateOrEmptyName(String),

    /// The processing strategy could not produce a result.
    #[error("{stage} failed")]
    StrategyComputationFailure {
        /// The stage that failed.
        stage: Stage,
        /// The underlying processing error.
        #[source]
        source: ProcessingError,
    },

    /// Loading or saving a file failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading or writing the configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Starting the grabber failed.
    #[error(transparent)]
    Acquisition(#[from] crate::acquisition::AcquisitionError),
}

impl WorkbenchError {
    pub(crate) fn computation(stage: Stage) -> impl FnOnce(ProcessingError) -> Self {
        move |source| WorkbenchError::StrategyComputationFailure { stage, source }
    }
}

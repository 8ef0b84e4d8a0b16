use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Required column '{column}' missing from transaction table")]
    MissingColumn { column: String },

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Upstream collaborator '{collaborator}' failed: {reason}")]
    Upstream {
        collaborator: &'static str,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Wrap an error with the name of the pipeline stage it surfaced in.
    pub fn in_stage(self, stage: &'static str) -> Self {
        EngineError::Stage {
            stage,
            source: Box::new(self),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

use thiserror::Error;

/// Failures the round-upload pipeline can surface to its caller.
///
/// "Not found" is never an error here: lookups return `Option` and leave
/// the decision to the caller. Committed batches stay committed when a
/// later step fails; there is no compensating rollback.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected before any write was issued.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A lookup or batch commit failed. Not retried at this layer.
    #[error("storage operation failed")]
    Storage(#[from] sqlx::Error),

    /// The column classifier could not produce a usable mapping.
    #[error("column classification failed: {0}")]
    Classifier(String),
}

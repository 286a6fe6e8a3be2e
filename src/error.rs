use uuid::Uuid;

use crate::models::TranscriptStatus;

#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("transcript {transcript_id} is {actual}, expected {expected}")]
    InvalidStage {
        transcript_id: Uuid,
        expected: &'static str,
        actual: TranscriptStatus,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type EvaluatorResult<T> = Result<T, EvaluatorError>;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EvaluatorResult;
use crate::models::{
    CourseDerivation, Evaluation, NewEvaluation, NewTranscript, ReferenceData, StudentCourse,
    Transcript, TranscriptStatus,
};

/// Persistence seam for the evaluation pipeline.
///
/// Every stage reads what the previous one wrote through this trait, so a
/// stage can be rerun from stored state alone.
#[async_trait]
pub trait TranscriptStore: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str {
        "unknown"
    }

    /// Persist a transcript and all of its courses, or nothing.
    async fn create_transcript(&self, input: &NewTranscript) -> EvaluatorResult<Transcript>;

    async fn find_transcript(&self, id: Uuid) -> EvaluatorResult<Option<Transcript>>;

    async fn set_transcript_status(
        &self,
        id: Uuid,
        status: TranscriptStatus,
    ) -> EvaluatorResult<()>;

    /// Courses of a transcript in their ingested order.
    async fn list_courses(&self, transcript_id: Uuid) -> EvaluatorResult<Vec<StudentCourse>>;

    /// Overwrite the derived fields of the given courses.
    async fn update_course_derivations(
        &self,
        updates: &[(Uuid, CourseDerivation)],
    ) -> EvaluatorResult<()>;

    async fn load_reference_data(&self, system_id: &str) -> EvaluatorResult<ReferenceData>;

    async fn insert_evaluation(&self, input: NewEvaluation) -> EvaluatorResult<Evaluation>;

    async fn find_evaluation(&self, id: Uuid) -> EvaluatorResult<Option<Evaluation>>;

    /// Evaluations of a transcript, newest first.
    async fn list_evaluations(&self, transcript_id: Uuid) -> EvaluatorResult<Vec<Evaluation>>;
}

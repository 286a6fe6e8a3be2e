use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EvaluatorError, EvaluatorResult};
use crate::models::{
    CourseDerivation, CourseEquivalency, Evaluation, GradeScaleEntry, NewEvaluation,
    NewTranscript, ReferenceData, StudentCourse, Transcript, TranscriptStatus,
};
use crate::store::TranscriptStore;

#[derive(Default)]
struct State {
    transcripts: HashMap<Uuid, Transcript>,
    courses: Vec<StudentCourse>,
    evaluations: Vec<Evaluation>,
    equivalencies: Vec<CourseEquivalency>,
    grade_scales: Vec<GradeScaleEntry>,
}

/// In-process store for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_equivalency(&self, entry: CourseEquivalency) {
        self.state.write().await.equivalencies.push(entry);
    }

    pub async fn add_grade(&self, entry: GradeScaleEntry) {
        self.state.write().await.grade_scales.push(entry);
    }

    pub async fn load_reference(&self, reference: ReferenceData) {
        let mut state = self.state.write().await;
        state.equivalencies.extend(reference.equivalencies);
        state.grade_scales.extend(reference.grade_scale);
    }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn create_transcript(&self, input: &NewTranscript) -> EvaluatorResult<Transcript> {
        let now = Utc::now();
        let transcript = Transcript {
            id: Uuid::new_v4(),
            student_id: input.student_id,
            country_id: input.country_id.clone(),
            system_id: input.system_id.clone(),
            school_name: input.school_name.clone(),
            school_city: input.school_city.clone(),
            language: input.language.clone(),
            status: TranscriptStatus::Ingested,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        for (position, course) in input.courses.iter().enumerate() {
            state.courses.push(StudentCourse {
                id: Uuid::new_v4(),
                transcript_id: transcript.id,
                position: position as i32,
                year: course.year,
                term: course.term.clone(),
                subject: course.subject.clone(),
                level: course.level.clone(),
                local_grade: course.local_grade.clone(),
                hours_per_week: course.hours_per_week,
                weeks_per_year: course.weeks_per_year,
                completed: course.completed,
                derivation: None,
            });
        }
        state.transcripts.insert(transcript.id, transcript.clone());
        Ok(transcript)
    }

    async fn find_transcript(&self, id: Uuid) -> EvaluatorResult<Option<Transcript>> {
        Ok(self.state.read().await.transcripts.get(&id).cloned())
    }

    async fn set_transcript_status(
        &self,
        id: Uuid,
        status: TranscriptStatus,
    ) -> EvaluatorResult<()> {
        let mut state = self.state.write().await;
        let transcript = state
            .transcripts
            .get_mut(&id)
            .ok_or(EvaluatorError::NotFound {
                entity: "transcript",
                id,
            })?;
        transcript.status = status;
        transcript.updated_at = Utc::now();
        Ok(())
    }

    async fn list_courses(&self, transcript_id: Uuid) -> EvaluatorResult<Vec<StudentCourse>> {
        let state = self.state.read().await;
        let mut courses: Vec<StudentCourse> = state
            .courses
            .iter()
            .filter(|course| course.transcript_id == transcript_id)
            .cloned()
            .collect();
        courses.sort_by_key(|course| course.position);
        Ok(courses)
    }

    async fn update_course_derivations(
        &self,
        updates: &[(Uuid, CourseDerivation)],
    ) -> EvaluatorResult<()> {
        let mut state = self.state.write().await;
        let mut indices = Vec::with_capacity(updates.len());
        for (course_id, _) in updates {
            let index = state
                .courses
                .iter()
                .position(|course| course.id == *course_id)
                .ok_or(EvaluatorError::NotFound {
                    entity: "course",
                    id: *course_id,
                })?;
            indices.push(index);
        }

        // All ids resolved; apply as one unit.
        for (index, (_, derivation)) in indices.into_iter().zip(updates) {
            state.courses[index].derivation = Some(derivation.clone());
        }
        Ok(())
    }

    async fn load_reference_data(&self, system_id: &str) -> EvaluatorResult<ReferenceData> {
        let state = self.state.read().await;
        Ok(ReferenceData {
            equivalencies: state
                .equivalencies
                .iter()
                .filter(|entry| entry.system_id == system_id)
                .cloned()
                .collect(),
            grade_scale: state
                .grade_scales
                .iter()
                .filter(|entry| entry.system_id == system_id)
                .cloned()
                .collect(),
        })
    }

    async fn insert_evaluation(&self, input: NewEvaluation) -> EvaluatorResult<Evaluation> {
        let evaluation = Evaluation::from_new(Uuid::new_v4(), Utc::now(), input);
        self.state
            .write()
            .await
            .evaluations
            .push(evaluation.clone());
        Ok(evaluation)
    }

    async fn find_evaluation(&self, id: Uuid) -> EvaluatorResult<Option<Evaluation>> {
        Ok(self
            .state
            .read()
            .await
            .evaluations
            .iter()
            .find(|evaluation| evaluation.id == id)
            .cloned())
    }

    async fn list_evaluations(&self, transcript_id: Uuid) -> EvaluatorResult<Vec<Evaluation>> {
        let state = self.state.read().await;
        Ok(state
            .evaluations
            .iter()
            .rev()
            .filter(|evaluation| evaluation.transcript_id == transcript_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCourse;

    fn input() -> NewTranscript {
        NewTranscript {
            student_id: Uuid::new_v4(),
            country_id: "GB".to_string(),
            system_id: "uk-gcse".to_string(),
            school_name: None,
            school_city: None,
            language: "en".to_string(),
            courses: vec![NewCourse {
                year: 2023,
                term: None,
                subject: "History".to_string(),
                level: None,
                local_grade: "7".to_string(),
                hours_per_week: None,
                weeks_per_year: None,
                completed: true,
            }],
        }
    }

    #[tokio::test]
    async fn derivation_updates_apply_all_or_nothing() {
        let store = MemoryStore::new();
        let transcript = store.create_transcript(&input()).await.expect("create");
        let course_id = store.list_courses(transcript.id).await.expect("courses")[0].id;

        let derivation = CourseDerivation {
            normalized_grade: Some(3.7),
            ..CourseDerivation::default()
        };
        let result = store
            .update_course_derivations(&[
                (course_id, derivation.clone()),
                (Uuid::new_v4(), derivation),
            ])
            .await;

        assert!(matches!(
            result,
            Err(EvaluatorError::NotFound { entity: "course", .. })
        ));
        let courses = store.list_courses(transcript.id).await.expect("courses");
        assert!(courses[0].derivation.is_none());
    }

    #[tokio::test]
    async fn status_changes_require_a_known_transcript() {
        let store = MemoryStore::new();
        let transcript = store.create_transcript(&input()).await.expect("create");

        store
            .set_transcript_status(transcript.id, TranscriptStatus::Suggested)
            .await
            .expect("known transcript");
        let found = store
            .find_transcript(transcript.id)
            .await
            .expect("lookup")
            .expect("exists");
        assert_eq!(found.status, TranscriptStatus::Suggested);

        assert!(store
            .set_transcript_status(Uuid::new_v4(), TranscriptStatus::Evaluated)
            .await
            .is_err());
    }
}

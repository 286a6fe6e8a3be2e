use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cache::{self, CacheInvalidation, CacheStats, TtlCache};
use crate::config::CacheConfig;
use crate::error::{EvaluatorError, EvaluatorResult};
use crate::models::{Evaluation, NewTranscript, ReferenceData, SuggestionSummary, Transcript};
use crate::report::{build_report, ReportDocument};
use crate::store::TranscriptStore;
use crate::{evaluate, ingest, suggest};

pub type ReferenceCache = TtlCache<String, Arc<ReferenceData>>;

/// Entry point for the four pipeline stages.
///
/// Owns the store handle and the per-system reference cache; both are
/// injected so tests and dry runs can use [`crate::memory::MemoryStore`].
pub struct TranscriptEvaluator {
    store: Arc<dyn TranscriptStore>,
    reference_cache: Arc<Mutex<ReferenceCache>>,
}

impl TranscriptEvaluator {
    pub fn new(store: Arc<dyn TranscriptStore>, cache_config: &CacheConfig) -> Self {
        let reference_cache = TtlCache::new(
            cache_config.capacity,
            cache_config.ttl,
            cache_config.eviction.policy(),
        );
        Self::with_cache(store, reference_cache)
    }

    pub fn with_cache(store: Arc<dyn TranscriptStore>, reference_cache: ReferenceCache) -> Self {
        Self {
            store,
            reference_cache: Arc::new(Mutex::new(reference_cache)),
        }
    }

    pub fn store(&self) -> &dyn TranscriptStore {
        self.store.as_ref()
    }

    pub async fn ingest_transcript(&self, input: NewTranscript) -> EvaluatorResult<Transcript> {
        ingest::ingest_transcript(self.store.as_ref(), input).await
    }

    pub async fn suggest_course_matches(
        &self,
        transcript_id: Uuid,
    ) -> EvaluatorResult<SuggestionSummary> {
        let transcript = self.transcript(transcript_id).await?;
        let reference = self.reference_data(&transcript.system_id).await?;
        suggest::suggest_course_matches(self.store.as_ref(), &transcript, &reference).await
    }

    pub async fn evaluate_eligibility(&self, transcript_id: Uuid) -> EvaluatorResult<Evaluation> {
        let transcript = self.transcript(transcript_id).await?;
        evaluate::evaluate_eligibility(self.store.as_ref(), &transcript).await
    }

    pub async fn generate_report(&self, evaluation_id: Uuid) -> EvaluatorResult<ReportDocument> {
        let evaluation = self
            .store
            .find_evaluation(evaluation_id)
            .await?
            .ok_or(EvaluatorError::NotFound {
                entity: "evaluation",
                id: evaluation_id,
            })?;
        let transcript = self.transcript(evaluation.transcript_id).await?;
        let courses = self.store.list_courses(transcript.id).await?;

        Ok(build_report(&transcript, &courses, &evaluation, Utc::now()))
    }

    /// Every evaluation recorded for a transcript, newest first.
    pub async fn evaluation_history(&self, transcript_id: Uuid) -> EvaluatorResult<Vec<Evaluation>> {
        self.transcript(transcript_id).await?;
        self.store.list_evaluations(transcript_id).await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.reference_cache.lock().await.stats()
    }

    pub async fn invalidate_reference(&self, system_id: &str) -> bool {
        self.reference_cache
            .lock()
            .await
            .invalidate(&system_id.to_string())
    }

    pub fn spawn_cache_purge(&self, every: std::time::Duration) -> JoinHandle<()> {
        cache::spawn_purge_task(Arc::clone(&self.reference_cache), every)
    }

    pub fn listen_for_invalidations(
        &self,
        receiver: broadcast::Receiver<CacheInvalidation<String>>,
    ) -> JoinHandle<()> {
        cache::spawn_invalidation_listener(Arc::clone(&self.reference_cache), receiver)
    }

    async fn transcript(&self, id: Uuid) -> EvaluatorResult<Transcript> {
        self.store
            .find_transcript(id)
            .await?
            .ok_or(EvaluatorError::NotFound {
                entity: "transcript",
                id,
            })
    }

    async fn reference_data(&self, system_id: &str) -> EvaluatorResult<Arc<ReferenceData>> {
        let key = system_id.to_string();
        if let Some(cached) = self.reference_cache.lock().await.get(&key) {
            tracing::debug!(system_id, "reference cache hit");
            return Ok(cached);
        }

        let loaded = Arc::new(self.store.load_reference_data(system_id).await?);
        tracing::debug!(
            system_id,
            equivalencies = loaded.equivalencies.len(),
            grades = loaded.grade_scale.len(),
            backend = self.store.backend_tag(),
            "loaded reference data"
        );
        self.reference_cache
            .lock()
            .await
            .insert(key, Arc::clone(&loaded));
        Ok(loaded)
    }
}

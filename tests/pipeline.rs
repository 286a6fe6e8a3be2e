use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use transcript_evaluator::cache::{CacheInvalidation, EvictionKind, TtlCache};
use transcript_evaluator::config::CacheConfig;
use transcript_evaluator::memory::MemoryStore;
use transcript_evaluator::models::{
    CourseEquivalency, Division, GradeScaleEntry, NcaaCategory, NewCourse, NewTranscript,
    RequirementKind, TranscriptStatus,
};
use transcript_evaluator::reference::seed_reference_data;
use transcript_evaluator::store::TranscriptStore;
use transcript_evaluator::{EvaluatorError, TranscriptEvaluator};

const SYSTEM: &str = "test-system";

async fn example_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store
        .add_equivalency(CourseEquivalency {
            system_id: SYSTEM.to_string(),
            local_subject: "Mathematics".to_string(),
            local_level: Some("Algebra I".to_string()),
            ncaa_category: NcaaCategory::Math,
            us_equivalent: "Algebra I".to_string(),
            is_lab_science: false,
            is_algebra_or_higher: None,
            default_credit_hours: 1.0,
        })
        .await;
    store
        .add_grade(GradeScaleEntry {
            system_id: SYSTEM.to_string(),
            local_grade: "B".to_string(),
            normalized_value: 3.0,
        })
        .await;
    Arc::new(store)
}

fn evaluator(store: Arc<MemoryStore>) -> TranscriptEvaluator {
    TranscriptEvaluator::new(store, &CacheConfig::default())
}

fn course(year: i32, subject: &str, level: Option<&str>, grade: &str) -> NewCourse {
    NewCourse {
        year,
        term: None,
        subject: subject.to_string(),
        level: level.map(str::to_string),
        local_grade: grade.to_string(),
        hours_per_week: None,
        weeks_per_year: None,
        completed: true,
    }
}

fn transcript(system_id: &str, courses: Vec<NewCourse>) -> NewTranscript {
    NewTranscript {
        student_id: Uuid::new_v4(),
        country_id: "XX".to_string(),
        system_id: system_id.to_string(),
        school_name: Some("International School".to_string()),
        school_city: None,
        language: "en".to_string(),
        courses,
    }
}

#[tokio::test]
async fn algebra_example_scores_one_and_a_half_credits() {
    let store = example_store().await;
    let evaluator = evaluator(Arc::clone(&store));

    let mut algebra = course(2023, "Mathematics", Some("Algebra I"), "B");
    algebra.hours_per_week = Some(5.0);
    algebra.weeks_per_year = Some(36.0);

    let created = evaluator
        .ingest_transcript(transcript(SYSTEM, vec![algebra]))
        .await
        .expect("ingest");
    let summary = evaluator
        .suggest_course_matches(created.id)
        .await
        .expect("suggest");
    assert_eq!(summary.courses_processed, 1);
    assert_eq!(summary.courses_flagged, 0);

    let evaluation = evaluator
        .evaluate_eligibility(created.id)
        .await
        .expect("evaluate");

    assert!((evaluation.credits.math_algebra_i_or_higher - 1.5).abs() < 1e-9);
    assert_eq!(evaluation.core_gpa, Some(3.0));
    assert_eq!(evaluation.overall_gpa, Some(3.0));
    assert!(!evaluation.division_i_eligible);
    assert!(evaluation.missing_requirements.iter().any(|gap| {
        gap.division == Division::DivisionI
            && gap.requirement == RequirementKind::Math
            && gap.required == 3.0
    }));

    let courses = store.list_courses(created.id).await.expect("courses");
    let derivation = courses[0].derivation.as_ref().expect("derived");
    assert_eq!(derivation.normalized_grade, Some(3.0));
    assert_eq!(derivation.ncaa_category, Some(NcaaCategory::Math));
    assert!(!derivation.requires_review);
}

#[tokio::test]
async fn ingest_keeps_every_course_tuple() {
    let store = example_store().await;
    let evaluator = evaluator(Arc::clone(&store));
    let input = vec![
        course(2021, "Mathematics", Some("Algebra I"), "B"),
        course(2022, "History", None, "A"),
        course(2022, "History", None, "A"),
    ];
    let expected: Vec<(i32, String, String)> = input
        .iter()
        .map(|c| (c.year, c.subject.clone(), c.local_grade.clone()))
        .collect();

    let created = evaluator
        .ingest_transcript(transcript(SYSTEM, input))
        .await
        .expect("ingest");
    assert_eq!(created.status, TranscriptStatus::Ingested);

    let stored: Vec<(i32, String, String)> = store
        .list_courses(created.id)
        .await
        .expect("courses")
        .into_iter()
        .map(|c| (c.year, c.subject, c.local_grade))
        .collect();
    assert_eq!(stored, expected);
}

#[tokio::test]
async fn unmatched_courses_need_review() {
    let store = example_store().await;
    let evaluator = evaluator(Arc::clone(&store));
    let created = evaluator
        .ingest_transcript(transcript(
            SYSTEM,
            vec![
                course(2023, "Mathematics", Some("Algebra I"), "B"),
                course(2023, "Drama", None, "B"),
            ],
        ))
        .await
        .expect("ingest");

    let summary = evaluator
        .suggest_course_matches(created.id)
        .await
        .expect("suggest");
    assert_eq!(summary.courses_flagged, 1);

    let courses = store.list_courses(created.id).await.expect("courses");
    let drama = courses[1].derivation.as_ref().expect("derived");
    assert!(drama.requires_review);
    assert_eq!(drama.ncaa_category, None);

    let evaluation = evaluator
        .evaluate_eligibility(created.id)
        .await
        .expect("evaluate");
    assert_eq!(evaluation.core_gpa, Some(3.0));
    assert!(evaluation
        .risk_factors
        .iter()
        .any(|risk| risk.contains("manual review")));
}

#[tokio::test]
async fn evaluation_before_suggestion_is_rejected() {
    let store = example_store().await;
    let evaluator = evaluator(store);
    let created = evaluator
        .ingest_transcript(transcript(
            SYSTEM,
            vec![course(2023, "Mathematics", Some("Algebra I"), "B")],
        ))
        .await
        .expect("ingest");

    let err = evaluator
        .evaluate_eligibility(created.id)
        .await
        .expect_err("not suggested yet");
    assert!(matches!(
        err,
        EvaluatorError::InvalidStage {
            actual: TranscriptStatus::Ingested,
            ..
        }
    ));
}

#[tokio::test]
async fn missing_ids_are_not_found() {
    let evaluator = evaluator(example_store().await);
    let missing = Uuid::new_v4();

    assert!(matches!(
        evaluator.suggest_course_matches(missing).await,
        Err(EvaluatorError::NotFound {
            entity: "transcript",
            ..
        })
    ));
    assert!(matches!(
        evaluator.evaluate_eligibility(missing).await,
        Err(EvaluatorError::NotFound { .. })
    ));
    assert!(matches!(
        evaluator.generate_report(missing).await,
        Err(EvaluatorError::NotFound {
            entity: "evaluation",
            ..
        })
    ));
}

#[tokio::test]
async fn suggestions_are_idempotent_and_evaluations_append() {
    let store = example_store().await;
    let evaluator = evaluator(Arc::clone(&store));
    let created = evaluator
        .ingest_transcript(transcript(
            SYSTEM,
            vec![course(2023, "Mathematics", Some("Algebra I"), "B")],
        ))
        .await
        .expect("ingest");

    evaluator
        .suggest_course_matches(created.id)
        .await
        .expect("first suggest");
    let first = store.list_courses(created.id).await.expect("courses");
    evaluator
        .suggest_course_matches(created.id)
        .await
        .expect("second suggest");
    let second = store.list_courses(created.id).await.expect("courses");
    assert_eq!(first[0].derivation, second[0].derivation);

    let older = evaluator
        .evaluate_eligibility(created.id)
        .await
        .expect("evaluate");
    let newer = evaluator
        .evaluate_eligibility(created.id)
        .await
        .expect("re-evaluate");
    assert_ne!(older.id, newer.id);

    let history = evaluator
        .evaluation_history(created.id)
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, newer.id);

    let transcript = store
        .find_transcript(created.id)
        .await
        .expect("lookup")
        .expect("exists");
    assert_eq!(transcript.status, TranscriptStatus::Evaluated);
}

#[tokio::test]
async fn reports_are_stable_apart_from_generation_time() {
    let store = example_store().await;
    let evaluator = evaluator(store);
    let created = evaluator
        .ingest_transcript(transcript(
            SYSTEM,
            vec![course(2023, "Mathematics", Some("Algebra I"), "B")],
        ))
        .await
        .expect("ingest");
    evaluator
        .suggest_course_matches(created.id)
        .await
        .expect("suggest");
    let evaluation = evaluator
        .evaluate_eligibility(created.id)
        .await
        .expect("evaluate");

    let mut first = serde_json::to_value(
        evaluator
            .generate_report(evaluation.id)
            .await
            .expect("report"),
    )
    .expect("json");
    let mut second = serde_json::to_value(
        evaluator
            .generate_report(evaluation.id)
            .await
            .expect("report"),
    )
    .expect("json");
    first["metadata"]["generated_at"] = serde_json::Value::Null;
    second["metadata"]["generated_at"] = serde_json::Value::Null;

    assert_eq!(first, second);
    assert_eq!(first["courses"].as_array().map(Vec::len), Some(1));
    assert_eq!(first["requirements"]["division_i"]["math"], 3.0);
}

#[tokio::test]
async fn full_gcse_transcript_meets_both_divisions() {
    let store = MemoryStore::new();
    store.load_reference(seed_reference_data("uk-gcse")).await;
    let evaluator = evaluator(Arc::new(store));

    let mut courses = Vec::new();
    for year in 2021..=2024 {
        courses.push(course(year, "English Language", None, "7"));
    }
    for year in 2021..=2023 {
        courses.push(course(year, "Mathematics", Some("Higher"), "6"));
    }
    courses.push(course(2022, "Biology", None, "7"));
    courses.push(course(2023, "Chemistry", None, "6"));
    courses.push(course(2022, "History", None, "8"));
    courses.push(course(2023, "Geography", None, "6"));
    for year in 2021..=2024 {
        courses.push(course(year, "Religious Studies", None, "5"));
    }
    courses.push(course(2024, "French", None, "6"));

    let created = evaluator
        .ingest_transcript(transcript("uk-gcse", courses))
        .await
        .expect("ingest");
    evaluator
        .suggest_course_matches(created.id)
        .await
        .expect("suggest");
    let evaluation = evaluator
        .evaluate_eligibility(created.id)
        .await
        .expect("evaluate");

    assert_eq!(evaluation.credits.total_core, 16.0);
    assert_eq!(evaluation.foreign_language_courses, 1);
    assert!(evaluation.division_i_eligible, "{:?}", evaluation.missing_requirements);
    assert!(evaluation.division_ii_eligible);
}

#[tokio::test]
async fn reference_data_is_cached_and_invalidated() {
    let store = example_store().await;
    let cache = TtlCache::new(4, Duration::from_secs(60), EvictionKind::Lru.policy());
    let evaluator = TranscriptEvaluator::with_cache(store, cache);

    for _ in 0..2 {
        let created = evaluator
            .ingest_transcript(transcript(
                SYSTEM,
                vec![course(2023, "Mathematics", Some("Algebra I"), "B")],
            ))
            .await
            .expect("ingest");
        evaluator
            .suggest_course_matches(created.id)
            .await
            .expect("suggest");
    }

    let stats = evaluator.cache_stats().await;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);

    let (sender, receiver) = broadcast::channel(4);
    let listener = evaluator.listen_for_invalidations(receiver);
    sender
        .send(CacheInvalidation::Key(SYSTEM.to_string()))
        .expect("listener subscribed");
    drop(sender);
    listener.await.expect("listener stops");

    assert_eq!(evaluator.cache_stats().await.entries, 0);
    assert!(!evaluator.invalidate_reference(SYSTEM).await);
}

#[tokio::test]
async fn background_purge_expires_reference_data() {
    let store = example_store().await;
    let cache = TtlCache::new(4, Duration::from_millis(20), EvictionKind::Fifo.policy());
    let evaluator = TranscriptEvaluator::with_cache(store, cache);

    let created = evaluator
        .ingest_transcript(transcript(
            SYSTEM,
            vec![course(2023, "Mathematics", Some("Algebra I"), "B")],
        ))
        .await
        .expect("ingest");
    evaluator
        .suggest_course_matches(created.id)
        .await
        .expect("suggest");
    assert_eq!(evaluator.cache_stats().await.entries, 1);

    let purge = evaluator.spawn_cache_purge(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(150)).await;
    purge.abort();

    let stats = evaluator.cache_stats().await;
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.expirations, 1);
}

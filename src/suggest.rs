//! Course matching: maps local courses onto NCAA categories, normalizes
//! grades to the 4.0 scale and derives credit hours.

use uuid::Uuid;

use crate::error::EvaluatorResult;
use crate::models::{
    CourseDerivation, CourseEquivalency, GradeScaleEntry, NcaaCategory, ReferenceData,
    StudentCourse, SuggestionSummary, Transcript, TranscriptStatus,
};
use crate::store::TranscriptStore;

/// Instructional hours in one Carnegie unit.
pub const CARNEGIE_UNIT_HOURS: f64 = 120.0;

const BELOW_ALGEBRA_MARKERS: [&str; 5] = ["pre-algebra", "arithmetic", "basic", "general", "consumer"];

fn key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn for_subject<'a, 's>(
    equivalencies: &'a [CourseEquivalency],
    subject: &'s str,
) -> impl Iterator<Item = &'a CourseEquivalency> + 's
where
    'a: 's,
{
    equivalencies
        .iter()
        .filter(move |entry| key(&entry.local_subject) == subject)
}

/// Best equivalency for a course: subject+level, then the subject-only
/// entry, then any entry for the subject.
pub fn match_equivalency<'a>(
    equivalencies: &'a [CourseEquivalency],
    subject: &str,
    level: Option<&str>,
) -> Option<&'a CourseEquivalency> {
    let subject = key(subject);

    if let Some(level) = level.map(key) {
        let exact = for_subject(equivalencies, &subject)
            .find(|entry| entry.local_level.as_deref().map(key) == Some(level.clone()));
        if exact.is_some() {
            return exact;
        }
    }

    let fallback = for_subject(equivalencies, &subject)
        .find(|entry| entry.local_level.is_none())
        .or_else(|| for_subject(equivalencies, &subject).next());
    fallback
}

pub fn normalize_grade(grade_scale: &[GradeScaleEntry], local_grade: &str) -> Option<f64> {
    let wanted = key(local_grade);
    grade_scale
        .iter()
        .find(|entry| key(&entry.local_grade) == wanted)
        .map(|entry| entry.normalized_value)
}

pub fn derive_credit_hours(
    hours_per_week: Option<f64>,
    weeks_per_year: Option<f64>,
    default_credit_hours: Option<f64>,
) -> f64 {
    match (hours_per_week, weeks_per_year) {
        (Some(hours), Some(weeks)) => hours * weeks / CARNEGIE_UNIT_HOURS,
        _ => default_credit_hours.unwrap_or(0.0),
    }
}

fn is_algebra_or_higher(entry: &CourseEquivalency, course: &StudentCourse) -> bool {
    if entry.ncaa_category != NcaaCategory::Math {
        return false;
    }
    if let Some(explicit) = entry.is_algebra_or_higher {
        return explicit;
    }

    let names = [
        Some(course.subject.as_str()),
        course.level.as_deref(),
        entry.local_level.as_deref(),
    ];
    !names.iter().flatten().any(|name| {
        let name = name.to_lowercase();
        BELOW_ALGEBRA_MARKERS
            .iter()
            .any(|marker| name.contains(marker))
    })
}

/// Derive every suggested field for one course.
pub fn suggest_course(course: &StudentCourse, reference: &ReferenceData) -> CourseDerivation {
    let matched = match_equivalency(
        &reference.equivalencies,
        &course.subject,
        course.level.as_deref(),
    );
    let normalized_grade = normalize_grade(&reference.grade_scale, &course.local_grade);

    let mut review_reasons = Vec::new();
    if matched.is_none() {
        review_reasons.push(format!(
            "no equivalency for subject '{}'{}",
            course.subject,
            course
                .level
                .as_deref()
                .map(|level| format!(" at level '{level}'"))
                .unwrap_or_default()
        ));
    }
    if normalized_grade.is_none() {
        review_reasons.push(format!("grade '{}' not in grade scale", course.local_grade));
    }

    CourseDerivation {
        ncaa_category: matched.map(|entry| entry.ncaa_category),
        us_equivalent: matched.map(|entry| entry.us_equivalent.clone()),
        is_lab_science: matched.is_some_and(|entry| {
            entry.ncaa_category == NcaaCategory::Science && entry.is_lab_science
        }),
        is_algebra_or_higher: matched.is_some_and(|entry| is_algebra_or_higher(entry, course)),
        credit_hours_awarded: derive_credit_hours(
            course.hours_per_week,
            course.weeks_per_year,
            matched.map(|entry| entry.default_credit_hours),
        ),
        normalized_grade,
        requires_review: !review_reasons.is_empty(),
        review_reasons,
    }
}

/// Recompute and store the derived fields of every course on a transcript.
pub async fn suggest_course_matches(
    store: &dyn TranscriptStore,
    transcript: &Transcript,
    reference: &ReferenceData,
) -> EvaluatorResult<SuggestionSummary> {
    let courses = store.list_courses(transcript.id).await?;
    if reference.equivalencies.is_empty() {
        tracing::warn!(
            transcript_id = %transcript.id,
            system_id = %transcript.system_id,
            "no equivalency table for education system, every course will need review"
        );
    }

    let updates: Vec<(Uuid, CourseDerivation)> = courses
        .iter()
        .map(|course| {
            let derivation = suggest_course(course, reference);
            for reason in &derivation.review_reasons {
                tracing::warn!(
                    transcript_id = %transcript.id,
                    course_id = %course.id,
                    reason = %reason,
                    "course needs review"
                );
            }
            (course.id, derivation)
        })
        .collect();

    let courses_flagged = updates
        .iter()
        .filter(|(_, derivation)| derivation.requires_review)
        .count();

    store.update_course_derivations(&updates).await?;
    store
        .set_transcript_status(transcript.id, TranscriptStatus::Suggested)
        .await?;

    tracing::info!(
        transcript_id = %transcript.id,
        courses = updates.len(),
        flagged = courses_flagged,
        "suggested course matches"
    );

    Ok(SuggestionSummary {
        transcript_id: transcript.id,
        courses_processed: updates.len(),
        courses_flagged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::seed_reference_data;

    fn equivalency(subject: &str, level: Option<&str>, category: NcaaCategory) -> CourseEquivalency {
        CourseEquivalency {
            system_id: "test".to_string(),
            local_subject: subject.to_string(),
            local_level: level.map(str::to_string),
            ncaa_category: category,
            us_equivalent: format!("{subject} {}", level.unwrap_or("")).trim().to_string(),
            is_lab_science: false,
            is_algebra_or_higher: None,
            default_credit_hours: 1.0,
        }
    }

    fn course(subject: &str, level: Option<&str>, grade: &str) -> StudentCourse {
        StudentCourse {
            id: Uuid::new_v4(),
            transcript_id: Uuid::new_v4(),
            position: 0,
            year: 2023,
            term: None,
            subject: subject.to_string(),
            level: level.map(str::to_string),
            local_grade: grade.to_string(),
            hours_per_week: None,
            weeks_per_year: None,
            completed: true,
            derivation: None,
        }
    }

    #[test]
    fn prefers_subject_and_level_over_subject_only() {
        let table = vec![
            equivalency("Mathematics", None, NcaaCategory::Math),
            equivalency("Mathematics", Some("Geometry"), NcaaCategory::Math),
        ];

        let exact = match_equivalency(&table, "mathematics", Some("  GEOMETRY ")).expect("match");
        assert_eq!(exact.local_level.as_deref(), Some("Geometry"));

        let fallback = match_equivalency(&table, "Mathematics", Some("Statistics")).expect("match");
        assert_eq!(fallback.local_level, None);

        assert!(match_equivalency(&table, "Drama", None).is_none());
    }

    #[test]
    fn falls_back_to_any_level_when_no_subject_only_entry() {
        let table = vec![equivalency("Chemistry", Some("Advanced"), NcaaCategory::Science)];
        let entry = match_equivalency(&table, "Chemistry", None).expect("match");
        assert_eq!(entry.local_level.as_deref(), Some("Advanced"));
    }

    #[test]
    fn credit_hours_scale_with_hours_per_week() {
        let single = derive_credit_hours(Some(5.0), Some(36.0), Some(1.0));
        let doubled = derive_credit_hours(Some(10.0), Some(36.0), Some(1.0));
        assert!((single - 1.5).abs() < 1e-9);
        assert!((doubled - 2.0 * single).abs() < 1e-9);
    }

    #[test]
    fn credit_hours_fall_back_to_default() {
        assert_eq!(derive_credit_hours(Some(5.0), None, Some(0.5)), 0.5);
        assert_eq!(derive_credit_hours(None, None, None), 0.0);
    }

    #[test]
    fn unmatched_course_requires_review() {
        let reference = seed_reference_data("intl-letter");
        let derivation = suggest_course(&course("Underwater Basket Weaving", None, "A"), &reference);

        assert!(derivation.requires_review);
        assert_eq!(derivation.ncaa_category, None);
        assert_eq!(derivation.normalized_grade, Some(4.0));
        assert_eq!(derivation.credit_hours_awarded, 0.0);
    }

    #[test]
    fn unmapped_grade_requires_review_but_keeps_category() {
        let reference = seed_reference_data("intl-letter");
        let derivation = suggest_course(&course("Biology", None, "Z"), &reference);

        assert!(derivation.requires_review);
        assert_eq!(derivation.ncaa_category, Some(NcaaCategory::Science));
        assert!(derivation.is_lab_science);
        assert_eq!(derivation.normalized_grade, None);
        assert_eq!(derivation.review_reasons.len(), 1);
    }

    #[test]
    fn algebra_flag_honours_table_then_level_names() {
        let reference = seed_reference_data("intl-letter");
        let pre = suggest_course(&course("Mathematics", Some("Pre-Algebra"), "A"), &reference);
        assert!(!pre.is_algebra_or_higher);

        let algebra = suggest_course(&course("Mathematics", Some("Algebra I"), "A"), &reference);
        assert!(algebra.is_algebra_or_higher);

        let basic = suggest_course(&course("Mathematics", Some("Basic Skills"), "A"), &reference);
        assert_eq!(basic.ncaa_category, Some(NcaaCategory::Math));
        assert!(!basic.is_algebra_or_higher);
    }
}

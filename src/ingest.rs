use std::path::Path;

use serde::Deserialize;

use crate::error::{EvaluatorError, EvaluatorResult};
use crate::models::{NewCourse, NewTranscript, Transcript};
use crate::store::TranscriptStore;

pub const MIN_YEAR: i32 = 1950;
pub const MAX_YEAR: i32 = 2100;
pub const MAX_HOURS_PER_WEEK: f64 = 168.0;
pub const MAX_WEEKS_PER_YEAR: f64 = 53.0;

/// Validate, normalize and persist a transcript with its courses.
pub async fn ingest_transcript(
    store: &dyn TranscriptStore,
    input: NewTranscript,
) -> EvaluatorResult<Transcript> {
    let input = normalize(input)?;
    let transcript = store.create_transcript(&input).await?;

    tracing::info!(
        transcript_id = %transcript.id,
        student_id = %transcript.student_id,
        system_id = %transcript.system_id,
        courses = input.courses.len(),
        "ingested transcript"
    );

    Ok(transcript)
}

fn normalize(mut input: NewTranscript) -> EvaluatorResult<NewTranscript> {
    input.country_id = required_text("country_id", &input.country_id)?;
    input.system_id = required_text("system_id", &input.system_id)?;
    input.language = required_text("language", &input.language)?;
    input.school_name = optional_text(input.school_name);
    input.school_city = optional_text(input.school_city);

    if input.courses.is_empty() {
        return Err(EvaluatorError::Validation(
            "a transcript needs at least one course".to_string(),
        ));
    }

    for (index, course) in input.courses.iter_mut().enumerate() {
        normalize_course(course).map_err(|reason| {
            EvaluatorError::Validation(format!("course {}: {reason}", index + 1))
        })?;
    }

    Ok(input)
}

fn normalize_course(course: &mut NewCourse) -> Result<(), String> {
    course.subject = course.subject.trim().to_string();
    course.local_grade = course.local_grade.trim().to_string();
    course.term = optional_text(course.term.take());
    course.level = optional_text(course.level.take());

    if course.subject.is_empty() {
        return Err("subject is blank".to_string());
    }
    if course.local_grade.is_empty() {
        return Err("local grade is blank".to_string());
    }
    if !(MIN_YEAR..=MAX_YEAR).contains(&course.year) {
        return Err(format!(
            "year {} outside {MIN_YEAR}..={MAX_YEAR}",
            course.year
        ));
    }
    within("hours per week", course.hours_per_week, MAX_HOURS_PER_WEEK)?;
    within("weeks per year", course.weeks_per_year, MAX_WEEKS_PER_YEAR)?;
    Ok(())
}

fn within(field: &str, value: Option<f64>, max: f64) -> Result<(), String> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 || v > max => {
            Err(format!("{field} must be in (0, {max}], got {v}"))
        }
        _ => Ok(()),
    }
}

fn required_text(field: &str, value: &str) -> EvaluatorResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EvaluatorError::Validation(format!("{field} is blank")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read course rows from a CSV with the columns
/// `year,term,subject,level,local_grade,hours_per_week,weeks_per_year,completed`.
pub fn read_courses_csv(csv_path: &Path) -> anyhow::Result<Vec<NewCourse>> {
    let reader = csv::Reader::from_path(csv_path)?;
    read_courses(reader)
}

pub fn read_courses<R: std::io::Read>(mut reader: csv::Reader<R>) -> anyhow::Result<Vec<NewCourse>> {
    #[derive(Deserialize)]
    struct CsvRow {
        year: i32,
        term: Option<String>,
        subject: String,
        level: Option<String>,
        local_grade: String,
        hours_per_week: Option<f64>,
        weeks_per_year: Option<f64>,
        completed: Option<bool>,
    }

    let mut courses = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        courses.push(NewCourse {
            year: row.year,
            term: row.term,
            subject: row.subject,
            level: row.level,
            local_grade: row.local_grade,
            hours_per_week: row.hours_per_week,
            weeks_per_year: row.weeks_per_year,
            completed: row.completed.unwrap_or(true),
        });
    }

    Ok(courses)
}

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    CreditTotals, Evaluation, MissingRequirement, NcaaCategory, StudentCourse, Transcript,
    TranscriptStatus,
};
use crate::requirements::{DivisionRequirements, DIVISION_I, DIVISION_II};

#[derive(Debug, Clone, Serialize)]
pub struct StudentInfo {
    pub student_id: Uuid,
    pub transcript_id: Uuid,
    pub country_id: String,
    pub system_id: String,
    pub school_name: Option<String>,
    pub school_city: Option<String>,
    pub language: String,
    pub status: TranscriptStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub core_gpa: Option<f64>,
    pub overall_gpa: Option<f64>,
    pub division_i_eligible: bool,
    pub division_ii_eligible: bool,
    pub total_courses: usize,
    /// Completed courses only, matching what the evaluation counted.
    pub core_courses: usize,
    pub courses_requiring_review: usize,
    pub foreign_language_courses: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    pub year: i32,
    pub term: Option<String>,
    pub subject: String,
    pub level: Option<String>,
    pub local_grade: String,
    pub completed: bool,
    pub ncaa_category: Option<NcaaCategory>,
    pub us_equivalent: Option<String>,
    pub is_lab_science: bool,
    pub is_algebra_or_higher: bool,
    pub credit_hours_awarded: Option<f64>,
    pub normalized_grade: Option<f64>,
    pub requires_review: bool,
    pub review_reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementTables {
    pub division_i: DivisionRequirements,
    pub division_ii: DivisionRequirements,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub evaluation_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub evaluator_version: String,
    pub generated_at: DateTime<Utc>,
}

/// Display-ready projection of an evaluation, its transcript and courses.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument {
    pub student: StudentInfo,
    pub summary: ReportSummary,
    pub credits: CreditTotals,
    pub requirements: RequirementTables,
    pub courses: Vec<CourseDetail>,
    pub risk_factors: Vec<String>,
    pub missing_requirements: Vec<MissingRequirement>,
    pub recommended_actions: Vec<String>,
    pub metadata: ReportMetadata,
}

fn course_detail(course: &StudentCourse) -> CourseDetail {
    let derivation = course.derivation.as_ref();
    CourseDetail {
        year: course.year,
        term: course.term.clone(),
        subject: course.subject.clone(),
        level: course.level.clone(),
        local_grade: course.local_grade.clone(),
        completed: course.completed,
        ncaa_category: course.category(),
        us_equivalent: derivation.and_then(|d| d.us_equivalent.clone()),
        is_lab_science: derivation.is_some_and(|d| d.is_lab_science),
        is_algebra_or_higher: derivation.is_some_and(|d| d.is_algebra_or_higher),
        credit_hours_awarded: derivation.map(|d| d.credit_hours_awarded),
        normalized_grade: course.normalized_grade(),
        requires_review: course.requires_review(),
        review_reasons: derivation
            .map(|d| d.review_reasons.clone())
            .unwrap_or_default(),
    }
}

pub fn build_report(
    transcript: &Transcript,
    courses: &[StudentCourse],
    evaluation: &Evaluation,
    generated_at: DateTime<Utc>,
) -> ReportDocument {
    ReportDocument {
        student: StudentInfo {
            student_id: transcript.student_id,
            transcript_id: transcript.id,
            country_id: transcript.country_id.clone(),
            system_id: transcript.system_id.clone(),
            school_name: transcript.school_name.clone(),
            school_city: transcript.school_city.clone(),
            language: transcript.language.clone(),
            status: transcript.status,
        },
        summary: ReportSummary {
            core_gpa: evaluation.core_gpa,
            overall_gpa: evaluation.overall_gpa,
            division_i_eligible: evaluation.division_i_eligible,
            division_ii_eligible: evaluation.division_ii_eligible,
            total_courses: courses.len(),
            core_courses: courses
                .iter()
                .filter(|course| course.completed && course.category().is_some())
                .count(),
            courses_requiring_review: courses
                .iter()
                .filter(|course| course.completed && course.requires_review())
                .count(),
            foreign_language_courses: evaluation.foreign_language_courses,
        },
        credits: evaluation.credits,
        requirements: RequirementTables {
            division_i: DIVISION_I,
            division_ii: DIVISION_II,
        },
        courses: courses.iter().map(course_detail).collect(),
        risk_factors: evaluation.risk_factors.clone(),
        missing_requirements: evaluation.missing_requirements.clone(),
        recommended_actions: evaluation.recommended_actions.clone(),
        metadata: ReportMetadata {
            evaluation_id: evaluation.id,
            evaluated_at: evaluation.created_at,
            evaluator_version: evaluation.evaluator_version.clone(),
            generated_at,
        },
    }
}

fn gpa(value: Option<f64>) -> String {
    value
        .map(|gpa| format!("{gpa:.2}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn verdict(eligible: bool) -> &'static str {
    if eligible {
        "meets requirements"
    } else {
        "does not meet requirements"
    }
}

pub fn render_markdown(report: &ReportDocument) -> String {
    let mut output = String::new();
    let school = report
        .student
        .school_name
        .as_deref()
        .unwrap_or("unknown school");

    let _ = writeln!(output, "# NCAA Transcript Evaluation");
    let _ = writeln!(
        output,
        "Student {} at {} ({}, {} system)",
        report.student.student_id, school, report.student.country_id, report.student.system_id
    );
    let _ = writeln!(
        output,
        "Generated {} from evaluation {} (evaluator {})",
        report.metadata.generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.metadata.evaluation_id,
        report.metadata.evaluator_version
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Core GPA: {}", gpa(report.summary.core_gpa));
    let _ = writeln!(output, "- Overall GPA: {}", gpa(report.summary.overall_gpa));
    let _ = writeln!(
        output,
        "- Division I: {}",
        verdict(report.summary.division_i_eligible)
    );
    let _ = writeln!(
        output,
        "- Division II: {}",
        verdict(report.summary.division_ii_eligible)
    );
    let _ = writeln!(
        output,
        "- Courses: {} total; of the completed ones {} core, {} needing review",
        report.summary.total_courses,
        report.summary.core_courses,
        report.summary.courses_requiring_review
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Credit Breakdown");
    let _ = writeln!(output, "| Requirement | Earned | Division I | Division II |");
    let _ = writeln!(output, "|---|---|---|---|");
    let di_rows = report.requirements.division_i.credit_rows();
    let dii_rows = report.requirements.division_ii.credit_rows();
    for (di, dii) in di_rows.iter().zip(dii_rows.iter()) {
        let _ = writeln!(
            output,
            "| {} | {:.2} | {:.1} | {:.1} |",
            di.kind.label(),
            (di.earned)(&report.credits),
            di.required,
            dii.required
        );
    }
    let _ = writeln!(
        output,
        "| Foreign Language | {:.2} ({} courses) | - | - |",
        report.credits.foreign_language, report.summary.foreign_language_courses
    );
    let _ = writeln!(output);

    let _ = writeln!(output, "## Courses");
    if report.courses.is_empty() {
        let _ = writeln!(output, "No courses on this transcript.");
    } else {
        for course in &report.courses {
            let category = course
                .ncaa_category
                .map(NcaaCategory::label)
                .unwrap_or("uncategorized");
            let credits = course
                .credit_hours_awarded
                .map(|c| format!("{c:.2}"))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                output,
                "- {} {}{}: grade {} ({}), {}, {} credits{}",
                course.year,
                course.subject,
                course
                    .level
                    .as_deref()
                    .map(|level| format!(" ({level})"))
                    .unwrap_or_default(),
                course.local_grade,
                gpa(course.normalized_grade),
                category,
                credits,
                if course.requires_review {
                    " [review]"
                } else {
                    ""
                }
            );
        }
    }

    section(&mut output, "Missing Requirements", &report.missing_requirements);
    section(&mut output, "Risk Factors", &report.risk_factors);
    section(&mut output, "Recommended Actions", &report.recommended_actions);

    output
}

fn section<T: std::fmt::Display>(output: &mut String, title: &str, items: &[T]) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {title}");
    if items.is_empty() {
        let _ = writeln!(output, "None.");
    } else {
        for item in items {
            let _ = writeln!(output, "- {item}");
        }
    }
}

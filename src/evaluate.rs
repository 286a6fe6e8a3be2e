use crate::error::{EvaluatorError, EvaluatorResult};
use crate::models::{
    CreditTotals, Division, Evaluation, MissingRequirement, NcaaCategory, NewEvaluation,
    RequirementKind, StudentCourse, Transcript, TranscriptStatus,
};
use crate::requirements::{meets, DivisionRequirements, DIVISION_I, DIVISION_II};
use crate::store::TranscriptStore;

pub const EVALUATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core GPA under which a student is flagged even when the floors are met.
pub const BORDERLINE_CORE_GPA: f64 = 2.5;

pub fn sum_credits(courses: &[&StudentCourse]) -> (CreditTotals, i32) {
    let mut totals = CreditTotals::default();
    let mut foreign_language_courses = 0;

    for course in courses {
        let Some(derivation) = course.derivation.as_ref() else {
            continue;
        };
        let Some(category) = derivation.ncaa_category else {
            continue;
        };
        let credits = derivation.credit_hours_awarded;

        match category {
            NcaaCategory::English => totals.english += credits,
            NcaaCategory::Math => {
                if !derivation.is_algebra_or_higher {
                    continue;
                }
                totals.math_algebra_i_or_higher += credits;
            }
            NcaaCategory::Science => {
                totals.science += credits;
                if derivation.is_lab_science {
                    totals.science_lab += credits;
                }
            }
            NcaaCategory::SocialScience => totals.social_science += credits,
            NcaaCategory::ForeignLanguage => {
                totals.foreign_language += credits;
                foreign_language_courses += 1;
            }
            NcaaCategory::Additional => totals.additional += credits,
        }
        totals.total_core += credits;
    }

    (totals, foreign_language_courses)
}

/// Arithmetic mean of normalized grades; courses without one are skipped.
pub fn mean_grade<'a>(courses: impl IntoIterator<Item = &'a StudentCourse>) -> Option<f64> {
    let (sum, count) = courses
        .into_iter()
        .filter_map(StudentCourse::normalized_grade)
        .fold((0.0, 0usize), |(sum, count), grade| (sum + grade, count + 1));

    (count > 0).then(|| sum / count as f64)
}

pub fn core_gpa(courses: &[&StudentCourse]) -> Option<f64> {
    mean_grade(
        courses
            .iter()
            .copied()
            .filter(|course| course.category().is_some()),
    )
}

pub fn overall_gpa(courses: &[&StudentCourse]) -> Option<f64> {
    mean_grade(courses.iter().copied())
}

pub fn missing_requirements(
    requirements: &DivisionRequirements,
    credits: &CreditTotals,
    core_gpa: Option<f64>,
) -> Vec<MissingRequirement> {
    let mut missing: Vec<MissingRequirement> = requirements
        .credit_rows()
        .into_iter()
        .filter_map(|row| {
            let earned = (row.earned)(credits);
            (!meets(earned, row.required)).then_some(MissingRequirement {
                division: requirements.division,
                requirement: row.kind,
                required: row.required,
                earned,
            })
        })
        .collect();

    if !requirements.gpa_met(core_gpa) {
        missing.push(MissingRequirement {
            division: requirements.division,
            requirement: RequirementKind::CoreGpa,
            required: requirements.min_core_gpa,
            earned: core_gpa.unwrap_or(0.0),
        });
    }

    missing
}

/// Inputs the heuristics look at besides the credit totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct CourseCounts {
    pub core: usize,
    /// Courses needing review whose grade did normalize.
    pub flagged: usize,
    pub unmapped_grades: usize,
    pub incomplete: usize,
}

pub fn risk_factors(
    credits: &CreditTotals,
    core_gpa: Option<f64>,
    foreign_language_courses: i32,
    counts: CourseCounts,
) -> Vec<String> {
    let mut risks = Vec::new();

    if counts.core == 0 {
        risks.push("No NCAA core courses identified on the transcript".to_string());
    }

    match core_gpa {
        Some(gpa) if gpa < DIVISION_II.min_core_gpa => risks.push(format!(
            "Core GPA {gpa:.2} is below the Division II minimum of {:.2}",
            DIVISION_II.min_core_gpa
        )),
        Some(gpa) if gpa < DIVISION_I.min_core_gpa => risks.push(format!(
            "Core GPA {gpa:.2} is below the Division I minimum of {:.2}",
            DIVISION_I.min_core_gpa
        )),
        Some(gpa) if gpa < BORDERLINE_CORE_GPA => risks.push(format!(
            "Core GPA {gpa:.2} is borderline (under {BORDERLINE_CORE_GPA:.2})"
        )),
        Some(_) => {}
        None if counts.core > 0 => {
            risks.push("Core GPA could not be computed from the available grades".to_string())
        }
        None => {}
    }

    if credits.science_lab <= 0.0 {
        risks.push("No lab science credits".to_string());
    }
    if foreign_language_courses == 0 {
        risks.push("No foreign language coursework".to_string());
    }
    if counts.flagged > 0 {
        risks.push(format!(
            "{} course(s) require manual review",
            counts.flagged
        ));
    }
    if counts.unmapped_grades > 0 {
        risks.push(format!(
            "{} course grade(s) could not be normalized to the 4.0 scale",
            counts.unmapped_grades
        ));
    }
    if counts.incomplete > 0 {
        risks.push(format!(
            "{} course(s) not yet completed were excluded",
            counts.incomplete
        ));
    }

    risks
}

fn action_for(requirement: RequirementKind, shortfall: f64) -> String {
    match requirement {
        RequirementKind::English => format!(
            "Add {shortfall:.1} credit(s) of English composition or literature"
        ),
        RequirementKind::Math => format!(
            "Complete {shortfall:.1} more credit(s) of Algebra I or higher mathematics"
        ),
        RequirementKind::Science => format!(
            "Add {shortfall:.1} credit(s) of natural or physical science"
        ),
        RequirementKind::ScienceLab => format!(
            "Enroll in {shortfall:.1} credit(s) of lab-based science such as biology, chemistry or physics"
        ),
        RequirementKind::SocialScience => format!(
            "Add {shortfall:.1} credit(s) of social science such as history or government"
        ),
        RequirementKind::Additional => format!(
            "Add {shortfall:.1} credit(s) of additional academic courses such as philosophy or comparative religion"
        ),
        RequirementKind::TotalCore => format!(
            "Increase total core coursework by {shortfall:.1} credit(s)"
        ),
        RequirementKind::CoreGpa => format!(
            "Raise core-course grades to lift the core GPA by {shortfall:.2}"
        ),
    }
}

/// One action per unmet requirement, sized to the largest shortfall
/// across divisions, followed by the review actions.
pub fn recommended_actions(missing: &[MissingRequirement], counts: CourseCounts) -> Vec<String> {
    let mut largest: Vec<(RequirementKind, f64)> = Vec::new();
    for gap in missing {
        let shortfall = gap.required - gap.earned;
        match largest.iter_mut().find(|(kind, _)| *kind == gap.requirement) {
            Some((_, current)) => *current = current.max(shortfall),
            None => largest.push((gap.requirement, shortfall)),
        }
    }

    let mut actions: Vec<String> = largest
        .into_iter()
        .map(|(kind, shortfall)| action_for(kind, shortfall))
        .collect();

    if counts.flagged > 0 {
        actions.push("Resolve the courses flagged for manual review with an evaluator".to_string());
    }
    if counts.unmapped_grades > 0 {
        actions.push("Provide the school's grading key for grades that could not be normalized".to_string());
    }

    actions
}

/// Pure evaluation of a transcript's courses.
pub fn build_evaluation(transcript_id: uuid::Uuid, courses: &[StudentCourse]) -> NewEvaluation {
    let completed: Vec<&StudentCourse> = courses.iter().filter(|course| course.completed).collect();

    let (credits, foreign_language_courses) = sum_credits(&completed);
    let core_gpa = core_gpa(&completed);
    let overall_gpa = overall_gpa(&completed);

    let counts = CourseCounts {
        core: completed
            .iter()
            .filter(|course| course.category().is_some())
            .count(),
        // Unmapped grades are counted separately below.
        flagged: completed
            .iter()
            .filter(|course| course.requires_review() && course.normalized_grade().is_some())
            .count(),
        unmapped_grades: completed
            .iter()
            .filter(|course| course.normalized_grade().is_none())
            .count(),
        incomplete: courses.len() - completed.len(),
    };

    let mut missing = missing_requirements(&DIVISION_I, &credits, core_gpa);
    missing.extend(missing_requirements(&DIVISION_II, &credits, core_gpa));

    let division_i_eligible = !missing.iter().any(|m| m.division == Division::DivisionI);
    let division_ii_eligible = !missing.iter().any(|m| m.division == Division::DivisionII);

    NewEvaluation {
        transcript_id,
        core_gpa,
        overall_gpa,
        credits,
        foreign_language_courses,
        division_i_eligible,
        division_ii_eligible,
        risk_factors: risk_factors(&credits, core_gpa, foreign_language_courses, counts),
        recommended_actions: recommended_actions(&missing, counts),
        missing_requirements: missing,
        evaluator_version: EVALUATOR_VERSION.to_string(),
    }
}

/// Evaluate a transcript whose courses have been matched, appending a new evaluation.
pub async fn evaluate_eligibility(
    store: &dyn TranscriptStore,
    transcript: &Transcript,
) -> EvaluatorResult<Evaluation> {
    if !transcript.status.is_suggested() {
        return Err(EvaluatorError::InvalidStage {
            transcript_id: transcript.id,
            expected: "suggested",
            actual: transcript.status,
        });
    }

    let courses = store.list_courses(transcript.id).await?;
    let evaluation = store
        .insert_evaluation(build_evaluation(transcript.id, &courses))
        .await?;
    store
        .set_transcript_status(transcript.id, TranscriptStatus::Evaluated)
        .await?;

    tracing::info!(
        transcript_id = %transcript.id,
        evaluation_id = %evaluation.id,
        core_gpa = ?evaluation.core_gpa,
        division_i = evaluation.division_i_eligible,
        division_ii = evaluation.division_ii_eligible,
        gaps = evaluation.missing_requirements.len(),
        "evaluated eligibility"
    );

    Ok(evaluation)
}

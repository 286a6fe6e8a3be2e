use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing state of a transcript. Stages only run from the states they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStatus {
    Ingested,
    Suggested,
    Evaluated,
}

impl TranscriptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptStatus::Ingested => "ingested",
            TranscriptStatus::Suggested => "suggested",
            TranscriptStatus::Evaluated => "evaluated",
        }
    }

    /// Whether course suggestions exist for the transcript.
    pub fn is_suggested(self) -> bool {
        matches!(
            self,
            TranscriptStatus::Suggested | TranscriptStatus::Evaluated
        )
    }
}

impl fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranscriptStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ingested" => Ok(TranscriptStatus::Ingested),
            "suggested" => Ok(TranscriptStatus::Suggested),
            "evaluated" => Ok(TranscriptStatus::Evaluated),
            other => Err(format!("unknown transcript status '{other}'")),
        }
    }
}

/// NCAA subject bucket a course counts toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NcaaCategory {
    English,
    Math,
    Science,
    SocialScience,
    ForeignLanguage,
    Additional,
}

impl NcaaCategory {
    pub const ALL: [NcaaCategory; 6] = [
        NcaaCategory::English,
        NcaaCategory::Math,
        NcaaCategory::Science,
        NcaaCategory::SocialScience,
        NcaaCategory::ForeignLanguage,
        NcaaCategory::Additional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NcaaCategory::English => "english",
            NcaaCategory::Math => "math",
            NcaaCategory::Science => "science",
            NcaaCategory::SocialScience => "social_science",
            NcaaCategory::ForeignLanguage => "foreign_language",
            NcaaCategory::Additional => "additional",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NcaaCategory::English => "English",
            NcaaCategory::Math => "Mathematics (Algebra I or higher)",
            NcaaCategory::Science => "Natural/Physical Science",
            NcaaCategory::SocialScience => "Social Science",
            NcaaCategory::ForeignLanguage => "Foreign Language",
            NcaaCategory::Additional => "Additional Academic",
        }
    }
}

impl fmt::Display for NcaaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NcaaCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "english" => Ok(NcaaCategory::English),
            "math" | "mathematics" => Ok(NcaaCategory::Math),
            "science" => Ok(NcaaCategory::Science),
            "social_science" | "social science" => Ok(NcaaCategory::SocialScience),
            "foreign_language" | "foreign language" => Ok(NcaaCategory::ForeignLanguage),
            "additional" => Ok(NcaaCategory::Additional),
            other => Err(format!("unknown NCAA category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub id: Uuid,
    pub student_id: Uuid,
    pub country_id: String,
    pub system_id: String,
    pub school_name: Option<String>,
    pub school_city: Option<String>,
    pub language: String,
    pub status: TranscriptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a course receives from the suggest stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseDerivation {
    pub ncaa_category: Option<NcaaCategory>,
    pub us_equivalent: Option<String>,
    pub is_lab_science: bool,
    pub is_algebra_or_higher: bool,
    pub credit_hours_awarded: f64,
    pub normalized_grade: Option<f64>,
    pub requires_review: bool,
    pub review_reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentCourse {
    pub id: Uuid,
    pub transcript_id: Uuid,
    pub position: i32,
    pub year: i32,
    pub term: Option<String>,
    pub subject: String,
    pub level: Option<String>,
    pub local_grade: String,
    pub hours_per_week: Option<f64>,
    pub weeks_per_year: Option<f64>,
    pub completed: bool,
    /// Absent until suggestions have been computed.
    pub derivation: Option<CourseDerivation>,
}

impl StudentCourse {
    pub fn category(&self) -> Option<NcaaCategory> {
        self.derivation.as_ref().and_then(|d| d.ncaa_category)
    }

    pub fn normalized_grade(&self) -> Option<f64> {
        self.derivation.as_ref().and_then(|d| d.normalized_grade)
    }

    pub fn requires_review(&self) -> bool {
        self.derivation.as_ref().map_or(true, |d| d.requires_review)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
    pub year: i32,
    pub term: Option<String>,
    pub subject: String,
    pub level: Option<String>,
    pub local_grade: String,
    pub hours_per_week: Option<f64>,
    pub weeks_per_year: Option<f64>,
    #[serde(default = "default_completed")]
    pub completed: bool,
}

fn default_completed() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTranscript {
    pub student_id: Uuid,
    pub country_id: String,
    pub system_id: String,
    pub school_name: Option<String>,
    pub school_city: Option<String>,
    pub language: String,
    pub courses: Vec<NewCourse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseEquivalency {
    pub system_id: String,
    pub local_subject: String,
    pub local_level: Option<String>,
    pub ncaa_category: NcaaCategory,
    pub us_equivalent: String,
    pub is_lab_science: bool,
    pub is_algebra_or_higher: Option<bool>,
    pub default_credit_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeScaleEntry {
    pub system_id: String,
    pub local_grade: String,
    pub normalized_value: f64,
}

/// Reference tables for one education system.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub equivalencies: Vec<CourseEquivalency>,
    pub grade_scale: Vec<GradeScaleEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditTotals {
    pub english: f64,
    pub math_algebra_i_or_higher: f64,
    pub science: f64,
    pub science_lab: f64,
    pub social_science: f64,
    pub foreign_language: f64,
    pub additional: f64,
    pub total_core: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Division {
    #[serde(rename = "division_i")]
    DivisionI,
    #[serde(rename = "division_ii")]
    DivisionII,
}

impl Division {
    pub fn label(self) -> &'static str {
        match self {
            Division::DivisionI => "Division I",
            Division::DivisionII => "Division II",
        }
    }
}

/// Rows of a division's requirement table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    English,
    Math,
    Science,
    ScienceLab,
    SocialScience,
    Additional,
    TotalCore,
    CoreGpa,
}

impl RequirementKind {
    pub fn label(self) -> &'static str {
        match self {
            RequirementKind::English => "English",
            RequirementKind::Math => "Mathematics (Algebra I or higher)",
            RequirementKind::Science => "Natural/Physical Science",
            RequirementKind::ScienceLab => "Lab Science",
            RequirementKind::SocialScience => "Social Science",
            RequirementKind::Additional => "Additional Academic",
            RequirementKind::TotalCore => "Total Core Credits",
            RequirementKind::CoreGpa => "Core GPA",
        }
    }
}

/// One unmet row of a division's requirement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingRequirement {
    pub division: Division,
    pub requirement: RequirementKind,
    pub required: f64,
    pub earned: f64,
}

impl fmt::Display for MissingRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {:.2} of {:.2} required",
            self.division.label(),
            self.requirement.label(),
            self.earned,
            self.required
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub transcript_id: Uuid,
    pub core_gpa: Option<f64>,
    pub overall_gpa: Option<f64>,
    pub credits: CreditTotals,
    pub foreign_language_courses: i32,
    pub division_i_eligible: bool,
    pub division_ii_eligible: bool,
    pub risk_factors: Vec<String>,
    pub missing_requirements: Vec<MissingRequirement>,
    pub recommended_actions: Vec<String>,
    pub evaluator_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub transcript_id: Uuid,
    pub core_gpa: Option<f64>,
    pub overall_gpa: Option<f64>,
    pub credits: CreditTotals,
    pub foreign_language_courses: i32,
    pub division_i_eligible: bool,
    pub division_ii_eligible: bool,
    pub risk_factors: Vec<String>,
    pub missing_requirements: Vec<MissingRequirement>,
    pub recommended_actions: Vec<String>,
    pub evaluator_version: String,
    pub created_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn from_new(id: Uuid, created_at: DateTime<Utc>, new: NewEvaluation) -> Self {
        Self {
            id,
            transcript_id: new.transcript_id,
            core_gpa: new.core_gpa,
            overall_gpa: new.overall_gpa,
            credits: new.credits,
            foreign_language_courses: new.foreign_language_courses,
            division_i_eligible: new.division_i_eligible,
            division_ii_eligible: new.division_ii_eligible,
            risk_factors: new.risk_factors,
            missing_requirements: new.missing_requirements,
            recommended_actions: new.recommended_actions,
            evaluator_version: new.evaluator_version,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionSummary {
    pub transcript_id: Uuid,
    pub courses_processed: usize,
    pub courses_flagged: usize,
}

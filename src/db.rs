use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{EvaluatorError, EvaluatorResult};
use crate::models::{
    CourseDerivation, CourseEquivalency, CreditTotals, Evaluation, GradeScaleEntry,
    MissingRequirement, NcaaCategory, NewEvaluation, NewTranscript, ReferenceData, StudentCourse,
    Transcript, TranscriptStatus,
};
use crate::reference;
use crate::store::TranscriptStore;

const TRANSCRIPT_COLUMNS: &str = "\
    id, student_id, country_id, system_id, school_name, school_city, \
    language, status, created_at, updated_at";

const COURSE_COLUMNS: &str = "\
    id, transcript_id, position, year, term, subject, level, local_grade, \
    hours_per_week, weeks_per_year, completed, ncaa_category, us_equivalent, \
    is_lab_science, is_algebra_or_higher, credit_hours_awarded, normalized_grade, \
    requires_review, review_reasons, suggested_at";

const EVALUATION_COLUMNS: &str = "\
    id, transcript_id, core_gpa, overall_gpa, credits, foreign_language_courses, \
    division_i_eligible, division_ii_eligible, risk_factors, missing_requirements, \
    recommended_actions, evaluator_version, created_at";

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Upsert the reference tables for every seeded education system.
pub async fn seed(pool: &PgPool) -> anyhow::Result<(usize, usize)> {
    let mut equivalencies = 0usize;
    let mut grades = 0usize;

    for system_id in reference::SEEDED_SYSTEMS {
        let data = reference::seed_reference_data(system_id);

        for entry in &data.equivalencies {
            sqlx::query(
                r#"
                INSERT INTO transcript_evaluator.course_equivalencies
                (system_id, local_subject, local_level, ncaa_category, us_equivalent,
                 is_lab_science, is_algebra_or_higher, default_credit_hours)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (system_id, local_subject, local_level) DO UPDATE
                SET ncaa_category = EXCLUDED.ncaa_category,
                    us_equivalent = EXCLUDED.us_equivalent,
                    is_lab_science = EXCLUDED.is_lab_science,
                    is_algebra_or_higher = EXCLUDED.is_algebra_or_higher,
                    default_credit_hours = EXCLUDED.default_credit_hours
                "#,
            )
            .bind(&entry.system_id)
            .bind(&entry.local_subject)
            .bind(entry.local_level.as_deref().unwrap_or(""))
            .bind(entry.ncaa_category.as_str())
            .bind(&entry.us_equivalent)
            .bind(entry.is_lab_science)
            .bind(entry.is_algebra_or_higher)
            .bind(entry.default_credit_hours)
            .execute(pool)
            .await?;
            equivalencies += 1;
        }

        for entry in &data.grade_scale {
            sqlx::query(
                r#"
                INSERT INTO transcript_evaluator.grade_scales
                (system_id, local_grade, normalized_value)
                VALUES ($1, $2, $3)
                ON CONFLICT (system_id, local_grade) DO UPDATE
                SET normalized_value = EXCLUDED.normalized_value
                "#,
            )
            .bind(&entry.system_id)
            .bind(&entry.local_grade)
            .bind(entry.normalized_value)
            .execute(pool)
            .await?;
            grades += 1;
        }
    }

    Ok((equivalencies, grades))
}

/// Postgres-backed store over the `transcript_evaluator` schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_status(value: &str) -> EvaluatorResult<TranscriptStatus> {
    value
        .parse()
        .map_err(|err: String| EvaluatorError::Database(sqlx::Error::Decode(err.into())))
}

fn parse_category(value: &str) -> EvaluatorResult<NcaaCategory> {
    value
        .parse()
        .map_err(|err: String| EvaluatorError::Database(sqlx::Error::Decode(err.into())))
}

fn transcript_from_row(row: &PgRow) -> EvaluatorResult<Transcript> {
    let status: String = row.try_get("status")?;
    Ok(Transcript {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        country_id: row.try_get("country_id")?,
        system_id: row.try_get("system_id")?,
        school_name: row.try_get("school_name")?,
        school_city: row.try_get("school_city")?,
        language: row.try_get("language")?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn course_from_row(row: &PgRow) -> EvaluatorResult<StudentCourse> {
    let suggested_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("suggested_at")?;
    let derivation = match suggested_at {
        None => None,
        Some(_) => {
            let category: Option<String> = row.try_get("ncaa_category")?;
            let reasons: Option<Json<Vec<String>>> = row.try_get("review_reasons")?;
            Some(CourseDerivation {
                ncaa_category: category.as_deref().map(parse_category).transpose()?,
                us_equivalent: row.try_get("us_equivalent")?,
                is_lab_science: row
                    .try_get::<Option<bool>, _>("is_lab_science")?
                    .unwrap_or(false),
                is_algebra_or_higher: row
                    .try_get::<Option<bool>, _>("is_algebra_or_higher")?
                    .unwrap_or(false),
                credit_hours_awarded: row
                    .try_get::<Option<f64>, _>("credit_hours_awarded")?
                    .unwrap_or(0.0),
                normalized_grade: row.try_get("normalized_grade")?,
                requires_review: row
                    .try_get::<Option<bool>, _>("requires_review")?
                    .unwrap_or(true),
                review_reasons: reasons.map(|r| r.0).unwrap_or_default(),
            })
        }
    };

    Ok(StudentCourse {
        id: row.try_get("id")?,
        transcript_id: row.try_get("transcript_id")?,
        position: row.try_get("position")?,
        year: row.try_get("year")?,
        term: row.try_get("term")?,
        subject: row.try_get("subject")?,
        level: row.try_get("level")?,
        local_grade: row.try_get("local_grade")?,
        hours_per_week: row.try_get("hours_per_week")?,
        weeks_per_year: row.try_get("weeks_per_year")?,
        completed: row.try_get("completed")?,
        derivation,
    })
}

fn evaluation_from_row(row: &PgRow) -> EvaluatorResult<Evaluation> {
    let credits: Json<CreditTotals> = row.try_get("credits")?;
    let risk_factors: Json<Vec<String>> = row.try_get("risk_factors")?;
    let missing: Json<Vec<MissingRequirement>> = row.try_get("missing_requirements")?;
    let actions: Json<Vec<String>> = row.try_get("recommended_actions")?;
    Ok(Evaluation {
        id: row.try_get("id")?,
        transcript_id: row.try_get("transcript_id")?,
        core_gpa: row.try_get("core_gpa")?,
        overall_gpa: row.try_get("overall_gpa")?,
        credits: credits.0,
        foreign_language_courses: row.try_get("foreign_language_courses")?,
        division_i_eligible: row.try_get("division_i_eligible")?,
        division_ii_eligible: row.try_get("division_ii_eligible")?,
        risk_factors: risk_factors.0,
        missing_requirements: missing.0,
        recommended_actions: actions.0,
        evaluator_version: row.try_get("evaluator_version")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl TranscriptStore for PgStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn create_transcript(&self, input: &NewTranscript) -> EvaluatorResult<Transcript> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "INSERT INTO transcript_evaluator.transcripts \
                 (id, student_id, country_id, system_id, school_name, school_city, language, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {TRANSCRIPT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(input.student_id)
            .bind(&input.country_id)
            .bind(&input.system_id)
            .bind(&input.school_name)
            .bind(&input.school_city)
            .bind(&input.language)
            .bind(TranscriptStatus::Ingested.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let transcript = transcript_from_row(&row)?;

        for (position, course) in input.courses.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO transcript_evaluator.student_courses
                (id, transcript_id, position, year, term, subject, level, local_grade,
                 hours_per_week, weeks_per_year, completed)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(transcript.id)
            .bind(position as i32)
            .bind(course.year)
            .bind(&course.term)
            .bind(&course.subject)
            .bind(&course.level)
            .bind(&course.local_grade)
            .bind(course.hours_per_week)
            .bind(course.weeks_per_year)
            .bind(course.completed)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(transcript)
    }

    async fn find_transcript(&self, id: Uuid) -> EvaluatorResult<Option<Transcript>> {
        let query = format!(
            "SELECT {TRANSCRIPT_COLUMNS} FROM transcript_evaluator.transcripts WHERE id = $1"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(transcript_from_row).transpose()
    }

    async fn set_transcript_status(
        &self,
        id: Uuid,
        status: TranscriptStatus,
    ) -> EvaluatorResult<()> {
        let result = sqlx::query(
            "UPDATE transcript_evaluator.transcripts SET status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EvaluatorError::NotFound {
                entity: "transcript",
                id,
            });
        }
        Ok(())
    }

    async fn list_courses(&self, transcript_id: Uuid) -> EvaluatorResult<Vec<StudentCourse>> {
        let query = format!(
            "SELECT {COURSE_COLUMNS} FROM transcript_evaluator.student_courses \
             WHERE transcript_id = $1 ORDER BY position ASC"
        );
        let rows = sqlx::query(&query)
            .bind(transcript_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(course_from_row).collect()
    }

    async fn update_course_derivations(
        &self,
        updates: &[(Uuid, CourseDerivation)],
    ) -> EvaluatorResult<()> {
        let mut tx = self.pool.begin().await?;

        for (course_id, derivation) in updates {
            let result = sqlx::query(
                r#"
                UPDATE transcript_evaluator.student_courses
                SET ncaa_category = $2,
                    us_equivalent = $3,
                    is_lab_science = $4,
                    is_algebra_or_higher = $5,
                    credit_hours_awarded = $6,
                    normalized_grade = $7,
                    requires_review = $8,
                    review_reasons = $9,
                    suggested_at = now()
                WHERE id = $1
                "#,
            )
            .bind(course_id)
            .bind(derivation.ncaa_category.map(NcaaCategory::as_str))
            .bind(&derivation.us_equivalent)
            .bind(derivation.is_lab_science)
            .bind(derivation.is_algebra_or_higher)
            .bind(derivation.credit_hours_awarded)
            .bind(derivation.normalized_grade)
            .bind(derivation.requires_review)
            .bind(Json(&derivation.review_reasons))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(EvaluatorError::NotFound {
                    entity: "course",
                    id: *course_id,
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_reference_data(&self, system_id: &str) -> EvaluatorResult<ReferenceData> {
        let rows = sqlx::query(
            r#"
            SELECT system_id, local_subject, local_level, ncaa_category, us_equivalent,
                   is_lab_science, is_algebra_or_higher, default_credit_hours
            FROM transcript_evaluator.course_equivalencies
            WHERE system_id = $1
            ORDER BY local_subject, local_level
            "#,
        )
        .bind(system_id)
        .fetch_all(&self.pool)
        .await?;

        let mut equivalencies = Vec::with_capacity(rows.len());
        for row in rows {
            let level: String = row.try_get("local_level")?;
            let category: String = row.try_get("ncaa_category")?;
            equivalencies.push(CourseEquivalency {
                system_id: row.try_get("system_id")?,
                local_subject: row.try_get("local_subject")?,
                local_level: (!level.is_empty()).then_some(level),
                ncaa_category: parse_category(&category)?,
                us_equivalent: row.try_get("us_equivalent")?,
                is_lab_science: row.try_get("is_lab_science")?,
                is_algebra_or_higher: row.try_get("is_algebra_or_higher")?,
                default_credit_hours: row.try_get("default_credit_hours")?,
            });
        }

        let rows = sqlx::query(
            r#"
            SELECT system_id, local_grade, normalized_value
            FROM transcript_evaluator.grade_scales
            WHERE system_id = $1
            ORDER BY normalized_value DESC
            "#,
        )
        .bind(system_id)
        .fetch_all(&self.pool)
        .await?;

        let mut grade_scale = Vec::with_capacity(rows.len());
        for row in rows {
            grade_scale.push(GradeScaleEntry {
                system_id: row.try_get("system_id")?,
                local_grade: row.try_get("local_grade")?,
                normalized_value: row.try_get("normalized_value")?,
            });
        }

        Ok(ReferenceData {
            equivalencies,
            grade_scale,
        })
    }

    async fn insert_evaluation(&self, input: NewEvaluation) -> EvaluatorResult<Evaluation> {
        let query = format!(
            "INSERT INTO transcript_evaluator.evaluations \
                 (id, transcript_id, core_gpa, overall_gpa, credits, foreign_language_courses, \
                  division_i_eligible, division_ii_eligible, risk_factors, missing_requirements, \
                  recommended_actions, evaluator_version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {EVALUATION_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(input.transcript_id)
            .bind(input.core_gpa)
            .bind(input.overall_gpa)
            .bind(Json(&input.credits))
            .bind(input.foreign_language_courses)
            .bind(input.division_i_eligible)
            .bind(input.division_ii_eligible)
            .bind(Json(&input.risk_factors))
            .bind(Json(&input.missing_requirements))
            .bind(Json(&input.recommended_actions))
            .bind(&input.evaluator_version)
            .fetch_one(&self.pool)
            .await?;
        evaluation_from_row(&row)
    }

    async fn find_evaluation(&self, id: Uuid) -> EvaluatorResult<Option<Evaluation>> {
        let query = format!(
            "SELECT {EVALUATION_COLUMNS} FROM transcript_evaluator.evaluations WHERE id = $1"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(evaluation_from_row).transpose()
    }

    async fn list_evaluations(&self, transcript_id: Uuid) -> EvaluatorResult<Vec<Evaluation>> {
        let query = format!(
            "SELECT {EVALUATION_COLUMNS} FROM transcript_evaluator.evaluations \
             WHERE transcript_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(transcript_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(evaluation_from_row).collect()
    }
}

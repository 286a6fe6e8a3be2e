//! Seed reference tables for the education systems shipped with the tool.

use crate::models::{CourseEquivalency, GradeScaleEntry, NcaaCategory, ReferenceData};

pub const SEEDED_SYSTEMS: [&str; 4] = ["intl-letter", "uk-gcse", "de-gymnasium", "fr-lycee"];

pub fn seed_reference_data(system_id: &str) -> ReferenceData {
    match system_id {
        "intl-letter" => ReferenceData {
            equivalencies: letter_equivalencies(),
            grade_scale: grades(
                system_id,
                &[
                    ("A+", 4.0),
                    ("A", 4.0),
                    ("A-", 3.7),
                    ("B+", 3.3),
                    ("B", 3.0),
                    ("B-", 2.7),
                    ("C+", 2.3),
                    ("C", 2.0),
                    ("C-", 1.7),
                    ("D+", 1.3),
                    ("D", 1.0),
                    ("F", 0.0),
                ],
            ),
        },
        "uk-gcse" => ReferenceData {
            equivalencies: gcse_equivalencies(),
            grade_scale: grades(
                system_id,
                &[
                    ("9", 4.0),
                    ("8", 4.0),
                    ("7", 3.7),
                    ("6", 3.3),
                    ("5", 3.0),
                    ("4", 2.7),
                    ("3", 2.0),
                    ("2", 1.0),
                    ("1", 0.0),
                    ("U", 0.0),
                    ("A*", 4.0),
                    ("A", 4.0),
                    ("B", 3.3),
                    ("C", 2.7),
                    ("D", 2.0),
                    ("E", 1.0),
                ],
            ),
        },
        "de-gymnasium" => ReferenceData {
            equivalencies: gymnasium_equivalencies(),
            grade_scale: grades(
                system_id,
                &[
                    ("1", 4.0),
                    ("1-", 3.7),
                    ("2+", 3.3),
                    ("2", 3.0),
                    ("2-", 2.7),
                    ("3+", 2.3),
                    ("3", 2.0),
                    ("3-", 1.7),
                    ("4+", 1.3),
                    ("4", 1.0),
                    ("5", 0.0),
                    ("6", 0.0),
                ],
            ),
        },
        "fr-lycee" => ReferenceData {
            equivalencies: lycee_equivalencies(),
            grade_scale: (0..=20)
                .map(|score| GradeScaleEntry {
                    system_id: system_id.to_string(),
                    local_grade: score.to_string(),
                    normalized_value: lycee_points(score),
                })
                .collect(),
        },
        _ => ReferenceData::default(),
    }
}

fn lycee_points(score: u32) -> f64 {
    match score {
        16..=20 => 4.0,
        14..=15 => 3.5,
        12..=13 => 3.0,
        10..=11 => 2.5,
        8..=9 => 1.5,
        _ => 0.0,
    }
}

fn grades(system_id: &str, table: &[(&str, f64)]) -> Vec<GradeScaleEntry> {
    table
        .iter()
        .map(|(grade, value)| GradeScaleEntry {
            system_id: system_id.to_string(),
            local_grade: grade.to_string(),
            normalized_value: *value,
        })
        .collect()
}

struct Row {
    subject: &'static str,
    level: Option<&'static str>,
    category: NcaaCategory,
    us_equivalent: &'static str,
    lab: bool,
    algebra: Option<bool>,
    credits: f64,
}

fn row(
    subject: &'static str,
    level: Option<&'static str>,
    category: NcaaCategory,
    us_equivalent: &'static str,
    credits: f64,
) -> Row {
    Row {
        subject,
        level,
        category,
        us_equivalent,
        lab: false,
        algebra: None,
        credits,
    }
}

fn lab(mut r: Row) -> Row {
    r.lab = true;
    r
}

fn below_algebra(mut r: Row) -> Row {
    r.algebra = Some(false);
    r
}

fn build(system_id: &str, rows: Vec<Row>) -> Vec<CourseEquivalency> {
    rows.into_iter()
        .map(|r| CourseEquivalency {
            system_id: system_id.to_string(),
            local_subject: r.subject.to_string(),
            local_level: r.level.map(str::to_string),
            ncaa_category: r.category,
            us_equivalent: r.us_equivalent.to_string(),
            is_lab_science: r.lab,
            is_algebra_or_higher: r.algebra,
            default_credit_hours: r.credits,
        })
        .collect()
}

fn letter_equivalencies() -> Vec<CourseEquivalency> {
    use NcaaCategory::*;
    build(
        "intl-letter",
        vec![
            row("English", None, English, "English", 1.0),
            row("Literature", None, English, "English Literature", 1.0),
            row("Mathematics", Some("Algebra I"), Math, "Algebra I", 1.0),
            row("Mathematics", Some("Geometry"), Math, "Geometry", 1.0),
            row("Mathematics", Some("Algebra II"), Math, "Algebra II", 1.0),
            below_algebra(row("Mathematics", Some("Pre-Algebra"), Math, "Pre-Algebra", 1.0)),
            row("Mathematics", None, Math, "Mathematics", 1.0),
            lab(row("Biology", None, Science, "Biology", 1.0)),
            lab(row("Chemistry", None, Science, "Chemistry", 1.0)),
            lab(row("Physics", None, Science, "Physics", 1.0)),
            row("Earth Science", None, Science, "Earth Science", 1.0),
            row("History", None, SocialScience, "World History", 1.0),
            row("Geography", None, SocialScience, "World Geography", 1.0),
            row("Economics", None, SocialScience, "Economics", 0.5),
            row("Spanish", None, ForeignLanguage, "Spanish", 1.0),
            row("French", None, ForeignLanguage, "French", 1.0),
            row("Philosophy", None, Additional, "Philosophy", 0.5),
            row("Religion", None, Additional, "Comparative Religion", 0.5),
        ],
    )
}

fn gcse_equivalencies() -> Vec<CourseEquivalency> {
    use NcaaCategory::*;
    build(
        "uk-gcse",
        vec![
            row("English Language", None, English, "English", 1.0),
            row("English Literature", None, English, "English Literature", 1.0),
            row("Mathematics", Some("Foundation"), Math, "Algebra I", 1.0),
            row("Mathematics", Some("Higher"), Math, "Algebra II", 1.0),
            row("Further Mathematics", None, Math, "Precalculus", 1.0),
            lab(row("Combined Science", None, Science, "Integrated Science", 2.0)),
            lab(row("Biology", None, Science, "Biology", 1.0)),
            lab(row("Chemistry", None, Science, "Chemistry", 1.0)),
            lab(row("Physics", None, Science, "Physics", 1.0)),
            row("History", None, SocialScience, "World History", 1.0),
            row("Geography", None, SocialScience, "World Geography", 1.0),
            row("French", None, ForeignLanguage, "French", 1.0),
            row("Spanish", None, ForeignLanguage, "Spanish", 1.0),
            row("German", None, ForeignLanguage, "German", 1.0),
            row("Religious Studies", None, Additional, "Comparative Religion", 1.0),
        ],
    )
}

fn gymnasium_equivalencies() -> Vec<CourseEquivalency> {
    use NcaaCategory::*;
    build(
        "de-gymnasium",
        vec![
            row("Englisch", None, English, "English (ESL literature)", 1.0),
            row("Mathematik", None, Math, "Algebra/Geometry", 1.0),
            row("Mathematik", Some("Leistungskurs"), Math, "Precalculus", 1.0),
            lab(row("Biologie", None, Science, "Biology", 1.0)),
            lab(row("Chemie", None, Science, "Chemistry", 1.0)),
            lab(row("Physik", None, Science, "Physics", 1.0)),
            row("Geschichte", None, SocialScience, "World History", 1.0),
            row("Erdkunde", None, SocialScience, "World Geography", 1.0),
            row("Politik", None, SocialScience, "Government", 0.5),
            row("Französisch", None, ForeignLanguage, "French", 1.0),
            row("Latein", None, ForeignLanguage, "Latin", 1.0),
            row("Philosophie", None, Additional, "Philosophy", 1.0),
            row("Religion", None, Additional, "Comparative Religion", 1.0),
        ],
    )
}

fn lycee_equivalencies() -> Vec<CourseEquivalency> {
    use NcaaCategory::*;
    build(
        "fr-lycee",
        vec![
            row("Anglais", None, English, "English (ESL literature)", 1.0),
            row("Mathématiques", None, Math, "Algebra II", 1.0),
            lab(row("Physique-Chimie", None, Science, "Physical Science", 1.0)),
            lab(row("SVT", None, Science, "Biology", 1.0)),
            row("Histoire-Géographie", None, SocialScience, "World History", 1.0),
            row("SES", None, SocialScience, "Economics", 1.0),
            row("Espagnol", None, ForeignLanguage, "Spanish", 1.0),
            row("Allemand", None, ForeignLanguage, "German", 1.0),
            row("Philosophie", None, Additional, "Philosophy", 1.0),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_seeded_system_has_tables() {
        for system in SEEDED_SYSTEMS {
            let data = seed_reference_data(system);
            assert!(!data.equivalencies.is_empty(), "{system} equivalencies");
            assert!(!data.grade_scale.is_empty(), "{system} grade scale");
            assert!(data
                .grade_scale
                .iter()
                .all(|g| (0.0..=4.0).contains(&g.normalized_value)));
        }
    }

    #[test]
    fn unknown_system_is_empty() {
        let data = seed_reference_data("xx-unknown");
        assert!(data.equivalencies.is_empty());
        assert!(data.grade_scale.is_empty());
    }
}

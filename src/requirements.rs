use serde::Serialize;

use crate::models::{CreditTotals, Division, RequirementKind};

/// Static initial-eligibility table for one NCAA division.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DivisionRequirements {
    pub division: Division,
    pub english: f64,
    pub math: f64,
    pub science: f64,
    pub science_lab: f64,
    pub social_science: f64,
    pub additional: f64,
    pub total_core: f64,
    pub min_core_gpa: f64,
}

pub const DIVISION_I: DivisionRequirements = DivisionRequirements {
    division: Division::DivisionI,
    english: 4.0,
    math: 3.0,
    science: 2.0,
    science_lab: 2.0,
    social_science: 2.0,
    additional: 4.0,
    total_core: 16.0,
    min_core_gpa: 2.3,
};

pub const DIVISION_II: DivisionRequirements = DivisionRequirements {
    division: Division::DivisionII,
    english: 3.0,
    math: 2.0,
    science: 2.0,
    science_lab: 2.0,
    social_science: 2.0,
    additional: 4.0,
    total_core: 16.0,
    min_core_gpa: 2.2,
};

/// A single credit row: what it measures, required credits, and where to read the earned value.
pub struct CreditRow {
    pub kind: RequirementKind,
    pub required: f64,
    pub earned: fn(&CreditTotals) -> f64,
}

impl DivisionRequirements {
    pub fn for_division(division: Division) -> &'static DivisionRequirements {
        match division {
            Division::DivisionI => &DIVISION_I,
            Division::DivisionII => &DIVISION_II,
        }
    }

    /// Credit rows in display order.
    pub fn credit_rows(&self) -> [CreditRow; 7] {
        [
            CreditRow {
                kind: RequirementKind::English,
                required: self.english,
                earned: |c| c.english,
            },
            CreditRow {
                kind: RequirementKind::Math,
                required: self.math,
                earned: |c| c.math_algebra_i_or_higher,
            },
            CreditRow {
                kind: RequirementKind::Science,
                required: self.science,
                earned: |c| c.science,
            },
            CreditRow {
                kind: RequirementKind::ScienceLab,
                required: self.science_lab,
                earned: |c| c.science_lab,
            },
            CreditRow {
                kind: RequirementKind::SocialScience,
                required: self.social_science,
                earned: |c| c.social_science,
            },
            CreditRow {
                kind: RequirementKind::Additional,
                required: self.additional,
                earned: |c| c.additional,
            },
            CreditRow {
                kind: RequirementKind::TotalCore,
                required: self.total_core,
                earned: |c| c.total_core,
            },
        ]
    }

    pub fn credits_met(&self, credits: &CreditTotals) -> bool {
        self.credit_rows()
            .iter()
            .all(|row| meets((row.earned)(credits), row.required))
    }

    pub fn gpa_met(&self, core_gpa: Option<f64>) -> bool {
        core_gpa.is_some_and(|gpa| meets(gpa, self.min_core_gpa))
    }

    pub fn is_met(&self, credits: &CreditTotals, core_gpa: Option<f64>) -> bool {
        self.credits_met(credits) && self.gpa_met(core_gpa)
    }
}

/// Float comparison tolerant of accumulated rounding in credit sums.
pub fn meets(earned: f64, required: f64) -> bool {
    earned + 1e-9 >= required
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_credits() -> CreditTotals {
        CreditTotals {
            english: 4.0,
            math_algebra_i_or_higher: 3.0,
            science: 2.0,
            science_lab: 2.0,
            social_science: 2.0,
            foreign_language: 1.0,
            additional: 4.0,
            total_core: 16.0,
        }
    }

    #[test]
    fn division_one_requires_gpa_floor() {
        let credits = full_credits();
        assert!(DIVISION_I.is_met(&credits, Some(2.3)));
        assert!(!DIVISION_I.is_met(&credits, Some(2.29)));
        assert!(!DIVISION_I.is_met(&credits, None));
    }

    #[test]
    fn division_two_is_looser_on_english_and_math() {
        let mut credits = full_credits();
        credits.english = 3.0;
        credits.math_algebra_i_or_higher = 2.0;
        assert!(!DIVISION_I.credits_met(&credits));
        assert!(DIVISION_II.credits_met(&credits));
    }

    #[test]
    fn sums_with_rounding_noise_still_meet() {
        assert!(meets(0.1 + 0.2 + 0.7, 1.0));
        assert!(!meets(0.99, 1.0));
    }
}

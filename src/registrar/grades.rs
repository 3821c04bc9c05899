//! Letter grades and credit-weighted GPA.

use std::fmt;
use std::str::FromStr;

use crate::registrar::errors::RegistrarError;

/// A letter grade on the 4.0 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grade {
    APlus,
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    DPlus,
    D,
    F,
}

impl Grade {
    pub fn points(self) -> f64 {
        match self {
            Grade::APlus | Grade::A => 4.0,
            Grade::AMinus => 3.7,
            Grade::BPlus => 3.3,
            Grade::B => 3.0,
            Grade::BMinus => 2.7,
            Grade::CPlus => 2.3,
            Grade::C => 2.0,
            Grade::CMinus => 1.7,
            Grade::DPlus => 1.3,
            Grade::D => 1.0,
            Grade::F => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::DPlus => "D+",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let grade = match s.trim().to_ascii_uppercase().as_str() {
            "A+" => Grade::APlus,
            "A" => Grade::A,
            "A-" => Grade::AMinus,
            "B+" => Grade::BPlus,
            "B" => Grade::B,
            "B-" => Grade::BMinus,
            "C+" => Grade::CPlus,
            "C" => Grade::C,
            "C-" => Grade::CMinus,
            "D+" => Grade::DPlus,
            "D" => Grade::D,
            "F" => Grade::F,
            _ => return Err(RegistrarError::InvalidGrade(s.to_owned())),
        };
        Ok(grade)
    }
}

/// Credit-weighted GPA over `(grade, credits)` pairs, rounded to two decimals.
///
/// Returns `None` when there are no graded credits. Pairs with non-positive
/// credits are ignored.
pub fn compute_gpa<I>(graded: I) -> Option<f64>
where
    I: IntoIterator<Item = (Grade, i32)>,
{
    let (points, credits) = graded
        .into_iter()
        .filter(|(_, credits)| *credits > 0)
        .fold((0.0, 0i64), |(points, credits), (grade, c)| {
            (points + grade.points() * f64::from(c), credits + i64::from(c))
        });

    if credits == 0 {
        return None;
    }
    let gpa = points / credits as f64;
    Some((gpa * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("a-".parse::<Grade>().unwrap(), Grade::AMinus);
        assert_eq!(" b+ ".parse::<Grade>().unwrap(), Grade::BPlus);
        assert_eq!("F".parse::<Grade>().unwrap(), Grade::F);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(
            "E".parse::<Grade>(),
            Err(RegistrarError::InvalidGrade("E".to_owned()))
        );
        assert!("F+".parse::<Grade>().is_err());
        assert!("".parse::<Grade>().is_err());
    }

    #[test]
    fn test_display_roundtrips_canonical_form() {
        for g in ["A+", "A", "A-", "B+", "B", "B-", "C+", "C", "C-", "D+", "D", "F"] {
            assert_eq!(g.parse::<Grade>().unwrap().to_string(), g);
        }
    }

    #[test]
    fn test_gpa_weighted_by_credits() {
        // (4.0 * 4 + 2.0 * 1) / 5 = 3.6
        let gpa = compute_gpa([(Grade::A, 4), (Grade::C, 1)]);
        assert_eq!(gpa, Some(3.6));
    }

    #[test]
    fn test_gpa_rounds_to_two_decimals() {
        // (3.7 * 3 + 3.3 * 3 + 3.0 * 4) / 10 = 3.3
        assert_eq!(
            compute_gpa([(Grade::AMinus, 3), (Grade::BPlus, 3), (Grade::B, 4)]),
            Some(3.3)
        );
        // (4.0 + 3.7 + 3.7) / 3 = 3.8
        assert_eq!(
            compute_gpa([(Grade::A, 1), (Grade::AMinus, 1), (Grade::AMinus, 1)]),
            Some(3.8)
        );
    }

    #[test]
    fn test_gpa_empty() {
        assert_eq!(compute_gpa(Vec::new()), None);
        assert_eq!(compute_gpa([(Grade::A, 0)]), None);
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TrackerError};

pub const FEATURE_NAMES: [&str; 5] = [
    "attendance",
    "marks",
    "assignments",
    "study_hours",
    "extracurriculars",
];

/// Inclusive upper bound of each feature, in `FEATURE_NAMES` order. Every lower bound is 0.
pub const FEATURE_MAX: [f64; 5] = [100.0, 100.0, 100.0, 80.0, 10.0];

/// The five measured performance inputs of one student.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    /// Class attendance, percent (0-100)
    pub attendance: f64,
    /// Average marks, percent (0-100)
    pub marks: f64,
    /// Assignment completion score, percent (0-100)
    pub assignments: f64,
    /// Study hours per week (0-80)
    pub study_hours: f64,
    /// Extracurricular count/intensity (0-10)
    pub extracurriculars: f64,
}

impl FeatureVector {
    pub fn new(
        attendance: f64,
        marks: f64,
        assignments: f64,
        study_hours: f64,
        extracurriculars: f64,
    ) -> Self {
        Self {
            attendance,
            marks,
            assignments,
            study_hours,
            extracurriculars,
        }
    }

    /// Values in model column order.
    pub fn to_array(&self) -> [f64; 5] {
        [
            self.attendance,
            self.marks,
            self.assignments,
            self.study_hours,
            self.extracurriculars,
        ]
    }

    /// Fails on NaN or infinite values.
    pub fn ensure_numeric(&self) -> Result<()> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.to_array()) {
            if !value.is_finite() {
                return Err(TrackerError::invalid(format!(
                    "feature `{}` is not a number",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Range check against the documented domain of each field.
    pub fn validate(&self) -> Result<()> {
        self.ensure_numeric()?;
        for ((name, value), max) in FEATURE_NAMES.iter().zip(self.to_array()).zip(FEATURE_MAX) {
            if !(0.0..=max).contains(&value) {
                return Err(TrackerError::invalid(format!(
                    "feature `{}` must be between 0 and {}, got {}",
                    name, max, value
                )));
            }
        }
        Ok(())
    }

    pub fn clamped(&self) -> Self {
        let [a, m, s, h, e] = self.to_array();
        Self {
            attendance: a.clamp(0.0, FEATURE_MAX[0]),
            marks: m.clamp(0.0, FEATURE_MAX[1]),
            assignments: s.clamp(0.0, FEATURE_MAX[2]),
            study_hours: h.clamp(0.0, FEATURE_MAX[3]),
            extracurriculars: e.clamp(0.0, FEATURE_MAX[4]),
        }
    }
}

/// Features as they arrive from a request body, before any field is known to be present.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct FeatureInput {
    pub attendance: Option<f64>,
    pub marks: Option<f64>,
    pub assignments: Option<f64>,
    pub study_hours: Option<f64>,
    pub extracurriculars: Option<f64>,
}

impl TryFrom<FeatureInput> for FeatureVector {
    type Error = TrackerError;

    fn try_from(input: FeatureInput) -> Result<Self> {
        let values = [
            input.attendance,
            input.marks,
            input.assignments,
            input.study_hours,
            input.extracurriculars,
        ];
        let mut out = [0.0; 5];
        for (i, value) in values.into_iter().enumerate() {
            out[i] = value.ok_or_else(|| {
                TrackerError::invalid(format!("missing required feature `{}`", FEATURE_NAMES[i]))
            })?;
        }
        let features = FeatureVector::new(out[0], out[1], out[2], out[3], out[4]);
        features.ensure_numeric()?;
        Ok(features)
    }
}

impl From<FeatureVector> for FeatureInput {
    fn from(f: FeatureVector) -> Self {
        Self {
            attendance: Some(f.attendance),
            marks: Some(f.marks),
            assignments: Some(f.assignments),
            study_hours: Some(f.study_hours),
            extracurriculars: Some(f.extracurriculars),
        }
    }
}

/// Letter grade, best first. The discriminant is the class index used by the model.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GradeLabel {
    A = 0,
    B = 1,
    C = 2,
    D = 3,
}

impl GradeLabel {
    pub const ALL: [GradeLabel; 4] = [GradeLabel::A, GradeLabel::B, GradeLabel::C, GradeLabel::D];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GradeLabel::A => "A",
            GradeLabel::B => "B",
            GradeLabel::C => "C",
            GradeLabel::D => "D",
        }
    }
}

impl fmt::Display for GradeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradeLabel {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "A" => Ok(GradeLabel::A),
            "B" => Ok(GradeLabel::B),
            "C" => Ok(GradeLabel::C),
            "D" => Ok(GradeLabel::D),
            other => Err(TrackerError::invalid(format!("unknown grade `{}`", other))),
        }
    }
}

/// Per-grade probability, indexed by `GradeLabel::index`.
///
/// Serialized as a JSON object keyed by grade; grades absent on input read as 0.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(from = "BTreeMap<GradeLabel, f64>", into = "BTreeMap<GradeLabel, f64>")]
pub struct ProbabilityMap([f64; 4]);

impl ProbabilityMap {
    pub fn from_array(probs: [f64; 4]) -> Self {
        Self(probs)
    }

    /// All mass on one grade, for records whose label is known but whose live prediction is not.
    pub fn one_hot(label: GradeLabel) -> Self {
        let mut probs = [0.0; 4];
        probs[label.index()] = 1.0;
        Self(probs)
    }

    pub fn get(&self, label: GradeLabel) -> f64 {
        self.0[label.index()]
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GradeLabel, f64)> + '_ {
        GradeLabel::ALL.iter().map(move |&g| (g, self.get(g)))
    }

    /// Every value finite and within [0, 1], summing to 1 within `1e-6`.
    pub fn validate(&self) -> Result<()> {
        for (label, p) in self.iter() {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(TrackerError::invalid(format!(
                    "probability for grade {} must be between 0 and 1, got {}",
                    label, p
                )));
            }
        }
        if (self.sum() - 1.0).abs() > 1e-6 {
            return Err(TrackerError::invalid(format!(
                "probabilities must sum to 1, got {}",
                self.sum()
            )));
        }
        Ok(())
    }

    /// Most probable grade. Ties go to the smallest class index.
    pub fn argmax(&self) -> GradeLabel {
        let mut best = GradeLabel::A;
        for label in GradeLabel::ALL {
            if self.get(label) > self.get(best) {
                best = label;
            }
        }
        best
    }
}

impl From<BTreeMap<GradeLabel, f64>> for ProbabilityMap {
    fn from(map: BTreeMap<GradeLabel, f64>) -> Self {
        let mut probs = [0.0; 4];
        for (label, p) in map {
            probs[label.index()] = p;
        }
        Self(probs)
    }
}

impl From<ProbabilityMap> for BTreeMap<GradeLabel, f64> {
    fn from(map: ProbabilityMap) -> Self {
        map.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_feature_is_invalid_input() {
        let input = FeatureInput {
            attendance: Some(80.0),
            marks: Some(70.0),
            assignments: None,
            study_hours: Some(10.0),
            extracurriculars: Some(2.0),
        };
        let err = FeatureVector::try_from(input).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidInput(ref m) if m.contains("assignments")));
    }

    #[test]
    fn test_non_numeric_feature_is_invalid_input() {
        let input = FeatureInput {
            marks: Some(f64::NAN),
            ..FeatureInput::from(FeatureVector::new(1.0, 1.0, 1.0, 1.0, 1.0))
        };
        assert!(FeatureVector::try_from(input).is_err());
    }

    #[test]
    fn test_validate_bounds() {
        assert!(FeatureVector::new(100.0, 0.0, 50.0, 80.0, 10.0).validate().is_ok());
        assert!(FeatureVector::new(101.0, 0.0, 50.0, 10.0, 1.0).validate().is_err());
        assert!(FeatureVector::new(90.0, 90.0, 90.0, 81.0, 1.0).validate().is_err());
        assert!(FeatureVector::new(90.0, -1.0, 90.0, 8.0, 1.0).validate().is_err());
    }

    #[test]
    fn test_clamped() {
        let f = FeatureVector::new(120.0, -5.0, 50.0, 100.0, 11.0).clamped();
        assert_eq!(f, FeatureVector::new(100.0, 0.0, 50.0, 80.0, 10.0));
    }

    #[test]
    fn test_argmax_tie_prefers_lower_index() {
        let probs = ProbabilityMap::from_array([0.1, 0.4, 0.4, 0.1]);
        assert_eq!(probs.argmax(), GradeLabel::B);

        let uniform = ProbabilityMap::from_array([0.25; 4]);
        assert_eq!(uniform.argmax(), GradeLabel::A);
    }

    #[test]
    fn test_probability_map_json_shape() {
        let probs = ProbabilityMap::from_array([0.1, 0.2, 0.3, 0.4]);
        let json = serde_json::to_value(probs).unwrap();
        assert_eq!(json["D"], 0.4);

        let partial: ProbabilityMap = serde_json::from_str(r#"{"C": 0.5, "D": 0.5}"#).unwrap();
        assert_eq!(partial.get(GradeLabel::A), 0.0);
        assert_eq!(partial.get(GradeLabel::D), 0.5);
    }

    #[test]
    fn test_probability_map_validation() {
        assert!(ProbabilityMap::from_array([0.1, 0.1, 0.3, 0.5]).validate().is_ok());
        assert!(ProbabilityMap::one_hot(GradeLabel::C).validate().is_ok());

        let negative = ProbabilityMap::from_array([7.0, 0.0, 0.0, -10.0]);
        assert!(matches!(negative.validate(), Err(TrackerError::InvalidInput(_))));

        assert!(ProbabilityMap::from_array([0.2, 0.2, 0.2, 0.2]).validate().is_err());
        assert!(ProbabilityMap::from_array([f64::NAN, 0.0, 0.0, 1.0]).validate().is_err());
    }

    #[test]
    fn test_grade_parse() {
        assert_eq!("C".parse::<GradeLabel>().unwrap(), GradeLabel::C);
        assert!("E".parse::<GradeLabel>().is_err());
        assert_eq!(GradeLabel::from_index(3), Some(GradeLabel::D));
        assert_eq!(GradeLabel::from_index(4), None);
    }
}

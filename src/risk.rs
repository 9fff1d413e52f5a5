use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::{FeatureVector, GradeLabel, ProbabilityMap};

pub const HIGH_THRESHOLD: f64 = 0.70;
pub const MEDIUM_THRESHOLD: f64 = 0.40;

/// Slack on level thresholds so an accumulated sum like 0.25 + 0.10 + 0.05 still reads as 0.40.
const LEVEL_EPSILON: f64 = 1e-9;

pub const MAINTAIN_HABITS: &str = "Maintain current habits and review weekly to keep risk low.";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_THRESHOLD - LEVEL_EPSILON {
            RiskLevel::High
        } else if score >= MEDIUM_THRESHOLD - LEVEL_EPSILON {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Class-level mitigation advice for students at this level.
    pub fn guidance(self) -> &'static str {
        match self {
            RiskLevel::High => {
                "Prioritize attendance contracts, daily study blocks, and early assignment drafts with feedback."
            }
            RiskLevel::Medium => {
                "Weekly progress reviews, targeted tutoring on weak topics, and a 12-15 hrs/week study plan."
            }
            RiskLevel::Low => {
                "Maintain habits; set monthly goals and peer study groups to keep momentum."
            }
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RiskAssessment {
    /// Clamped to [0, 1]
    pub score: f64,
    pub level: RiskLevel,
    /// Never empty
    pub tips: Vec<String>,
}

/// Combines grade probabilities (if any) with threshold penalties into a bounded risk score.
///
/// With a probability map, P(D) counts in full and P(C) at half weight. Pass
/// `ProbabilityMap::one_hot(grade)` to rescore a stored record whose live prediction is gone.
pub fn compute_risk(f: &FeatureVector, probs: Option<&ProbabilityMap>) -> RiskAssessment {
    let mut score: f64 = 0.0;
    let mut tips = Vec::new();

    if let Some(p) = probs {
        score += p.get(GradeLabel::D) * 1.0;
        score += p.get(GradeLabel::C) * 0.5;
    }

    if f.attendance < 75.0 {
        score += 0.20;
        tips.push(
            "Raise attendance toward 85%+ with a weekly attendance plan and accountability partner."
                .to_string(),
        );
    }

    if f.marks < 60.0 {
        score += 0.25;
        tips.push(
            "Schedule 2 focused study blocks/day and target weak topics to lift marks above 70%."
                .to_string(),
        );
    }

    if f.assignments < 60.0 {
        score += 0.20;
        tips.push("Use a weekly assignment checklist and submit drafts 48h early for feedback.".to_string());
    }

    if f.study_hours < 8.0 {
        score += 0.10;
        tips.push(
            "Increase study time to 12-15 hrs/week using Pomodoro (25/5) and a fixed timetable."
                .to_string(),
        );
    }

    if f.extracurriculars < 2.0 {
        score += 0.05;
        tips.push("Join 1-2 extracurriculars to build routines and motivation.".to_string());
    }

    let score = score.clamp(0.0, 1.0);
    let level = RiskLevel::from_score(score);

    if tips.is_empty() {
        tips.push(MAINTAIN_HABITS.to_string());
    }

    RiskAssessment { score, level, tips }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing() -> FeatureVector {
        FeatureVector::new(95.0, 95.0, 95.0, 20.0, 8.0)
    }

    #[test]
    fn test_every_penalty_fires() {
        let risk = compute_risk(&FeatureVector::new(40.0, 40.0, 40.0, 2.0, 0.0), None);
        assert!((risk.score - 0.80).abs() < 1e-9, "score = {}", risk.score);
        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.tips.len(), 5);
        assert!(!risk.tips.iter().any(|t| t == MAINTAIN_HABITS));
    }

    #[test]
    fn test_no_risk() {
        let risk = compute_risk(&passing(), None);
        assert_eq!(risk.score, 0.0);
        assert_eq!(risk.level, RiskLevel::Low);
        assert_eq!(risk.tips, vec![MAINTAIN_HABITS.to_string()]);
    }

    #[test]
    fn test_probability_contribution() {
        let probs = ProbabilityMap::from_array([0.1, 0.1, 0.3, 0.5]);
        let risk = compute_risk(&passing(), Some(&probs));
        assert!((risk.score - 0.65).abs() < 1e-9);
        assert_eq!(risk.level, RiskLevel::Medium);
        assert_eq!(risk.tips, vec![MAINTAIN_HABITS.to_string()]);
    }

    #[test]
    fn test_score_is_clamped() {
        let probs = ProbabilityMap::one_hot(GradeLabel::D);
        let risk = compute_risk(&FeatureVector::new(0.0, 0.0, 0.0, 0.0, 0.0), Some(&probs));
        assert_eq!(risk.score, 1.0);
        assert_eq!(risk.level, RiskLevel::High);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0.70), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.6999), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.3999), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
    }

    #[test]
    fn test_accumulated_boundary_lands_on_medium() {
        // marks + study + extracurricular penalties: 0.25 + 0.10 + 0.05
        let risk = compute_risk(&FeatureVector::new(90.0, 50.0, 90.0, 5.0, 1.0), None);
        assert!((risk.score - 0.40).abs() < 1e-9);
        assert_eq!(risk.level, RiskLevel::Medium);
        assert_eq!(risk.tips.len(), 3);
    }

    #[test]
    fn test_one_hot_grades() {
        let c = compute_risk(&passing(), Some(&ProbabilityMap::one_hot(GradeLabel::C)));
        assert!((c.score - 0.5).abs() < 1e-9);
        assert_eq!(c.level, RiskLevel::Medium);

        let a = compute_risk(&passing(), Some(&ProbabilityMap::one_hot(GradeLabel::A)));
        assert_eq!(a.score, 0.0);
        assert_eq!(a.level, RiskLevel::Low);
    }
}

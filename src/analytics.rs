use serde::Serialize;

use crate::database::StudentRecord;
use crate::features::{FeatureVector, GradeLabel, ProbabilityMap};
use crate::risk::{compute_risk, RiskLevel};

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ClassReport {
    pub total_students: usize,
    pub grade_distribution: Vec<GradeCount>,
    pub risk_overview: Vec<RiskCount>,
    /// Mean of each feature; `None` when there are no records
    pub averages: Option<FeatureVector>,
    pub marks_by_grade: Vec<MarksSummary>,
    /// High-risk students only, highest score first
    pub at_risk_students: Vec<AtRiskStudent>,
    /// One point per student, in record order
    pub risk_points: Vec<RiskPoint>,
    /// Non-empty attendance x assignments cells with their mean marks
    pub marks_heatmap: Vec<HeatmapCell>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GradeCount {
    pub grade: GradeLabel,
    pub count: usize,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RiskCount {
    pub level: RiskLevel,
    pub count: usize,
    pub guidance: String,
}

/// Five-number summary of marks for one grade.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MarksSummary {
    pub grade: GradeLabel,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct AtRiskStudent {
    pub id: i64,
    pub name: String,
    pub predicted_grade: GradeLabel,
    pub risk_score: f64,
}

/// Attendance against marks for one student, sized by assignments and colored by risk.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RiskPoint {
    pub id: i64,
    pub name: String,
    pub attendance: f64,
    pub marks: f64,
    pub assignments: f64,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
}

/// Half-open `[start, end)` ranges; the last bin on each axis also holds its upper edge.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct HeatmapCell {
    pub attendance_start: f64,
    pub attendance_end: f64,
    pub assignments_start: f64,
    pub assignments_end: f64,
    pub count: usize,
    pub mean_marks: f64,
}

const HEATMAP_MAX_BINS: usize = 10;

/// Evenly spaced bins with a 1, 2 or 5 times power-of-ten step.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bins {
    start: f64,
    step: f64,
    count: usize,
}

impl Bins {
    fn covering(values: &[f64], max_bins: usize) -> Option<Self> {
        let min = values.iter().copied().reduce(f64::min)?;
        let max = values.iter().copied().reduce(f64::max)?;
        let span = max - min;
        if span <= 0.0 {
            return Some(Bins {
                start: min.floor(),
                step: 1.0,
                count: 1,
            });
        }

        let raw = span / max_bins as f64;
        let magnitude = 10f64.powf(raw.log10().floor());
        let step = [1.0, 2.0, 5.0, 10.0]
            .iter()
            .map(|m| m * magnitude)
            .find(|step| span / step <= max_bins as f64)
            .unwrap_or(10.0 * magnitude);

        let start = (min / step).floor() * step;
        let stop = (max / step).ceil() * step;
        let count = (((stop - start) / step).round() as usize).max(1);
        Some(Bins { start, step, count })
    }

    fn index(&self, value: f64) -> usize {
        let i = ((value - self.start) / self.step).floor().max(0.0) as usize;
        i.min(self.count - 1)
    }

    fn edges(&self, index: usize) -> (f64, f64) {
        let lo = self.start + index as f64 * self.step;
        (lo, lo + self.step)
    }
}

pub struct ClassAnalyzer;

impl ClassAnalyzer {
    pub fn new() -> Self {
        ClassAnalyzer
    }

    pub fn generate_class_report(&self, records: &[StudentRecord]) -> ClassReport {
        // Stored records keep only their grade, so risk is rescored from a one-hot distribution.
        let scored: Vec<(&StudentRecord, f64, RiskLevel)> = records
            .iter()
            .map(|r| {
                let risk = compute_risk(&r.features, Some(&ProbabilityMap::one_hot(r.predicted_grade)));
                (r, risk.score, risk.level)
            })
            .collect();

        let grade_distribution = GradeLabel::ALL
            .iter()
            .map(|&grade| GradeCount {
                grade,
                count: records.iter().filter(|r| r.predicted_grade == grade).count(),
            })
            .collect();

        let risk_overview = [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low]
            .iter()
            .map(|&level| RiskCount {
                level,
                count: scored.iter().filter(|(_, _, l)| *l == level).count(),
                guidance: level.guidance().to_string(),
            })
            .collect();

        let mut at_risk_students: Vec<AtRiskStudent> = scored
            .iter()
            .filter(|(_, _, level)| *level == RiskLevel::High)
            .map(|(r, score, _)| AtRiskStudent {
                id: r.id,
                name: r.name.clone(),
                predicted_grade: r.predicted_grade,
                risk_score: *score,
            })
            .collect();
        at_risk_students.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score).then(a.id.cmp(&b.id)));

        let risk_points = scored
            .iter()
            .map(|(r, score, level)| RiskPoint {
                id: r.id,
                name: r.name.clone(),
                attendance: r.features.attendance,
                marks: r.features.marks,
                assignments: r.features.assignments,
                risk_level: *level,
                risk_score: *score,
            })
            .collect();

        ClassReport {
            total_students: records.len(),
            grade_distribution,
            risk_overview,
            averages: self.calculate_averages(records),
            marks_by_grade: self.marks_by_grade(records),
            at_risk_students,
            risk_points,
            marks_heatmap: self.marks_heatmap(records),
        }
    }

    fn marks_heatmap(&self, records: &[StudentRecord]) -> Vec<HeatmapCell> {
        let attendance: Vec<f64> = records.iter().map(|r| r.features.attendance).collect();
        let assignments: Vec<f64> = records.iter().map(|r| r.features.assignments).collect();
        let (Some(x_bins), Some(y_bins)) = (
            Bins::covering(&attendance, HEATMAP_MAX_BINS),
            Bins::covering(&assignments, HEATMAP_MAX_BINS),
        ) else {
            return Vec::new();
        };

        // (count, marks total) per cell, row-major by attendance bin
        let mut cells = vec![(0usize, 0.0f64); x_bins.count * y_bins.count];
        for r in records {
            let x = x_bins.index(r.features.attendance);
            let y = y_bins.index(r.features.assignments);
            let cell = &mut cells[x * y_bins.count + y];
            cell.0 += 1;
            cell.1 += r.features.marks;
        }

        cells
            .into_iter()
            .enumerate()
            .filter(|(_, (count, _))| *count > 0)
            .map(|(i, (count, total))| {
                let (attendance_start, attendance_end) = x_bins.edges(i / y_bins.count);
                let (assignments_start, assignments_end) = y_bins.edges(i % y_bins.count);
                HeatmapCell {
                    attendance_start,
                    attendance_end,
                    assignments_start,
                    assignments_end,
                    count,
                    mean_marks: total / count as f64,
                }
            })
            .collect()
    }

    fn calculate_averages(&self, records: &[StudentRecord]) -> Option<FeatureVector> {
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        let mut sums = [0.0; 5];
        for r in records {
            for (sum, value) in sums.iter_mut().zip(r.features.to_array()) {
                *sum += value;
            }
        }
        let [a, m, s, h, e] = sums.map(|total| total / n);
        Some(FeatureVector::new(a, m, s, h, e))
    }

    fn marks_by_grade(&self, records: &[StudentRecord]) -> Vec<MarksSummary> {
        GradeLabel::ALL
            .iter()
            .filter_map(|&grade| {
                let mut marks: Vec<f64> = records
                    .iter()
                    .filter(|r| r.predicted_grade == grade)
                    .map(|r| r.features.marks)
                    .collect();
                if marks.is_empty() {
                    return None;
                }
                marks.sort_by(f64::total_cmp);

                Some(MarksSummary {
                    grade,
                    count: marks.len(),
                    min: marks[0],
                    q1: quantile(&marks, 0.25),
                    median: quantile(&marks, 0.5),
                    q3: quantile(&marks, 0.75),
                    max: marks[marks.len() - 1],
                })
            })
            .collect()
    }
}

impl Default for ClassAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::io::Read;

use crate::error::{Result, TrackerError};
use crate::features::{FeatureInput, FeatureVector, GradeLabel};

const NOISE_STD_DEV: f64 = 5.0;

/// Labeled training data: one row of `features` per entry of `labels`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticDataset {
    /// Columns in `FEATURE_NAMES` order
    pub features: Array2<f64>,
    pub labels: Array1<GradeLabel>,
}

impl SyntheticDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels as model class indices.
    pub fn targets(&self) -> Array1<usize> {
        self.labels.mapv(GradeLabel::index)
    }

    pub fn class_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for label in self.labels.iter() {
            counts[label.index()] += 1;
        }
        counts
    }
}

/// Weighted 0-100 composite before noise.
pub fn composite_score(f: &FeatureVector) -> f64 {
    f.marks * 0.5
        + f.attendance * 0.2
        + f.assignments * 0.15
        + (f.study_hours / 40.0) * 100.0 * 0.10
        + (f.extracurriculars / 10.0) * 100.0 * 0.05
}

/// Grade thresholds; a score on a boundary belongs to the better grade.
pub fn label_for_score(score: f64) -> GradeLabel {
    if score >= 85.0 {
        GradeLabel::A
    } else if score >= 70.0 {
        GradeLabel::B
    } else if score >= 55.0 {
        GradeLabel::C
    } else {
        GradeLabel::D
    }
}

/// Draws `n` students with a seeded generator. Same `n` and `seed` always give the same data.
pub fn generate_synthetic_dataset(n: usize, seed: u64) -> Result<SyntheticDataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    // Each column is drawn in full before the next, so adding a column never shifts the others.
    let attendance: Vec<f64> = (0..n).map(|_| rng.gen_range(50.0..100.0)).collect();
    let marks: Vec<f64> = (0..n).map(|_| rng.gen_range(30.0..100.0)).collect();
    let assignments: Vec<f64> = (0..n).map(|_| rng.gen_range(30.0..100.0)).collect();
    let study_hours: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..40.0)).collect();
    let extracurriculars: Vec<f64> = (0..n).map(|_| rng.gen_range(0..=10u32) as f64).collect();

    let normal = Normal::new(0.0, NOISE_STD_DEV).map_err(|e| TrackerError::Training(e.to_string()))?;

    let mut flat = Vec::with_capacity(n * 5);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let f = FeatureVector::new(
            attendance[i],
            marks[i],
            assignments[i],
            study_hours[i],
            extracurriculars[i],
        );
        let noise = normal.sample(&mut rng);
        let score = (composite_score(&f) + noise).clamp(0.0, 100.0);

        flat.extend_from_slice(&f.to_array());
        labels.push(label_for_score(score));
    }

    let features = Array2::from_shape_vec((n, 5), flat)
        .map_err(|e| TrackerError::Training(e.to_string()))?;

    Ok(SyntheticDataset {
        features,
        labels: Array1::from_vec(labels),
    })
}

pub fn calculate_accuracy(predictions: &[GradeLabel], targets: &Array1<GradeLabel>) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(targets.iter())
        .filter(|(pred, actual)| pred == actual)
        .count() as f64
        / targets.len() as f64
}

/// One line of an uploaded roster: `name,attendance,marks,assignments,study_hours,extracurriculars`.
#[derive(Debug, Deserialize, Clone)]
pub struct RosterRow {
    pub name: String,
    pub attendance: Option<f64>,
    pub marks: Option<f64>,
    pub assignments: Option<f64>,
    pub study_hours: Option<f64>,
    pub extracurriculars: Option<f64>,
}

impl From<RosterRow> for FeatureInput {
    fn from(row: RosterRow) -> Self {
        FeatureInput {
            attendance: row.attendance,
            marks: row.marks,
            assignments: row.assignments,
            study_hours: row.study_hours,
            extracurriculars: row.extracurriculars,
        }
    }
}

/// Parses a CSV roster with a header row. Rows with a blank name or a missing feature are rejected
/// with the 1-based data line number.
pub fn load_roster<R: Read>(reader: R) -> Result<Vec<(String, FeatureVector)>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();

    for (line, result) in rdr.deserialize::<RosterRow>().enumerate() {
        let row = result?;
        let name = row.name.trim().to_string();
        if name.is_empty() {
            return Err(TrackerError::invalid(format!("row {}: name is required", line + 1)));
        }
        let features = FeatureVector::try_from(FeatureInput::from(row))
            .map_err(|e| TrackerError::invalid(format!("row {}: {}", line + 1, e)))?;
        rows.push((name, features));
    }

    Ok(rows)
}

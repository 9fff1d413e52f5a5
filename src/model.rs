use chrono::{DateTime, Utc};
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{arr2, Array1, Array2, Axis};
use once_cell::sync::OnceCell;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::data::{calculate_accuracy, generate_synthetic_dataset, SyntheticDataset};
use crate::error::{Result, TrackerError};
use crate::features::{FeatureVector, GradeLabel, ProbabilityMap};

const ARTIFACT_VERSION: u32 = 1;
const NUM_CLASSES: usize = 4;

static SHARED_MODEL: OnceCell<Arc<GradeClassifier>> = OnceCell::new();

/// Ensemble configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: Option<usize>,
    /// Minimum total sample weight in a leaf
    pub min_weight_leaf: f32,
    /// Reweight each bootstrap sample so every grade carries equal total weight
    pub class_balance: bool,
    /// Seed for bootstrap sampling; tree `i` uses `seed + i`
    pub seed: u64,
    /// Size of the synthetic hold-out set scored after training
    pub holdout_size: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: Some(10),
            min_weight_leaf: 1.0,
            class_balance: true,
            seed: 0,
            holdout_size: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub classes: Vec<GradeLabel>,
    pub holdout_accuracy: f64,
    pub trained_at: DateTime<Utc>,
}

/// Bagged decision trees over the five student features.
///
/// This is also the on-disk artifact: it is written once after training and read back unchanged,
/// so a given file always produces the same predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeClassifier {
    version: u32,
    config: ForestConfig,
    classes: Vec<GradeLabel>,
    trees: Vec<DecisionTree<f64, usize>>,
    holdout_accuracy: f64,
    trained_at: DateTime<Utc>,
}

impl GradeClassifier {
    /// Fits the ensemble. Trees are built in parallel; each draws its own bootstrap sample.
    pub fn train(dataset: &SyntheticDataset, config: &ForestConfig) -> Result<Self> {
        if dataset.is_empty() {
            return Err(TrackerError::Training("training set is empty".to_string()));
        }
        if config.n_estimators == 0 {
            return Err(TrackerError::Training("n_estimators must be at least 1".to_string()));
        }

        let targets = dataset.targets();
        let counts = dataset.class_counts();
        tracing::info!(
            "Training {} trees on {} samples (A={}, B={}, C={}, D={})",
            config.n_estimators,
            dataset.len(),
            counts[0],
            counts[1],
            counts[2],
            counts[3]
        );

        let trees = (0..config.n_estimators)
            .into_par_iter()
            .map(|i| fit_tree(&dataset.features, &targets, config, config.seed.wrapping_add(i as u64)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version: ARTIFACT_VERSION,
            config: config.clone(),
            classes: GradeLabel::ALL.to_vec(),
            trees,
            holdout_accuracy: 0.0,
            trained_at: Utc::now(),
        })
    }

    /// Trains, then scores against a fresh synthetic set drawn with `dataset_seed + 1`.
    pub fn train_with_holdout(
        dataset: &SyntheticDataset,
        config: &ForestConfig,
        dataset_seed: u64,
    ) -> Result<Self> {
        let mut model = Self::train(dataset, config)?;
        if config.holdout_size > 0 {
            let holdout = generate_synthetic_dataset(config.holdout_size, dataset_seed.wrapping_add(1))?;
            model.holdout_accuracy = model.accuracy(&holdout);
            tracing::info!("Hold-out accuracy: {:.2}%", model.holdout_accuracy * 100.0);
        }
        Ok(model)
    }

    /// Reads a previously saved artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| TrackerError::storage(path, e))?;
        let model: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| TrackerError::storage(path, e))?;

        if model.version != ARTIFACT_VERSION {
            return Err(TrackerError::storage(
                path,
                format!("unsupported artifact version {}", model.version),
            ));
        }
        if model.trees.is_empty() {
            return Err(TrackerError::storage(path, "artifact holds no trees"));
        }
        if model.classes != GradeLabel::ALL {
            return Err(TrackerError::storage(path, "artifact class ordering does not match A, B, C, D"));
        }

        tracing::info!("Loaded model with {} trees from {}", model.trees.len(), path.display());
        Ok(model)
    }

    /// Writes the artifact through a temporary sibling file, so readers never see a partial model.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TrackerError::storage(path, e))?;
        }

        let tmp = path.with_extension("tmp");
        let file = File::create(&tmp).map_err(|e| TrackerError::storage(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|e| TrackerError::storage(path, e))?;
        writer.flush().map_err(|e| TrackerError::storage(path, e))?;
        drop(writer);
        fs::rename(&tmp, path).map_err(|e| TrackerError::storage(path, e))?;

        tracing::info!("Saved model to {}", path.display());
        Ok(())
    }

    /// Loads the artifact at `settings.model_path`, or trains and saves one if the file is absent.
    /// A file that exists but cannot be read is an error, never a reason to retrain.
    pub fn load_or_train(settings: &Settings) -> Result<Self> {
        if settings.model_path.exists() {
            return Self::load(&settings.model_path);
        }

        tracing::info!(
            "No model at {}; training from {} synthetic samples (seed {})",
            settings.model_path.display(),
            settings.dataset_size,
            settings.dataset_seed
        );
        let dataset = generate_synthetic_dataset(settings.dataset_size, settings.dataset_seed)?;
        let config = ForestConfig {
            seed: settings.forest_seed,
            ..ForestConfig::default()
        };
        let model = Self::train_with_holdout(&dataset, &config, settings.dataset_seed)?;
        model.save(&settings.model_path)?;
        Ok(model)
    }

    /// Most probable grade and the full distribution for one student.
    pub fn predict(&self, features: &FeatureVector) -> Result<(GradeLabel, ProbabilityMap)> {
        features.ensure_numeric()?;
        let x = arr2(&[features.to_array()]);
        let probs = self
            .predict_proba_batch(&x)
            .pop()
            .ok_or_else(|| TrackerError::Training("model produced no output".to_string()))?;
        Ok((probs.argmax(), probs))
    }

    /// Vote share of each grade across the ensemble, one map per row of `x`.
    pub fn predict_proba_batch(&self, x: &Array2<f64>) -> Vec<ProbabilityMap> {
        let mut votes = vec![[0usize; NUM_CLASSES]; x.nrows()];

        for tree in &self.trees {
            let preds: Array1<usize> = tree.predict(x);
            for (row, &class) in preds.iter().enumerate() {
                if let Some(slot) = votes[row].get_mut(class) {
                    *slot += 1;
                }
            }
        }

        let total = self.trees.len() as f64;
        votes
            .into_iter()
            .map(|counts| ProbabilityMap::from_array(counts.map(|c| c as f64 / total)))
            .collect()
    }

    pub fn accuracy(&self, dataset: &SyntheticDataset) -> f64 {
        let predictions: Vec<GradeLabel> = self
            .predict_proba_batch(&dataset.features)
            .iter()
            .map(ProbabilityMap::argmax)
            .collect();
        calculate_accuracy(&predictions, &dataset.labels)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            n_estimators: self.trees.len(),
            max_depth: self.config.max_depth,
            classes: self.classes.clone(),
            holdout_accuracy: self.holdout_accuracy,
            trained_at: self.trained_at,
        }
    }
}

fn fit_tree(
    features: &Array2<f64>,
    targets: &Array1<usize>,
    config: &ForestConfig,
    seed: u64,
) -> Result<DecisionTree<f64, usize>> {
    let n = targets.len();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let bag: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

    let records = features.select(Axis(0), &bag);
    let bag_targets = targets.select(Axis(0), &bag);
    let weights = if config.class_balance {
        balanced_weights(&bag_targets)
    } else {
        Array1::ones(n)
    };

    let dataset = DatasetBase::new(records, bag_targets).with_weights(weights);

    DecisionTree::<f64, usize>::params()
        .split_quality(SplitQuality::Gini)
        .max_depth(config.max_depth)
        .min_weight_leaf(config.min_weight_leaf)
        .fit(&dataset)
        .map_err(|e| TrackerError::Training(e.to_string()))
}

/// `n / (k * count_c)` per sample, where `k` counts only the grades present in this sample.
fn balanced_weights(targets: &Array1<usize>) -> Array1<f32> {
    let mut counts = [0usize; NUM_CLASSES];
    for &t in targets.iter() {
        if t < NUM_CLASSES {
            counts[t] += 1;
        }
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1);
    let n = targets.len() as f32;

    targets.mapv(|t| match counts.get(t) {
        Some(&c) if c > 0 => n / (present as f32 * c as f32),
        _ => 1.0,
    })
}

/// The process-wide classifier, loaded or trained on first use from the environment settings.
/// The environment is only read until the model exists.
pub fn shared_classifier() -> Result<Arc<GradeClassifier>> {
    if let Some(model) = SHARED_MODEL.get() {
        return Ok(Arc::clone(model));
    }
    init_shared_classifier(&Settings::from_env())
}

/// Initializes the process-wide classifier from explicit settings. Concurrent callers block until
/// the single initialization finishes; later calls return the existing model and ignore `settings`.
/// A failed initialization is not cached.
pub fn init_shared_classifier(settings: &Settings) -> Result<Arc<GradeClassifier>> {
    SHARED_MODEL
        .get_or_try_init(|| GradeClassifier::load_or_train(settings).map(Arc::new))
        .map(Arc::clone)
}

/// Predicted grade and per-grade probabilities from the shared classifier.
pub fn predict_grade(features: &FeatureVector) -> Result<(GradeLabel, ProbabilityMap)> {
    shared_classifier()?.predict(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_estimators: 15,
            max_depth: Some(8),
            holdout_size: 200,
            ..ForestConfig::default()
        }
    }

    fn small_model() -> GradeClassifier {
        let data = generate_synthetic_dataset(600, 42).unwrap();
        GradeClassifier::train_with_holdout(&data, &small_config(), 42).unwrap()
    }

    #[test]
    fn test_probabilities_sum_to_one_and_match_label() {
        let model = small_model();
        let students = [
            FeatureVector::new(95.0, 95.0, 95.0, 30.0, 8.0),
            FeatureVector::new(75.0, 70.0, 70.0, 15.0, 4.0),
            FeatureVector::new(55.0, 40.0, 40.0, 2.0, 0.0),
            FeatureVector::new(0.0, 0.0, 0.0, 0.0, 0.0),
            FeatureVector::new(100.0, 100.0, 100.0, 80.0, 10.0),
        ];
        for f in &students {
            let (label, probs) = model.predict(f).unwrap();
            assert!((probs.sum() - 1.0).abs() < 1e-6, "sum = {}", probs.sum());
            assert!(probs.iter().all(|(_, p)| (0.0..=1.0).contains(&p)));
            assert_eq!(label, probs.argmax());
        }
    }

    #[test]
    fn test_extremes_rank_sensibly() {
        let model = small_model();
        let (strong, _) = model.predict(&FeatureVector::new(99.0, 99.0, 99.0, 39.0, 10.0)).unwrap();
        let (weak, _) = model.predict(&FeatureVector::new(50.0, 30.0, 30.0, 0.0, 0.0)).unwrap();
        assert!(strong < weak, "strong={} weak={}", strong, weak);
        assert_eq!(weak, GradeLabel::D);
    }

    #[test]
    fn test_repeated_predictions_are_identical() {
        let model = small_model();
        let f = FeatureVector::new(82.0, 68.0, 71.0, 11.0, 2.0);
        let first = model.predict(&f).unwrap();
        for _ in 0..5 {
            assert_eq!(model.predict(&f).unwrap(), first);
        }
    }

    #[test]
    fn test_non_finite_input_is_rejected() {
        let model = small_model();
        let err = model
            .predict(&FeatureVector::new(80.0, f64::NAN, 70.0, 10.0, 2.0))
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidInput(_)));
    }

    #[test]
    fn test_holdout_accuracy_is_recorded() {
        let model = small_model();
        let info = model.info();
        assert_eq!(info.n_estimators, 15);
        assert_eq!(info.classes, GradeLabel::ALL.to_vec());
        assert!(info.holdout_accuracy > 0.4, "accuracy = {}", info.holdout_accuracy);
    }

    #[test]
    fn test_balanced_weights_equalize_classes() {
        let targets = Array1::from_vec(vec![0, 0, 0, 1, 3, 3]);
        let w = balanced_weights(&targets);
        let total_for = |class: usize| -> f32 {
            targets
                .iter()
                .zip(w.iter())
                .filter(|(&t, _)| t == class)
                .map(|(_, &w)| w)
                .sum()
        };
        assert!((total_for(0) - 2.0).abs() < 1e-6);
        assert!((total_for(1) - 2.0).abs() < 1e-6);
        assert!((total_for(3) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        let data = generate_synthetic_dataset(0, 1).unwrap();
        assert!(matches!(
            GradeClassifier::train(&data, &small_config()),
            Err(TrackerError::Training(_))
        ));
    }
}

use std::fs;

use student_tracker::data::generate_synthetic_dataset;
use student_tracker::model::{shared_classifier, ForestConfig};
use student_tracker::*;
use tempfile::tempdir;

fn small_config() -> ForestConfig {
    ForestConfig {
        n_estimators: 20,
        holdout_size: 100,
        ..ForestConfig::default()
    }
}

fn students() -> Vec<FeatureVector> {
    vec![
        FeatureVector::new(92.0, 88.0, 90.0, 18.0, 4.0),
        FeatureVector::new(78.0, 66.0, 70.0, 10.0, 2.0),
        FeatureVector::new(55.0, 42.0, 38.0, 3.0, 0.0),
        FeatureVector::new(100.0, 100.0, 100.0, 80.0, 10.0),
    ]
}

#[test]
fn test_saved_model_reloads_with_identical_predictions() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("model.json");

    let data = generate_synthetic_dataset(600, 42).unwrap();
    let model = GradeClassifier::train_with_holdout(&data, &small_config(), 42).unwrap();
    model.save(&path).unwrap();
    assert!(!path.with_extension("tmp").exists());

    let reloaded = GradeClassifier::load(&path).unwrap();
    assert_eq!(reloaded.n_trees(), 20);
    for f in students() {
        assert_eq!(model.predict(&f).unwrap(), reloaded.predict(&f).unwrap());
    }
}

#[test]
fn test_corrupted_artifact_is_a_storage_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    fs::write(&path, "{\"version\": 1, \"trees\": [").unwrap();

    assert!(matches!(GradeClassifier::load(&path), Err(TrackerError::Storage { .. })));

    // An unreadable artifact must not be silently replaced by a fresh model.
    let settings = Settings {
        model_path: path.clone(),
        ..Settings::default()
    };
    assert!(matches!(
        GradeClassifier::load_or_train(&settings),
        Err(TrackerError::Storage { .. })
    ));
    assert_eq!(fs::read_to_string(&path).unwrap(), "{\"version\": 1, \"trees\": [");
}

#[test]
fn test_missing_artifact_is_a_storage_error() {
    let dir = tempdir().unwrap();
    let err = GradeClassifier::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, TrackerError::Storage { .. }));
}

#[test]
fn test_shared_classifier_uses_configured_artifact() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shared.json");

    let data = generate_synthetic_dataset(600, 7).unwrap();
    let model = GradeClassifier::train(&data, &small_config()).unwrap();
    model.save(&path).unwrap();

    std::env::set_var("STUDENT_TRACKER_MODEL_PATH", &path);

    let first = shared_classifier().unwrap();
    let second = shared_classifier().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(first.n_trees(), 20);

    for f in students() {
        let expected = model.predict(&f).unwrap();
        assert_eq!(predict_grade(&f).unwrap(), expected);
        assert_eq!(predict_grade(&f).unwrap(), expected);
    }

    // Once initialized, later environment changes are not consulted.
    let moved = dir.path().join("elsewhere.json");
    std::env::set_var("STUDENT_TRACKER_MODEL_PATH", &moved);
    let third = shared_classifier().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &third));
    assert_eq!(predict_grade(&students()[0]).unwrap(), model.predict(&students()[0]).unwrap());
    assert!(!moved.exists());
}

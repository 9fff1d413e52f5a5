use student_tracker::data::generate_synthetic_dataset;
use student_tracker::model::ForestConfig;
use student_tracker::recommendations::KEEP_IT_UP;
use student_tracker::risk::MAINTAIN_HABITS;
use student_tracker::*;

fn trained() -> GradeClassifier {
    let data = generate_synthetic_dataset(800, 42).unwrap();
    let config = ForestConfig {
        n_estimators: 25,
        holdout_size: 0,
        ..ForestConfig::default()
    };
    GradeClassifier::train(&data, &config).unwrap()
}

#[test]
fn test_full_pipeline_for_struggling_student() {
    let model = trained();
    let f = FeatureVector::new(40.0, 40.0, 40.0, 2.0, 0.0);

    let (grade, probs) = model.predict(&f).unwrap();
    assert_eq!(grade, probs.argmax());

    let recs = get_recommendations(&f);
    assert_eq!(recs.len(), 5);

    let risk = compute_risk(&f, Some(&probs));
    assert_eq!(risk.level, RiskLevel::High);
    assert!(risk.score >= 0.80 - 1e-9 && risk.score <= 1.0);
    assert_eq!(risk.tips.len(), 5);
}

#[test]
fn test_full_pipeline_for_strong_student() {
    let f = FeatureVector::new(95.0, 95.0, 95.0, 20.0, 8.0);

    assert_eq!(get_recommendations(&f), vec![KEEP_IT_UP.to_string()]);

    let risk = compute_risk(&f, None);
    assert_eq!(risk.score, 0.0);
    assert_eq!(risk.level, RiskLevel::Low);
    assert_eq!(risk.tips, vec![MAINTAIN_HABITS.to_string()]);
}

#[test]
fn test_probabilities_well_formed_across_grid() {
    let model = trained();
    for attendance in [0.0, 50.0, 75.0, 100.0] {
        for marks in [0.0, 45.0, 70.0, 100.0] {
            for hours in [0.0, 10.0, 40.0, 80.0] {
                let f = FeatureVector::new(attendance, marks, marks, hours, 3.0);
                let (grade, probs) = model.predict(&f).unwrap();
                assert!((probs.sum() - 1.0).abs() < 1e-6);
                assert_eq!(grade, probs.argmax());
            }
        }
    }
}

#[test]
fn test_lists_are_never_empty() {
    for f in [
        FeatureVector::new(0.0, 0.0, 0.0, 0.0, 0.0),
        FeatureVector::new(74.9, 69.9, 69.9, 9.9, 2.9),
        FeatureVector::new(100.0, 100.0, 100.0, 80.0, 10.0),
    ] {
        assert!(!get_recommendations(&f).is_empty());
        let risk = compute_risk(&f, None);
        assert!(!risk.tips.is_empty());
        assert!((0.0..=1.0).contains(&risk.score));
    }
}

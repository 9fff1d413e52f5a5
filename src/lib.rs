//! Student performance tracking: grade prediction, study recommendations, risk scoring and class
//! reports over stored student records.

pub mod analytics;
pub mod api;
pub mod config;
pub mod data;
pub mod database;
pub mod error;
pub mod features;
pub mod model;
pub mod recommendations;
pub mod risk;

pub use config::Settings;
pub use error::{Result, TrackerError};
pub use features::{FeatureInput, FeatureVector, GradeLabel, ProbabilityMap};
pub use model::{predict_grade, GradeClassifier};
pub use recommendations::get_recommendations;
pub use risk::{compute_risk, RiskAssessment, RiskLevel};

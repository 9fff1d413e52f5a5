//! Configuration module

use std::env;
use std::path::PathBuf;

pub const DEFAULT_MODEL_PATH: &str = "model.json";
pub const DEFAULT_DB_PATH: &str = "student_tracker.db";
pub const DEFAULT_DATASET_SIZE: usize = 2000;
pub const DEFAULT_DATASET_SEED: u64 = 42;
pub const DEFAULT_FOREST_SEED: u64 = 0;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Where the trained model artifact is read from and written to
    pub model_path: PathBuf,

    /// SQLite file holding student records
    pub db_path: String,

    pub host: String,
    pub port: u16,

    /// Synthetic training set size and seed used when no artifact exists
    pub dataset_size: usize,
    pub dataset_seed: u64,

    /// Seed for bootstrap sampling inside the forest
    pub forest_seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            db_path: DEFAULT_DB_PATH.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            dataset_size: DEFAULT_DATASET_SIZE,
            dataset_seed: DEFAULT_DATASET_SEED,
            forest_seed: DEFAULT_FOREST_SEED,
        }
    }
}

impl Settings {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            model_path: env::var("STUDENT_TRACKER_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),

            db_path: env::var("STUDENT_TRACKER_DB_PATH").unwrap_or(defaults.db_path),

            host: env::var("STUDENT_TRACKER_HOST").unwrap_or(defaults.host),

            port: parse_var("STUDENT_TRACKER_PORT").unwrap_or(defaults.port),

            dataset_size: parse_var("STUDENT_TRACKER_DATASET_SIZE").unwrap_or(defaults.dataset_size),

            dataset_seed: parse_var("STUDENT_TRACKER_DATASET_SEED").unwrap_or(defaults.dataset_seed),

            forest_seed: parse_var("STUDENT_TRACKER_FOREST_SEED").unwrap_or(defaults.forest_seed),
        }
    }

    /// sqlx connection URL for the configured database file
    pub fn database_url(&self) -> String {
        if self.db_path.starts_with("sqlite:") {
            self.db_path.clone()
        } else {
            format!("sqlite://{}?mode=rwc", self.db_path)
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::ensemble::{BoostingParams, ForestParams};

pub const DEFAULT_RECOMMENDATION_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta";

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Directory holding the source datasets
    #[arg(long, env = "STUDENT_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Seed for the train/test split and hyperparameter search
    #[arg(long, env = "STUDENT_MODEL_SEED", default_value_t = 42, global = true)]
    pub seed: u64,

    /// Credential for the generative recommendation provider
    #[arg(
        long,
        env = "RECOMMENDATION_API_KEY",
        hide_env_values = true,
        global = true
    )]
    pub recommendation_api_key: Option<String>,

    #[arg(
        long,
        env = "RECOMMENDATION_MODEL",
        default_value = "gemini-1.5-flash",
        global = true
    )]
    pub recommendation_model: String,

    #[arg(
        long,
        env = "RECOMMENDATION_ENDPOINT",
        default_value = DEFAULT_RECOMMENDATION_ENDPOINT,
        global = true
    )]
    pub recommendation_endpoint: String,

    #[arg(
        long,
        env = "RECOMMENDATION_TIMEOUT_SECS",
        default_value_t = 8,
        global = true
    )]
    pub recommendation_timeout_secs: u64,
}

impl Settings {
    pub fn recommendation_timeout(&self) -> Duration {
        Duration::from_secs(self.recommendation_timeout_secs.max(1))
    }

    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            seed: self.seed,
            ..TrainingConfig::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForestGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
}

impl ForestGrid {
    pub fn candidates(&self) -> Vec<ForestParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        out.push(ForestParams {
                            n_estimators,
                            max_depth,
                            min_samples_split,
                            min_samples_leaf,
                        });
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct BoostingGrid {
    pub n_estimators: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub max_depth: Vec<usize>,
}

impl BoostingGrid {
    pub fn candidates(&self) -> Vec<BoostingParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &learning_rate in &self.learning_rate {
                for &max_depth in &self.max_depth {
                    out.push(BoostingParams {
                        n_estimators,
                        learning_rate,
                        max_depth,
                    });
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub seed: u64,
    pub test_fraction: f64,
    pub folds: usize,
    pub forest_grid: ForestGrid,
    pub forest_iterations: usize,
    pub boosting_grid: BoostingGrid,
    pub boosting_iterations: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            folds: 3,
            forest_grid: ForestGrid {
                n_estimators: vec![200, 300, 400],
                max_depth: vec![Some(10), Some(15), Some(20), None],
                min_samples_split: vec![2, 5, 10],
                min_samples_leaf: vec![1, 2, 4],
            },
            forest_iterations: 10,
            boosting_grid: BoostingGrid {
                n_estimators: vec![200, 300],
                learning_rate: vec![0.05, 0.1, 0.2],
                max_depth: vec![3, 4, 5],
            },
            boosting_iterations: 6,
        }
    }
}

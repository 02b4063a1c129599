use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::tree::{RegressionTree, TreeParams};

pub const FOREST_NAME: &str = "Random Forest";
pub const BOOSTING_NAME: &str = "Gradient Boosting";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl ForestParams {
    pub fn describe(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("n_estimators".to_string(), self.n_estimators.to_string()),
            (
                "max_depth".to_string(),
                self.max_depth
                    .map_or_else(|| "none".to_string(), |d| d.to_string()),
            ),
            (
                "min_samples_split".to_string(),
                self.min_samples_split.to_string(),
            ),
            (
                "min_samples_leaf".to_string(),
                self.min_samples_leaf.to_string(),
            ),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
}

impl BoostingParams {
    pub fn describe(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("n_estimators".to_string(), self.n_estimators.to_string()),
            ("learning_rate".to_string(), self.learning_rate.to_string()),
            ("max_depth".to_string(), self.max_depth.to_string()),
        ])
    }
}

/// Bagged ensemble: each tree is grown on a bootstrap sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(x: ArrayView2<f64>, y: &[f64], params: ForestParams, seed: u64) -> Self {
        let n = y.len();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
        };
        // per-tree seeds are drawn up front so parallel fitting stays reproducible
        let mut rng = StdRng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..params.n_estimators.max(1)).map(|_| rng.gen()).collect();
        let trees = seeds
            .into_par_iter()
            .map(|tree_seed| {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n.max(1))).collect();
                RegressionTree::fit(x, y, &sample, tree_params)
            })
            .collect();
        Self { params, trees }
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let count = self.trees.len() as f64;
        x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / count)
            .collect()
    }
}

/// Least-squares gradient boosting starting from the target mean.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoosting {
    params: BoostingParams,
    init: f64,
    stages: Vec<RegressionTree>,
}

impl GradientBoosting {
    pub fn fit(x: ArrayView2<f64>, y: &[f64], params: BoostingParams) -> Self {
        let n = y.len();
        let init = if n == 0 {
            0.0
        } else {
            y.iter().sum::<f64>() / n as f64
        };
        let tree_params = TreeParams {
            max_depth: Some(params.max_depth),
            ..TreeParams::default()
        };
        let rows: Vec<usize> = (0..n).collect();
        let mut current = vec![init; n];
        let mut stages = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let tree = RegressionTree::fit(x, &residuals, &rows, tree_params);
            for (i, row) in x.rows().into_iter().enumerate() {
                current[i] += params.learning_rate * tree.predict_row(row);
            }
            stages.push(tree);
        }
        Self {
            params,
            init,
            stages,
        }
    }

    pub fn params(&self) -> BoostingParams {
        self.params
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                self.init
                    + self
                        .stages
                        .iter()
                        .map(|t| self.params.learning_rate * t.predict_row(row))
                        .sum::<f64>()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FittedRegressor {
    Forest(RandomForest),
    Boosting(GradientBoosting),
}

impl FittedRegressor {
    pub fn name(&self) -> &'static str {
        match self {
            FittedRegressor::Forest(_) => FOREST_NAME,
            FittedRegressor::Boosting(_) => BOOSTING_NAME,
        }
    }

    pub fn hyperparameters(&self) -> BTreeMap<String, String> {
        match self {
            FittedRegressor::Forest(model) => model.params().describe(),
            FittedRegressor::Boosting(model) => model.params().describe(),
        }
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        match self {
            FittedRegressor::Forest(model) => model.predict(x),
            FittedRegressor::Boosting(model) => model.predict(x),
        }
    }
}

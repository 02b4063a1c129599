use std::collections::BTreeMap;

use ndarray::Array2;

use crate::error::TrainingError;
use crate::models::{FeatureRow, CATEGORICAL_FEATURES, NUMERIC_FEATURES};

/// Shared feature transform: categorical columns are imputed with the most
/// frequent training value and one-hot encoded (unseen categories encode as all
/// zeros); numeric columns are imputed with the training median and standardized.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTransform {
    categories: [Vec<String>; 3],
    modes: [String; 3],
    medians: [f64; 5],
    means: [f64; 5],
    scales: [f64; 5],
}

fn is_missing(value: &str) -> bool {
    value.trim().is_empty()
}

/// Most frequent value; ties go to the lexically smallest.
fn most_frequent<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

impl FeatureTransform {
    pub fn fit(rows: &[FeatureRow]) -> Result<Self, TrainingError> {
        if rows.is_empty() {
            return Err(TrainingError::InsufficientData(
                "cannot fit feature transform on zero rows".into(),
            ));
        }

        let mut categories: [Vec<String>; 3] = Default::default();
        let mut modes: [String; 3] = Default::default();
        for (i, name) in CATEGORICAL_FEATURES.iter().enumerate() {
            let present = rows
                .iter()
                .map(|row| row.categorical[i].as_str())
                .filter(|value| !is_missing(value));
            let mode = most_frequent(present).ok_or_else(|| {
                TrainingError::Fit(format!("categorical feature '{name}' has no values"))
            })?;
            let mut seen: Vec<String> = rows
                .iter()
                .map(|row| {
                    if is_missing(&row.categorical[i]) {
                        mode.clone()
                    } else {
                        row.categorical[i].clone()
                    }
                })
                .collect();
            seen.sort();
            seen.dedup();
            categories[i] = seen;
            modes[i] = mode;
        }

        let mut medians = [0.0; 5];
        let mut means = [0.0; 5];
        let mut scales = [1.0; 5];
        for (i, name) in NUMERIC_FEATURES.iter().enumerate() {
            let mut present: Vec<f64> = rows
                .iter()
                .map(|row| row.numeric[i])
                .filter(|value| value.is_finite())
                .collect();
            let fill = median(&mut present).ok_or_else(|| {
                TrainingError::Fit(format!("numeric feature '{name}' has no values"))
            })?;
            let imputed: Vec<f64> = rows
                .iter()
                .map(|row| {
                    if row.numeric[i].is_finite() {
                        row.numeric[i]
                    } else {
                        fill
                    }
                })
                .collect();
            let n = imputed.len() as f64;
            let mean = imputed.iter().sum::<f64>() / n;
            let variance = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            medians[i] = fill;
            means[i] = mean;
            scales[i] = if std > f64::EPSILON { std } else { 1.0 };
        }

        Ok(Self {
            categories,
            modes,
            medians,
            means,
            scales,
        })
    }

    pub fn width(&self) -> usize {
        self.categories.iter().map(Vec::len).sum::<usize>() + NUMERIC_FEATURES.len()
    }

    /// Column names of the encoded matrix (`gender=female`, ..., `age`, ...).
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = CATEGORICAL_FEATURES
            .iter()
            .zip(&self.categories)
            .flat_map(|(name, values)| values.iter().map(move |value| format!("{name}={value}")))
            .collect();
        names.extend(NUMERIC_FEATURES.iter().map(|name| name.to_string()));
        names
    }

    pub fn transform(&self, rows: &[FeatureRow]) -> Array2<f64> {
        let mut out = Array2::zeros((rows.len(), self.width()));
        for (r, row) in rows.iter().enumerate() {
            let mut offset = 0;
            for i in 0..CATEGORICAL_FEATURES.len() {
                let value = if is_missing(&row.categorical[i]) {
                    self.modes[i].as_str()
                } else {
                    row.categorical[i].as_str()
                };
                if let Ok(position) = self.categories[i].binary_search_by(|c| c.as_str().cmp(value))
                {
                    out[[r, offset + position]] = 1.0;
                }
                offset += self.categories[i].len();
            }
            for i in 0..NUMERIC_FEATURES.len() {
                let value = if row.numeric[i].is_finite() {
                    row.numeric[i]
                } else {
                    self.medians[i]
                };
                out[[r, offset + i]] = (value - self.means[i]) / self.scales[i];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(gender: &str, extra: &str, age: f64, study: f64) -> FeatureRow {
        FeatureRow {
            categorical: [gender.into(), "college".into(), extra.into()],
            numeric: [age, study, 2.0, 7.0, 80.0],
        }
    }

    #[test]
    fn one_hot_ignores_unknown_categories() {
        let transform = FeatureTransform::fit(&[
            row("female", "yes", 16.0, 1.0),
            row("male", "no", 18.0, 3.0),
        ])
        .unwrap();
        assert_eq!(
            transform.feature_names(),
            vec![
                "gender=female",
                "gender=male",
                "parental_education=college",
                "extracurricular=no",
                "extracurricular=yes",
                "age",
                "study_time_hours",
                "absences",
                "sleep_hours",
                "previous_grade",
            ]
        );
        let encoded = transform.transform(&[row("other", "yes", 17.0, 2.0)]);
        assert_eq!(encoded.row(0).to_vec()[..5].to_vec(), vec![0.0, 0.0, 1.0, 0.0, 1.0]);
        assert_eq!(encoded[[0, 5]], 0.0);
        assert_eq!(encoded[[0, 6]], 0.0);
    }

    #[test]
    fn numeric_columns_are_standardized() {
        let transform = FeatureTransform::fit(&[
            row("female", "yes", 14.0, 1.0),
            row("female", "yes", 18.0, 1.0),
        ])
        .unwrap();
        let encoded = transform.transform(&[row("female", "yes", 18.0, 1.0)]);
        assert!((encoded[[0, 3]] - 1.0).abs() < 1e-12);
        // constant column keeps unit scale
        assert_eq!(encoded[[0, 4]], 0.0);
    }

    #[test]
    fn missing_values_are_imputed() {
        let transform = FeatureTransform::fit(&[
            row("male", "no", 16.0, 1.0),
            row("male", "no", 17.0, 2.0),
            row("female", "", f64::NAN, 9.0),
        ])
        .unwrap();
        let encoded = transform.transform(&[row("", "", f64::NAN, 2.0)]);
        let expected = transform.transform(&[row("male", "no", 16.5, 2.0)]);
        assert_eq!(encoded, expected);
    }

    #[test]
    fn most_frequent_breaks_ties_lexically() {
        let values = ["b", "a", "b", "a", "c"];
        assert_eq!(most_frequent(values.into_iter()), Some("a".to_string()));
        assert!(FeatureTransform::fit(&[]).is_err());
    }
}

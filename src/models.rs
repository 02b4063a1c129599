use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CATEGORICAL_FEATURES: [&str; 3] = ["gender", "parental_education", "extracurricular"];
pub const NUMERIC_FEATURES: [&str; 5] = [
    "age",
    "study_time_hours",
    "absences",
    "sleep_hours",
    "previous_grade",
];

/// Input features in the order callers supply them.
pub const INPUT_FEATURES: [&str; 8] = [
    "age",
    "gender",
    "study_time_hours",
    "absences",
    "parental_education",
    "extracurricular",
    "sleep_hours",
    "previous_grade",
];

pub const AGE_RANGE: (f64, f64) = (12.0, 25.0);
pub const STUDY_TIME_RANGE: (f64, f64) = (0.0, 12.0);
pub const ABSENCES_RANGE: (f64, f64) = (0.0, 30.0);
pub const SLEEP_RANGE: (f64, f64) = (4.0, 12.0);
pub const GRADE_RANGE: (f64, f64) = (0.0, 100.0);

pub fn normalize_category(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn clip(value: f64, range: (f64, f64)) -> f64 {
    value.clamp(range.0, range.1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalStudentRecord {
    pub age: u32,
    pub gender: String,
    pub study_time_hours: f64,
    pub absences: u32,
    pub parental_education: String,
    pub extracurricular: String,
    pub sleep_hours: f64,
    pub previous_grade: f64,
    pub final_grade: Option<f64>,
}

impl CanonicalStudentRecord {
    /// Lower-cases and trims every categorical field. Idempotent.
    pub fn normalized(mut self) -> Self {
        self.gender = normalize_category(&self.gender);
        self.parental_education = normalize_category(&self.parental_education);
        self.extracurricular = normalize_category(&self.extracurricular);
        self
    }

    pub fn features(&self) -> FeatureRow {
        FeatureRow {
            categorical: [
                self.gender.clone(),
                self.parental_education.clone(),
                self.extracurricular.clone(),
            ],
            numeric: [
                f64::from(self.age),
                self.study_time_hours,
                f64::from(self.absences),
                self.sleep_hours,
                self.previous_grade,
            ],
        }
    }
}

/// Model-boundary view of a record. Empty strings and NaN mark missing values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub categorical: [String; 3],
    pub numeric: [f64; 5],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub age: i64,
    pub gender: String,
    pub study_time_hours: f64,
    pub absences: i64,
    pub parental_education: String,
    pub previous_grade: f64,
    pub extracurricular: String,
    pub sleep_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub predicted_grade: f64,
    pub performance_level: PerformanceLevel,
    pub confidence_score: f64,
    pub model_used: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceLevel {
    Excellent,
    #[serde(rename = "Very Good")]
    VeryGood,
    Good,
    Satisfactory,
    #[serde(rename = "At Risk")]
    AtRisk,
}

impl PerformanceLevel {
    pub fn label(self) -> &'static str {
        match self {
            PerformanceLevel::Excellent => "Excellent",
            PerformanceLevel::VeryGood => "Very Good",
            PerformanceLevel::Good => "Good",
            PerformanceLevel::Satisfactory => "Satisfactory",
            PerformanceLevel::AtRisk => "At Risk",
        }
    }
}

impl fmt::Display for PerformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetrics {
    pub model_name: String,
    pub r2_score: f64,
    pub rmse: f64,
    pub mae: f64,
    pub cv_r2_score: f64,
    pub training_samples: usize,
    pub test_samples: usize,
    pub hyperparameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub metrics: ModelMetrics,
    pub features: Vec<String>,
    pub encoded_features: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
}

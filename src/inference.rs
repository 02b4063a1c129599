use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    clip, normalize_category, FeatureRow, PerformanceLevel, PredictionRequest, ABSENCES_RANGE,
    AGE_RANGE, GRADE_RANGE, SLEEP_RANGE, STUDY_TIME_RANGE,
};

pub fn performance_level(grade: f64) -> PerformanceLevel {
    match grade {
        g if g >= 90.0 => PerformanceLevel::Excellent,
        g if g >= 80.0 => PerformanceLevel::VeryGood,
        g if g >= 70.0 => PerformanceLevel::Good,
        g if g >= 60.0 => PerformanceLevel::Satisfactory,
        _ => PerformanceLevel::AtRisk,
    }
}

/// Heuristic confidence from the model's test RMSE and the request profile.
pub fn confidence_score(rmse: f64, request: &PredictionRequest) -> f64 {
    let mut score = (1.0 - rmse / 40.0).max(0.5);
    if request.study_time_hours >= 3.0 {
        score += 0.05;
    }
    if request.sleep_hours >= 7.0 {
        score += 0.03;
    }
    if request.absences > 10 {
        score -= 0.08;
    }
    score.clamp(0.5, 0.95)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Clipped grade and its level. The level is bucketed before rounding, so a raw
/// 89.996 reports as 90.0 with `Very Good`.
pub fn grade_and_level(raw: f64) -> (f64, PerformanceLevel) {
    let grade = clip(raw, GRADE_RANGE);
    (grade, performance_level(grade))
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ServiceError {
    ServiceError::Validation {
        field,
        reason: reason.into(),
    }
}

fn check_range(field: &'static str, value: f64, low: f64, high: f64) -> ServiceResult<()> {
    if !value.is_finite() {
        return Err(invalid(field, "must be a finite number"));
    }
    if value < low || value > high {
        return Err(invalid(field, format!("must be between {low} and {high}, got {value}")));
    }
    Ok(())
}

impl PredictionRequest {
    pub fn validate(&self) -> ServiceResult<()> {
        check_range("age", self.age as f64, 5.0, 100.0)?;
        check_range("study_time_hours", self.study_time_hours, 0.0, 24.0)?;
        if self.absences < 0 {
            return Err(invalid("absences", "must not be negative"));
        }
        check_range("previous_grade", self.previous_grade, 0.0, 100.0)?;
        check_range("sleep_hours", self.sleep_hours, 0.0, 24.0)?;
        for (field, value) in [
            ("gender", &self.gender),
            ("parental_education", &self.parental_education),
            ("extracurricular", &self.extracurricular),
        ] {
            if normalize_category(value).is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        let extracurricular = normalize_category(&self.extracurricular);
        if extracurricular != "yes" && extracurricular != "no" {
            return Err(invalid("extracurricular", "must be 'yes' or 'no'"));
        }
        Ok(())
    }

    pub fn normalized(&self) -> Self {
        Self {
            gender: normalize_category(&self.gender),
            parental_education: normalize_category(&self.parental_education),
            extracurricular: normalize_category(&self.extracurricular),
            ..self.clone()
        }
    }

    /// Model input with categoricals normalized and numerics clipped to the canonical ranges.
    pub fn features(&self) -> FeatureRow {
        let normalized = self.normalized();
        FeatureRow {
            categorical: [
                normalized.gender,
                normalized.parental_education,
                normalized.extracurricular,
            ],
            numeric: [
                clip(self.age as f64, AGE_RANGE).round(),
                clip(self.study_time_hours, STUDY_TIME_RANGE),
                clip(self.absences as f64, ABSENCES_RANGE).round(),
                clip(self.sleep_hours, SLEEP_RANGE),
                clip(self.previous_grade, GRADE_RANGE),
            ],
        }
    }
}

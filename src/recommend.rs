//! Improvement recommendations: a best-effort generative provider composed with
//! a deterministic rule list that always answers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::models::{normalize_category, PerformanceLevel, PredictionRequest};

const MAX_RECOMMENDATIONS: usize = 6;

#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recommend(
        &self,
        request: &PredictionRequest,
        predicted_grade: f64,
        level: PerformanceLevel,
    ) -> anyhow::Result<Vec<String>>;
}

/// Provider used when no credential is configured; always unavailable.
#[derive(Debug, Default)]
pub struct NullProvider;

#[async_trait]
impl RecommendationProvider for NullProvider {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn recommend(
        &self,
        _request: &PredictionRequest,
        _predicted_grade: f64,
        _level: PerformanceLevel,
    ) -> anyhow::Result<Vec<String>> {
        bail!("no recommendation provider configured")
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Generative-language REST provider (`models/{model}:generateContent`).
pub struct ExternalProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ExternalProvider {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("failed to build recommendation HTTP client")?;
        let endpoint: String = endpoint.into();
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }
}

pub fn build_prompt(request: &PredictionRequest, predicted_grade: f64, level: PerformanceLevel) -> String {
    format!(
        "You are an academic advisor. Given the student's profile and predicted grade, \
         provide 4-6 specific, actionable, and personalized recommendations to improve or \
         sustain performance. Return only bullet points without numbering.\n\n\
         Profile: age={}, gender='{}', study_time_hours={}, absences={}, \
         parental_education='{}', previous_grade={}, extracurricular='{}', sleep_hours={}.\n\
         Predicted grade: {:.1}/100, Performance level: {}.",
        request.age,
        request.gender,
        request.study_time_hours,
        request.absences,
        request.parental_education,
        request.previous_grade,
        request.extracurricular,
        request.sleep_hours,
        predicted_grade,
        level
    )
}

/// Joined text of the first candidate's parts.
fn response_text(response: GenerateResponse) -> anyhow::Result<String> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("recommendation response had no candidates"))?
        .content
        .ok_or_else(|| anyhow!("recommendation candidate had no content"))?;
    let text = content
        .parts
        .into_iter()
        .map(|part| part.text)
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() {
        bail!("recommendation response text was empty");
    }
    Ok(text)
}

/// Splits generated text into at most six bullet lines.
pub fn parse_bullets(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim_matches(|c: char| matches!(c, '-' | '•' | '*' | ' ')).trim())
        .filter(|line| !line.is_empty())
        .take(MAX_RECOMMENDATIONS)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl RecommendationProvider for ExternalProvider {
    fn name(&self) -> &'static str {
        "generative"
    }

    async fn recommend(
        &self,
        request: &PredictionRequest,
        predicted_grade: f64,
        level: PerformanceLevel,
    ) -> anyhow::Result<Vec<String>> {
        let prompt = build_prompt(request, predicted_grade, level);
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
        };
        let response: GenerateResponse = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("recommendation request failed")?
            .error_for_status()
            .context("recommendation provider returned an error status")?
            .json()
            .await
            .context("recommendation response was not valid JSON")?;

        Ok(parse_bullets(&response_text(response)?))
    }
}

/// Deterministic fallback, evaluated in a fixed order.
pub fn rule_based(request: &PredictionRequest, predicted_grade: f64) -> Vec<String> {
    let mut recs = Vec::new();
    if request.study_time_hours < 2.0 {
        recs.push("Increase daily study time to at least 2-3 hours.");
    }
    if request.absences > 10 {
        recs.push("Reduce class absences to improve concept retention.");
    }
    if request.sleep_hours < 7.0 {
        recs.push("Aim for 7-9 hours of sleep for better cognitive performance.");
    }
    if normalize_category(&request.extracurricular) == "no" {
        recs.push("Consider joining extracurriculars to build motivation and soft skills.");
    }
    if request.previous_grade < 70.0 {
        recs.push("Seek tutoring to strengthen foundational topics from previous courses.");
    }
    if predicted_grade < 70.0 {
        recs.push("Meet advisors to craft a personalized improvement plan.");
    }
    if recs.is_empty() {
        recs.push("Keep up the great work and maintain your current study habits.");
        recs.push("Challenge yourself with advanced coursework or projects.");
    }
    recs.into_iter().map(str::to_string).collect()
}

pub struct RecommendationEngine {
    provider: Arc<dyn RecommendationProvider>,
    timeout: Duration,
}

impl RecommendationEngine {
    pub fn new(provider: Arc<dyn RecommendationProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Picks the provider once: external when a credential is configured.
    pub fn from_settings(settings: &Settings) -> Self {
        let timeout = settings.recommendation_timeout();
        let key = settings
            .recommendation_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        let provider: Arc<dyn RecommendationProvider> = match key {
            Some(key) => match ExternalProvider::new(
                &settings.recommendation_endpoint,
                &settings.recommendation_model,
                key,
                timeout,
            ) {
                Ok(provider) => Arc::new(provider),
                Err(err) => {
                    warn!(error = %err, "generative recommendations disabled");
                    Arc::new(NullProvider)
                }
            },
            None => Arc::new(NullProvider),
        };
        Self::new(provider, timeout)
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn recommend(
        &self,
        request: &PredictionRequest,
        predicted_grade: f64,
        level: PerformanceLevel,
    ) -> Vec<String> {
        let attempt = tokio::time::timeout(
            self.timeout,
            self.provider.recommend(request, predicted_grade, level),
        )
        .await;
        match attempt {
            Ok(Ok(recs)) if !recs.is_empty() => return recs,
            Ok(Ok(_)) => debug!(provider = self.provider.name(), "provider returned no recommendations"),
            Ok(Err(err)) => debug!(provider = self.provider.name(), error = %err, "provider unavailable"),
            Err(_) => warn!(
                provider = self.provider.name(),
                timeout_secs = self.timeout.as_secs_f64(),
                "recommendation provider timed out"
            ),
        }
        rule_based(request, predicted_grade)
    }
}

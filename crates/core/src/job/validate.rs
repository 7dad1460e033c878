//! Synchronous validation of submission requests.
//!
//! Everything here runs before a job exists, so a rejected request never
//! reaches the coordinator's background work.

use serde::Deserialize;
use thiserror::Error;

use super::types::{ImageFormat, JobParams};

/// A submission exactly as received from a client, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub url: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_quality")]
    pub quality: i64,
    #[serde(default = "default_ratio")]
    pub ratio: f64,
    #[serde(default)]
    pub grayscale: bool,
}

fn default_format() -> String {
    "jpeg".to_string()
}

fn default_quality() -> i64 {
    100
}

fn default_ratio() -> f64 {
    1.0
}

/// A rejected submission parameter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl SubmitRequest {
    /// Validates every field and returns the source URL with resolved parameters.
    pub fn validate(&self) -> Result<(String, JobParams), ValidationError> {
        let url = validate_source_url(&self.url)?;
        let format = self
            .format
            .parse::<ImageFormat>()
            .map_err(|e| ValidationError::new("format", e))?;
        let params = JobParams {
            format,
            quality: validate_quality(self.quality)?,
            ratio: validate_ratio(self.ratio)?,
            grayscale: self.grayscale,
        };
        Ok((url, params))
    }
}

/// Validates an already-typed parameter set (for callers that bypass `SubmitRequest`).
pub fn validate_params(params: &JobParams) -> Result<(), ValidationError> {
    validate_quality(params.quality as i64)?;
    validate_ratio(params.ratio)?;
    Ok(())
}

/// Only absolute http(s) URLs with a host are accepted.
pub fn validate_source_url(url: &str) -> Result<String, ValidationError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ValidationError::new("url", "must not be empty"));
    }
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ValidationError::new("url", e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ValidationError::new(
                "url",
                format!("unsupported protocol '{}'", other),
            ))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::new("url", "missing host"));
    }
    Ok(parsed.to_string())
}

fn validate_quality(quality: i64) -> Result<u8, ValidationError> {
    if !(0..=100).contains(&quality) {
        return Err(ValidationError::new(
            "quality",
            format!("{} is outside 0-100", quality),
        ));
    }
    Ok(quality as u8)
}

fn validate_ratio(ratio: f64) -> Result<f64, ValidationError> {
    if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
        return Err(ValidationError::new(
            "ratio",
            format!("{} is outside (0, 1]", ratio),
        ));
    }
    Ok(ratio)
}

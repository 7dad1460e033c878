//! Core job data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Identity
// ============================================================================

/// Opaque, unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Target encoding for re-emitted images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// Lossy, stored as `DCTDecode`.
    #[serde(alias = "jpg")]
    Jpeg,
    /// Lossless, stored as Flate-compressed samples.
    Png,
}

impl ImageFormat {
    /// Whether the quality parameter has any effect for this format.
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Jpeg)
    }

    /// The PDF stream filter used to store images in this format.
    pub fn pdf_filter(&self) -> &'static str {
        match self {
            Self::Jpeg => "DCTDecode",
            Self::Png => "FlateDecode",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(format!("unknown image format '{}'", other)),
        }
    }
}

/// Fully-resolved transform parameters for one job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    pub format: ImageFormat,
    /// 0-100, ignored for lossless formats.
    pub quality: u8,
    /// Resize ratio applied to both dimensions, 0 < ratio <= 1.
    pub ratio: f64,
    pub grayscale: bool,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: 100,
            ratio: 1.0,
            grayscale: false,
        }
    }
}

// ============================================================================
// Phase state machine
// ============================================================================

/// Coarse-grained stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Queued,
    Fetching,
    Transforming,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Forward steps are one at a time; `Failed` is reachable from any
    /// non-terminal phase.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        match (self, next) {
            (Self::Queued, Self::Fetching) => true,
            (Self::Fetching, Self::Transforming) => true,
            (Self::Transforming, Self::Completed) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Transforming => "transforming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Share of the overall progress bar that precedes this phase, and the
    /// share this phase covers. Fetching maps to 0-50, transforming to 50-100.
    fn overall_window(&self) -> (f32, f32) {
        match self {
            Self::Queued => (0.0, 0.0),
            Self::Fetching => (0.0, 50.0),
            Self::Transforming => (50.0, 50.0),
            Self::Completed => (100.0, 0.0),
            Self::Failed => (0.0, 0.0),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error classification carried by failed jobs and terminal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Fetch,
    Transform,
    NotFound,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Fetch => "fetch",
            Self::Transform => "transform",
            Self::NotFound => "not_found",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted a transition the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid phase transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: Phase,
    pub to: Phase,
}

// ============================================================================
// Job
// ============================================================================

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// The artifact produced by a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Download filename, `<source stem>_converted.pdf`.
    pub filename: String,
    /// Location inside the job's working directory.
    #[serde(skip)]
    pub path: PathBuf,
    pub original_bytes: u64,
    pub output_bytes: u64,
    /// `(1 - output / original) * 100`, two decimals. Negative when the output grew.
    pub compression_percent: f64,
    pub images_transformed: usize,
}

impl JobResult {
    pub fn compression_percent(original_bytes: u64, output_bytes: u64) -> f64 {
        if original_bytes == 0 {
            return 0.0;
        }
        let ratio = 1.0 - (output_bytes as f64 / original_bytes as f64);
        (ratio * 100.0 * 100.0).round() / 100.0
    }
}

/// One compression request and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source_url: String,
    pub params: JobParams,
    pub phase: Phase,
    /// Fraction (0.0-1.0) of the current phase.
    pub progress: f32,
    /// Whole-job percentage (0-100).
    pub overall: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a job in the `queued` phase.
    pub fn new(source_url: impl Into<String>, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            source_url: source_url.into(),
            params,
            phase: Phase::Queued,
            progress: 0.0,
            overall: 0.0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Moves to the next non-terminal or completed phase, resetting phase progress.
    pub fn advance_to(&mut self, next: Phase) -> Result<(), InvalidTransition> {
        if next == Phase::Failed || !self.phase.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.progress = if next == Phase::Completed { 1.0 } else { 0.0 };
        self.touch();
        Ok(())
    }

    /// Records progress within the current phase.
    ///
    /// Progress never moves backwards; returns false when nothing changed or
    /// the job is terminal.
    pub fn set_progress(&mut self, fraction: f32) -> bool {
        if self.is_terminal() || !fraction.is_finite() {
            return false;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= self.progress {
            return false;
        }
        self.progress = fraction;
        self.touch();
        true
    }

    pub fn complete(&mut self, result: JobResult) -> Result<(), InvalidTransition> {
        self.advance_to(Phase::Completed)?;
        self.result = Some(result);
        self.finished_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> Result<(), InvalidTransition> {
        if !self.phase.can_transition_to(Phase::Failed) {
            return Err(InvalidTransition {
                from: self.phase,
                to: Phase::Failed,
            });
        }
        // Failed keeps the overall percentage reached so far.
        self.phase = Phase::Failed;
        self.error = Some(JobFailure {
            kind,
            message: message.into(),
        });
        self.updated_at = Utc::now();
        self.finished_at = Some(self.updated_at);
        Ok(())
    }

    fn touch(&mut self) {
        let (base, span) = self.phase.overall_window();
        self.overall = (base + span * self.progress).max(self.overall);
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Progress events
// ============================================================================

/// An ordered notification of incremental progress or terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub phase: Phase,
    pub progress: f32,
    #[serde(default)]
    pub message: Option<String>,
    /// Strictly increasing per job, starting at 1.
    pub seq: u64,
    pub overall: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Synthetic event rebuilt from the job snapshot for a newly attached subscriber.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replay: bool,
}

impl ProgressEvent {
    /// Builds an event reflecting the given job state.
    pub fn from_job(job: &Job, seq: u64, message: Option<String>) -> Self {
        let message = message.or_else(|| job.error.as_ref().map(|e| e.message.clone()));
        Self {
            job_id: job.id.clone(),
            phase: job.phase,
            progress: job.progress,
            message,
            seq,
            overall: job.overall,
            error_kind: job.error.as_ref().map(|e| e.kind),
            result: job.result.clone(),
            replay: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

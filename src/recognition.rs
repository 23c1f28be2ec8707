//! Recognition service contract and the records it produces.

use anyhow::Result;
use std::fmt;

use crate::geometry::NormalizedBox;

/// Opaque identifier of one asynchronous recognition job.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal status reported in a job notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "SUCCEEDED" => JobStatus::Succeeded,
            "FAILED" => JobStatus::Failed,
            other => JobStatus::Other(other.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Succeeded => f.write_str("SUCCEEDED"),
            JobStatus::Failed => f.write_str("FAILED"),
            JobStatus::Other(raw) => f.write_str(raw),
        }
    }
}

/// One subject recognised at one timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub subject_name: String,
    /// Offset from the start of the video, in milliseconds.
    pub timestamp_ms: u64,
    pub bounding_box: NormalizedBox,
    /// Recognition confidence in percent, when the service reports one.
    pub confidence: Option<f32>,
}

/// Properties of the analysed video, as reported with the results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VideoMetadata {
    pub codec: Option<String>,
    pub duration_ms: Option<u64>,
    pub format: Option<String>,
    pub frame_rate: Option<f64>,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
}

/// Location of the stored video a job analyses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoRef {
    pub bucket: String,
    pub key: String,
}

/// Where the service publishes the completion notification, and the role
/// that allows it to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationChannel {
    pub topic_arn: String,
    pub role_arn: String,
}

/// A single page of job results.
#[derive(Clone, Debug, Default)]
pub struct ResultsPage {
    pub detections: Vec<Detection>,
    pub video_metadata: Option<VideoMetadata>,
    pub next_token: Option<String>,
}

/// A face recognised in a still image.
#[derive(Clone, Debug, PartialEq)]
pub struct CelebrityFace {
    pub name: String,
    pub match_confidence: f32,
    pub bounding_box: NormalizedBox,
}

/// Remote celebrity recognition service.
pub trait RecognitionService {
    /// Start an asynchronous job against a stored video.
    fn start_job(&self, video: &VideoRef, channel: &NotificationChannel) -> Result<JobHandle>;

    /// Fetch one page of results. `next_token` is `None` for the first page.
    fn results_page(
        &self,
        job: &JobHandle,
        page_size: u32,
        next_token: Option<&str>,
    ) -> Result<ResultsPage>;

    /// Recognise celebrities in an encoded still image.
    fn recognize_image(&self, image_bytes: &[u8]) -> Result<Vec<CelebrityFace>>;
}

use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{regional_endpoint, Credentials, JsonProtocolClient};
use crate::geometry::NormalizedBox;
use crate::recognition::{
    CelebrityFace, Detection, JobHandle, NotificationChannel, RecognitionService, ResultsPage,
    VideoMetadata, VideoRef,
};

const TARGET_PREFIX: &str = "RekognitionService";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Rekognition celebrity recognition client.
#[derive(Clone, Debug)]
pub struct RekognitionClient {
    inner: JsonProtocolClient,
}

impl RekognitionClient {
    pub fn new(credentials: Credentials, region: &str, endpoint: Option<Url>) -> Result<Self> {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => regional_endpoint("rekognition", region)?,
        };
        Ok(Self {
            inner: JsonProtocolClient::new(
                credentials,
                endpoint,
                region,
                "rekognition",
                TARGET_PREFIX,
                CONTENT_TYPE,
            ),
        })
    }
}

impl RecognitionService for RekognitionClient {
    fn start_job(&self, video: &VideoRef, channel: &NotificationChannel) -> Result<JobHandle> {
        let request = StartRequest {
            video: VideoWire {
                s3_object: S3ObjectWire {
                    bucket: &video.bucket,
                    name: &video.key,
                },
            },
            notification_channel: ChannelWire {
                sns_topic_arn: &channel.topic_arn,
                role_arn: &channel.role_arn,
            },
        };
        let response: StartResponse = self.inner.call("StartCelebrityRecognition", &request)?;
        Ok(JobHandle::new(response.job_id))
    }

    fn results_page(
        &self,
        job: &JobHandle,
        page_size: u32,
        next_token: Option<&str>,
    ) -> Result<ResultsPage> {
        let request = GetRequest {
            job_id: job.as_str(),
            max_results: page_size,
            next_token,
        };
        let response: GetResponse = self.inner.call("GetCelebrityRecognition", &request)?;
        Ok(response.into_page())
    }

    fn recognize_image(&self, image_bytes: &[u8]) -> Result<Vec<CelebrityFace>> {
        let request = RecognizeRequest {
            image: ImageWire {
                bytes: base64::engine::general_purpose::STANDARD.encode(image_bytes),
            },
        };
        let response: RecognizeResponse = self.inner.call("RecognizeCelebrities", &request)?;
        Ok(response.into_faces())
    }
}

/// Parse a raw `GetCelebrityRecognition` response body.
pub fn parse_results_page(body: &str) -> Result<ResultsPage> {
    let response: GetResponse =
        serde_json::from_str(body).context("parse GetCelebrityRecognition response")?;
    Ok(response.into_page())
}

/// Parse a raw `RecognizeCelebrities` response body.
pub fn parse_recognize_response(body: &str) -> Result<Vec<CelebrityFace>> {
    let response: RecognizeResponse =
        serde_json::from_str(body).context("parse RecognizeCelebrities response")?;
    Ok(response.into_faces())
}

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct StartRequest<'a> {
    #[serde(rename = "Video")]
    video: VideoWire<'a>,
    #[serde(rename = "NotificationChannel")]
    notification_channel: ChannelWire<'a>,
}

#[derive(Serialize)]
struct VideoWire<'a> {
    #[serde(rename = "S3Object")]
    s3_object: S3ObjectWire<'a>,
}

#[derive(Serialize)]
struct S3ObjectWire<'a> {
    #[serde(rename = "Bucket")]
    bucket: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
}

#[derive(Serialize)]
struct ChannelWire<'a> {
    #[serde(rename = "SNSTopicArn")]
    sns_topic_arn: &'a str,
    #[serde(rename = "RoleArn")]
    role_arn: &'a str,
}

#[derive(Deserialize)]
struct StartResponse {
    #[serde(rename = "JobId")]
    job_id: String,
}

#[derive(Serialize)]
struct GetRequest<'a> {
    #[serde(rename = "JobId")]
    job_id: &'a str,
    #[serde(rename = "MaxResults")]
    max_results: u32,
    #[serde(rename = "NextToken", skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetResponse {
    #[serde(default)]
    job_status: Option<String>,
    #[serde(default)]
    video_metadata: Option<VideoMetadataWire>,
    #[serde(default)]
    next_token: Option<String>,
    #[serde(default)]
    celebrities: Vec<CelebrityRecognitionWire>,
}

impl GetResponse {
    fn into_page(self) -> ResultsPage {
        if let Some(status) = self.job_status.as_deref() {
            log::debug!("results page reports job status {}", status);
        }
        ResultsPage {
            detections: self
                .celebrities
                .into_iter()
                .map(CelebrityRecognitionWire::into_detection)
                .collect(),
            video_metadata: self.video_metadata.map(VideoMetadataWire::into_metadata),
            next_token: self.next_token,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VideoMetadataWire {
    #[serde(default)]
    codec: Option<String>,
    #[serde(default)]
    duration_millis: Option<u64>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    frame_rate: Option<f64>,
    #[serde(default)]
    frame_height: Option<u32>,
    #[serde(default)]
    frame_width: Option<u32>,
}

impl VideoMetadataWire {
    fn into_metadata(self) -> VideoMetadata {
        VideoMetadata {
            codec: self.codec,
            duration_ms: self.duration_millis,
            format: self.format,
            frame_rate: self.frame_rate,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CelebrityRecognitionWire {
    timestamp: u64,
    celebrity: CelebrityDetailWire,
}

impl CelebrityRecognitionWire {
    fn into_detection(self) -> Detection {
        let celebrity = self.celebrity;
        let bounding_box = celebrity
            .face
            .and_then(|face| face.bounding_box)
            .or(celebrity.bounding_box)
            .unwrap_or_default();
        Detection {
            subject_name: celebrity.name,
            timestamp_ms: self.timestamp,
            bounding_box,
            confidence: celebrity.confidence,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CelebrityDetailWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    bounding_box: Option<NormalizedBox>,
    #[serde(default)]
    face: Option<FaceWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaceWire {
    #[serde(default)]
    bounding_box: Option<NormalizedBox>,
}

#[derive(Serialize)]
struct RecognizeRequest {
    #[serde(rename = "Image")]
    image: ImageWire,
}

#[derive(Serialize)]
struct ImageWire {
    #[serde(rename = "Bytes")]
    bytes: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognizeResponse {
    #[serde(default)]
    celebrity_faces: Vec<CelebrityFaceWire>,
}

impl RecognizeResponse {
    fn into_faces(self) -> Vec<CelebrityFace> {
        self.celebrity_faces
            .into_iter()
            .map(|face| CelebrityFace {
                name: face.name,
                match_confidence: face.match_confidence,
                bounding_box: face.face.and_then(|f| f.bounding_box).unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CelebrityFaceWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    match_confidence: f32,
    #[serde(default)]
    face: Option<FaceWire>,
}

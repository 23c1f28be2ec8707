use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::job::{WaitSettings, DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL};
use crate::overlay::OverlayStyle;
use crate::recognition::{NotificationChannel, VideoRef};
use crate::video::MAX_SAMPLED_FRAMES;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_OUTPUT_DIR: &str = ".";
const MAX_PAGE_SIZE: u32 = 1000;
const MAX_BATCH_SIZE: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct RunConfigFile {
    aws: Option<AwsConfigFile>,
    video: Option<VideoConfigFile>,
    notification: Option<NotificationConfigFile>,
    wait: Option<WaitConfigFile>,
    results: Option<ResultsConfigFile>,
    render: Option<RenderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct AwsConfigFile {
    region: Option<String>,
    rekognition_endpoint: Option<String>,
    sqs_endpoint: Option<String>,
    s3_endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    bucket: Option<String>,
    key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct NotificationConfigFile {
    role_arn: Option<String>,
    topic_arn: Option<String>,
    queue_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WaitConfigFile {
    poll_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    batch_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ResultsConfigFile {
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    max_frames: Option<usize>,
    output_dir: Option<PathBuf>,
    font_path: Option<PathBuf>,
    thickness: Option<u32>,
    label_px: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub aws: AwsSettings,
    pub video: VideoSettings,
    pub notification: NotificationSettings,
    pub wait: WaitSettings,
    pub page_size: u32,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub region: String,
    pub rekognition_endpoint: Option<Url>,
    pub sqs_endpoint: Option<Url>,
    pub s3_endpoint: Option<Url>,
}

#[derive(Debug, Clone, Default)]
pub struct VideoSettings {
    pub bucket: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    pub role_arn: Option<String>,
    pub topic_arn: Option<String>,
    pub queue_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub max_frames: usize,
    pub output_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    /// Video frames.
    pub style: OverlayStyle,
    /// Still images; configured thickness and label size override both.
    pub image_style: OverlayStyle,
}

/// Everything needed to submit and await one video job.
#[derive(Debug, Clone)]
pub struct VideoJobSpec {
    pub video: VideoRef,
    pub channel: NotificationChannel,
    pub queue_url: String,
}

impl RunConfig {
    /// Defaults, then the file named by `CELEB_CONFIG`, then environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CELEB_CONFIG").ok().filter(|p| !p.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => RunConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RunConfigFile) -> Result<Self> {
        let aws_file = file.aws.unwrap_or_default();
        let aws = AwsSettings {
            region: aws_file
                .region
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            rekognition_endpoint: parse_endpoint(aws_file.rekognition_endpoint.as_deref())?,
            sqs_endpoint: parse_endpoint(aws_file.sqs_endpoint.as_deref())?,
            s3_endpoint: parse_endpoint(aws_file.s3_endpoint.as_deref())?,
        };
        let video = file
            .video
            .map(|v| VideoSettings {
                bucket: v.bucket,
                key: v.key,
            })
            .unwrap_or_default();
        let notification = file
            .notification
            .map(|n| NotificationSettings {
                role_arn: n.role_arn,
                topic_arn: n.topic_arn,
                queue_url: n.queue_url,
            })
            .unwrap_or_default();
        let wait_file = file.wait.unwrap_or_default();
        let wait = WaitSettings {
            poll_interval: wait_file
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            batch_size: wait_file.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            timeout: wait_file.timeout_secs.map(Duration::from_secs),
        };
        let page_size = file
            .results
            .and_then(|r| r.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let render_file = file.render.unwrap_or_default();
        let defaults = OverlayStyle::default();
        let still = OverlayStyle::still_image();
        let render = RenderSettings {
            max_frames: render_file.max_frames.unwrap_or(MAX_SAMPLED_FRAMES),
            output_dir: render_file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            font_path: render_file.font_path,
            style: OverlayStyle {
                thickness: render_file.thickness.unwrap_or(defaults.thickness),
                label_px: render_file.label_px.unwrap_or(defaults.label_px),
                ..defaults
            },
            image_style: OverlayStyle {
                thickness: render_file.thickness.unwrap_or(still.thickness),
                label_px: render_file.label_px.unwrap_or(still.label_px),
                ..still
            },
        };
        Ok(Self {
            aws,
            video,
            notification,
            wait,
            page_size,
            render,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        for key in ["AWS_REGION", "AWS_DEFAULT_REGION"] {
            if let Some(region) = env_value(key) {
                self.aws.region = region;
                break;
            }
        }
        if let Some(bucket) = env_value("CELEB_BUCKET") {
            self.video.bucket = Some(bucket);
        }
        if let Some(key) = env_value("CELEB_VIDEO_KEY") {
            self.video.key = Some(key);
        }
        if let Some(role) = env_value("CELEB_ROLE_ARN") {
            self.notification.role_arn = Some(role);
        }
        if let Some(topic) = env_value("CELEB_TOPIC_ARN") {
            self.notification.topic_arn = Some(topic);
        }
        if let Some(queue) = env_value("CELEB_QUEUE_URL") {
            self.notification.queue_url = Some(queue);
        }
        if let Some(dir) = env_value("CELEB_OUTPUT_DIR") {
            self.render.output_dir = PathBuf::from(dir);
        }
        if let Some(font) = env_value("CELEB_FONT_PATH") {
            self.render.font_path = Some(PathBuf::from(font));
        }
        if let Some(secs) = env_value("CELEB_POLL_INTERVAL_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("CELEB_POLL_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.wait.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_value("CELEB_WAIT_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                anyhow!("CELEB_WAIT_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.wait.timeout = Some(Duration::from_secs(secs));
        }
        if let Some(frames) = env_value("CELEB_MAX_FRAMES") {
            self.render.max_frames = frames
                .parse()
                .map_err(|_| anyhow!("CELEB_MAX_FRAMES must be a positive integer"))?;
        }
        Ok(())
    }

    /// Check value ranges. Called by `load`, and again by callers that
    /// override fields afterwards.
    pub fn validate(&self) -> Result<()> {
        if self.aws.region.trim().is_empty() {
            return Err(anyhow!("aws region must not be empty"));
        }
        if self.wait.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.wait.batch_size) {
            return Err(anyhow!("batch size must be between 1 and {}", MAX_BATCH_SIZE));
        }
        if self.wait.timeout.is_some_and(|t| t.is_zero()) {
            return Err(anyhow!("wait timeout must be greater than zero"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(anyhow!("page size must be between 1 and {}", MAX_PAGE_SIZE));
        }
        if self.render.max_frames == 0 {
            return Err(anyhow!("max frames must be greater than zero"));
        }
        if self.render.style.thickness == 0 {
            return Err(anyhow!("box thickness must be greater than zero"));
        }
        Ok(())
    }

    /// The video and notification settings a job needs, all present.
    pub fn require_video_job(&self) -> Result<VideoJobSpec> {
        let require = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} is required for a video run", name))
        };
        Ok(VideoJobSpec {
            video: VideoRef {
                bucket: require(&self.video.bucket, "video bucket")?,
                key: require(&self.video.key, "video key")?,
            },
            channel: NotificationChannel {
                topic_arn: require(&self.notification.topic_arn, "notification topic arn")?,
                role_arn: require(&self.notification.role_arn, "notification role arn")?,
            },
            queue_url: require(&self.notification.queue_url, "queue url")?,
        })
    }
}

fn read_config_file(path: &Path) -> Result<RunConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_endpoint(raw: Option<&str>) -> Result<Option<Url>> {
    raw.filter(|r| !r.trim().is_empty())
        .map(|r| Url::parse(r).with_context(|| format!("invalid endpoint url {}", r)))
        .transpose()
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

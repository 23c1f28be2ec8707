//! End-to-end runs.
//!
//! `VideoPipeline::run` chains the stages of a video run: submit the job, wait
//! for its notification, collect the results, download the video, sample
//! frames and write annotated copies. `annotate_image` is the still-image
//! counterpart.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::job::{
    fetch_all_results, submit_job, CancelToken, Clock, CompletionWaiter, WaitOutcome,
    WaitSettings, DEFAULT_PAGE_SIZE,
};
use crate::overlay::{Annotation, Color, OverlayRenderer};
use crate::queue::NotificationQueue;
use crate::recognition::{
    Detection, JobHandle, NotificationChannel, RecognitionService, VideoMetadata, VideoRef,
};
use crate::store::{download_to_temp, key_suffix, ObjectStore};
use crate::ui::Ui;
use crate::video::{sample_frames, sample_timestamps, VideoOpener, MAX_SAMPLED_FRAMES};

/// Destination for rendered images.
pub trait ImageWriter {
    fn write(&self, path: &Path, image: &RgbImage) -> Result<()>;
}

/// Writes images to disk; the format follows the file extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsImageWriter;

impl ImageWriter for FsImageWriter {
    fn write(&self, path: &Path, image: &RgbImage) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output directory {}", parent.display()))?;
        }
        image
            .save(path)
            .with_context(|| format!("write image {}", path.display()))
    }
}

/// The services a video run talks to.
pub struct Collaborators<'a> {
    pub recognition: &'a dyn RecognitionService,
    pub queue: &'a dyn NotificationQueue,
    pub store: &'a dyn ObjectStore,
    pub opener: &'a dyn VideoOpener,
    pub writer: &'a dyn ImageWriter,
    pub clock: &'a dyn Clock,
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub wait: WaitSettings,
    pub page_size: u32,
    pub max_frames: usize,
    pub output_dir: PathBuf,
    /// Decode this local file (or `stub://` uri) instead of downloading the
    /// analysed object.
    pub local_video: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            wait: WaitSettings::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_frames: MAX_SAMPLED_FRAMES,
            output_dir: PathBuf::from("."),
            local_video: None,
        }
    }
}

/// One annotated frame written by a run.
#[derive(Clone, Debug)]
pub struct RenderedFrame {
    pub path: PathBuf,
    pub timestamp_ms: u64,
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub job: JobHandle,
    pub outcome: WaitOutcome,
    /// False when the job did not finish with a success status; nothing
    /// after the wait ran.
    pub job_succeeded: bool,
    pub detections: usize,
    pub video_metadata: Option<VideoMetadata>,
    pub frames: Vec<RenderedFrame>,
    /// Subject colors in first-seen order.
    pub legend: Vec<(String, Color)>,
    /// The cancel token was tripped; later stages did not run and `frames`
    /// may be partial.
    pub cancelled: bool,
}

impl RunReport {
    fn stopped(job: JobHandle, outcome: WaitOutcome) -> Self {
        Self {
            job,
            cancelled: outcome == WaitOutcome::Cancelled,
            outcome,
            job_succeeded: false,
            detections: 0,
            video_metadata: None,
            frames: Vec::new(),
            legend: Vec::new(),
        }
    }
}

pub struct VideoPipeline<'a> {
    services: Collaborators<'a>,
    settings: PipelineSettings,
    ui: Ui,
    cancel: CancelToken,
}

impl<'a> VideoPipeline<'a> {
    pub fn new(services: Collaborators<'a>, settings: PipelineSettings) -> Self {
        Self {
            services,
            settings,
            ui: Ui::plain(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_ui(mut self, ui: Ui) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(
        &self,
        video: &VideoRef,
        channel: &NotificationChannel,
        renderer: &mut OverlayRenderer,
    ) -> Result<RunReport> {
        let source = self
            .settings
            .local_video
            .clone()
            .unwrap_or_else(|| PathBuf::from(&video.key));
        self.services.opener.ensure_supported(&source)?;

        let job = {
            let _stage = self.ui.stage("Submit recognition job");
            submit_job(self.services.recognition, video, channel)?
        };

        let outcome = {
            let stage = self.ui.stage("Wait for job completion");
            stage.set_detail(job.as_str());
            CompletionWaiter::new(
                self.services.queue,
                self.services.clock,
                self.settings.wait.clone(),
            )
            .with_cancel(self.cancel.clone())
            .wait_for(&job)?
        };

        if !outcome.succeeded() {
            match &outcome {
                WaitOutcome::Finished(status) => {
                    log::error!("job {} finished with status {}", job, status)
                }
                WaitOutcome::TimedOut => log::error!("timed out waiting for job {}", job),
                WaitOutcome::Cancelled => log::warn!("stopped waiting for job {}", job),
            }
            return Ok(RunReport::stopped(job, outcome));
        }
        if self.stop_requested("collecting results") {
            return Ok(RunReport {
                job_succeeded: true,
                cancelled: true,
                ..RunReport::stopped(job, outcome)
            });
        }

        let results = {
            let _stage = self.ui.stage("Collect results");
            fetch_all_results(self.services.recognition, &job, self.settings.page_size)?
        };
        if let Some(metadata) = &results.video_metadata {
            log_metadata(metadata);
        }

        let timestamps = sample_timestamps(&results.detections, self.settings.max_frames);
        let mut frames = Vec::new();
        if timestamps.is_empty() {
            log::info!("no celebrities recognised; nothing to render");
        } else if !self.stop_requested("download") {
            frames = self.render_frames(video, &timestamps, &results.detections, renderer)?;
        }

        Ok(RunReport {
            job,
            outcome,
            job_succeeded: true,
            detections: results.detections.len(),
            video_metadata: results.video_metadata,
            frames,
            legend: renderer.colors().legend().to_vec(),
            cancelled: self.cancel.is_cancelled(),
        })
    }

    fn stop_requested(&self, next: &str) -> bool {
        let stop = self.cancel.is_cancelled();
        if stop {
            log::warn!("run cancelled before {}", next);
        }
        stop
    }

    fn render_frames(
        &self,
        video: &VideoRef,
        timestamps: &[u64],
        detections: &[Detection],
        renderer: &mut OverlayRenderer,
    ) -> Result<Vec<RenderedFrame>> {
        // Removed from disk when dropped at the end of this function.
        let download = match &self.settings.local_video {
            Some(_) => None,
            None => {
                let _stage = self.ui.stage("Download video");
                Some(download_to_temp(
                    self.services.store,
                    &video.bucket,
                    &video.key,
                    &key_suffix(&video.key),
                )?)
            }
        };
        let video_path = match (&self.settings.local_video, &download) {
            (Some(path), _) => path.clone(),
            (None, Some(file)) => file.path().to_path_buf(),
            (None, None) => {
                return Err(anyhow!("no video source for s3://{}/{}", video.bucket, video.key))
            }
        };
        if self.stop_requested("decode") {
            return Ok(Vec::new());
        }

        let sampled = {
            let _stage = self.ui.stage("Decode frames");
            let mut decoder = self
                .services
                .opener
                .open(&video_path)
                .with_context(|| format!("open video {}", video_path.display()))?;
            sample_frames(decoder.as_mut(), timestamps, &self.cancel)
        };

        let mut progress = self.ui.counted("Render frames", sampled.len() as u64);
        let mut rendered = Vec::with_capacity(sampled.len());
        for mut frame in sampled {
            if self.stop_requested("rendering the remaining frames") {
                break;
            }
            let annotations =
                renderer.render_frame(&mut frame.image, frame.timestamp_ms, detections);
            let path = self
                .settings
                .output_dir
                .join(frame_file_name(frame.ordinal, frame.timestamp_ms));
            self.services.writer.write(&path, &frame.image)?;
            log::info!(
                "wrote {} ({} annotations, frame {})",
                path.display(),
                annotations.len(),
                frame.frame_index
            );
            progress.inc();
            rendered.push(RenderedFrame {
                path,
                timestamp_ms: frame.timestamp_ms,
                annotations,
            });
        }
        Ok(rendered)
    }
}

/// Output of a still-image run.
#[derive(Clone, Debug)]
pub struct ImageReport {
    pub path: PathBuf,
    pub annotations: Vec<Annotation>,
}

/// Recognise celebrities in a local image and write an annotated copy named
/// `celebrity_detected_<file name>` into `output_dir`.
pub fn annotate_image(
    recognition: &dyn RecognitionService,
    writer: &dyn ImageWriter,
    renderer: &mut OverlayRenderer,
    image_path: &Path,
    output_dir: &Path,
) -> Result<ImageReport> {
    let file_name = image_path
        .file_name()
        .ok_or_else(|| anyhow!("image path {} has no file name", image_path.display()))?;
    let bytes = std::fs::read(image_path)
        .with_context(|| format!("read image {}", image_path.display()))?;
    let faces = recognition
        .recognize_image(&bytes)
        .with_context(|| format!("recognise celebrities in {}", image_path.display()))?;
    log::info!("{} celebrities recognised in {}", faces.len(), image_path.display());

    let mut image = image::load_from_memory(&bytes)
        .with_context(|| format!("decode image {}", image_path.display()))?
        .to_rgb8();
    let annotations = renderer.render_faces(&mut image, &faces);

    let path = output_dir.join(format!("celebrity_detected_{}", file_name.to_string_lossy()));
    writer.write(&path, &image)?;
    log::info!("wrote {}", path.display());
    Ok(ImageReport { path, annotations })
}

/// `frame_<n>_t<timestamp>ms.jpg`
pub fn frame_file_name(ordinal: usize, timestamp_ms: u64) -> String {
    format!("frame_{}_t{}ms.jpg", ordinal, timestamp_ms)
}

/// `name: RGB(r, g, b)`
pub fn legend_entry(name: &str, color: Color) -> String {
    format!("{}: RGB({}, {}, {})", name, color[0], color[1], color[2])
}

fn log_metadata(metadata: &VideoMetadata) {
    log::info!(
        "video: codec={} format={} duration={}ms fps={} size={}x{}",
        metadata.codec.as_deref().unwrap_or("?"),
        metadata.format.as_deref().unwrap_or("?"),
        metadata
            .duration_ms
            .map_or_else(|| "?".to_string(), |d| d.to_string()),
        metadata
            .frame_rate
            .map_or_else(|| "?".to_string(), |f| format!("{:.2}", f)),
        metadata
            .frame_width
            .map_or_else(|| "?".to_string(), |w| w.to_string()),
        metadata
            .frame_height
            .map_or_else(|| "?".to_string(), |h| h.to_string()),
    );
}

//! video_celebrities - Recognise celebrities in a stored video and write
//! annotated frames.
//!
//! Settings come from `CELEB_CONFIG`, the `CELEB_*` environment variables and
//! the flags below, in increasing precedence. Credentials are read from the
//! standard `AWS_*` variables.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use celebrity_overlay::aws::{Credentials, RekognitionClient, S3Client, SqsClient};
use celebrity_overlay::config::RunConfig;
use celebrity_overlay::overlay::load_font;
use celebrity_overlay::pipeline::legend_entry;
use celebrity_overlay::ui::Ui;
use celebrity_overlay::{
    CancelToken, Collaborators, DefaultVideoOpener, FsImageWriter, OverlayRenderer,
    PipelineSettings, SystemClock, VideoPipeline, WaitOutcome,
};

#[derive(Parser, Debug)]
#[command(
    name = "video_celebrities",
    about = "Run celebrity recognition over a stored video and draw the results"
)]
struct Args {
    /// Config file (toml, or json by extension)
    #[arg(long, env = "CELEB_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Bucket holding the video
    #[arg(long)]
    bucket: Option<String>,

    /// Object key of the video
    #[arg(long, value_name = "KEY")]
    key: Option<String>,

    /// Role the service assumes to publish the notification
    #[arg(long, value_name = "ARN")]
    role_arn: Option<String>,

    /// Topic the service notifies on completion
    #[arg(long, value_name = "ARN")]
    topic_arn: Option<String>,

    /// Queue subscribed to the topic
    #[arg(long, value_name = "URL")]
    queue_url: Option<String>,

    /// Directory for annotated frames
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Maximum number of distinct timestamps to render
    #[arg(long)]
    max_frames: Option<usize>,

    /// Seconds between empty queue polls
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Give up waiting for the job after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// TrueType font for labels
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,

    /// Decode this local file (or stub:// uri) instead of downloading the video
    #[arg(long, value_name = "PATH")]
    local_video: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = RunConfig::load_from(args.config.as_deref())?;
    apply_args(&mut cfg, &args);
    cfg.validate()?;
    let job_spec = cfg.require_video_job()?;

    let credentials = Credentials::from_env()?;
    let region = cfg.aws.region.as_str();
    let recognition = RekognitionClient::new(
        credentials.clone(),
        region,
        cfg.aws.rekognition_endpoint.clone(),
    )?;
    let queue = SqsClient::new(
        credentials.clone(),
        region,
        &job_spec.queue_url,
        cfg.aws.sqs_endpoint.clone(),
    )?;
    let store = S3Client::new(credentials, region, cfg.aws.s3_endpoint.clone());

    let font = load_font(cfg.render.font_path.as_deref())?;
    let mut renderer = OverlayRenderer::new(cfg.render.style.clone()).with_font(font);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            log::warn!("second interrupt, exiting");
            std::process::exit(130);
        }
        log::warn!("interrupt received, stopping after the current step (again to exit now)");
        handler_token.cancel();
    })
    .context("install Ctrl-C handler")?;

    let settings = PipelineSettings {
        wait: cfg.wait.clone(),
        page_size: cfg.page_size,
        max_frames: cfg.render.max_frames,
        output_dir: cfg.render.output_dir.clone(),
        local_video: args.local_video.clone(),
    };
    let services = Collaborators {
        recognition: &recognition,
        queue: &queue,
        store: &store,
        opener: &DefaultVideoOpener,
        writer: &FsImageWriter,
        clock: &SystemClock,
    };
    let report = VideoPipeline::new(services, settings)
        .with_ui(ui)
        .with_cancel(cancel)
        .run(&job_spec.video, &job_spec.channel, &mut renderer)?;

    if report.cancelled {
        println!(
            "video_celebrities: run for job {} cancelled ({} frames written)",
            report.job,
            report.frames.len()
        );
        for frame in &report.frames {
            println!("  {}", frame.path.display());
        }
        return Ok(());
    }
    if !report.job_succeeded {
        return match report.outcome {
            WaitOutcome::Cancelled => Ok(()),
            WaitOutcome::TimedOut => Err(anyhow!("timed out waiting for job {}", report.job)),
            WaitOutcome::Finished(status) => {
                Err(anyhow!("job {} finished with status {}", report.job, status))
            }
        };
    }

    println!(
        "video_celebrities: job {} produced {} detections",
        report.job, report.detections
    );
    for frame in &report.frames {
        println!(
            "  {} ({} subjects at {}ms)",
            frame.path.display(),
            frame.annotations.len(),
            frame.timestamp_ms
        );
    }
    if !report.legend.is_empty() {
        println!();
        println!("Colors:");
        for (name, color) in &report.legend {
            println!("  {}", legend_entry(name, *color));
        }
    }
    Ok(())
}

fn apply_args(cfg: &mut RunConfig, args: &Args) {
    if let Some(bucket) = &args.bucket {
        cfg.video.bucket = Some(bucket.clone());
    }
    if let Some(key) = &args.key {
        cfg.video.key = Some(key.clone());
    }
    if let Some(role) = &args.role_arn {
        cfg.notification.role_arn = Some(role.clone());
    }
    if let Some(topic) = &args.topic_arn {
        cfg.notification.topic_arn = Some(topic.clone());
    }
    if let Some(queue) = &args.queue_url {
        cfg.notification.queue_url = Some(queue.clone());
    }
    if let Some(dir) = &args.output_dir {
        cfg.render.output_dir = dir.clone();
    }
    if let Some(frames) = args.max_frames {
        cfg.render.max_frames = frames;
    }
    if let Some(secs) = args.poll_interval_secs {
        cfg.wait.poll_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = args.timeout_secs {
        cfg.wait.timeout = Some(Duration::from_secs(secs));
    }
    if let Some(font) = &args.font {
        cfg.render.font_path = Some(font.clone());
    }
}

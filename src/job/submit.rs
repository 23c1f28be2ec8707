use anyhow::{Context, Result};

use crate::recognition::{JobHandle, NotificationChannel, RecognitionService, VideoRef};

/// Start one celebrity recognition job.
///
/// Submission is not retried; any error aborts the run.
pub fn submit_job(
    service: &dyn RecognitionService,
    video: &VideoRef,
    channel: &NotificationChannel,
) -> Result<JobHandle> {
    let job = service
        .start_job(video, channel)
        .with_context(|| format!("start job for s3://{}/{}", video.bucket, video.key))?;
    log::info!("start job id: {}", job);
    Ok(job)
}

//! Frame sampling from decoded video.
//!
//! This module provides:
//! - `VideoDecoder` / `VideoOpener`: the decoder contract
//! - `sample_frames`: seeks one frame per target timestamp
//! - `SyntheticVideo`: generated frames for `stub://` sources (testing)
//! - `FfmpegVideo`: local files through FFmpeg (feature: video-ffmpeg)
//!
//! A timestamp whose frame cannot be decoded is skipped; it never aborts the
//! run.

#[cfg(feature = "video-ffmpeg")]
pub mod ffmpeg;
pub mod synthetic;

use anyhow::Result;
use image::RgbImage;
use std::collections::BTreeSet;
use std::path::Path;

use crate::job::CancelToken;
use crate::recognition::Detection;

pub use synthetic::SyntheticVideo;

/// Cap on the number of distinct timestamps rendered per run.
pub const MAX_SAMPLED_FRAMES: usize = 5;

/// Random-access decoded video.
pub trait VideoDecoder {
    /// Frames per second of the video stream.
    fn frame_rate(&self) -> f64;

    /// Decode the frame at `index`. `Ok(None)` means the index is past the
    /// end of the stream.
    fn seek_to_frame(&mut self, index: u64) -> Result<Option<RgbImage>>;
}

/// Opens a decoder for a local video path.
pub trait VideoOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>>;

    /// Fail early when `path` could never be opened, before any remote work
    /// is paid for. `path` may be an object key; only its form is checked.
    fn ensure_supported(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Default opener: `stub://` paths produce synthetic video, everything else
/// goes through FFmpeg when the feature is enabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultVideoOpener;

impl VideoOpener for DefaultVideoOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoDecoder>> {
        let display = path.to_string_lossy();
        if display.starts_with("stub://") {
            return Ok(Box::new(SyntheticVideo::from_uri(&display)?));
        }
        #[cfg(feature = "video-ffmpeg")]
        {
            Ok(Box::new(ffmpeg::FfmpegVideo::open(path)?))
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(anyhow::anyhow!(
                "decoding {} requires the video-ffmpeg feature",
                display
            ))
        }
    }

    fn ensure_supported(&self, path: &Path) -> Result<()> {
        if path.to_string_lossy().starts_with("stub://") || cfg!(feature = "video-ffmpeg") {
            return Ok(());
        }
        Err(anyhow::anyhow!(
            "decoding {} requires the video-ffmpeg feature; rebuild with \
             --features video-ffmpeg or pass a stub:// video",
            path.display()
        ))
    }
}

/// One decoded frame chosen for rendering.
pub struct SampledFrame {
    /// 1-based position of the timestamp in the sampled list.
    pub ordinal: usize,
    pub timestamp_ms: u64,
    pub frame_index: u64,
    pub image: RgbImage,
}

/// Frame index for a timestamp, truncating toward zero.
pub fn frame_index(timestamp_ms: u64, frame_rate: f64) -> u64 {
    (timestamp_ms as f64 * frame_rate / 1000.0).trunc() as u64
}

/// The first `limit` distinct timestamps of `detections`, ascending.
pub fn sample_timestamps(detections: &[Detection], limit: usize) -> Vec<u64> {
    detections
        .iter()
        .map(|d| d.timestamp_ms)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(limit)
        .collect()
}

/// Decode one frame per timestamp, skipping those that fail. Stops before
/// the next seek once `cancel` is tripped.
pub fn sample_frames(
    decoder: &mut dyn VideoDecoder,
    timestamps: &[u64],
    cancel: &CancelToken,
) -> Vec<SampledFrame> {
    let frame_rate = decoder.frame_rate();
    let mut frames = Vec::with_capacity(timestamps.len());

    for (i, &timestamp_ms) in timestamps.iter().enumerate() {
        if cancel.is_cancelled() {
            log::warn!("frame sampling cancelled after {} of {}", i, timestamps.len());
            break;
        }
        let index = frame_index(timestamp_ms, frame_rate);
        match decoder.seek_to_frame(index) {
            Ok(Some(image)) => frames.push(SampledFrame {
                ordinal: i + 1,
                timestamp_ms,
                frame_index: index,
                image,
            }),
            Ok(None) => {
                log::warn!(
                    "no frame {} for t={}ms (past end of stream); skipping",
                    index,
                    timestamp_ms
                );
            }
            Err(e) => {
                log::warn!("failed to decode frame {} for t={}ms: {}", index, timestamp_ms, e);
            }
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NormalizedBox;
    use anyhow::anyhow;

    fn detection(timestamp_ms: u64) -> Detection {
        Detection {
            subject_name: "x".to_string(),
            timestamp_ms,
            bounding_box: NormalizedBox::default(),
            confidence: None,
        }
    }

    struct FlakyDecoder {
        fail_index: u64,
        seeks: Vec<u64>,
    }

    impl VideoDecoder for FlakyDecoder {
        fn frame_rate(&self) -> f64 {
            30.0
        }

        fn seek_to_frame(&mut self, index: u64) -> Result<Option<RgbImage>> {
            self.seeks.push(index);
            if index == self.fail_index {
                return Err(anyhow!("corrupt frame"));
            }
            Ok(Some(RgbImage::new(4, 4)))
        }
    }

    #[test]
    fn frame_index_at_thirty_fps() {
        assert_eq!(frame_index(1000, 30.0), 30);
        assert_eq!(frame_index(0, 30.0), 0);
        assert_eq!(frame_index(1033, 29.97), 30);
    }

    #[test]
    fn only_first_five_distinct_timestamps() {
        let detections: Vec<_> = [700, 100, 300, 100, 600, 200, 500, 400]
            .into_iter()
            .map(detection)
            .collect();
        assert_eq!(
            sample_timestamps(&detections, MAX_SAMPLED_FRAMES),
            vec![100, 200, 300, 400, 500]
        );
    }

    #[test]
    fn failed_seek_skips_timestamp() {
        let mut decoder = FlakyDecoder {
            fail_index: 30,
            seeks: vec![],
        };
        let frames = sample_frames(&mut decoder, &[500, 1000, 1500], &CancelToken::new());
        assert_eq!(decoder.seeks, vec![15, 30, 45]);
        let ordinals: Vec<_> = frames.iter().map(|f| f.ordinal).collect();
        assert_eq!(ordinals, vec![1, 3]);
        assert_eq!(frames[1].timestamp_ms, 1500);
    }

    #[test]
    fn cancelled_sampling_seeks_nothing() {
        let mut decoder = FlakyDecoder {
            fail_index: u64::MAX,
            seeks: vec![],
        };
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(sample_frames(&mut decoder, &[0, 500], &cancel).is_empty());
        assert!(decoder.seeks.is_empty());
    }

    #[test]
    fn stub_sources_are_always_supported() {
        let opener = DefaultVideoOpener;
        assert!(opener.ensure_supported(Path::new("stub://4x4@10/5")).is_ok());
        assert_eq!(
            opener.ensure_supported(Path::new("clips/a.mp4")).is_ok(),
            cfg!(feature = "video-ffmpeg")
        );
    }
}

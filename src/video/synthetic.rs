// ----------------------------------------------------------------------------
// Synthetic video (stub://) for tests and dry runs
// ----------------------------------------------------------------------------

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

use super::VideoDecoder;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: f64 = 30.0;
const DEFAULT_FRAMES: u64 = 300;

/// Generated video with a fixed frame count.
///
/// URI form: `stub://[WIDTHxHEIGHT][@FPS][/FRAMES]`, e.g. `stub://800x600@25/500`.
/// Missing parts fall back to 640x480, 30 fps, 300 frames.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticVideo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
}

impl Default for SyntheticVideo {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            frame_count: DEFAULT_FRAMES,
        }
    }
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        Self {
            width,
            height,
            fps,
            frame_count,
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        let spec = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic video uri must start with stub://"))?;
        let mut video = Self::default();

        let (spec, frames) = match spec.split_once('/') {
            Some((head, frames)) => (head, Some(frames)),
            None => (spec, None),
        };
        if let Some(frames) = frames.filter(|f| !f.is_empty()) {
            video.frame_count = frames
                .parse()
                .with_context(|| format!("invalid frame count in {}", uri))?;
        }
        let (size, fps) = match spec.split_once('@') {
            Some((size, fps)) => (size, Some(fps)),
            None => (spec, None),
        };
        if let Some(fps) = fps {
            video.fps = fps
                .parse()
                .with_context(|| format!("invalid frame rate in {}", uri))?;
        }
        if !size.is_empty() {
            let (w, h) = size
                .split_once('x')
                .ok_or_else(|| anyhow!("invalid frame size in {}; expected WIDTHxHEIGHT", uri))?;
            video.width = w.parse().with_context(|| format!("invalid width in {}", uri))?;
            video.height = h.parse().with_context(|| format!("invalid height in {}", uri))?;
        }
        if video.width == 0 || video.height == 0 || video.fps <= 0.0 {
            return Err(anyhow!("synthetic video {} has an empty frame or zero rate", uri));
        }
        Ok(video)
    }
}

impl VideoDecoder for SyntheticVideo {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn seek_to_frame(&mut self, index: u64) -> Result<Option<RgbImage>> {
        if index >= self.frame_count {
            return Ok(None);
        }
        let shade = (index % 256) as u8;
        Ok(Some(RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([shade, (x % 256) as u8, (y % 256) as u8])
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let video = SyntheticVideo::from_uri("stub://800x600@25/500").unwrap();
        assert_eq!(video, SyntheticVideo::new(800, 600, 25.0, 500));
    }

    #[test]
    fn bare_uri_uses_defaults() {
        assert_eq!(
            SyntheticVideo::from_uri("stub://").unwrap(),
            SyntheticVideo::default()
        );
        assert_eq!(SyntheticVideo::from_uri("stub:///12").unwrap().frame_count, 12);
    }

    #[test]
    fn rejects_bad_size() {
        assert!(SyntheticVideo::from_uri("stub://800by600").is_err());
        assert!(SyntheticVideo::from_uri("stub://0x600").is_err());
    }

    #[test]
    fn seek_past_end_is_none() {
        let mut video = SyntheticVideo::new(8, 6, 30.0, 10);
        assert!(video.seek_to_frame(9).unwrap().is_some());
        assert!(video.seek_to_frame(10).unwrap().is_none());
    }
}

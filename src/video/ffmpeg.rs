//! Local file decoding using FFmpeg.
//!
//! Seeking lands on the keyframe at or before the target; frames are then
//! decoded forward until the requested index is reached.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::Path;

use super::VideoDecoder;

const AV_TIME_BASE: f64 = 1_000_000.0;

pub struct FfmpegVideo {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    time_base: f64,
    frame_rate: f64,
}

impl FfmpegVideo {
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", path.display()))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = stream.index();
        let time_base = f64::from(stream.time_base());
        let frame_rate = f64::from(stream.avg_frame_rate());
        if !(frame_rate > 0.0) {
            return Err(anyhow!("video '{}' reports no frame rate", path.display()));
        }

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "opened {} ({}x{} @ {:.3} fps)",
            path.display(),
            decoder.width(),
            decoder.height(),
            frame_rate
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            time_base,
            frame_rate,
        })
    }

    fn to_image(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RgbImage> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("decoded frame buffer does not match {}x{}", width, height))
    }
}

impl VideoDecoder for FfmpegVideo {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn seek_to_frame(&mut self, index: u64) -> Result<Option<RgbImage>> {
        let target_us = (index as f64 / self.frame_rate * AV_TIME_BASE) as i64;
        self.input
            .seek(target_us, 0..target_us.saturating_add(1))
            .with_context(|| format!("seek to frame {}", index))?;
        self.decoder.flush();

        let (time_base, frame_rate) = (self.time_base, self.frame_rate);
        let reached = |frame: &ffmpeg::frame::Video| {
            decoded_index(frame, time_base, frame_rate).map_or(true, |current| current >= index)
        };
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut found = false;

        'packets: for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                if reached(&decoded) {
                    found = true;
                    break 'packets;
                }
            }
        }

        if !found {
            self.decoder.send_eof().context("drain ffmpeg decoder")?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                if reached(&decoded) {
                    found = true;
                    break;
                }
            }
        }

        if found {
            self.to_image(&decoded).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Frame index of a decoded frame, from its presentation timestamp.
fn decoded_index(frame: &ffmpeg::frame::Video, time_base: f64, frame_rate: f64) -> Option<u64> {
    let ts = frame.timestamp().or_else(|| frame.pts())?;
    let seconds = ts as f64 * time_base;
    Some((seconds * frame_rate).round().max(0.0) as u64)
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0) as usize;
    let data = frame.data(0);

    if stride == row_bytes {
        let pixels = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}

//! Overlay rendering: one colored box and label per detected subject.
//!
//! The renderer owns the run's `SubjectColors`, so a subject keeps its color
//! across every frame of the run. Text needs a TrueType font; without one the
//! boxes are still drawn and the labels are only reported in the returned
//! annotations.

mod palette;

pub use palette::{Color, SubjectColors, PALETTE};

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::geometry::{map_box, PixelBox};
use crate::recognition::{CelebrityFace, Detection};

/// Common system font locations tried when no font is configured.
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Clone, Debug)]
pub struct OverlayStyle {
    /// Rectangle outline width in pixels.
    pub thickness: u32,
    /// Label glyph height in pixels.
    pub label_px: f32,
    /// Gap between the label baseline and the top edge of the box.
    pub label_gap: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            thickness: 2,
            label_px: 18.0,
            label_gap: 10,
        }
    }
}

impl OverlayStyle {
    /// Heavier outline and larger labels for single still images.
    pub fn still_image() -> Self {
        Self {
            thickness: 3,
            label_px: 22.0,
            ..Self::default()
        }
    }
}

/// One box/label pair drawn on a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub label: String,
    pub color: Color,
    pub pixel_box: PixelBox,
}

pub struct OverlayRenderer {
    colors: SubjectColors,
    style: OverlayStyle,
    font: Option<FontVec>,
    warned_missing_font: bool,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            colors: SubjectColors::new(),
            style,
            font: None,
            warned_missing_font: false,
        }
    }

    pub fn with_font(mut self, font: Option<FontVec>) -> Self {
        self.font = font;
        self
    }

    pub fn colors(&self) -> &SubjectColors {
        &self.colors
    }

    /// Draw every detection whose timestamp equals `timestamp_ms`.
    pub fn render_frame(
        &mut self,
        frame: &mut RgbImage,
        timestamp_ms: u64,
        detections: &[Detection],
    ) -> Vec<Annotation> {
        let (width, height) = frame.dimensions();
        let mut annotations = Vec::new();
        for detection in detections.iter().filter(|d| d.timestamp_ms == timestamp_ms) {
            let annotation = Annotation {
                label: label_text(&detection.subject_name, detection.confidence),
                color: self.colors.color_for(&detection.subject_name),
                pixel_box: map_box(&detection.bounding_box, width, height),
            };
            self.paint(frame, &annotation);
            annotations.push(annotation);
        }
        annotations
    }

    /// Draw every face recognised in a still image, labelled with its match
    /// confidence. Colors follow the face's position in `faces`, so two faces
    /// with the same name still get distinct boxes.
    pub fn render_faces(
        &mut self,
        image: &mut RgbImage,
        faces: &[CelebrityFace],
    ) -> Vec<Annotation> {
        let (width, height) = image.dimensions();
        let mut annotations = Vec::with_capacity(faces.len());
        for (i, face) in faces.iter().enumerate() {
            let annotation = Annotation {
                label: label_text(&face.name, Some(face.match_confidence)),
                color: PALETTE[i % PALETTE.len()],
                pixel_box: map_box(&face.bounding_box, width, height),
            };
            self.paint(image, &annotation);
            annotations.push(annotation);
        }
        annotations
    }

    fn paint(&mut self, image: &mut RgbImage, annotation: &Annotation) {
        let color = Rgb(annotation.color);
        let pb = annotation.pixel_box;

        for inset in 0..self.style.thickness {
            let shrink = 2 * inset;
            if pb.width <= shrink || pb.height <= shrink {
                break;
            }
            let rect = Rect::at(pb.x + inset as i32, pb.y + inset as i32)
                .of_size(pb.width - shrink, pb.height - shrink);
            draw_hollow_rect_mut(image, rect, color);
        }

        let Some(font) = self.font.as_ref() else {
            if !self.warned_missing_font {
                log::warn!("no label font loaded; drawing boxes without text");
                self.warned_missing_font = true;
            }
            return;
        };
        let scale = PxScale::from(self.style.label_px);
        let (text_w, text_h) = text_size(scale, font, &annotation.label);
        let (x, y) = label_origin(
            &pb,
            (text_w, text_h),
            self.style.label_gap,
            image.dimensions(),
        );
        draw_text_mut(image, color, x, y, scale, font, &annotation.label);
    }
}

/// Label for a subject, with the confidence when one is known.
pub fn label_text(name: &str, confidence: Option<f32>) -> String {
    match confidence {
        Some(confidence) => format!("{} ({:.1}%)", name, confidence),
        None => name.to_string(),
    }
}

/// Top-left corner of a label sitting `gap` pixels above the box, kept inside
/// the frame.
pub fn label_origin(pb: &PixelBox, text: (u32, u32), gap: i32, frame: (u32, u32)) -> (i32, i32) {
    let (text_w, text_h) = (text.0 as i32, text.1 as i32);
    let max_x = (frame.0 as i32 - text_w).max(0);
    let max_y = (frame.1 as i32 - text_h).max(0);
    let x = pb.x.clamp(0, max_x);
    let y = (pb.y - gap - text_h).clamp(0, max_y);
    (x, y)
}

/// Load the label font from `path`, or from the first system font found.
///
/// A configured path that cannot be loaded is an error; a missing system
/// font is not.
pub fn load_font(path: Option<&Path>) -> Result<Option<FontVec>> {
    if let Some(path) = path {
        return read_font(path).map(Some);
    }
    for candidate in FALLBACK_FONTS.iter().map(PathBuf::from) {
        if !candidate.is_file() {
            continue;
        }
        match read_font(&candidate) {
            Ok(font) => {
                log::debug!("using label font {}", candidate.display());
                return Ok(Some(font));
            }
            Err(e) => log::debug!("skipping font {}: {}", candidate.display(), e),
        }
    }
    Ok(None)
}

fn read_font(path: &Path) -> Result<FontVec> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read font file {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))
}

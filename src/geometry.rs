//! Box geometry shared by the recognition results and the overlay renderer.
//!
//! The recognition service reports face boxes as fractions of the frame size.
//! Drawing needs integer pixel coordinates, so every box crosses `map_box`
//! exactly once per frame.

use serde::{Deserialize, Serialize};

/// Rectangle expressed as fractions of the frame width/height.
///
/// `left + width <= 1` and `top + height <= 1` are expected but not enforced;
/// the service occasionally reports faces cut by the frame border with
/// slightly negative origins or extents past the edge. Fields are `f64` so
/// wire decimals such as `0.7` truncate to the same pixel as double-precision
/// arithmetic does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NormalizedBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Rectangle in integer pixel units of a concrete frame.
///
/// The origin may be negative or past the frame edge for out-of-range input;
/// drawing clips it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Map a normalized box onto a `frame_width` x `frame_height` frame.
///
/// Every coordinate is truncated toward zero. Origins pass through unclamped;
/// negative extents collapse to zero.
pub fn map_box(bbox: &NormalizedBox, frame_width: u32, frame_height: u32) -> PixelBox {
    let w = f64::from(frame_width);
    let h = f64::from(frame_height);
    PixelBox {
        x: (bbox.left * w).trunc() as i32,
        y: (bbox.top * h).trunc() as i32,
        width: (bbox.width.max(0.0) * w).trunc() as u32,
        height: (bbox.height.max(0.0) * h).trunc() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_frame_maps_to_frame_size() {
        let mapped = map_box(&NormalizedBox::new(0.0, 0.0, 1.0, 1.0), 800, 600);
        assert_eq!(
            mapped,
            PixelBox {
                x: 0,
                y: 0,
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn coordinates_truncate() {
        let mapped = map_box(&NormalizedBox::new(0.25, 0.5, 0.333, 0.2), 641, 479);
        assert_eq!(mapped.x, 160);
        assert_eq!(mapped.y, 239);
        assert_eq!(mapped.width, 213);
        assert_eq!(mapped.height, 95);
    }

    #[test]
    fn well_formed_boxes_stay_inside_frame() {
        let steps = [0.0f64, 0.1, 0.33, 0.5, 0.77, 1.0];
        for (w, h) in [(1u32, 1u32), (640, 480), (1920, 1080), (7, 3)] {
            for &left in &steps {
                for &top in &steps {
                    let bbox = NormalizedBox::new(left, top, 1.0 - left, 1.0 - top);
                    let mapped = map_box(&bbox, w, h);
                    assert!(mapped.x >= 0 && mapped.x <= w as i32);
                    assert!(mapped.y >= 0 && mapped.y <= h as i32);
                }
            }
        }
    }

    #[test]
    fn out_of_range_boxes_pass_through() {
        let bbox = NormalizedBox::new(-0.1, 0.9, 0.3, -0.2);
        let mapped = map_box(&bbox, 100, 100);
        assert_eq!(mapped.x, -10);
        assert_eq!(mapped.y, 90);
        assert_eq!(mapped.width, 30);
        assert_eq!(mapped.height, 0);
    }

    #[test]
    fn wire_decimals_truncate_at_double_precision() {
        let bbox: NormalizedBox =
            serde_json::from_str(r#"{"Width":0.3,"Height":0.2,"Left":0.9,"Top":0.7}"#).unwrap();
        let mapped = map_box(&bbox, 100, 1080);
        assert_eq!(mapped.x, 90);
        assert_eq!(mapped.y, 756);
        assert_eq!(mapped.width, 30);
        assert_eq!(mapped.height, 216);
    }

    #[test]
    fn deserializes_service_field_names() {
        let bbox: NormalizedBox =
            serde_json::from_str(r#"{"Width":0.1,"Height":0.2,"Left":0.3,"Top":0.4}"#).unwrap();
        assert_eq!(bbox, NormalizedBox::new(0.3, 0.4, 0.1, 0.2));
    }
}

use std::collections::HashMap;

/// RGB color.
pub type Color = [u8; 3];

/// Fixed palette cycled in first-seen order of subject names.
pub const PALETTE: [Color; 6] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
];

/// Per-run mapping from subject name to color.
///
/// A name keeps the color it was first given; the n-th distinct name gets
/// `PALETTE[n % 6]`.
#[derive(Clone, Debug, Default)]
pub struct SubjectColors {
    order: Vec<(String, Color)>,
    by_name: HashMap<String, usize>,
}

impl SubjectColors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Color for `name`, assigning the next palette entry on first sight.
    pub fn color_for(&mut self, name: &str) -> Color {
        if let Some(&slot) = self.by_name.get(name) {
            return self.order[slot].1;
        }
        let color = PALETTE[self.order.len() % PALETTE.len()];
        self.by_name.insert(name.to_string(), self.order.len());
        self.order.push((name.to_string(), color));
        color
    }

    /// Assigned colors in first-seen order.
    pub fn legend(&self) -> &[(String, Color)] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

use serde::{Deserialize, Serialize};

/// A captured grayscale camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes, row-major).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
        }
    }
}

/// Axis-aligned face region in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip the box to a `width` x `height` frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(BoundingBox::new(self.x, self.y, w, h))
    }
}

/// Tuning for multi-scale face detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    /// Geometric step between detection scales.
    pub scale_factor: f64,
    /// Overlapping candidate hits required to keep a region.
    pub min_neighbors: u32,
    /// Smallest face side, in pixels, worth reporting.
    pub min_face_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 5,
            min_face_size: 30,
        }
    }
}

/// A registered person as recorded in the attendance log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Raw recogniser output for one face sample.
///
/// `confidence` is a distance: lower means a closer match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: i32,
    pub confidence: f64,
}

/// Outcome of gating and resolving a [`Prediction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Known(Identity),
    Unknown,
}

impl Classification {
    /// Overlay text for the preview window.
    pub fn label_text(&self) -> String {
        match self {
            Classification::Known(identity) => format!("{} ({})", identity.name, identity.id),
            Classification::Unknown => "Unknown".to_string(),
        }
    }
}

/// What the preview surface should draw for one detected region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub region: BoundingBox,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_inside() {
        let b = BoundingBox::new(10, 10, 20, 20);
        assert_eq!(b.clamp_to(100, 100), Some(b));
    }

    #[test]
    fn test_clamp_overhanging_edge() {
        let b = BoundingBox::new(90, 95, 20, 20);
        assert_eq!(b.clamp_to(100, 100), Some(BoundingBox::new(90, 95, 10, 5)));
    }

    #[test]
    fn test_clamp_outside() {
        assert_eq!(BoundingBox::new(100, 0, 5, 5).clamp_to(100, 100), None);
        assert_eq!(BoundingBox::new(0, 0, 0, 5).clamp_to(100, 100), None);
    }

    #[test]
    fn test_label_text() {
        let known = Classification::Known(Identity::new("7", "Alice"));
        assert_eq!(known.label_text(), "Alice (7)");
        assert_eq!(Classification::Unknown.label_text(), "Unknown");
    }
}

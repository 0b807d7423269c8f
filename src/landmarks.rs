//! Hand landmark wire format produced by the external detector.
//!
//! The detector writes one JSON object per frame with 21 keypoints in
//! MediaPipe order plus handedness, confidence and frame dimensions. The
//! core reads each frame once and never retains it.

use serde::Deserialize;
use std::fmt;

pub const LANDMARK_COUNT: usize = 21;

// MediaPipe hand landmark indices we care about.
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handedness::Left => write!(f, "left"),
            Handedness::Right => write!(f, "right"),
            Handedness::Unknown => write!(f, "unknown"),
        }
    }
}

/// One detector frame: the full landmark set for a single tracked hand.
#[derive(Debug, Clone, Deserialize)]
pub struct LandmarkFrame {
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub handedness: Handedness,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
}

fn default_frame_width() -> u32 {
    640
}

fn default_frame_height() -> u32 {
    480
}

impl LandmarkFrame {
    /// A frame is usable when it carries the full keypoint set and the
    /// coordinates are not degenerate (all zero). Anything else is skipped,
    /// never treated as an error.
    pub fn is_usable(&self) -> bool {
        if self.landmarks.len() < LANDMARK_COUNT {
            return false;
        }
        self.landmarks.iter().any(|lm| lm.x != 0.0 || lm.y != 0.0)
    }

    /// Keypoint position in pixel space. Coordinates ≤ 1.0 are treated as
    /// normalized and scaled by the frame dimensions; larger values are
    /// assumed to already be pixels.
    pub fn point_px(&self, index: usize) -> (f32, f32) {
        let lm = &self.landmarks[index];
        let x = if lm.x > 1.0 {
            lm.x
        } else {
            lm.x * self.frame_width as f32
        };
        let y = if lm.y > 1.0 {
            lm.y
        } else {
            lm.y * self.frame_height as f32
        };
        (x, y)
    }

    /// Pixel distance between two keypoints.
    pub fn distance_px(&self, a: usize, b: usize) -> f32 {
        let (ax, ay) = self.point_px(a);
        let (bx, by) = self.point_px(b);
        (ax - bx).hypot(ay - by)
    }

    /// A finger counts as folded when its tip sits below its own PIP
    /// knuckle in image space (y grows downward).
    pub fn finger_folded(&self, tip: usize, pip: usize) -> bool {
        let (_, tip_y) = self.point_px(tip);
        let (_, pip_y) = self.point_px(pip);
        tip_y > pip_y
    }

    /// Normalized cursor position (0..1) taken from the index fingertip.
    pub fn cursor_norm(&self) -> (f32, f32) {
        let (x, y) = self.point_px(INDEX_TIP);
        (
            (x / self.frame_width as f32).clamp(0.0, 1.0),
            (y / self.frame_height as f32).clamp(0.0, 1.0),
        )
    }
}

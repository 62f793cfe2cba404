//! Building blocks for single-shot object detectors.

pub mod nms;
pub mod ssd;

use nalgebra::{Rotation2, Vector2};

use crate::rect::Rect;

/// A detected object: bounding rectangle, confidence, clockwise angle and keypoints.
///
/// Confidence is expected to be in `0.0..=1.0`, as [`nms::SuppressionMode::Average`] uses it as a
/// weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    confidence: f32,
    angle: f32,
    rect: Rect,
    keypoints: Vec<Keypoint>,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self::with_keypoints(confidence, rect, Vec::new())
    }

    pub fn with_keypoints(confidence: f32, rect: Rect, keypoints: Vec<Keypoint>) -> Self {
        Self {
            confidence,
            angle: 0.0,
            rect,
            keypoints,
        }
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Clockwise rotation of the object in radians. 0.0 if the network does not estimate it.
    #[inline]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
    }

    #[inline]
    pub fn bounding_rect(&self) -> Rect {
        self.rect
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Scales all coordinates by `scale`, then moves them by `offset`.
    pub fn map_coords(&mut self, scale: f32, offset: Vector2<f32>) {
        let center = self.rect.center() * scale + offset;
        let size = self.rect.size() * scale;
        self.rect = Rect::from_center(center.x, center.y, size.x, size.y);
        for kp in &mut self.keypoints {
            kp.pos = kp.pos * scale + offset;
        }
    }
}

/// A 2D point of interest reported alongside a [`Detection`].
///
/// What each keypoint means depends on the detector and the keypoint's index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pos: Vector2<f32>,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            pos: Vector2::new(x, y),
        }
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos.x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos.y
    }

    #[inline]
    pub fn pos(&self) -> Vector2<f32> {
        self.pos
    }
}

/// Clockwise angle by which an object whose `base` lies below its `tip` when upright is rotated.
pub fn upright_angle(base: Vector2<f32>, tip: Vector2<f32>) -> f32 {
    Rotation2::rotation_between(&Vector2::y(), &(base - tip)).angle()
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn upright() {
        let angle = |bx, by, tx, ty| upright_angle(Vector2::new(bx, by), Vector2::new(tx, ty));
        assert_abs_diff_eq!(angle(0.0, 10.0, 0.0, 0.0), 0.0);
        // Tip pointing right: rotated clockwise by 90°.
        assert_abs_diff_eq!(angle(0.0, 0.0, 10.0, 0.0), FRAC_PI_2, epsilon = 1e-6);
        assert_abs_diff_eq!(angle(0.0, 0.0, -10.0, 0.0), -FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn map_coords() {
        let mut det = Detection::with_keypoints(
            0.9,
            Rect::from_center(10.0, 10.0, 4.0, 2.0),
            vec![Keypoint::new(1.0, 2.0)],
        );
        det.map_coords(2.0, Vector2::new(-5.0, 3.0));
        assert_eq!(det.bounding_rect(), Rect::from_center(15.0, 23.0, 8.0, 4.0));
        assert_eq!(det.keypoints()[0], Keypoint::new(-3.0, 7.0));
    }
}

//! Non-maximum suppression.
//!
//! SSD networks report every object many times, once per nearby anchor. Suppression reduces each
//! cluster of overlapping detections to one, either by keeping only the most confident detection
//! ([`SuppressionMode::Remove`]) or by averaging the cluster weighted by confidence
//! ([`SuppressionMode::Average`], the default, which jitters less between frames).

use nalgebra::Vector2;

use crate::{num::TotalF32, rect::Rect};

use super::{Detection, Keypoint};

/// How overlapping detections are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionMode {
    /// Keep only the most confident detection.
    Remove,
    /// Replace the cluster by its confidence-weighted average.
    Average,
}

pub struct NonMaxSuppression {
    iou_thresh: f32,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            mode: SuppressionMode::Average,
        }
    }

    /// Detections whose bounding rectangles have an IoU of at least `iou_thresh` are merged.
    pub fn set_iou_thresh(&mut self, iou_thresh: f32) {
        self.iou_thresh = iou_thresh;
    }

    pub fn set_mode(&mut self, mode: SuppressionMode) {
        self.mode = mode;
    }

    /// Merges overlapping `detections` in place. The result is ordered by descending confidence.
    pub fn process(&self, detections: &mut Vec<Detection>) {
        // Ascending, so that `pop` yields the most confident remaining detection.
        detections.sort_unstable_by_key(|det| TotalF32(det.confidence));

        let mut out = Vec::new();
        while let Some(seed) = detections.pop() {
            let rect = seed.bounding_rect();
            let (cluster, rest): (Vec<_>, Vec<_>) = detections
                .drain(..)
                .partition(|other| rect.iou(&other.bounding_rect()) >= self.iou_thresh);
            *detections = rest;

            out.push(match self.mode {
                SuppressionMode::Remove => seed,
                SuppressionMode::Average => average(seed, &cluster),
            });
        }

        *detections = out;
    }
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

/// Averages `seed` and `others`, keeping the confidence of `seed`.
fn average(seed: Detection, others: &[Detection]) -> Detection {
    if others.is_empty() {
        return seed;
    }

    let mut center = Vector2::zeros();
    let mut size = Vector2::zeros();
    let mut angle = 0.0;
    let mut keypoints = vec![Vector2::zeros(); seed.keypoints.len()];
    let mut total = 0.0;
    for det in std::iter::once(&seed).chain(others) {
        let w = det.confidence;
        total += w;
        center += det.rect.center() * w;
        size += det.rect.size() * w;
        angle += det.angle * w;
        debug_assert_eq!(det.keypoints.len(), keypoints.len());
        for (acc, kp) in keypoints.iter_mut().zip(&det.keypoints) {
            *acc += kp.pos * w;
        }
    }

    let center = center / total;
    let size = size / total;
    let mut avg = Detection::with_keypoints(
        seed.confidence,
        Rect::from_center(center.x, center.y, size.x, size.y),
        keypoints
            .into_iter()
            .map(|p| {
                let p = p / total;
                Keypoint::new(p.x, p.y)
            })
            .collect(),
    );
    avg.set_angle(angle / total);
    avg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_keeps_most_confident() {
        let mut nms = NonMaxSuppression::new();
        nms.set_mode(SuppressionMode::Remove);

        let rect = Rect::from_center(0.0, 0.0, 1.0, 1.0);
        let mut dets = vec![
            Detection::new(0.55, rect.scale(1.5)),
            Detection::new(0.6, rect),
        ];
        nms.process(&mut dets);
        assert_eq!(dets, [Detection::new(0.6, rect)]);
    }

    #[test]
    fn disjoint_detections_survive() {
        let nms = NonMaxSuppression::new();
        let mut dets = vec![
            Detection::new(0.7, Rect::from_center(0.0, 0.0, 1.0, 1.0)),
            Detection::new(0.9, Rect::from_center(5.0, 0.0, 1.0, 1.0)),
        ];
        nms.process(&mut dets);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].confidence(), 0.9);
        assert_eq!(dets[1].confidence(), 0.7);
    }

    #[test]
    fn average_is_confidence_weighted() {
        let mut nms = NonMaxSuppression::new();
        nms.set_iou_thresh(0.0);

        let rect = Rect::from_center(-1.0, 3.0, 1.0, 1.0);
        let mut a = Detection::with_keypoints(1.0, rect, vec![Keypoint::new(0.0, 0.0)]);
        a.set_angle(0.3);
        let b = Detection::with_keypoints(0.5, rect.scale(4.0), vec![Keypoint::new(3.0, 6.0)]);
        let mut dets = vec![b, a];
        nms.process(&mut dets);

        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!(d.confidence(), 1.0);
        assert_eq!(d.bounding_rect(), Rect::from_center(-1.0, 3.0, 2.0, 2.0));
        assert_eq!(d.keypoints(), &[Keypoint::new(1.0, 2.0)]);
        assert!((d.angle() - 0.2).abs() < 1e-6);
    }
}

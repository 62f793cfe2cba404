//! Multi-hand tracking.
//!
//! Palm detection is expensive and only provides a rough hand location, so it is only used to
//! find new hands. Once a hand is found, the region of interest for the next frame is derived from
//! its landmarks, and the palm detector is skipped as long as enough hands are being tracked.

use std::{cmp::Reverse, mem};

use nalgebra::{Rotation2, Vector2};

use crate::{
    detection::Detection,
    image::{AspectRatio, Image},
    num::TotalF32,
    rect::{Rect, RotatedRect},
};

use super::{
    detection::PalmDetector,
    landmark::{LandmarkResult, Landmarker},
};

/// How far a hand's region of interest is moved from the palm towards the fingers, relative to the
/// palm's height.
const PALM_SHIFT: f32 = 0.5;
/// Side length of a hand's region of interest relative to the palm's longer side.
const PALM_SCALE: f32 = 2.6;
/// Padding added on each side of a tracked hand's landmarks, relative to their extent.
const LANDMARK_PADDING: f32 = 0.5;
/// Intersection-over-union at which two regions are considered to contain the same hand.
const IOU_THRESH: f32 = 0.3;

/// Finds palms in a whole image.
pub trait Detector {
    /// Returns palm detections in image coordinates, most confident first.
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<Detection>>;

    /// Sets the confidence below which palms are not reported.
    fn set_min_confidence(&mut self, confidence: f32);
}

impl Detector for PalmDetector {
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<Detection>> {
        PalmDetector::detect(self, image)
    }

    fn set_min_confidence(&mut self, confidence: f32) {
        self.set_threshold(confidence);
    }
}

/// Estimates hand landmarks inside a region of an image.
pub trait Estimator {
    fn estimate(&mut self, image: &Image, roi: RotatedRect) -> anyhow::Result<LandmarkResult>;
}

impl Estimator for Landmarker {
    fn estimate(&mut self, image: &Image, roi: RotatedRect) -> anyhow::Result<LandmarkResult> {
        Landmarker::estimate(self, image, roi)
    }
}

/// Tracks up to a configurable number of hands across frames.
pub struct HandTracker<D = PalmDetector, E = Landmarker> {
    detector: D,
    estimator: E,
    static_image_mode: bool,
    max_num_hands: usize,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
    /// Regions of interest for the next frame.
    tracked: Vec<RotatedRect>,
}

impl<D: Detector, E: Estimator> HandTracker<D, E> {
    /// Presence threshold used in static image mode, where the tracking confidence is ignored.
    pub const STATIC_PRESENCE_THRESH: f32 = 0.5;

    pub fn new(detector: D, estimator: E) -> Self {
        let mut this = Self {
            detector,
            estimator,
            static_image_mode: false,
            max_num_hands: 2,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            tracked: Vec::new(),
        };
        this.set_min_detection_confidence(0.5);
        this
    }

    /// In static image mode, every frame is treated as unrelated to the previous ones and palm
    /// detection runs every time.
    pub fn set_static_image_mode(&mut self, static_image_mode: bool) {
        self.static_image_mode = static_image_mode;
        self.tracked.clear();
    }

    pub fn set_max_num_hands(&mut self, max_num_hands: usize) {
        self.max_num_hands = max_num_hands;
        self.tracked.truncate(max_num_hands);
    }

    /// Palms detected with a lower confidence are not tracked. Also configures the detector, so
    /// that weaker palms are dropped before non-maximum suppression.
    pub fn set_min_detection_confidence(&mut self, confidence: f32) {
        self.min_detection_confidence = confidence;
        self.detector.set_min_confidence(confidence);
    }

    pub fn set_min_tracking_confidence(&mut self, confidence: f32) {
        self.min_tracking_confidence = confidence;
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Number of hands carried over into the next frame.
    pub fn num_tracked(&self) -> usize {
        self.tracked.len()
    }

    /// Processes the next frame and returns the hands in it, most confident first.
    pub fn track(&mut self, image: &Image) -> anyhow::Result<Vec<LandmarkResult>> {
        let mut rois = if self.static_image_mode {
            Vec::new()
        } else {
            mem::take(&mut self.tracked)
        };

        if rois.len() < self.max_num_hands {
            for det in self.detector.detect(image)? {
                if rois.len() >= self.max_num_hands {
                    break;
                }
                if det.confidence() < self.min_detection_confidence {
                    continue;
                }
                let roi = palm_roi(&det);
                if overlaps(&rois, &roi) {
                    log::trace!(
                        "ignoring palm at {:?}, hand is already tracked",
                        det.bounding_rect()
                    );
                    continue;
                }
                rois.push(roi);
            }
        }

        let presence_thresh = if self.static_image_mode {
            Self::STATIC_PRESENCE_THRESH
        } else {
            self.min_tracking_confidence
        };

        let mut hands = Vec::with_capacity(rois.len());
        for roi in rois {
            let hand = self.estimator.estimate(image, roi)?;
            if hand.presence() < presence_thresh {
                log::trace!(
                    "lost hand in {:?} (presence {:.2} < {:.2})",
                    roi.bounding_rect(),
                    hand.presence(),
                    presence_thresh,
                );
                continue;
            }
            hands.push(hand);
        }
        hands.sort_by_key(|hand| Reverse(TotalF32(hand.presence())));

        // Two regions may have converged onto the same hand.
        let mut next = Vec::with_capacity(hands.len());
        let mut results = Vec::with_capacity(hands.len());
        for hand in hands {
            let Some(roi) = landmark_roi(&hand) else { continue };
            if overlaps(&next, &roi) {
                log::trace!("dropping duplicate hand at {:?}", roi.bounding_rect());
                continue;
            }
            next.push(roi);
            results.push(hand);
        }
        next.truncate(self.max_num_hands);
        results.truncate(self.max_num_hands);

        if !self.static_image_mode {
            self.tracked = next;
        }
        Ok(results)
    }
}

/// Returns whether `roi` covers the same hand as one of `rois`.
fn overlaps(rois: &[RotatedRect], roi: &RotatedRect) -> bool {
    let rect = roi.bounding_rect();
    rois.iter()
        .any(|other| other.bounding_rect().iou(&rect) >= IOU_THRESH)
}

/// Computes the region of interest of a whole hand from a palm detection.
fn palm_roi(det: &Detection) -> RotatedRect {
    let palm = det.bounding_rect();
    let angle = det.angle();
    let up = Rotation2::new(angle) * Vector2::new(0.0, -palm.height() * PALM_SHIFT);
    let center = palm.center() + up;
    let side = palm.width().max(palm.height()) * PALM_SCALE;
    RotatedRect::new(Rect::from_center(center.x, center.y, side, side), angle)
}

/// Computes the region of interest for the next frame from a hand's landmarks.
fn landmark_roi(hand: &LandmarkResult) -> Option<RotatedRect> {
    let angle = hand.rotation_radians();
    let roi = RotatedRect::bounding(angle, hand.positions().iter().map(|p| p.xy()))?;
    Some(roi.map(|r| {
        r.grow_to_fit_aspect(AspectRatio::SQUARE)
            .grow_rel(LANDMARK_PADDING)
    }))
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    use crate::hand::LandmarkIdx;

    use super::*;

    struct FakeDetector {
        palms: Vec<Detection>,
        min_confidence: f32,
        calls: usize,
    }

    impl Detector for FakeDetector {
        fn detect(&mut self, _: &Image) -> anyhow::Result<Vec<Detection>> {
            self.calls += 1;
            Ok(self
                .palms
                .iter()
                .filter(|palm| palm.confidence() >= self.min_confidence)
                .cloned()
                .collect())
        }

        fn set_min_confidence(&mut self, confidence: f32) {
            self.min_confidence = confidence;
        }
    }

    struct FakeEstimator {
        presence: Box<dyn Fn(Vector2<f32>) -> f32>,
        rois: Vec<RotatedRect>,
    }

    impl Estimator for FakeEstimator {
        /// Places an upright hand in the middle of `roi`, spanning half of its size.
        fn estimate(&mut self, _: &Image, roi: RotatedRect) -> anyhow::Result<LandmarkResult> {
            self.rois.push(roi);
            let c = roi.center();
            let q = roi.rect().width() / 4.0;
            let mut positions = [Vector3::zeros(); LandmarkIdx::COUNT];
            for (i, pos) in positions.iter_mut().enumerate() {
                let dx = ((i % 5) as f32 - 2.0) * q / 2.0;
                let dy = ((i / 5) as f32 - 2.0) * q / 2.0;
                *pos = Vector3::new(c.x + dx, c.y + dy, 0.0);
            }
            positions[LandmarkIdx::Wrist.index()] = Vector3::new(c.x, c.y + q, 0.0);
            positions[LandmarkIdx::MiddleFingerMcp.index()] = Vector3::new(c.x, c.y - q, 0.0);
            Ok(LandmarkResult::new(positions, (self.presence)(c), 0.0))
        }
    }

    fn palm(confidence: f32, x: f32, y: f32) -> Detection {
        Detection::new(confidence, Rect::from_center(x, y, 40.0, 40.0))
    }

    fn tracker(palms: Vec<Detection>) -> HandTracker<FakeDetector, FakeEstimator> {
        HandTracker::new(
            FakeDetector {
                palms,
                min_confidence: 0.0,
                calls: 0,
            },
            FakeEstimator {
                presence: Box::new(|_| 0.9),
                rois: Vec::new(),
            },
        )
    }

    #[test]
    fn palm_roi_extends_towards_fingers() {
        let roi = palm_roi(&palm(1.0, 100.0, 100.0));
        assert_abs_diff_eq!(roi.center(), Vector2::new(100.0, 80.0), epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rect().width(), 104.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rect().height(), 104.0, epsilon = 1e-4);

        let mut det = palm(1.0, 100.0, 100.0);
        det.set_angle(FRAC_PI_2);
        let roi = palm_roi(&det);
        assert_abs_diff_eq!(roi.center(), Vector2::new(120.0, 100.0), epsilon = 1e-4);
        assert_eq!(roi.rotation_radians(), FRAC_PI_2);
    }

    #[test]
    fn tracked_hands_skip_detection() {
        let image = Image::new(640, 480);
        let mut tracker = tracker(vec![palm(0.9, 100.0, 100.0)]);
        tracker.set_max_num_hands(1);

        let hands = tracker.track(&image).unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(tracker.detector().calls, 1);
        assert_eq!(tracker.num_tracked(), 1);
        let first = tracker.estimator().rois[0];

        let hands = tracker.track(&image).unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(tracker.detector().calls, 1);

        // The fake hand spans half of its region, so the region stays put.
        let second = tracker.estimator().rois[1];
        assert_abs_diff_eq!(second.center(), first.center(), epsilon = 1e-3);
        assert_abs_diff_eq!(second.rect().width(), first.rect().width(), epsilon = 1e-3);
    }

    #[test]
    fn lost_hands_are_redetected() {
        let image = Image::new(640, 480);
        let mut tracker = tracker(vec![palm(0.9, 100.0, 100.0)]);
        tracker.set_max_num_hands(1);
        tracker.set_min_tracking_confidence(0.5);

        assert_eq!(tracker.track(&image).unwrap().len(), 1);

        tracker.estimator.presence = Box::new(|_| 0.2);
        assert!(tracker.track(&image).unwrap().is_empty());
        assert_eq!(tracker.num_tracked(), 0);
        assert_eq!(tracker.detector().calls, 1);

        tracker.estimator.presence = Box::new(|_| 0.9);
        assert_eq!(tracker.track(&image).unwrap().len(), 1);
        assert_eq!(tracker.detector().calls, 2);
    }

    #[test]
    fn static_mode_detects_every_frame() {
        let image = Image::new(640, 480);
        let mut tracker = tracker(vec![palm(0.9, 100.0, 100.0)]);
        tracker.set_static_image_mode(true);
        tracker.set_min_tracking_confidence(0.1);

        for _ in 0..3 {
            assert_eq!(tracker.track(&image).unwrap().len(), 1);
            assert_eq!(tracker.num_tracked(), 0);
        }
        assert_eq!(tracker.detector().calls, 3);

        // The tracking confidence does not apply to static images.
        tracker.estimator.presence = Box::new(|_| 0.4);
        assert!(tracker.track(&image).unwrap().is_empty());
    }

    #[test]
    fn weak_and_overlapping_palms_are_ignored() {
        let image = Image::new(640, 480);
        let mut tracker = tracker(vec![
            palm(0.9, 100.0, 100.0),
            palm(0.8, 105.0, 100.0),
            palm(0.7, 400.0, 100.0),
            palm(0.3, 400.0, 300.0),
        ]);
        tracker.set_max_num_hands(4);
        tracker.set_min_detection_confidence(0.5);

        let hands = tracker.track(&image).unwrap();
        assert_eq!(hands.len(), 2);
        assert_eq!(tracker.estimator().rois.len(), 2);
    }

    #[test]
    fn detection_confidence_reaches_detector() {
        let image = Image::new(640, 480);
        let mut tracker = tracker(vec![palm(0.3, 100.0, 100.0)]);
        tracker.set_static_image_mode(true);
        assert_eq!(tracker.detector().min_confidence, 0.5);
        assert!(tracker.track(&image).unwrap().is_empty());

        tracker.set_min_detection_confidence(0.2);
        assert_eq!(tracker.detector().min_confidence, 0.2);
        assert_eq!(tracker.track(&image).unwrap().len(), 1);

        tracker.set_min_detection_confidence(0.8);
        assert!(tracker.track(&image).unwrap().is_empty());
        assert_eq!(tracker.estimator().rois.len(), 1);
    }

    #[test]
    fn limits_and_sorts_hands() {
        let image = Image::new(640, 480);
        let mut tracker = tracker(vec![
            palm(0.9, 100.0, 100.0),
            palm(0.8, 400.0, 100.0),
            palm(0.7, 400.0, 350.0),
        ]);
        tracker.estimator.presence =
            Box::new(|c: Vector2<f32>| if c.x < 200.0 { 0.6 } else { 0.95 });

        let hands = tracker.track(&image).unwrap();
        assert_eq!(hands.len(), 2);
        assert_eq!(tracker.estimator().rois.len(), 2);
        assert_eq!(hands[0].presence(), 0.95);
        assert_eq!(hands[1].presence(), 0.6);
        assert!(hands[0].position(LandmarkIdx::Wrist).x > 200.0);
    }
}

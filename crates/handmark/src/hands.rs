//! The bundled hand model: palm detection and landmark networks run with `tract`.

use std::path::Path;

use anyhow::Context;

use crate::{
    hand::{
        detection::PalmDetector,
        landmark::{LandmarkResult, Landmarker},
        tracking::HandTracker,
    },
    image::{Image, Resolution},
    model::{Hand, HandLandmarkModel, HandsOptions, ModelComplexity, NormalizedLandmark},
    timer::FpsCounter,
};

/// Finds and tracks hands with MediaPipe's palm detection and hand landmark networks.
///
/// The networks are read from the directory configured in [`HandsOptions`], and are expected to
/// be called `palm_detection_{lite,full}.onnx` and `hand_landmark_{lite,full}.onnx`.
pub struct Hands {
    tracker: HandTracker<PalmDetector, Landmarker>,
    fps: FpsCounter,
}

impl Hands {
    pub fn new(options: &HandsOptions) -> anyhow::Result<Self> {
        let dir = options.resolve_model_dir();
        let variant = match options.model_complexity {
            ModelComplexity::Lite => "lite",
            ModelComplexity::Full => "full",
        };

        let palm_path = dir.join(format!("palm_detection_{variant}.onnx"));
        let detector = PalmDetector::load(&palm_path).with_context(|| {
            format!("failed to load palm detector from '{}'", palm_path.display())
        })?;
        let landmark_path = dir.join(format!("hand_landmark_{variant}.onnx"));
        let landmarker = Landmarker::load(&landmark_path).with_context(|| {
            format!("failed to load landmarker from '{}'", landmark_path.display())
        })?;
        log::debug!(
            "loaded {variant} hand networks from '{}' (palm input {}, landmark input {})",
            dir.display(),
            detector.input_resolution(),
            landmarker.input_resolution(),
        );

        let mut tracker = HandTracker::new(detector, landmarker);
        tracker.set_static_image_mode(options.static_image_mode);
        tracker.set_max_num_hands(options.max_num_hands);
        tracker.set_min_detection_confidence(options.min_detection_confidence);
        tracker.set_min_tracking_confidence(options.min_tracking_confidence);

        Ok(Self {
            tracker,
            fps: FpsCounter::new("hands"),
        })
    }

    /// Like [`Hands::new`], loading the networks from `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P, options: &HandsOptions) -> anyhow::Result<Self> {
        Self::new(&options.clone().model_dir(dir.as_ref()))
    }
}

impl HandLandmarkModel for Hands {
    fn infer(&mut self, image: &Image) -> anyhow::Result<Vec<Hand>> {
        let results = self.tracker.track(image)?;
        let hands = results
            .iter()
            .map(|res| normalize(res, image.resolution()))
            .collect();

        self.fps.tick_with(
            self.tracker
                .detector()
                .timers()
                .into_iter()
                .chain(self.tracker.estimator().timers()),
        );
        Ok(hands)
    }
}

/// Converts pixel coordinates to coordinates relative to `res`.
fn normalize(result: &LandmarkResult, res: Resolution) -> Hand {
    let (w, h) = (res.width() as f32, res.height() as f32);
    let landmarks = result
        .positions()
        .map(|p| NormalizedLandmark::new(p.x / w, p.y / h, p.z / w));
    Hand::new(landmarks, result.handedness(), result.presence())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    use crate::hand::{Handedness, LandmarkIdx};

    use super::*;

    #[test]
    fn normalizes_by_frame_size() {
        let mut positions = [Vector3::new(320.0, 240.0, 64.0); LandmarkIdx::COUNT];
        positions[LandmarkIdx::ThumbTip.index()] = Vector3::new(-64.0, 480.0, 0.0);
        let hand = normalize(
            &LandmarkResult::new(positions, 0.75, 0.9),
            Resolution::new(640, 480),
        );

        assert_eq!(hand.landmarks().len(), 21);
        let wrist = hand.landmark(LandmarkIdx::Wrist);
        assert_abs_diff_eq!(wrist.x, 0.5);
        assert_abs_diff_eq!(wrist.y, 0.5);
        assert_abs_diff_eq!(wrist.z, 0.1);
        // Points outside of the frame stay outside.
        let thumb = hand.landmark(LandmarkIdx::ThumbTip);
        assert_abs_diff_eq!(thumb.x, -0.1);
        assert_abs_diff_eq!(thumb.y, 1.0);

        assert_eq!(hand.handedness(), Handedness::Right);
        assert_eq!(hand.score(), 0.75);
    }

    #[test]
    fn missing_networks_are_reported() {
        let dir = std::env::temp_dir().join("handmark-no-such-model-dir");
        let err = Hands::from_dir(&dir, &HandsOptions::default())
            .err()
            .expect("loading from a missing directory should fail");
        let msg = format!("{err:#}");
        assert!(msg.contains("palm_detection_full.onnx"), "{msg}");
    }
}

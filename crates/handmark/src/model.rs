//! The hand landmark model interface and its configuration.

use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{
    hand::{self, Handedness, LandmarkIdx},
    image::{Image, PixelFormat},
};

const ENV_VAR_MODEL_DIR: &str = "HANDMARK_MODEL_DIR";
const DEFAULT_MODEL_DIR: &str = "3rdparty/onnx";

/// A landmark position relative to the frame.
///
/// `x` and `y` are in `0.0..=1.0` for points inside the frame, scaled by its width and height.
/// `z` is depth relative to the wrist, roughly in the same scale as `x`; smaller is closer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// One detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    landmarks: [NormalizedLandmark; LandmarkIdx::COUNT],
    handedness: Handedness,
    score: f32,
}

impl Hand {
    pub fn new(
        landmarks: [NormalizedLandmark; LandmarkIdx::COUNT],
        handedness: Handedness,
        score: f32,
    ) -> Self {
        Self {
            landmarks,
            handedness,
            score,
        }
    }

    /// All landmarks, indexed by [`LandmarkIdx`].
    pub fn landmarks(&self) -> &[NormalizedLandmark; LandmarkIdx::COUNT] {
        &self.landmarks
    }

    pub fn landmark(&self, lm: LandmarkIdx) -> NormalizedLandmark {
        self.landmarks[lm.index()]
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Confidence that this really is a hand, in `0.0..=1.0`.
    pub fn score(&self) -> f32 {
        self.score
    }
}

/// Trades accuracy for speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelComplexity {
    Lite = 0,
    #[default]
    Full = 1,
}

/// Finds hands in images.
///
/// Implementations may keep state between calls, e.g. to track hands across video frames.
pub trait HandLandmarkModel {
    /// The pixel layout [`HandLandmarkModel::infer`] expects.
    fn input_format(&self) -> PixelFormat {
        PixelFormat::Rgb
    }

    /// Returns the hands visible in `image`, most confident first. Finding no hand is not an
    /// error.
    fn infer(&mut self, image: &Image) -> anyhow::Result<Vec<Hand>>;

    /// The landmark pairs that form the hand skeleton.
    fn connections(&self) -> &'static [(LandmarkIdx, LandmarkIdx)] {
        hand::CONNECTIONS
    }
}

impl<M: HandLandmarkModel + ?Sized> HandLandmarkModel for Box<M> {
    fn input_format(&self) -> PixelFormat {
        (**self).input_format()
    }

    fn infer(&mut self, image: &Image) -> anyhow::Result<Vec<Hand>> {
        (**self).infer(image)
    }

    fn connections(&self) -> &'static [(LandmarkIdx, LandmarkIdx)] {
        (**self).connections()
    }
}

/// Configuration of the bundled hand model.
///
/// Values are passed to the model as they are.
#[derive(Debug, Clone, PartialEq)]
pub struct HandsOptions {
    pub(crate) static_image_mode: bool,
    pub(crate) max_num_hands: usize,
    pub(crate) model_complexity: ModelComplexity,
    pub(crate) min_detection_confidence: f32,
    pub(crate) min_tracking_confidence: f32,
    model_dir: Option<PathBuf>,
}

impl Default for HandsOptions {
    fn default() -> Self {
        Self {
            static_image_mode: false,
            max_num_hands: 2,
            model_complexity: ModelComplexity::Full,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_dir: None,
        }
    }
}

impl HandsOptions {
    /// Treats every image as unrelated, running palm detection on all of them. Otherwise, hands
    /// are tracked across frames.
    pub fn static_image_mode(mut self, static_image_mode: bool) -> Self {
        self.static_image_mode = static_image_mode;
        self
    }

    pub fn max_num_hands(mut self, max_num_hands: usize) -> Self {
        self.max_num_hands = max_num_hands;
        self
    }

    pub fn model_complexity(mut self, complexity: ModelComplexity) -> Self {
        self.model_complexity = complexity;
        self
    }

    /// Minimum palm detection confidence for a new hand to be considered.
    pub fn min_detection_confidence(mut self, confidence: f32) -> Self {
        self.min_detection_confidence = confidence;
        self
    }

    /// Minimum landmark presence for a tracked hand to be kept. Ignored in static image mode.
    pub fn min_tracking_confidence(mut self, confidence: f32) -> Self {
        self.min_tracking_confidence = confidence;
        self
    }

    /// Sets the directory containing the `.onnx` networks.
    ///
    /// Defaults to `$HANDMARK_MODEL_DIR`, or `3rdparty/onnx` if that is unset.
    pub fn model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(dir.into());
        self
    }

    /// The directory the networks are loaded from.
    pub fn resolve_model_dir(&self) -> PathBuf {
        match &self.model_dir {
            Some(dir) => dir.clone(),
            None => env::var_os(ENV_VAR_MODEL_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| Path::new(DEFAULT_MODEL_DIR).to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = HandsOptions::default();
        assert!(!opts.static_image_mode);
        assert_eq!(opts.max_num_hands, 2);
        assert_eq!(opts.model_complexity, ModelComplexity::Full);
        assert_eq!(opts.min_detection_confidence, 0.5);
        assert_eq!(opts.min_tracking_confidence, 0.5);
        assert_eq!(ModelComplexity::Lite as u8, 0);
        assert_eq!(ModelComplexity::Full as u8, 1);
    }

    #[test]
    fn values_are_passed_through() {
        let opts = HandsOptions::default()
            .static_image_mode(true)
            .max_num_hands(0)
            .model_complexity(ModelComplexity::Lite)
            .min_detection_confidence(1.5)
            .min_tracking_confidence(-0.25)
            .model_dir("/opt/models");
        assert!(opts.static_image_mode);
        assert_eq!(opts.max_num_hands, 0);
        assert_eq!(opts.model_complexity, ModelComplexity::Lite);
        assert_eq!(opts.min_detection_confidence, 1.5);
        assert_eq!(opts.min_tracking_confidence, -0.25);
        assert_eq!(opts.resolve_model_dir(), Path::new("/opt/models"));
    }

    #[test]
    fn hand_accessors() {
        let mut landmarks = [NormalizedLandmark::default(); LandmarkIdx::COUNT];
        landmarks[LandmarkIdx::IndexFingerTip.index()] = NormalizedLandmark::new(0.25, 0.5, -0.1);
        let hand = Hand::new(landmarks, Handedness::Left, 0.8);
        assert_eq!(
            hand.landmark(LandmarkIdx::IndexFingerTip),
            NormalizedLandmark::new(0.25, 0.5, -0.1)
        );
        assert_eq!(hand.landmarks().len(), 21);
        assert_eq!(hand.handedness(), Handedness::Left);
        assert_eq!(hand.score(), 0.8);
    }
}

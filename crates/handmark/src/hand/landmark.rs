//! Hand landmark estimation.

use std::path::Path;

use anyhow::{anyhow, ensure};
use nalgebra::{Vector2, Vector3};

use crate::{
    detection::upright_angle,
    image::{Image, Resolution},
    nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs},
    rect::RotatedRect,
    timer::Timer,
};

use super::{Handedness, LandmarkIdx, PALM_LANDMARKS};

/// Landmarks of one hand, as estimated by a [`Landmarker`].
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkResult {
    positions: [Vector3<f32>; LandmarkIdx::COUNT],
    presence: f32,
    raw_handedness: f32,
}

impl LandmarkResult {
    pub fn new(
        positions: [Vector3<f32>; LandmarkIdx::COUNT],
        presence: f32,
        raw_handedness: f32,
    ) -> Self {
        Self {
            positions,
            presence,
            raw_handedness,
        }
    }

    /// Landmark positions in image pixels. Z is relative depth in the same scale as X.
    pub fn positions(&self) -> &[Vector3<f32>; LandmarkIdx::COUNT] {
        &self.positions
    }

    #[inline]
    pub fn position(&self, lm: LandmarkIdx) -> Vector3<f32> {
        self.positions[lm.index()]
    }

    /// Likelihood that a hand is actually present in the examined region.
    #[inline]
    pub fn presence(&self) -> f32 {
        self.presence
    }

    #[inline]
    pub fn raw_handedness(&self) -> f32 {
        self.raw_handedness
    }

    /// Only meaningful when [`LandmarkResult::presence`] is high.
    pub fn handedness(&self) -> Handedness {
        Handedness::from_raw(self.raw_handedness)
    }

    /// Average of the landmarks surrounding the palm.
    pub fn palm_center(&self) -> Vector3<f32> {
        let sum: Vector3<f32> = PALM_LANDMARKS.iter().map(|&lm| self.position(lm)).sum();
        sum / PALM_LANDMARKS.len() as f32
    }

    /// Clockwise rotation of the hand. 0.0 means the fingers point up.
    pub fn rotation_radians(&self) -> f32 {
        upright_angle(
            self.position(LandmarkIdx::Wrist).xy(),
            self.position(LandmarkIdx::MiddleFingerMcp).xy(),
        )
    }

    fn map_positions(&mut self, f: impl Fn(Vector3<f32>) -> Vector3<f32>) {
        for pos in &mut self.positions {
            *pos = f(*pos);
        }
    }
}

/// Runs a hand landmark network on regions of an image.
pub struct Landmarker {
    cnn: Cnn,
    t_infer: Timer,
}

impl Landmarker {
    /// Loads a hand landmark network from an `.onnx` file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        // Screen landmarks, presence and handedness. World landmarks are not used.
        let nn = NeuralNetwork::from_path(path)?
            .with_output_selection([0, 1, 2])
            .load()?;
        Ok(Self::new(Cnn::new(
            nn,
            CnnInputShape::NCHW,
            ColorMapper::linear(0.0..=1.0),
        )?))
    }

    pub fn new(cnn: Cnn) -> Self {
        Self {
            cnn,
            t_infer: Timer::new("landmark infer"),
        }
    }

    pub fn input_resolution(&self) -> Resolution {
        self.cnn.input_resolution()
    }

    /// Estimates the landmarks of the hand inside `roi`.
    ///
    /// `roi` is enlarged to the network's aspect ratio. Landmarks are returned in the coordinate
    /// system of `image`, and may lie outside of it.
    pub fn estimate(&mut self, image: &Image, roi: RotatedRect) -> anyhow::Result<LandmarkResult> {
        let input_res = self.input_resolution();
        let aspect = input_res.aspect_ratio().ok_or_else(|| {
            anyhow!("landmark network has degenerate input resolution {input_res}")
        })?;
        let view = roi.grow_to_fit_aspect(aspect);

        let outputs = self.t_infer.time(|| self.cnn.estimate(image, view))?;
        log::trace!("landmark outputs: {:?}", outputs);
        let mut result = extract(&outputs)?;

        let scale = Vector2::new(
            view.rect().width() / input_res.width() as f32,
            view.rect().height() / input_res.height() as f32,
        );
        result.map_positions(|p| {
            let xy = view.transform_out(p.xy().component_mul(&scale));
            Vector3::new(xy.x, xy.y, p.z * scale.x)
        });
        Ok(result)
    }

    pub fn timers(&self) -> impl IntoIterator<Item = &Timer> + '_ {
        [&self.t_infer]
    }
}

/// Decodes the raw outputs: screen landmarks, presence flag and handedness. A fourth output with
/// metric landmarks may follow and is ignored.
fn extract(outputs: &Outputs) -> anyhow::Result<LandmarkResult> {
    ensure!(
        outputs.len() >= 3,
        "landmark network produced {} outputs, expected at least 3",
        outputs.len()
    );
    let screen_landmarks = &outputs[0];
    let presence = &outputs[1];
    let handedness = &outputs[2];
    ensure!(
        screen_landmarks.shape() == [1, LandmarkIdx::COUNT * 3],
        "unexpected landmark shape {:?}",
        screen_landmarks.shape()
    );
    ensure!(
        presence.shape() == [1, 1] && handedness.shape() == [1, 1],
        "unexpected presence/handedness shapes {:?}/{:?}",
        presence.shape(),
        handedness.shape()
    );

    let mut positions = [Vector3::zeros(); LandmarkIdx::COUNT];
    let coords = screen_landmarks.index([0]).as_slice().chunks_exact(3);
    for (xyz, out) in coords.zip(&mut positions) {
        *out = Vector3::new(xyz[0], xyz[1], xyz[2]);
    }

    Ok(LandmarkResult {
        positions,
        presence: presence.index([0, 0]).as_singular(),
        raw_handedness: handedness.index([0, 0]).as_singular(),
    })
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use crate::nn::Tensor;

    use super::*;

    fn outputs(landmarks: impl Fn(usize) -> [f32; 3], presence: f32, handedness: f32) -> Outputs {
        let screen = Tensor::from_shape_fn([1, 63], |[_, i]| landmarks(i / 3)[i % 3]);
        vec![
            screen.clone(),
            Tensor::from_vec(&[1, 1], vec![presence]).unwrap(),
            Tensor::from_vec(&[1, 1], vec![handedness]).unwrap(),
            screen,
        ]
        .into()
    }

    #[test]
    fn extracts_landmarks_in_order() {
        let res = extract(&outputs(|i| [i as f32, 2.0 * i as f32, -1.0], 0.75, 0.9)).unwrap();
        assert_eq!(res.presence(), 0.75);
        assert_eq!(res.handedness(), Handedness::Right);
        assert_eq!(
            res.position(LandmarkIdx::PinkyTip),
            Vector3::new(20.0, 40.0, -1.0)
        );
        assert_eq!(res.positions()[0], Vector3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn rejects_missing_outputs() {
        let screen = Tensor::from_shape_fn([1, 63], |_| 0.0);
        assert!(extract(&vec![screen].into()).is_err());

        let short = Tensor::from_shape_fn([1, 60], |_| 0.0);
        let flag = Tensor::from_vec(&[1, 1], vec![1.0]).unwrap();
        assert!(extract(&vec![short, flag.clone(), flag].into()).is_err());
    }

    #[test]
    fn palm_center_and_rotation() {
        // Fingers pointing to the right of the image.
        let mut res = extract(&outputs(|_| [0.0; 3], 1.0, 0.0)).unwrap();
        res.positions[LandmarkIdx::MiddleFingerMcp.index()] = Vector3::new(10.0, 0.0, 0.0);
        assert_abs_diff_eq!(res.rotation_radians(), FRAC_PI_2, epsilon = 1e-6);
        assert_abs_diff_eq!(
            res.palm_center(),
            Vector3::new(10.0 / 6.0, 0.0, 0.0),
            epsilon = 1e-6
        );
        assert_eq!(res.handedness(), Handedness::Left);
    }
}

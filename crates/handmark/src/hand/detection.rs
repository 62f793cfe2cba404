//! Palm detection.
//!
//! The palm detection networks are SSDs with 2016 anchors. Every anchor predicts a palm box and 7
//! keypoints; the angle of the palm is derived from the wrist and middle finger keypoints.

use std::path::Path;

use anyhow::{anyhow, ensure};
use nalgebra::Vector2;

use crate::{
    detection::{
        nms::NonMaxSuppression,
        ssd::{Anchors, LayerInfo},
        upright_angle, Detection, Keypoint,
    },
    image::{Image, Resolution},
    nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs},
    num::sigmoid,
    rect::Rect,
    timer::Timer,
};

/// The keypoints of a palm [`Detection`], in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PalmKeypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

const NUM_KEYPOINTS: usize = 7;
const BOX_PARAMS: usize = 4 + NUM_KEYPOINTS * 2;

const LAYERS: &[LayerInfo] = &[LayerInfo::new(2, 24, 24), LayerInfo::new(6, 12, 12)];

/// Runs a palm detection network on whole images.
pub struct PalmDetector {
    cnn: Cnn,
    anchors: Anchors,
    nms: NonMaxSuppression,
    threshold: f32,
    t_infer: Timer,
    t_nms: Timer,
}

impl PalmDetector {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;

    /// Loads a palm detection network from an `.onnx` file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?.load()?;
        Ok(Self::new(Cnn::new(
            nn,
            CnnInputShape::NCHW,
            ColorMapper::linear(0.0..=1.0),
        )?))
    }

    pub fn new(cnn: Cnn) -> Self {
        Self {
            cnn,
            anchors: Anchors::calculate(LAYERS),
            nms: NonMaxSuppression::new(),
            threshold: Self::DEFAULT_THRESHOLD,
            t_infer: Timer::new("palm infer"),
            t_nms: Timer::new("palm nms"),
        }
    }

    /// Sets the minimum confidence a palm must have to be reported.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn input_resolution(&self) -> Resolution {
        self.cnn.input_resolution()
    }

    /// Detects palms in `image`, most confident first. Coordinates are in image pixels.
    pub fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<Detection>> {
        let input_res = self.input_resolution();
        let aspect = input_res
            .aspect_ratio()
            .ok_or_else(|| anyhow!("palm network has degenerate input resolution {input_res}"))?;
        // Pad the image to the network's aspect ratio instead of stretching it.
        let full = image.rect().grow_to_fit_aspect(aspect);

        let outputs = self
            .t_infer
            .time(|| self.cnn.estimate(image, full.into()))?;
        let mut detections = extract(&self.anchors, input_res, &outputs, self.threshold)?;
        self.t_nms.time(|| self.nms.process(&mut detections));

        let scale = full.width() / input_res.width() as f32;
        for det in &mut detections {
            det.map_coords(scale, full.top_left());
        }
        Ok(detections)
    }

    pub fn timers(&self) -> impl IntoIterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_nms]
    }
}

/// Decodes raw network outputs into detections in input-resolution coordinates.
fn extract(
    anchors: &Anchors,
    input_res: Resolution,
    outputs: &Outputs,
    threshold: f32,
) -> anyhow::Result<Vec<Detection>> {
    ensure!(
        outputs.len() >= 2,
        "palm network produced {} outputs, expected 2",
        outputs.len()
    );
    let boxes = &outputs[0];
    let scores = &outputs[1];
    ensure!(
        boxes.shape() == [1, anchors.len(), BOX_PARAMS],
        "unexpected palm box shape {:?}",
        boxes.shape()
    );
    ensure!(
        scores.shape() == [1, anchors.len(), 1],
        "unexpected palm score shape {:?}",
        scores.shape()
    );

    let (input_w, input_h) = (input_res.width() as f32, input_res.height() as f32);
    let mut detections = Vec::new();
    for (index, score) in scores.index([0]).iter().enumerate() {
        let confidence = sigmoid(score.as_slice()[0]);
        if confidence < threshold {
            continue;
        }

        let anchor = anchors[index];
        let offset = Vector2::new(anchor.x_center() * input_w, anchor.y_center() * input_h);
        let params = boxes.index([0, index]).as_slice();
        let center = Vector2::new(params[0], params[1]) + offset;
        let keypoints = params[4..]
            .chunks_exact(2)
            .map(|xy| Keypoint::new(xy[0] + offset.x, xy[1] + offset.y))
            .collect::<Vec<_>>();

        let mut det = Detection::with_keypoints(
            confidence,
            Rect::from_center(center.x, center.y, params[2], params[3]),
            keypoints,
        );
        let wrist = det.keypoints()[PalmKeypoint::Wrist as usize].pos();
        let finger = det.keypoints()[PalmKeypoint::MiddleFingerMcp as usize].pos();
        det.set_angle(upright_angle(wrist, finger));
        detections.push(det);
    }

    Ok(detections)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use crate::nn::Tensor;

    use super::*;

    const RES: Resolution = Resolution::new(192, 192);

    fn outputs(hits: &[(usize, f32, [f32; BOX_PARAMS])]) -> Outputs {
        let anchors = Anchors::calculate(LAYERS).len();
        let boxes = Tensor::from_shape_fn([1, anchors, BOX_PARAMS], |[_, i, p]| {
            hits.iter()
                .find(|hit| hit.0 == i)
                .map_or(0.0, |hit| hit.2[p])
        });
        let scores = Tensor::from_shape_fn([1, anchors, 1], |[_, i, _]| {
            hits.iter().find(|hit| hit.0 == i).map_or(-10.0, |hit| hit.1)
        });
        vec![boxes, scores].into()
    }

    /// Box parameters of a palm whose middle finger points `dir` away from the wrist.
    fn palm(dir: Vector2<f32>) -> [f32; BOX_PARAMS] {
        let mut params = [0.0; BOX_PARAMS];
        params[2] = 20.0;
        params[3] = 20.0;
        let finger = dir * 10.0;
        params[4 + PalmKeypoint::MiddleFingerMcp as usize * 2] = finger.x;
        params[5 + PalmKeypoint::MiddleFingerMcp as usize * 2] = finger.y;
        params
    }

    #[test]
    fn decodes_boxes_relative_to_anchors() {
        let anchors = Anchors::calculate(LAYERS);
        let mut params = palm(Vector2::new(0.0, -1.0));
        params[0] = 3.0;
        params[1] = -2.0;
        let dets = extract(&anchors, RES, &outputs(&[(2, 5.0, params)]), 0.5).unwrap();

        assert_eq!(dets.len(), 1);
        let det = &dets[0];
        assert_abs_diff_eq!(det.confidence(), sigmoid(5.0));
        // Anchor 2 is the second cell of the first row of the 24x24 layer.
        let (ax, ay) = (1.5 / 24.0 * 192.0, 0.5 / 24.0 * 192.0);
        assert_eq!(
            det.bounding_rect(),
            Rect::from_center(ax + 3.0, ay - 2.0, 20.0, 20.0)
        );
        assert_eq!(det.keypoints().len(), NUM_KEYPOINTS);
        assert_eq!(
            det.keypoints()[PalmKeypoint::Wrist as usize],
            Keypoint::new(ax, ay)
        );
        // Fingers pointing up.
        assert_abs_diff_eq!(det.angle(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn angle_follows_fingers() {
        let anchors = Anchors::calculate(LAYERS);
        let dets = extract(
            &anchors,
            RES,
            &outputs(&[(0, 5.0, palm(Vector2::new(1.0, 0.0)))]),
            0.5,
        )
        .unwrap();
        assert_abs_diff_eq!(dets[0].angle(), FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn threshold_filters_scores() {
        let anchors = Anchors::calculate(LAYERS);
        let up = palm(Vector2::new(0.0, -1.0));
        let out = outputs(&[(0, 3.0, up), (100, 0.0, up), (2000, -3.0, up)]);

        assert_eq!(extract(&anchors, RES, &out, 0.5).unwrap().len(), 2);
        assert_eq!(extract(&anchors, RES, &out, 0.9).unwrap().len(), 1);
        assert_eq!(extract(&anchors, RES, &out, 0.01).unwrap().len(), 3);
    }

    #[test]
    fn rejects_unexpected_shapes() {
        let anchors = Anchors::calculate(LAYERS);
        let boxes = Tensor::from_shape_fn([1, 10, BOX_PARAMS], |_| 0.0);
        let scores = Tensor::from_shape_fn([1, 10, 1], |_| 0.0);
        assert!(extract(&anchors, RES, &vec![boxes.clone(), scores].into(), 0.5).is_err());
        assert!(extract(&anchors, RES, &vec![boxes].into(), 0.5).is_err());
    }
}

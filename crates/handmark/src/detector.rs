//! The hand detector adapter: runs a [`HandLandmarkModel`] on frames, draws its results and
//! converts landmarks to pixel coordinates.

use thiserror::Error;

use crate::{
    hand::LandmarkIdx,
    hands::Hands,
    image::{draw, Color, Image, Resolution},
    model::{Hand, HandLandmarkModel, HandsOptions, NormalizedLandmark},
};

const CONNECTION_COLOR: Color = Color::from_rgb8(224, 224, 224);
const CONNECTION_WIDTH: u32 = 2;
const LANDMARK_COLOR: Color = Color::RED;
const LANDMARK_RADIUS: u32 = 2;
const POSITION_COLOR: Color = Color::BLUE;
const POSITION_RADIUS: u32 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetectorError {
    /// [`HandDetector::find_position`] was called before [`HandDetector::find_hands`].
    #[error("no hand detection result available, `find_hands` has not been called yet")]
    NoResult,
}

/// A landmark in pixel coordinates of the frame it was requested for.
///
/// Coordinates are not clamped to the frame and may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkPosition {
    /// Index of the landmark, see [`LandmarkIdx`].
    pub id: usize,
    pub x: i32,
    pub y: i32,
}

impl LandmarkPosition {
    pub fn landmark(&self) -> Option<LandmarkIdx> {
        LandmarkIdx::from_index(self.id)
    }
}

struct Detections {
    hands: Vec<Hand>,
    resolution: Resolution,
}

/// Finds hands in frames and reports their landmarks.
///
/// The result of the last [`HandDetector::find_hands`] call is kept until the next one, and is
/// what [`HandDetector::find_position`] reports on.
pub struct HandDetector {
    model: Box<dyn HandLandmarkModel>,
    last: Option<Detections>,
}

impl HandDetector {
    /// Loads the bundled [`Hands`] model.
    pub fn new(options: HandsOptions) -> anyhow::Result<Self> {
        Ok(Self::with_model(Hands::new(&options)?))
    }

    pub fn with_model<M: HandLandmarkModel + 'static>(model: M) -> Self {
        Self {
            model: Box::new(model),
            last: None,
        }
    }

    /// Runs the model on `frame` and stores the result.
    ///
    /// The frame is converted to the model's pixel format first. If `draw` is set, the skeleton of
    /// every hand found is drawn onto `frame`. Errors from the model are returned unchanged, and
    /// leave no result behind.
    pub fn find_hands(&mut self, frame: &mut Image, draw: bool) -> anyhow::Result<&[Hand]> {
        self.last = None;
        let hands = {
            let input = frame.as_format(self.model.input_format());
            self.model.infer(&input)?
        };
        let resolution = frame.resolution();
        if draw {
            for hand in &hands {
                draw_skeleton(frame, hand, self.model.connections());
            }
        }

        let last = self.last.insert(Detections { hands, resolution });
        Ok(&last.hands)
    }

    /// Returns the landmarks of hand number `hand_index` of the last result, in pixels of `frame`.
    ///
    /// The list is empty if fewer hands were found. If `draw` is set, a filled circle is drawn at
    /// every landmark.
    pub fn find_position(
        &self,
        frame: &mut Image,
        hand_index: usize,
        draw: bool,
    ) -> Result<Vec<LandmarkPosition>, DetectorError> {
        let last = self.last.as_ref().ok_or(DetectorError::NoResult)?;
        if last.resolution != frame.resolution() {
            log::debug!(
                "hands were found in a {} frame, but positions are requested for {}",
                last.resolution,
                frame.resolution(),
            );
        }

        let Some(hand) = last.hands.get(hand_index) else {
            return Ok(Vec::new());
        };
        let res = frame.resolution();
        let positions = hand
            .landmarks()
            .iter()
            .enumerate()
            .map(|(id, lm)| {
                let (x, y) = to_pixel(lm, res);
                LandmarkPosition { id, x, y }
            })
            .collect::<Vec<_>>();

        if draw {
            for pos in &positions {
                draw::circle(frame, pos.x, pos.y, POSITION_RADIUS)
                    .filled()
                    .color(POSITION_COLOR);
            }
        }
        Ok(positions)
    }

    /// The hands found by the last [`HandDetector::find_hands`] call.
    pub fn hands(&self) -> Option<&[Hand]> {
        self.last.as_ref().map(|last| &*last.hands)
    }

    pub fn connections(&self) -> &'static [(LandmarkIdx, LandmarkIdx)] {
        self.model.connections()
    }
}

/// Rounds a normalized landmark to the nearest pixel of a `res` frame.
fn to_pixel(lm: &NormalizedLandmark, res: Resolution) -> (i32, i32) {
    let x = (lm.x * res.width() as f32).round() as i32;
    let y = (lm.y * res.height() as f32).round() as i32;
    (x, y)
}

fn draw_skeleton(frame: &mut Image, hand: &Hand, connections: &[(LandmarkIdx, LandmarkIdx)]) {
    let res = frame.resolution();
    for &(a, b) in connections {
        let (ax, ay) = to_pixel(&hand.landmark(a), res);
        let (bx, by) = to_pixel(&hand.landmark(b), res);
        draw::line(frame, ax, ay, bx, by)
            .color(CONNECTION_COLOR)
            .stroke_width(CONNECTION_WIDTH);
    }
    for lm in hand.landmarks() {
        let (x, y) = to_pixel(lm, res);
        draw::circle(frame, x, y, LANDMARK_RADIUS)
            .filled()
            .color(LANDMARK_COLOR);
    }
}

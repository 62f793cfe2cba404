//! The capture loop: reads frames, annotates them with hand landmarks and the frame rate, and
//! shows them. Still images can be annotated with [`annotate_file`].

use std::path::Path;

use crate::{
    detector::{HandDetector, LandmarkPosition},
    gui,
    image::{draw, Color, Image},
    timer::FrameRate,
    video::webcam::Webcam,
};

/// Produces frames, blocking until the next one is available.
pub trait FrameSource {
    fn read(&mut self) -> anyhow::Result<Image>;
}

impl FrameSource for Webcam {
    fn read(&mut self) -> anyhow::Result<Image> {
        Webcam::read(self)
    }
}

/// Consumes annotated frames.
pub trait FrameSink {
    fn show(&mut self, image: &Image) -> anyhow::Result<()>;
}

/// Shows frames in a GUI window.
pub struct ImageWindow {
    title: String,
}

impl ImageWindow {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl FrameSink for ImageWindow {
    fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        gui::show_image(self.title.as_str(), image)
    }
}

/// Position of the frame rate overlay (left edge, bottom of the text).
const FPS_POS: (i32, i32) = (10, 78);
const FPS_COLOR: Color = Color::MAGENTA;

pub struct CaptureLoop<S, K> {
    source: S,
    sink: K,
    detector: HandDetector,
    frame_rate: FrameRate,
    positions: Vec<LandmarkPosition>,
}

impl<S: FrameSource, K: FrameSink> CaptureLoop<S, K> {
    /// Creates a capture loop. Its frame rate is measured from this point on.
    pub fn new(source: S, sink: K, detector: HandDetector) -> Self {
        Self {
            source,
            sink,
            detector,
            frame_rate: FrameRate::new(),
            positions: Vec::new(),
        }
    }

    /// Processes a single frame and returns the instantaneous frame rate.
    pub fn step(&mut self) -> anyhow::Result<f32> {
        let mut frame = self.source.read()?;
        self.detector.find_hands(&mut frame, true)?;
        self.positions = self.detector.find_position(&mut frame, 0, true)?;
        if let Some(tip) = self.positions.get(4) {
            log::trace!("thumb tip at {},{}", tip.x, tip.y);
        }

        let fps = self.frame_rate.tick();
        draw_fps(&mut frame, fps);
        self.sink.show(&frame)?;
        Ok(fps)
    }

    /// Processes frames until reading, detecting or showing one fails.
    pub fn run(mut self) -> anyhow::Result<()> {
        loop {
            self.step()?;
        }
    }

    /// Landmarks of the first hand in the last frame, empty if it had none.
    pub fn positions(&self) -> &[LandmarkPosition] {
        &self.positions
    }

    pub fn detector(&self) -> &HandDetector {
        &self.detector
    }
}

/// Draws the frame rate, truncated to an integer, with the bottom left corner of the text at
/// (10, 78).
pub fn draw_fps(frame: &mut Image, fps: f32) {
    let text = format!("{}", fps as i32);
    draw::text(frame, FPS_POS.0, FPS_POS.1, &text)
        .large()
        .align_left()
        .align_bottom()
        .color(FPS_COLOR);
}

/// Finds hands in the image file at `input` and saves it to `output` with the skeletons and the
/// landmarks of the first hand drawn on top.
///
/// Both paths need a `.png`, `.jpg` or `.jpeg` extension. Returns the landmarks of the first hand.
pub fn annotate_file(
    detector: &mut HandDetector,
    input: &Path,
    output: &Path,
) -> anyhow::Result<Vec<LandmarkPosition>> {
    let mut image = Image::load(input)?;
    let hands = detector.find_hands(&mut image, true)?.len();
    let positions = detector.find_position(&mut image, 0, true)?;
    log::info!("found {hands} hand(s) in '{}'", input.display());
    image.save(output)?;
    Ok(positions)
}

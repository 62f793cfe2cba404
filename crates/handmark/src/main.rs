//! Shows webcam video with the landmarks of detected hands and the current frame rate.
//!
//! Given an image path instead, annotates that image and saves it as `hands.png`, or to the path
//! passed as the second argument.

use std::path::Path;

use handmark::{
    capture::{self, CaptureLoop, ImageWindow},
    detector::HandDetector,
    model::HandsOptions,
    video::webcam::{Webcam, WebcamOptions},
};

#[handmark::main]
fn main() -> anyhow::Result<()> {
    let mut args = std::env::args_os().skip(1);
    if let Some(input) = args.next() {
        let output = args.next().unwrap_or_else(|| "hands.png".into());
        let mut detector = HandDetector::new(HandsOptions::default().static_image_mode(true))?;
        let positions = capture::annotate_file(&mut detector, input.as_ref(), output.as_ref())?;
        for pos in positions {
            println!("{} {} {}", pos.id, pos.x, pos.y);
        }
        log::info!("saved annotated image to '{}'", Path::new(&output).display());
        return Ok(());
    }

    let mut options = WebcamOptions::default();
    if std::env::var_os("HANDMARK_WEBCAM_NAME").is_none() {
        options = options.index(0);
    }
    let webcam = Webcam::open(options)?;
    let detector = HandDetector::new(HandsOptions::default())?;

    CaptureLoop::new(webcam, ImageWindow::new("Image"), detector).run()
}

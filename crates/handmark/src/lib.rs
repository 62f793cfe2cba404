//! Hand landmark detection for live video.
//!
//! [`detector::HandDetector`] runs a [`model::HandLandmarkModel`] on frames, optionally draws the
//! hand skeletons it finds, and reports the 21 landmarks of a hand in pixel coordinates.
//! [`capture::CaptureLoop`] drives it from a webcam and shows the annotated frames together with
//! the current frame rate.
//!
//! The bundled model, [`hands::Hands`], runs MediaPipe's palm detection and hand landmark
//! networks, and tracks hands across frames so that palm detection only has to run when a hand is
//! lost.
//!
//! # Coordinates
//!
//! Image coordinates have X pointing right and Y pointing *down*, with `(0, 0)` in the top left
//! corner. Landmark depth (Z) grows away from the camera.
//!
//! # Environment Variables
//!
//! * `HANDMARK_JPEG_BACKEND`: Configures the JPEG decoder used for webcam frames. Allowed values
//!   are:
//!   * `mozjpeg`: uses the [mozjpeg] library (the default).
//!   * `zune-jpeg`: uses the [zune-jpeg] crate.
//!   * `jpeg-decoder`: uses the [jpeg-decoder] crate.
//! * `HANDMARK_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s opened without an explicit
//!   device. If unset, the first device that supports a compatible image format is used.
//! * `HANDMARK_MODEL_DIR`: Directory containing the `.onnx` networks, unless one is configured in
//!   [`HandsOptions`]. Defaults to `3rdparty/onnx`.
//! * `RUST_LOG`: Overrides the log levels set by [`init_logger!`].
//!
//! [mozjpeg]: https://github.com/mozilla/mozjpeg
//! [zune-jpeg]: https://github.com/etemesi254/zune-jpeg
//! [jpeg-decoder]: https://github.com/image-rs/jpeg-decoder/
//! [`Webcam`]: video::webcam::Webcam
//! [`HandsOptions`]: model::HandsOptions

use log::LevelFilter;

pub mod capture;
pub mod detection;
pub mod detector;
pub mod gui;
pub mod hand;
pub mod hands;
pub mod image;
pub mod model;
pub mod nn;
pub mod num;
pub mod rect;
pub mod termination;
pub mod timer;
pub mod video;

pub use handmark_macros::main;

use termination::Termination;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and handmark log at *debug* level, `wgpu` at *warn* level. `RUST_LOG` takes
/// precedence over both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn run<R: Termination + Send + 'static>(main: fn() -> R) -> ! {
    gui::run(main)
}

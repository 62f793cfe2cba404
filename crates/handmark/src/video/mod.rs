//! Video capture devices.

pub mod webcam;

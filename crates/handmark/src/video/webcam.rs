//! V4L2 webcam access.
//!
//! Only `VIDEO_CAPTURE` devices that deliver JFIF JPEG or Motion JPEG frames are supported.

use std::{cmp::Reverse, env, path::PathBuf};

use anyhow::{bail, Context};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{
    image::{Image, Resolution},
    timer::Timer,
};

const ENV_VAR_WEBCAM_NAME: &str = "HANDMARK_WEBCAM_NAME";

/// Whether to keep the resolution or the frame rate when the camera cannot deliver both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamPreference {
    #[default]
    Resolution,
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Device selection and format negotiation options.
///
/// Without a device index or name, the first device that supports a compatible format is used,
/// unless `HANDMARK_WEBCAM_NAME` names a specific one.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    index: Option<u32>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Opens the device whose card name is `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Opens `/dev/video{index}`.
    pub fn index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Requests at least this resolution. A lower one is used if the camera does not support it.
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Requests at least this frame rate. A lower one is used if the camera does not support it.
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects which parameter to maximize, and which one to give up first during negotiation.
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

/// A webcam yielding a stream of RGBA [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the webcam selected by `options`.
    ///
    /// Blocks while the camera initializes, which can take hundreds of milliseconds.
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        if let Some(index) = options.index {
            let path = PathBuf::from(format!("/dev/video{index}"));
            let dev = Device::open(&path)
                .with_context(|| format!("failed to open '{}'", path.display()))?;
            return match Self::open_device(dev, &options)? {
                Some(webcam) => Ok(webcam),
                None => bail!("'{}' is not a supported capture device", path.display()),
            };
        }

        let name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = &name_from_env {
            log::debug!("`{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
        }
        let name = options.name.as_deref().or(name_from_env.as_deref());

        for dev in linuxvideo::list()? {
            let dev = match dev {
                Ok(dev) => dev,
                Err(e) => {
                    log::warn!("{e}");
                    continue;
                }
            };
            if let Some(name) = name {
                if dev.capabilities()?.card() != name {
                    continue;
                }
            }
            match Self::open_device(dev, &options) {
                Ok(Some(webcam)) => return Ok(webcam),
                Ok(None) => {}
                Err(e) => log::debug!("{e:#}"),
            }
        }

        match name {
            Some(name) => bail!("no supported webcam named '{name}' found"),
            None => bail!("no supported webcam found"),
        }
    }

    fn open_device(dev: Device, options: &WebcamOptions) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        let flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            flags
        );
        if !flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, interval) = negotiate_format(&dev, options.frame)?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let actual = capture.set_frame_interval(interval)?;
        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        Ok(Some(Self {
            stream: capture.into_stream(2)?,
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Blocks until the next frame is available and decodes it.
    ///
    /// Corrupted frames are logged and replaced by a blank image, so that a single bad USB
    /// transfer does not end the stream.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue = self.t_dequeue.start();
        let image = self.stream.dequeue(|buf| {
            drop(dequeue);
            let image = match self.t_decode.time(|| Image::decode_jpeg(&buf)) {
                Ok(image) => image,
                Err(e) => {
                    log::error!("webcam decode error: {e:#}");
                    Image::new(self.resolution.width(), self.resolution.height())
                }
            };
            Ok(image)
        })?;
        Ok(image)
    }

    pub fn timers(&self) -> impl IntoIterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode]
    }
}

struct FrameFormat {
    resolution: Resolution,
    interval: Fract,
}

fn negotiate_format(device: &Device, prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixelformat = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?.pixelformat();
        if format == Pixelformat::JPEG || format == Pixelformat::MJPG {
            pixelformat = Some(format);
            break;
        }
    }
    let Some(pixelformat) = pixelformat else {
        bail!("device does not support JPEG or MJPG frames");
    };

    let mut formats = Vec::new();
    let FrameSizes::Discrete(sizes) = device.frame_sizes(pixelformat)? else {
        bail!("stepwise or continuous resolutions are not supported");
    };
    for size in sizes {
        let FrameIntervals::Discrete(intervals) =
            device.frame_intervals(pixelformat, size.width(), size.height())?
        else {
            bail!("stepwise or continuous frame rates are not supported");
        };
        for interval in intervals {
            formats.push(FrameFormat {
                resolution: Resolution::new(size.width(), size.height()),
                interval: *interval.fract(),
            });
        }
    }

    let candidates = formats
        .iter()
        .map(|f| (f.resolution, 1.0 / f.interval.as_f32()))
        .collect::<Vec<_>>();
    let Some(index) = select_format(&candidates, prefs) else {
        bail!("device offers no frame formats");
    };
    let format = &formats[index];
    Ok((
        PixFormat::new(
            format.resolution.width(),
            format.resolution.height(),
            pixelformat,
        ),
        format.interval,
    ))
}

/// Picks one of the `(resolution, fps)` candidates, relaxing `prefs` until one is eligible.
fn select_format(candidates: &[(Resolution, f32)], mut prefs: FramePrefs) -> Option<usize> {
    loop {
        if let Some(index) = select_format_step(candidates, prefs) {
            return Some(index);
        }

        log::debug!("no format satisfies {prefs:?}");
        // Drop the less important requirement first.
        let relaxed = match prefs.pref {
            ParamPreference::Resolution => {
                prefs.fps.take().is_some() || prefs.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                prefs.resolution.take().is_some() || prefs.fps.take().is_some()
            }
        };
        if !relaxed {
            return None;
        }
    }
}

fn select_format_step(candidates: &[(Resolution, f32)], prefs: FramePrefs) -> Option<usize> {
    let eligible = candidates.iter().enumerate().filter(|(_, (res, fps))| {
        prefs.resolution.map_or(true, |want| {
            res.width() >= want.width() && res.height() >= want.height()
        }) && prefs.fps.map_or(true, |want| fps.round() >= want as f32)
    });
    // Ties prefer the smaller value of the other parameter, which keeps bandwidth down.
    let key = |&(_, &(res, fps)): &(usize, &(Resolution, f32))| {
        let fps = fps.round() as u32;
        match prefs.pref {
            ParamPreference::Resolution => (res.num_pixels(), Reverse(fps)),
            ParamPreference::Framerate => (u64::from(fps), Reverse(res.num_pixels() as u32)),
        }
    };
    eligible.max_by_key(key).map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VGA: Resolution = Resolution::new(640, 480);

    fn candidates() -> Vec<(Resolution, f32)> {
        vec![
            (VGA, 30.0),
            (VGA, 60.0),
            (Resolution::RES_720P, 30.0),
            (Resolution::RES_1080P, 15.0),
        ]
    }

    fn prefs(res: Option<Resolution>, fps: Option<u32>, pref: ParamPreference) -> FramePrefs {
        FramePrefs {
            resolution: res,
            fps,
            pref,
        }
    }

    #[test]
    fn maximizes_preferred_parameter() {
        let c = candidates();
        let any_res = prefs(None, None, ParamPreference::Resolution);
        assert_eq!(select_format(&c, any_res), Some(3));
        let any_fps = prefs(None, None, ParamPreference::Framerate);
        assert_eq!(select_format(&c, any_fps), Some(1));
        assert_eq!(
            select_format(&c, prefs(None, Some(30), ParamPreference::Resolution)),
            Some(2)
        );
    }

    #[test]
    fn relaxes_unsatisfiable_requests() {
        let c = candidates();
        // 1080p at 60 Hz does not exist. Keeping the resolution drops the frame rate.
        let p = prefs(
            Some(Resolution::RES_1080P),
            Some(60),
            ParamPreference::Resolution,
        );
        assert_eq!(select_format(&c, p), Some(3));
        // Keeping the frame rate drops the resolution.
        let p = prefs(
            Some(Resolution::RES_1080P),
            Some(60),
            ParamPreference::Framerate,
        );
        assert_eq!(select_format(&c, p), Some(1));
    }

    #[test]
    fn no_candidates() {
        let p = prefs(Some(VGA), Some(30), ParamPreference::Resolution);
        assert_eq!(select_format(&[], p), None);
    }
}

//! Image, camera and window resolutions.

use std::fmt;

/// Size of a frame or window, `width x height` in pixels.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    pub const RES_720P: Self = Self::new(1280, 720);
    pub const RES_1080P: Self = Self::new(1920, 1080);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns the reduced aspect ratio, or `None` if either dimension is 0.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A `width:height` ratio in lowest terms.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectRatio {
    // Both nonzero, GCD is 1.
    width: u32,
    height: u32,
}

impl AspectRatio {
    pub const SQUARE: Self = Self {
        width: 1,
        height: 1,
    };

    /// Creates the ratio `width:height`, or `None` if either is 0.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let gcd = gcd(width, height);
        Some(Self {
            width: width / gcd,
            height: height / gcd,
        })
    }

    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl fmt::Debug for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcd_reduces() {
        assert_eq!(gcd(6, 9), 3);
        assert_eq!(gcd(640, 480), 160);
        assert_eq!(gcd(0, 5), 5);
    }

    #[test]
    fn webcam_ratios() {
        let vga = Resolution::new(640, 480).aspect_ratio().unwrap();
        let hd = Resolution::RES_720P.aspect_ratio().unwrap();
        assert_eq!(vga.to_string(), "4:3");
        assert_eq!(hd, Resolution::RES_1080P.aspect_ratio().unwrap());
        assert_eq!(hd.to_string(), "16:9");
        assert_eq!(Resolution::new(0, 480).aspect_ratio(), None);
    }
}

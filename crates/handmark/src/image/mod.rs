//! Frames and drawing.
//!
//! [`Image`] is an owned frame of interleaved 8-bit pixels in one of the [`PixelFormat`]s. Camera
//! frames arrive as RGBA, models usually want RGB, and OpenCV-style sources hand out BGR, so
//! conversions between all of them are provided. The [`draw`] module renders overlays onto frames.

pub mod draw;
mod jpeg;
mod resolution;

#[cfg(test)]
mod tests;

use std::{borrow::Cow, fmt, ops::Index, path::Path};

use anyhow::{bail, ensure, Context};
use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{DynamicImage, ImageBuffer, RgbaImage};

pub use resolution::*;

use crate::rect::Rect;

/// Channel layout of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
}

impl PixelFormat {
    /// Number of bytes per pixel.
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra => 4,
        }
    }

    #[inline]
    pub fn has_alpha(self) -> bool {
        self.channels() == 4
    }

    fn is_bgr(self) -> bool {
        matches!(self, Self::Bgr | Self::Bgra)
    }

    /// Reads the pixel starting at `px[0]`.
    fn read(self, px: &[u8]) -> Color {
        let a = if self.has_alpha() { px[3] } else { 255 };
        if self.is_bgr() {
            Color([px[2], px[1], px[0], a])
        } else {
            Color([px[0], px[1], px[2], a])
        }
    }

    fn write(self, px: &mut [u8], color: Color) {
        let [r, g, b, a] = color.0;
        if self.is_bgr() {
            px[..3].copy_from_slice(&[b, g, r]);
        } else {
            px[..3].copy_from_slice(&[r, g, b]);
        }
        if self.has_alpha() {
            px[3] = a;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FileFormat {
    Jpeg,
    Png,
}

impl FileFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => bail!(
                "unsupported image path '{}' (expected a .jpg, .jpeg or .png extension)",
                path.display()
            ),
        }
    }
}

/// An owned image with 8 bits per channel.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Image {
    /// Creates a transparent black RGBA image.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_format(width, height, PixelFormat::Rgba)
    }

    /// Creates an image in the given format with every byte set to 0.
    pub fn with_format(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    /// Wraps a buffer of interleaved pixel data.
    ///
    /// Fails if `data` does not hold exactly `width * height` pixels of `format`.
    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> anyhow::Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        ensure!(
            data.len() == expected,
            "buffer of {} bytes does not fit a {}x{} {:?} image (expected {} bytes)",
            data.len(),
            width,
            height,
            format,
            expected,
        );
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Loads a `.jpg`, `.jpeg` or `.png` file as an RGBA image.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read image '{}'", path.display()))?;
        match format {
            FileFormat::Jpeg => Self::decode_jpeg(&data),
            FileFormat::Png => {
                let buf =
                    image::load_from_memory_with_format(&data, image::ImageFormat::Png)?.to_rgba8();
                Ok(Self::from_rgba_buffer(buf))
            }
        }
    }

    /// Decodes a JFIF JPEG or a Motion-JPEG frame into an RGBA image.
    ///
    /// The decoder is selected by the `HANDMARK_JPEG_BACKEND` environment variable.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        jpeg::decode(data)
    }

    /// Saves the image as `.jpg`, `.jpeg` or `.png`, depending on the extension of `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let rgba = self.as_format(PixelFormat::Rgba);
        let buf: RgbaImage = ImageBuffer::from_raw(self.width, self.height, rgba.data.clone())
            .ok_or_else(|| anyhow::anyhow!("image buffer does not match its resolution"))?;
        match format {
            // JPEG has no alpha channel.
            FileFormat::Jpeg => DynamicImage::ImageRgba8(buf).to_rgb8().save(path)?,
            FileFormat::Png => buf.save(path)?,
        }
        Ok(())
    }

    fn from_rgba_buffer(buf: RgbaImage) -> Self {
        Self {
            width: buf.width(),
            height: buf.height(),
            format: PixelFormat::Rgba,
            data: buf.into_raw(),
        }
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
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns a [`Rect`] at `(0, 0)` covering the whole image.
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width as f32, self.height as f32)
    }

    /// Raw interleaved pixel data, rows top to bottom.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.channels()
    }

    fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height)
    }

    /// Returns the color of the pixel at `(x, y)`.
    ///
    /// Images without an alpha channel report opaque colors.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Color {
        assert!(
            self.contains(x.into(), y.into()),
            "pixel ({x}, {y}) out of bounds for {self:?}"
        );
        let off = self.offset(x, y);
        self.format.read(&self.data[off..])
    }

    /// Sets the pixel at `(x, y)` to `color`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        assert!(
            self.contains(x.into(), y.into()),
            "pixel ({x}, {y}) out of bounds for {self:?}"
        );
        let off = self.offset(x, y);
        self.format.write(&mut self.data[off..], color);
    }

    /// Sets a pixel if it lies inside the image, ignoring it otherwise.
    pub(crate) fn put(&mut self, x: i64, y: i64, color: Color) {
        if self.contains(x, y) {
            self.set(x as u32, y as u32, color);
        }
    }

    /// Samples a pixel, returning [`Color::NONE`] outside of the image.
    pub(crate) fn sample(&self, x: i64, y: i64) -> Color {
        if self.contains(x, y) {
            self.get(x as u32, y as u32)
        } else {
            Color::NONE
        }
    }

    /// Converts the image to `format`, swapping, adding or dropping channels as needed.
    ///
    /// Dropping the alpha channel discards it; adding one makes every pixel opaque.
    pub fn to_format(&self, format: PixelFormat) -> Image {
        let (from, to) = (self.format, format);
        if from == to {
            return self.clone();
        }

        let pixels = self.width as usize * self.height as usize;
        let mut data = Vec::with_capacity(pixels * to.channels());
        let mut px = [0; 4];
        for src in self.data.chunks_exact(from.channels()) {
            to.write(&mut px, from.read(src));
            data.extend_from_slice(&px[..to.channels()]);
        }

        Image {
            width: self.width,
            height: self.height,
            format: to,
            data,
        }
    }

    /// Like [`Image::to_format`], but borrows `self` when it is already in `format`.
    pub fn as_format(&self, format: PixelFormat) -> Cow<'_, Image> {
        if self.format == format {
            Cow::Borrowed(self)
        } else {
            Cow::Owned(self.to_format(format))
        }
    }

    /// Sets every pixel to `color`.
    pub fn clear(&mut self, color: Color) {
        let format = self.format;
        for px in self.data.chunks_exact_mut(format.channels()) {
            format.write(px, color);
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {:?} Image", self.width, self.height, self.format)
    }
}

/// An 8-bit sRGB color with non-premultiplied alpha.
///
/// Components are always stored in RGBA order, independent of the [`PixelFormat`] of the image
/// the color is written to.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Transparent black.
    pub const NONE: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);
    pub const YELLOW: Self = Self([255, 255, 0, 255]);
    pub const MAGENTA: Self = Self([255, 0, 255, 255]);
    pub const CYAN: Self = Self([0, 255, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

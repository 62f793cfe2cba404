//! Overlay drawing.
//!
//! Every function returns a guard that draws when it is dropped, so the defaults can be adjusted
//! with chained method calls:
//!
//! ```no_run
//! # use handmark::image::{draw, Color, Image};
//! # let mut image = Image::new(64, 64);
//! draw::line(&mut image, 0, 0, 63, 63).color(Color::GREEN).stroke_width(2);
//! ```

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii, MonoFont, MonoTextStyle},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use super::{Color, Image};

fn render<D: Drawable<Color = Color>>(image: &mut Image, drawable: &D) {
    match drawable.draw(&mut Target(image)) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

fn stroke(color: Color, width: u32) -> PrimitiveStyle<Color> {
    PrimitiveStyle::with_stroke(color, width)
}

/// Guard returned by [`line`].
pub struct DrawLine<'a> {
    image: &'a mut Image,
    start: Point,
    end: Point,
    color: Color,
    stroke_width: u32,
}

impl DrawLine<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawLine<'_> {
    fn drop(&mut self) {
        // Keep the rasterizer away from far out endpoints, whose deltas overflow `i32`.
        let margin = f64::from(self.image.width())
            + f64::from(self.image.height())
            + f64::from(self.stroke_width);
        let min = (-margin, -margin);
        let max = (
            f64::from(self.image.width()) + margin,
            f64::from(self.image.height()) + margin,
        );
        let Some((start, end)) = clip_line(self.start, self.end, min, max) else {
            return;
        };
        let line = Line::new(start, end);
        render(
            self.image,
            &line.into_styled(stroke(self.color, self.stroke_width)),
        );
    }
}

/// Guard returned by [`text`].
pub struct DrawText<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    text: &'a str,
    color: Color,
    font: &'static MonoFont<'static>,
    alignment: Alignment,
    baseline: Baseline,
}

impl DrawText<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Uses a 10x20 font instead of the default 6x10 one.
    pub fn large(&mut self) -> &mut Self {
        self.font = &ascii::FONT_10X20;
        self
    }

    /// Places the text's bottom edge at `y`.
    pub fn align_bottom(&mut self) -> &mut Self {
        self.baseline = Baseline::Bottom;
        self
    }

    /// Starts the text at `x`.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        let character_style = MonoTextStyle::new(self.font, self.color);
        let text_style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(self.baseline)
            .build();
        let text = Text::with_text_style(
            self.text,
            Point::new(self.x, self.y),
            character_style,
            text_style,
        );
        render(self.image, &text);
    }
}

/// Guard returned by [`circle`].
pub struct DrawCircle<'a> {
    image: &'a mut Image,
    x: i32,
    y: i32,
    radius: u32,
    color: Color,
    stroke_width: u32,
    filled: bool,
}

impl DrawCircle<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }

    /// Fills the circle instead of drawing its outline.
    pub fn filled(&mut self) -> &mut Self {
        self.filled = true;
        self
    }
}

impl Drop for DrawCircle<'_> {
    fn drop(&mut self) {
        let reach = i64::from(self.radius) + i64::from(self.stroke_width);
        let (x, y) = (i64::from(self.x), i64::from(self.y));
        if x + reach < 0
            || y + reach < 0
            || x - reach >= i64::from(self.image.width())
            || y - reach >= i64::from(self.image.height())
        {
            return;
        }
        let diameter = self.radius.saturating_mul(2).saturating_add(1);
        let circle = Circle::with_center(Point::new(self.x, self.y), diameter);
        let style = if self.filled {
            PrimitiveStyleBuilder::new().fill_color(self.color).build()
        } else {
            stroke(self.color, self.stroke_width)
        };
        render(self.image, &circle.into_styled(style));
    }
}

/// Draws a line between two points. Blue, 1 pixel wide by default.
pub fn line(image: &mut Image, start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> DrawLine<'_> {
    DrawLine {
        image,
        start: Point::new(start_x, start_y),
        end: Point::new(end_x, end_y),
        color: Color::BLUE,
        stroke_width: 1,
    }
}

/// Draws `text` anchored at `(x, y)`. Red by default.
///
/// The text is centered on the anchor unless the `align_*` methods of the guard say otherwise.
pub fn text<'a>(image: &'a mut Image, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        image,
        x,
        y,
        text,
        color: Color::RED,
        font: &ascii::FONT_6X10,
        alignment: Alignment::Center,
        baseline: Baseline::Middle,
    }
}

/// Draws a circle of `radius` pixels around `(x, y)`. A green outline by default.
pub fn circle(image: &mut Image, x: i32, y: i32, radius: u32) -> DrawCircle<'_> {
    DrawCircle {
        image,
        x,
        y,
        radius,
        color: Color::GREEN,
        stroke_width: 1,
        filled: false,
    }
}

/// Cuts the line from `start` to `end` down to the part inside the `min`..`max` box.
///
/// Returns `None` if no part of the line is inside.
fn clip_line(start: Point, end: Point, min: (f64, f64), max: (f64, f64)) -> Option<(Point, Point)> {
    let (x0, y0) = (f64::from(start.x), f64::from(start.y));
    let (dx, dy) = (f64::from(end.x) - x0, f64::from(end.y) - y0);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-dx, x0 - min.0),
        (dx, max.0 - x0),
        (-dy, y0 - min.1),
        (dy, max.1 - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            if t > t1 {
                return None;
            }
            t0 = t0.max(t);
        } else {
            if t < t0 {
                return None;
            }
            t1 = t1.min(t);
        }
    }

    let at = |t: f64| Point::new((x0 + t * dx).round() as i32, (y0 + t * dy).round() as i32);
    Some((at(t0), at(t1)))
}

struct Target<'a>(&'a mut Image);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle::new(Point::zero(), Size::new(self.0.width(), self.0.height()))
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pt, color) in pixels {
            self.0.put(pt.x.into(), pt.y.into(), color);
        }
        Ok(())
    }
}

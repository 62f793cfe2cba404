//! Axis-aligned and rotated rectangles.
//!
//! Rectangles describe detections and regions of interest in image coordinates (X right, Y down).

use std::fmt;

use nalgebra::{Rotation2, Vector2};

use crate::image::AspectRatio;

/// An axis-aligned rectangle, stored as center and size.
///
/// Zero width or height is allowed, negative sizes are not.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    center: Vector2<f32>,
    size: Vector2<f32>,
}

impl Rect {
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            center: Vector2::new(x_center, y_center),
            size: Vector2::new(width, height),
        }
    }

    #[inline]
    pub fn from_top_left(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_center(x + width * 0.5, y + height * 0.5, width, height)
    }

    /// Computes the smallest rectangle containing all `points`, or `None` if there are none.
    pub fn bounding<I>(points: I) -> Option<Self>
    where
        I: IntoIterator,
        I::Item: Into<Vector2<f32>>,
    {
        let mut iter = points.into_iter().map(Into::into);
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.inf(&p), max.sup(&p)));
        Some(Self::from_top_left(min.x, min.y, max.x - min.x, max.y - min.y))
    }

    /// Adds `amount * width` to the left and right and `amount * height` to the top and bottom.
    #[must_use]
    pub fn grow_rel(&self, amount: f32) -> Self {
        Self {
            center: self.center,
            size: self.size * (1.0 + 2.0 * amount),
        }
    }

    /// Multiplies width and height by `factor`, keeping the center.
    #[must_use]
    pub fn scale(&self, factor: f32) -> Self {
        Self {
            center: self.center,
            size: self.size * factor,
        }
    }

    /// Symmetrically enlarges one dimension so that the result has the aspect ratio `aspect`.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, aspect: AspectRatio) -> Self {
        let mut res = *self;
        let target_width = self.height() * aspect.as_f32();
        if target_width >= self.width() {
            res.size.x = target_width;
        } else {
            res.size.y = self.width() / aspect.as_f32();
        }
        res
    }

    #[must_use]
    pub fn move_to(&self, x: f32, y: f32) -> Self {
        Self::from_top_left(x, y, self.width(), self.height())
    }

    #[inline]
    pub fn top_left(&self) -> Vector2<f32> {
        self.center - self.size * 0.5
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.top_left().x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.top_left().y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn center(&self) -> Vector2<f32> {
        self.center
    }

    #[inline]
    pub fn size(&self) -> Vector2<f32> {
        self.size
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.size.x * self.size.y
    }

    /// Returns the overlapping area of `self` and `other`, if they overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let min = self.top_left().sup(&other.top_left());
        let max = (self.top_left() + self.size).inf(&(other.top_left() + other.size));
        if min.x > max.x || min.y > max.y {
            return None;
        }
        Some(Rect::from_top_left(min.x, min.y, max.x - min.x, max.y - min.y))
    }

    /// Intersection over union of two rectangles.
    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection = self.intersection(other).map_or(0.0, |r| r.area());
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    pub fn contains_point(&self, p: Vector2<f32>) -> bool {
        let tl = self.top_left();
        let br = tl + self.size;
        tl.x <= p.x && tl.y <= p.y && p.x <= br.x && p.y <= br.y
    }

    /// Corners in the order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Vector2<f32>; 4] {
        let tl = self.top_left();
        let (w, h) = (self.width(), self.height());
        [
            tl,
            tl + Vector2::new(w, 0.0),
            tl + Vector2::new(w, h),
            tl + Vector2::new(0.0, h),
        ]
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({},{})/{}x{}",
            self.center.x, self.center.y, self.size.x, self.size.y
        )
    }
}

/// A [`Rect`] rotated clockwise around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    rect: Rect,
    radians: f32,
}

impl RotatedRect {
    #[inline]
    pub fn new(rect: Rect, radians: f32) -> Self {
        Self { rect, radians }
    }

    /// Computes the rectangle rotated by `radians` that tightly encloses `points`.
    ///
    /// Returns `None` if `points` is empty.
    pub fn bounding<I>(radians: f32, points: I) -> Option<Self>
    where
        I: IntoIterator,
        I::Item: Into<Vector2<f32>>,
    {
        // Rotate the points into the rectangle's frame, bound them there, then rotate the center
        // back out.
        let inv = Rotation2::new(-radians);
        let rect = Rect::bounding(points.into_iter().map(|p| inv * p.into()))?;
        let center = Rotation2::new(radians) * rect.center();
        Some(Self::new(
            Rect::from_center(center.x, center.y, rect.width(), rect.height()),
            radians,
        ))
    }

    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.radians
    }

    #[inline]
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    #[inline]
    pub fn center(&self) -> Vector2<f32> {
        self.rect.center()
    }

    /// Applies `f` to the unrotated rectangle.
    #[must_use]
    pub fn map(self, f: impl FnOnce(Rect) -> Rect) -> Self {
        Self::new(f(self.rect), self.radians)
    }

    #[must_use]
    pub fn grow_rel(&self, amount: f32) -> Self {
        self.map(|r| r.grow_rel(amount))
    }

    #[must_use]
    pub fn grow_to_fit_aspect(&self, aspect: AspectRatio) -> Self {
        self.map(|r| r.grow_to_fit_aspect(aspect))
    }

    /// Returns the corners in image coordinates, in the order of [`Rect::corners`].
    pub fn rotated_corners(&self) -> [Vector2<f32>; 4] {
        let rot = Rotation2::new(self.radians);
        let center = self.rect.center();
        self.rect.corners().map(|p| center + rot * (p - center))
    }

    /// The axis-aligned rectangle enclosing the rotated corners.
    pub fn bounding_rect(&self) -> Rect {
        let [a, b, c, d] = self.rotated_corners();
        let min = a.inf(&b).inf(&c).inf(&d);
        let max = a.sup(&b).sup(&c).sup(&d);
        Rect::from_top_left(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    pub fn contains_point(&self, p: Vector2<f32>) -> bool {
        let local = self.transform_in(p);
        self.rect.move_to(0.0, 0.0).contains_point(local)
    }

    /// Maps a point from image coordinates into the rectangle's frame, whose origin is the
    /// rectangle's (unrotated) top-left corner.
    pub fn transform_in(&self, p: Vector2<f32>) -> Vector2<f32> {
        let half = self.rect.size() * 0.5;
        Rotation2::new(-self.radians) * (p - self.rect.top_left() - half) + half
    }

    /// Inverse of [`RotatedRect::transform_in`].
    pub fn transform_out(&self, p: Vector2<f32>) -> Vector2<f32> {
        let half = self.rect.size() * 0.5;
        Rotation2::new(self.radians) * (p - half) + half + self.rect.top_left()
    }
}

impl From<Rect> for RotatedRect {
    fn from(rect: Rect) -> Self {
        Self::new(rect, 0.0)
    }
}

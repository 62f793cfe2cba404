//! Anchor generation for Single Shot MultiBox Detectors (SSDs).
//!
//! Only covers what MediaPipe-style detectors need: a fixed anchor size and anchors placed in the
//! center of every feature map cell.

use std::ops::Index;

/// Center of an SSD anchor, normalized to `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    x_center: f32,
    y_center: f32,
}

impl Anchor {
    #[inline]
    pub fn x_center(&self) -> f32 {
        self.x_center
    }

    #[inline]
    pub fn y_center(&self) -> f32 {
        self.y_center
    }
}

/// An output layer: a `width x height` feature map with `boxes_per_cell` anchors per cell.
#[derive(Debug, Clone, Copy)]
pub struct LayerInfo {
    boxes_per_cell: u32,
    width: u32,
    height: u32,
}

impl LayerInfo {
    pub const fn new(boxes_per_cell: u32, width: u32, height: u32) -> Self {
        assert!(boxes_per_cell != 0);
        Self {
            boxes_per_cell,
            width,
            height,
        }
    }
}

/// The anchors of all layers, in the order the network outputs its boxes.
#[derive(Debug)]
pub struct Anchors {
    anchors: Vec<Anchor>,
}

impl Anchors {
    pub fn calculate(layers: &[LayerInfo]) -> Self {
        let mut anchors = Vec::new();
        for layer in layers {
            for y in 0..layer.height {
                for x in 0..layer.width {
                    let anchor = Anchor {
                        x_center: (x as f32 + 0.5) / layer.width as f32,
                        y_center: (y as f32 + 0.5) / layer.height as f32,
                    };
                    anchors.extend((0..layer.boxes_per_cell).map(|_| anchor));
                }
            }
        }
        Self { anchors }
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl Index<usize> for Anchors {
    type Output = Anchor;

    fn index(&self, index: usize) -> &Anchor {
        &self.anchors[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palm_detector_layout() {
        let anchors = Anchors::calculate(&[LayerInfo::new(2, 24, 24), LayerInfo::new(6, 12, 12)]);
        assert_eq!(anchors.len(), 2016);

        assert_eq!(anchors[0], anchors[1]);
        assert_eq!(anchors[0].x_center(), 0.5 / 24.0);
        assert_eq!(anchors[2].x_center(), 1.5 / 24.0);

        // First anchor of the second layer.
        let first = anchors[24 * 24 * 2];
        assert_eq!(first.x_center(), 0.5 / 12.0);
        assert_eq!(first.y_center(), 0.5 / 12.0);
        assert_eq!(anchors[anchors.len() - 1].y_center(), 11.5 / 12.0);
    }
}

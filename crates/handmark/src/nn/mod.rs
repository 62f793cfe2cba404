//! Neural network inference on the CPU, via `tract`.

pub mod tensor;

use std::{
    ops::{Index, RangeInclusive},
    path::Path,
    sync::Arc,
};

use anyhow::{anyhow, bail, Context};
use nalgebra::Vector2;
use tract_onnx::prelude::tract_data::tvec;
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TypedFact, TypedOp,
};

use crate::image::{Color, Image, Resolution};
use crate::rect::RotatedRect;

pub use tensor::{Tensor, TensorView};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Configures how a network is loaded.
pub struct Loader {
    model_data: Vec<u8>,
    outputs: Option<Vec<usize>>,
}

impl Loader {
    /// Restricts inference to the outputs with the given indices, in that order.
    pub fn with_output_selection(mut self, outputs: impl Into<Vec<usize>>) -> Self {
        self.outputs = Some(outputs.into());
        self
    }

    /// Parses and optimizes the network.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)?
            .into_optimized()?;
        let outputs = graph.output_outlets()?;
        let selected = match self.outputs {
            Some(indices) => indices
                .iter()
                .map(|&i| {
                    outputs
                        .get(i)
                        .copied()
                        .ok_or_else(|| anyhow!("network has no output #{i}"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => outputs.to_vec(),
        };
        let plan = SimplePlan::new_for_outputs(graph, &selected)?;
        Ok(NeuralNetwork(Arc::new(plan)))
    }
}

/// A loaded network. Cloning is cheap and shares the underlying plan.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<Model>);

impl NeuralNetwork {
    /// Reads an `.onnx` file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Loader> {
        let path = path.as_ref();
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!("'{}' is not an `.onnx` file", path.display()),
        }
        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read network from '{}'", path.display()))?;
        Ok(Self::from_onnx(model_data))
    }

    /// Uses an in-memory ONNX model.
    pub fn from_onnx(model_data: impl Into<Vec<u8>>) -> Loader {
        Loader {
            model_data: model_data.into(),
            outputs: None,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.0.model().inputs.len()
    }

    /// Returns the concrete shape of input `index`.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<Vec<usize>> {
        let fact = self.0.model().input_fact(index)?;
        let shape = fact
            .shape
            .as_concrete()
            .ok_or_else(|| anyhow!("network input #{index} has a symbolic shape"))?;
        Ok(shape.to_vec())
    }

    /// Runs the network on a single input tensor.
    pub fn infer(&self, input: &Tensor) -> anyhow::Result<Outputs> {
        let outputs = self
            .0
            .run(tvec![TValue::from_const(Arc::new(
                input.to_tract()?
            ))])?;
        let inner = outputs
            .iter()
            .map(|t| Tensor::from_tract(t))
            .collect::<anyhow::Result<_>>()?;
        Ok(Outputs { inner })
    }
}

/// Memory layout of an image input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CnnInputShape {
    /// `[1, 3, height, width]`
    NCHW,
    /// `[1, height, width, 3]`
    NHWC,
}

/// Maps 8-bit colors to the value range a network was trained on.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Maps `0..=255` linearly onto `range`.
    pub fn linear(range: RangeInclusive<f32>) -> Self {
        assert!(range.end() > range.start(), "empty color range {range:?}");
        Self { range }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        let start = *self.range.start();
        let scale = (*self.range.end() - start) / 255.0;
        [color.r(), color.g(), color.b()].map(|c| f32::from(c) * scale + start)
    }
}

/// A network taking a single RGB image.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    shape: CnnInputShape,
    input_res: Resolution,
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Wraps `nn`, checking that its only input has the layout described by `shape`.
    pub fn new(
        nn: NeuralNetwork,
        shape: CnnInputShape,
        color_mapper: ColorMapper,
    ) -> anyhow::Result<Self> {
        if nn.num_inputs() != 1 {
            bail!(
                "image network must take exactly 1 input, this one takes {}",
                nn.num_inputs()
            );
        }
        let input = nn.input_shape(0)?;
        let (w, h) = match (shape, &*input) {
            (CnnInputShape::NCHW, &[1, 3, h, w]) | (CnnInputShape::NHWC, &[1, h, w, 3]) => (w, h),
            _ => bail!("input shape {input:?} does not match {shape:?}"),
        };

        Ok(Self {
            nn,
            shape,
            input_res: Resolution::new(w.try_into()?, h.try_into()?),
            color_mapper,
        })
    }

    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on the part of `image` covered by `roi`.
    ///
    /// The region is stretched to the input resolution. Parts of it outside of `image` are read as
    /// transparent black.
    pub fn estimate(&self, image: &Image, roi: RotatedRect) -> anyhow::Result<Outputs> {
        let tensor = sample(image, roi, self.input_res, self.shape, &self.color_mapper);
        self.nn.infer(&tensor)
    }
}

/// Builds the input tensor by sampling the center of every input pixel mapped into `roi`.
fn sample(
    image: &Image,
    roi: RotatedRect,
    res: Resolution,
    shape: CnnInputShape,
    mapper: &ColorMapper,
) -> Tensor {
    let (w, h) = (res.width() as usize, res.height() as usize);
    let (sx, sy) = (roi.rect().width() / w as f32, roi.rect().height() / h as f32);

    let mut pixels = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let p = roi.transform_out(Vector2::new(
                (x as f32 + 0.5) * sx,
                (y as f32 + 0.5) * sy,
            ));
            let color = image.sample(p.x.floor() as i64, p.y.floor() as i64);
            pixels.push(mapper.map(color));
        }
    }

    match shape {
        CnnInputShape::NCHW => {
            Tensor::from_shape_fn([1, 3, h, w], |[_, c, y, x]| pixels[y * w + x][c])
        }
        CnnInputShape::NHWC => {
            Tensor::from_shape_fn([1, h, w, 3], |[_, y, x, c]| pixels[y * w + x][c])
        }
    }
}

/// The tensors computed by one inference pass, in output order.
#[derive(Debug)]
pub struct Outputs {
    inner: Vec<Tensor>,
}

impl Outputs {
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.inner.iter()
    }
}

impl From<Vec<Tensor>> for Outputs {
    fn from(inner: Vec<Tensor>) -> Self {
        Self { inner }
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{image::PixelFormat, rect::Rect};

    #[test]
    fn color_mapper() {
        let mapper = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(mapper.map(Color::BLACK), [-1.0; 3]);
        assert_eq!(mapper.map(Color::WHITE), [1.0; 3]);

        let mapper = ColorMapper::linear(0.0..=1.0);
        assert_eq!(mapper.map(Color::from_rgb8(255, 0, 0)), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn sample_roi() {
        let mut image = Image::with_format(4, 4, PixelFormat::Rgb);
        image.set(2, 2, Color::WHITE);
        let run = |roi: Rect| {
            sample(
                &image,
                roi.into(),
                Resolution::new(2, 2),
                CnnInputShape::NHWC,
                &ColorMapper::linear(0.0..=1.0),
            )
        };

        // Bottom-right quadrant: the white pixel lands in the top-left input pixel.
        let t = run(Rect::from_top_left(2.0, 2.0, 2.0, 2.0));
        assert_eq!(t.shape(), &[1, 2, 2, 3]);
        assert_eq!(t.index([0, 0, 0]).as_slice(), &[1.0; 3]);
        assert_eq!(t.index([0, 1, 1]).as_slice(), &[0.0; 3]);

        // Outside of the image, samples are zero.
        let t = run(Rect::from_top_left(3.0, 3.0, 2.0, 2.0));
        assert_eq!(t.index([0, 1, 1]).as_slice(), &[0.0; 3]);
    }

    #[test]
    fn sample_rotated_nchw() {
        let mut image = Image::with_format(2, 2, PixelFormat::Rgb);
        image.set(1, 0, Color::RED);
        let roi = RotatedRect::new(
            Rect::from_top_left(0.0, 0.0, 2.0, 2.0),
            std::f32::consts::FRAC_PI_2,
        );
        let t = sample(
            &image,
            roi,
            Resolution::new(2, 2),
            CnnInputShape::NCHW,
            &ColorMapper::linear(0.0..=1.0),
        );
        assert_eq!(t.shape(), &[1, 3, 2, 2]);
        // Rotating by 90° moves the top-right image pixel to the input's top-left.
        assert_eq!(t.index([0, 0, 0, 0]).as_singular(), 1.0);
        assert_eq!(t.index([0, 1, 0, 0]).as_singular(), 0.0);
        assert_eq!(t.index([0, 0, 1, 1]).as_singular(), 0.0);
    }
}

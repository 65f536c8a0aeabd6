use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{DiagnosisError, Result};

/// Memory order of the model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `[batch, height, width, channels]` (Keras exports)
    Nhwc,
    /// `[batch, channels, height, width]` (PyTorch exports)
    Nchw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// `mean` and `std` are indexed in the model's channel order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub width: usize,
    pub height: usize,
    pub layout: Layout,
    pub channel_order: ChannelOrder,
    pub scale: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            layout: Layout::Nhwc,
            channel_order: ChannelOrder::Bgr,
            scale: 1.0 / 255.0,
            mean: [0.0, 0.0, 0.0],
            std: [1.0, 1.0, 1.0],
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DiagnosisError::config(format!(
                "model input size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(DiagnosisError::config("preprocess std components must be finite and non-zero"));
        }
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(DiagnosisError::config("preprocess scale must be finite and non-zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Processor {
    pub config: PreprocessConfig,
}

impl Processor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Stretches the image to the model input size with bilinear filtering.
    pub fn resize(&self, x: &DynamicImage) -> Result<RgbImage> {
        if x.width() == 0 || x.height() == 0 {
            return Err(DiagnosisError::EmptyImage);
        }
        let (width, height) = (self.config.width as u32, self.config.height as u32);
        let rgb = x.to_rgb8();
        if rgb.dimensions() == (width, height) {
            return Ok(rgb);
        }

        let src = DynamicImage::ImageRgb8(rgb);
        let mut dst_image = Image::new(width, height, PixelType::U8x3);
        let mut resizer = Resizer::new();
        let resize_options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        resizer
            .resize(&src, &mut dst_image, Some(&resize_options))
            .map_err(|e| DiagnosisError::Resize(e.to_string()))?;

        RgbImage::from_raw(width, height, dst_image.buffer().to_vec())
            .ok_or_else(|| DiagnosisError::Resize("resized buffer does not match target size".into()))
    }

    /// Packs already-resized images into a normalized batch tensor.
    pub fn to_tensor(&self, images: &[RgbImage]) -> Result<Array4<f32>> {
        let (w, h) = (self.config.width, self.config.height);
        let shape = match self.config.layout {
            Layout::Nhwc => (images.len(), h, w, 3),
            Layout::Nchw => (images.len(), 3, h, w),
        };
        let mut xs = Array4::<f32>::zeros(shape);

        for (n, img) in images.iter().enumerate() {
            if img.dimensions() != (w as u32, h as u32) {
                return Err(DiagnosisError::Resize(format!(
                    "image {} is {}x{}, expected {}x{}",
                    n,
                    img.width(),
                    img.height(),
                    w,
                    h
                )));
            }
            for (x, y, rgb) in img.enumerate_pixels() {
                let (x, y) = (x as usize, y as usize);
                let ordered = match self.config.channel_order {
                    ChannelOrder::Rgb => [rgb[0], rgb[1], rgb[2]],
                    ChannelOrder::Bgr => [rgb[2], rgb[1], rgb[0]],
                };
                for (c, value) in ordered.iter().enumerate() {
                    let v = (*value as f32 * self.config.scale - self.config.mean[c]) / self.config.std[c];
                    match self.config.layout {
                        Layout::Nhwc => xs[[n, y, x, c]] = v,
                        Layout::Nchw => xs[[n, c, y, x]] = v,
                    }
                }
            }
        }
        Ok(xs)
    }

    /// Resize and normalize a batch of images, resizing in parallel.
    pub fn preprocess(&self, xs: &[DynamicImage]) -> Result<Array4<f32>> {
        let t = std::time::Instant::now();
        let resized = xs
            .par_iter()
            .map(|x| self.resize(x))
            .collect::<Result<Vec<_>>>()?;
        let ys = self.to_tensor(&resized)?;
        tracing::debug!(batch = xs.len(), elapsed = ?t.elapsed(), "preprocessed");
        Ok(ys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn default_matches_keras_bgr_input() {
        let processor = Processor::new(PreprocessConfig::default());
        let xs = processor.preprocess(&[solid(640, 480, [255, 0, 51])]).unwrap();

        assert_eq!(xs.shape(), &[1, 224, 224, 3]);
        // BGR: blue first, then green, then red.
        let px = 1.5 / 255.0;
        assert!((xs[[0, 10, 10, 0]] - 0.2).abs() < px);
        assert!(xs[[0, 10, 10, 1]].abs() < px);
        assert!((xs[[0, 10, 10, 2]] - 1.0).abs() < px);
    }

    #[test]
    fn nchw_rgb_with_imagenet_stats() {
        let config = PreprocessConfig {
            width: 32,
            height: 16,
            layout: Layout::Nchw,
            channel_order: ChannelOrder::Rgb,
            scale: 1.0 / 255.0,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        };
        let processor = Processor::new(config);
        let xs = processor.preprocess(&[solid(8, 8, [255, 255, 255]), solid(3, 5, [0, 0, 0])]).unwrap();

        assert_eq!(xs.shape(), &[2, 3, 16, 32]);
        assert!((xs[[0, 0, 0, 0]] - (1.0 - 0.485) / 0.229).abs() < 0.02);
        assert!((xs[[1, 2, 15, 31]] - (-0.406 / 0.225)).abs() < 0.02);
    }

    #[test]
    fn resize_stretches_without_padding() {
        let processor = Processor::new(PreprocessConfig::default());
        let resized = processor.resize(&solid(1000, 50, [10, 200, 30])).unwrap();
        assert_eq!(resized.dimensions(), (224, 224));
        // no letterbox border: corners keep the source colour
        for (x, y) in [(0, 0), (223, 223)] {
            let px = resized.get_pixel(x, y);
            for (got, want) in px.0.iter().zip([10u8, 200, 30]) {
                assert!(got.abs_diff(want) <= 1, "{:?}", px);
            }
        }
    }

    #[test]
    fn empty_image_is_rejected() {
        let processor = Processor::new(PreprocessConfig::default());
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(processor.resize(&empty), Err(DiagnosisError::EmptyImage)));
    }

    #[test]
    fn validate_rejects_zero_std() {
        let config = PreprocessConfig { std: [1.0, 0.0, 1.0], ..Default::default() };
        assert!(config.validate().is_err());
        assert!(PreprocessConfig::default().validate().is_ok());
    }
}

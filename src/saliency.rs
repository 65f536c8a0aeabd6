//! Occlusion-sensitivity maps.
//!
//! Each cell of a `grid x grid` lattice over the model input is painted over
//! in turn and the model rerun; the cell's weight is how much the predicted
//! class's confidence drops. Only forward passes are needed, so this works
//! with any exported classifier.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use crate::error::{DiagnosisError, Result};
use crate::model::Backend;
use crate::postprocess::{OutputKind, to_probabilities};
use crate::preprocess::Processor;

pub const MAX_GRID: u32 = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaliencyConfig {
    pub enabled: bool,
    pub grid: u32,
    /// Occluded copies sent to the model per forward pass.
    pub batch_size: usize,
    pub opacity: f32,
    pub fill: [u8; 3],
}

impl Default for SaliencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grid: 7,
            batch_size: 8,
            opacity: 0.45,
            fill: [0, 0, 0],
        }
    }
}

impl SaliencyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grid == 0 || self.grid > MAX_GRID {
            return Err(DiagnosisError::config(format!(
                "saliency grid must be within 1..={}, got {}",
                MAX_GRID, self.grid
            )));
        }
        if self.batch_size == 0 {
            return Err(DiagnosisError::config("saliency batch_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(DiagnosisError::config(format!(
                "saliency opacity must be within [0, 1], got {}",
                self.opacity
            )));
        }
        Ok(())
    }
}

/// Pixel bounds `[x0, x1) x [y0, y1)` of lattice cell `(col, row)`.
fn cell_bounds(width: u32, height: u32, grid: u32, col: u32, row: u32) -> (u32, u32, u32, u32) {
    (
        col * width / grid,
        (col + 1) * width / grid,
        row * height / grid,
        (row + 1) * height / grid,
    )
}

/// Confidence drop per cell, row-major, normalized so the largest is 1.
pub fn occlusion_map(
    backend: &mut dyn Backend,
    processor: &Processor,
    kind: OutputKind,
    resized: &RgbImage,
    class_index: usize,
    base_confidence: f32,
    config: &SaliencyConfig,
) -> Result<Vec<f32>> {
    let grid = config.grid;
    let (width, height) = resized.dimensions();
    let cells: Vec<(u32, u32)> = (0..grid).flat_map(|row| (0..grid).map(move |col| (col, row))).collect();

    let mut heat = Vec::with_capacity(cells.len());
    for chunk in cells.chunks(config.batch_size) {
        let occluded: Vec<RgbImage> = chunk
            .iter()
            .map(|&(col, row)| {
                let mut img = resized.clone();
                let (x0, x1, y0, y1) = cell_bounds(width, height, grid, col, row);
                for y in y0..y1 {
                    for x in x0..x1 {
                        img.put_pixel(x, y, Rgb(config.fill));
                    }
                }
                img
            })
            .collect();

        let scores = backend.forward(processor.to_tensor(&occluded)?)?;
        if scores.nrows() != occluded.len() || class_index >= scores.ncols() {
            return Err(DiagnosisError::UnexpectedOutput(scores.shape().to_vec()));
        }
        for row in scores.rows() {
            let probs = to_probabilities(row, kind);
            heat.push((base_confidence - probs[class_index]).max(0.0));
        }
    }

    let peak = heat.iter().cloned().fold(0.0_f32, f32::max);
    if peak > 0.0 {
        heat.iter_mut().for_each(|h| *h /= peak);
    }
    Ok(heat)
}

/// Jet colormap for `v` in `[0, 1]`.
pub fn jet(v: f32) -> Rgb<u8> {
    let channel = |offset: f32| ((1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Blends the upsampled heat map onto `original` and outlines the hottest cell.
pub fn render_overlay(original: &RgbImage, heat: &[f32], grid: u32, opacity: f32) -> RgbImage {
    let (width, height) = original.dimensions();
    let coarse = GrayImage::from_fn(grid, grid, |col, row| {
        let v = heat.get((row * grid + col) as usize).copied().unwrap_or(0.0);
        Luma([(v.clamp(0.0, 1.0) * 255.0).round() as u8])
    });
    let fine = imageops::resize(&coarse, width, height, FilterType::Triangle);

    let mut overlay = RgbImage::from_fn(width, height, |x, y| {
        let color = jet(fine.get_pixel(x, y)[0] as f32 / 255.0);
        let base = original.get_pixel(x, y);
        Rgb(std::array::from_fn(|c| {
            (base[c] as f32 * (1.0 - opacity) + color[c] as f32 * opacity).round() as u8
        }))
    });

    let hottest = heat
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| if v > max { (i, v) } else { (best, max) });
    if hottest.1 > 0.0 {
        let (col, row) = (hottest.0 as u32 % grid, hottest.0 as u32 / grid);
        let (x0, x1, y0, y1) = cell_bounds(width, height, grid, col, row);
        let (w, h) = ((x1 - x0).max(1), (y1 - y0).max(1));
        draw_hollow_rect_mut(&mut overlay, Rect::at(x0 as i32, y0 as i32).of_size(w, h), Rgb([255, 0, 0]));
        if w > 2 && h > 2 {
            let inner = Rect::at(x0 as i32 + 1, y0 as i32 + 1).of_size(w - 2, h - 2);
            draw_hollow_rect_mut(&mut overlay, inner, Rgb([255, 0, 0]));
        }
    }
    overlay
}

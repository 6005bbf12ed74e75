//! Reshapes thresholded vectors into 2-D grids and renders them as PNG heatmaps.

use crate::error::{Error, Result};
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Rows and columns of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dense 2-D grid stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub shape: GridShape,
    pub values: Vec<f64>,
}

impl Grid {
    /// Reshapes `values` row-major into `shape`. The lengths must match exactly.
    pub fn reshape(values: &[f64], shape: GridShape) -> Result<Self> {
        if shape.is_empty() || shape.len() != values.len() {
            return Err(Error::ShapeMismatch {
                expected: shape.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            shape,
            values: values.to_vec(),
        })
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.shape.cols + col]
    }
}

/// Output size and color mapping of a heatmap image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapStyle {
    pub width_px: u32,
    pub height_px: u32,

    /// Color of a 0.0 cell.
    pub color_low: [u8; 3],

    /// Color of a 1.0 cell.
    pub color_high: [u8; 3],

    /// Blank border around and between panels.
    pub margin_px: u32,
}

impl Default for HeatmapStyle {
    fn default() -> Self {
        Self {
            width_px: 1024,
            height_px: 1024,
            color_low: [200, 200, 200],
            color_high: [127, 0, 0],
            margin_px: 20,
        }
    }
}

impl HeatmapStyle {
    pub fn validate(&self) -> Result<()> {
        if self.width_px <= 2 * self.margin_px || self.height_px <= 2 * self.margin_px {
            return Err(Error::config(format!(
                "heatmap of {}x{} px leaves no room inside a {} px margin",
                self.width_px, self.height_px, self.margin_px
            )));
        }
        Ok(())
    }

    /// Linear blend of the low and high colors, `value` clamped to [0, 1].
    pub fn color(&self, value: f64) -> Rgb<u8> {
        let t = value.clamp(0.0, 1.0);
        let mut rgb = [0u8; 3];
        for (c, (&low, &high)) in rgb
            .iter_mut()
            .zip(self.color_low.iter().zip(&self.color_high))
        {
            *c = (low as f64 + (high as f64 - low as f64) * t).round() as u8;
        }
        Rgb(rgb)
    }
}

/// Draws grids into an image file.
pub trait HeatmapRenderer {
    fn render(&self, grids: &[Grid], path: &Path, style: &HeatmapStyle) -> Result<()>;
}

/// Renders each grid as a panel of filled cells, panels laid out left to right.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHeatmapRenderer;

impl ImageHeatmapRenderer {
    pub fn draw(&self, grids: &[Grid], style: &HeatmapStyle) -> RgbImage {
        let mut img = RgbImage::from_pixel(style.width_px, style.height_px, Rgb([255, 255, 255]));
        if grids.is_empty() {
            return img;
        }

        let margin = style.margin_px;
        let panels = grids.len() as u32;
        let panel_w = (style.width_px.saturating_sub(margin * (panels + 1)) / panels).max(1);
        let panel_h = style.height_px.saturating_sub(2 * margin).max(1);

        for (i, grid) in grids.iter().enumerate() {
            let x0 = margin + i as u32 * (panel_w + margin);
            let cell_w = (panel_w / grid.shape.cols as u32).max(1);
            let cell_h = (panel_h / grid.shape.rows as u32).max(1);

            for row in 0..grid.shape.rows {
                for col in 0..grid.shape.cols {
                    let rect = Rect::at(
                        (x0 + col as u32 * cell_w) as i32,
                        (margin + row as u32 * cell_h) as i32,
                    )
                    .of_size(cell_w, cell_h);
                    draw_filled_rect_mut(&mut img, rect, style.color(grid.get(row, col)));
                }
            }
        }

        img
    }
}

impl HeatmapRenderer for ImageHeatmapRenderer {
    fn render(&self, grids: &[Grid], path: &Path, style: &HeatmapStyle) -> Result<()> {
        self.draw(grids, style).save(path).map_err(|e| match e {
            image::ImageError::IoError(source) => Error::resource(path, source),
            other => Error::Image(other),
        })
    }
}

/// Hands thresholded vectors to a renderer, creating destination directories on the way.
#[derive(Debug, Clone, Default)]
pub struct HeatmapExporter<R = ImageHeatmapRenderer> {
    pub renderer: R,
    pub style: HeatmapStyle,
}

impl<R: HeatmapRenderer> HeatmapExporter<R> {
    pub fn new(renderer: R, style: HeatmapStyle) -> Result<Self> {
        style.validate()?;
        Ok(Self { renderer, style })
    }

    /// Reshapes `vector` row-major into `shape` and renders it to `destination`.
    pub fn export(&self, vector: &[f64], shape: GridShape, destination: &Path) -> Result<()> {
        let grid = Grid::reshape(vector, shape)?;

        if let Some(dir) = destination.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| Error::resource(dir, e))?;
        }

        self.renderer
            .render(std::slice::from_ref(&grid), destination, &self.style)
    }
}

/// File of the heatmap for one input value.
pub fn heatmap_path(out_dir: &Path, value: f64) -> PathBuf {
    out_dir.join(format!("{value}_threshold_heatmap.png"))
}

//! Types for the transform module.

use serde::{Deserialize, Serialize};

/// Color model of an image as stored in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Gray,
    Rgb,
    Cmyk,
    Indexed,
}

impl ColorMode {
    /// The PDF device color space written for re-encoded images.
    pub fn device_space(&self) -> &'static str {
        match self {
            ColorMode::Gray => "DeviceGray",
            _ => "DeviceRGB",
        }
    }
}

/// An embedded raster image found in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUnit {
    /// Object number and generation.
    pub object_id: (u32, u16),
    /// First page (1-based) on which the image is referenced.
    pub page: u32,
    pub width: u32,
    pub height: u32,
    /// `None` when the color space could not be resolved.
    pub color: Option<ColorMode>,
    /// Filter chain, e.g. `DCTDecode`, or `raw` when unfiltered.
    pub encoding: String,
    /// Size of the encoded stream.
    pub bytes: usize,
}

/// The outcome of rewriting one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRewrite {
    pub source: ImageUnit,
    pub width: u32,
    pub height: u32,
    pub color: ColorMode,
    pub encoding: String,
    pub bytes: usize,
}

/// Image-level progress of a running transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformProgress {
    pub images_done: usize,
    pub images_total: usize,
    /// Page of the image just processed.
    pub page: Option<u32>,
}

impl TransformProgress {
    /// A document without images is complete from the start.
    pub fn fraction(&self) -> f32 {
        if self.images_total == 0 {
            return 1.0;
        }
        (self.images_done as f32 / self.images_total as f32).min(1.0)
    }
}

/// Summary of a finished transform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformReport {
    pub pages: usize,
    pub images: Vec<ImageRewrite>,
    /// Stencil masks left untouched.
    pub skipped_masks: usize,
    pub output_bytes: u64,
}

/// Target dimensions for a resize ratio. Never smaller than 1x1.
pub fn scaled_dimensions(width: u32, height: u32, ratio: f64) -> (u32, u32) {
    if ratio >= 1.0 {
        return (width, height);
    }
    let scale = |d: u32| ((d as f64 * ratio).floor() as u32).max(1);
    (scale(width), scale(height))
}

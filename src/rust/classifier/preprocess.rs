//! Image preprocessing shared by every prediction.
//!
//! The pipeline is deterministic: scale the source so its shorter side matches the
//! model input size, cut the centered square, optionally mirror it, then turn it into a
//! normalized `f32` tensor with a leading batch dimension of one.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;

use super::error::ClassifierError;
use super::scope::{AllocationTracker, Scoped};
use super::source::ImageSource;

/// Divisor mapping `0..=255` onto roughly `[-1, 1]`.
///
/// Models exported from the training tool were fitted on `v / 127 - 1`, so `255` lands on
/// `255 / 127 - 1` rather than exactly `1.0`.
pub const NORMALIZATION_DIVISOR: f32 = 127.0;

/// ITU-R 601 luma weights for R, G and B.
pub const LUMA_WEIGHTS: [f32; 3] = [0.2989, 0.587, 0.114];

/// Memory order of the model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
    /// `[batch, height, width, channels]`
    #[default]
    Nhwc,
    /// `[batch, channels, height, width]`
    Nchw,
}

/// Scale and offsets of the center crop for one source size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropGeometry {
    /// Factor applied to both axes so the shorter side equals `size`
    pub scale: f64,
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Pixels skipped on the left of the scaled image
    pub offset_x: u32,
    /// Pixels skipped on the top of the scaled image
    pub offset_y: u32,
    /// Side length of the square crop
    pub size: u32,
}

impl CropGeometry {
    /// Computes the crop for a `width × height` source and a `size × size` target.
    ///
    /// Scaled sides are rounded up. Offsets truncate toward zero, so an odd difference
    /// leaves the extra pixel on the right or bottom edge.
    ///
    /// # Errors
    /// * `Validation` if any dimension is zero
    pub fn compute(width: u32, height: u32, size: u32) -> Result<Self, ClassifierError> {
        if width == 0 || height == 0 {
            return Err(ClassifierError::Validation(format!(
                "Image source has no pixels ({}x{})",
                width, height
            )));
        }
        if size == 0 {
            return Err(ClassifierError::Validation("Target size must be positive".into()));
        }

        let shorter = width.min(height);
        let scaled_width = ceil_scaled(width, size, shorter)?;
        let scaled_height = ceil_scaled(height, size, shorter)?;

        Ok(Self {
            scale: size as f64 / shorter as f64,
            scaled_width,
            scaled_height,
            offset_x: (scaled_width - size) / 2,
            offset_y: (scaled_height - size) / 2,
            size,
        })
    }
}

// ceil(dim * size / shorter) in integers, so exact multiples never round up.
fn ceil_scaled(dim: u32, size: u32, shorter: u32) -> Result<u32, ClassifierError> {
    let scaled = (dim as u64 * size as u64).div_ceil(shorter as u64);
    u32::try_from(scaled).map_err(|_| {
        ClassifierError::Validation(format!(
            "Scaling a side of {} to fit {} overflows ({} pixels)",
            dim, size, scaled
        ))
    })
}

/// Maps a raw channel value into the model's input range.
pub fn normalize(value: f32) -> f32 {
    value / NORMALIZATION_DIVISOR - 1.0
}

/// Luminance of an RGB pixel, in the raw `0..=255` range.
pub fn luminance(pixel: &Rgb<u8>) -> f32 {
    pixel
        .0
        .iter()
        .zip(LUMA_WEIGHTS.iter())
        .map(|(&channel, &weight)| channel as f32 * weight)
        .sum()
}

/// Scales a source image and cuts the centered square described by `geometry`.
pub fn center_crop(rgb: &RgbImage, geometry: &CropGeometry) -> RgbImage {
    let resized = imageops::resize(
        rgb,
        geometry.scaled_width,
        geometry.scaled_height,
        FilterType::Triangle,
    );
    imageops::crop_imm(
        &resized,
        geometry.offset_x,
        geometry.offset_y,
        geometry.size,
        geometry.size,
    )
    .to_image()
}

/// Turns sources into model-ready tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    size: u32,
    grayscale: bool,
    layout: TensorLayout,
}

impl Preprocessor {
    pub fn new(size: u32, grayscale: bool, layout: TensorLayout) -> Self {
        Self { size, grayscale, layout }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn channels(&self) -> usize {
        if self.grayscale { 1 } else { 3 }
    }

    /// Shape of the tensors this preprocessor produces.
    pub fn tensor_shape(&self) -> [usize; 4] {
        let size = self.size as usize;
        match self.layout {
            TensorLayout::Nhwc => [1, size, size, self.channels()],
            TensorLayout::Nchw => [1, self.channels(), size, size],
        }
    }

    /// Crop geometry for a particular source.
    pub fn geometry(&self, source: &ImageSource<'_>) -> Result<CropGeometry, ClassifierError> {
        let (width, height) = source.dimensions();
        CropGeometry::compute(width, height, self.size)
    }

    /// Runs the full pipeline. Every intermediate buffer is owned by `tracker` and is
    /// released before this returns; only the final tensor guard is handed back.
    pub fn process(
        &self,
        source: &ImageSource<'_>,
        flipped: bool,
        tracker: &AllocationTracker,
    ) -> Result<Scoped<Array4<f32>>, ClassifierError> {
        let geometry = self.geometry(source)?;

        let rgb = tracker.track(source.to_rgb());
        let cropped = tracker.track(center_crop(&rgb, &geometry));
        let square = if flipped {
            tracker.track(imageops::flip_horizontal(&*cropped))
        } else {
            cropped
        };

        Ok(tracker.track(self.to_tensor(&square)))
    }

    /// Converts a `size × size` crop into a normalized batch-of-one tensor.
    pub fn to_tensor(&self, square: &RgbImage) -> Array4<f32> {
        let shape = self.tensor_shape();
        let grayscale = self.grayscale;
        let value_at = |x: usize, y: usize, c: usize| -> f32 {
            let pixel = square.get_pixel(x as u32, y as u32);
            let raw = if grayscale { luminance(pixel) } else { pixel[c] as f32 };
            normalize(raw)
        };

        match self.layout {
            TensorLayout::Nhwc => {
                Array4::from_shape_fn((shape[0], shape[1], shape[2], shape[3]), |(_, y, x, c)| {
                    value_at(x, y, c)
                })
            }
            TensorLayout::Nchw => {
                Array4::from_shape_fn((shape[0], shape[1], shape[2], shape[3]), |(_, c, y, x)| {
                    value_at(x, y, c)
                })
            }
        }
    }
}

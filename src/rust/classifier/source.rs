use std::borrow::Cow;

use image::buffer::ConvertBuffer;
use image::{DynamicImage, RgbImage, RgbaImage};

/// A single frame grabbed from a live video feed.
///
/// Video elements report two sizes: the native resolution of the decoded frame and the
/// size it is laid out at on screen. Preprocessing always works on the native size.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    frame: RgbImage,
    display_width: u32,
    display_height: u32,
}

impl VideoFrame {
    /// Wraps a decoded frame that is shown at its native size.
    pub fn new(frame: RgbImage) -> Self {
        let (display_width, display_height) = frame.dimensions();
        Self { frame, display_width, display_height }
    }

    /// Records the on-screen size of the frame, which may differ from the native one.
    pub fn with_display_size(mut self, width: u32, height: u32) -> Self {
        self.display_width = width;
        self.display_height = height;
        self
    }

    /// Native (decoded) resolution.
    pub fn native_size(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    /// Layout size the frame is displayed at.
    pub fn display_size(&self) -> (u32, u32) {
        (self.display_width, self.display_height)
    }

    pub fn frame(&self) -> &RgbImage {
        &self.frame
    }
}

/// The image inputs a classifier accepts.
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    /// A static, decoded image of any color type
    Image(&'a DynamicImage),
    /// An RGBA drawing surface; alpha is discarded
    Canvas(&'a RgbaImage),
    /// A frame from a live video feed
    Video(&'a VideoFrame),
    /// A decoded RGB bitmap
    Bitmap(&'a RgbImage),
}

impl<'a> ImageSource<'a> {
    /// True pixel dimensions of the source as `(width, height)`.
    ///
    /// For video this is the native frame size, never the display size.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ImageSource::Image(image) => (image.width(), image.height()),
            ImageSource::Canvas(canvas) => canvas.dimensions(),
            ImageSource::Video(video) => video.native_size(),
            ImageSource::Bitmap(bitmap) => bitmap.dimensions(),
        }
    }

    /// RGB pixels at native resolution. Sources that are already RGB are borrowed.
    pub(crate) fn to_rgb(&self) -> Cow<'a, RgbImage> {
        match *self {
            ImageSource::Image(image) => match image.as_rgb8() {
                Some(rgb) => Cow::Borrowed(rgb),
                None => Cow::Owned(image.to_rgb8()),
            },
            ImageSource::Canvas(canvas) => Cow::Owned(canvas.convert()),
            ImageSource::Video(video) => Cow::Borrowed(video.frame()),
            ImageSource::Bitmap(bitmap) => Cow::Borrowed(bitmap),
        }
    }
}

impl<'a> From<&'a DynamicImage> for ImageSource<'a> {
    fn from(image: &'a DynamicImage) -> Self {
        ImageSource::Image(image)
    }
}

impl<'a> From<&'a RgbaImage> for ImageSource<'a> {
    fn from(canvas: &'a RgbaImage) -> Self {
        ImageSource::Canvas(canvas)
    }
}

impl<'a> From<&'a VideoFrame> for ImageSource<'a> {
    fn from(video: &'a VideoFrame) -> Self {
        ImageSource::Video(video)
    }
}

impl<'a> From<&'a RgbImage> for ImageSource<'a> {
    fn from(bitmap: &'a RgbImage) -> Self {
        ImageSource::Bitmap(bitmap)
    }
}

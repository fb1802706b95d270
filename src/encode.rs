//! Flattening and JPEG encoding of the stitched page

use base64::Engine as Base64Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::stitch::StitchedImage;
use crate::{CaptureError, Result};

/// Quality used for delivered screenshots
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

pub const JPEG_MIME: &str = "image/jpeg";

/// Final delivery-format image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

impl EncodedImage {
    /// `data:` URI form, as handed to browser download APIs
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Composite `image` onto opaque white (JPEG has no alpha channel).
pub fn flatten(image: &StitchedImage) -> RgbImage {
    let src = image.pixels();
    RgbImage::from_fn(src.width(), src.height(), |x, y| {
        let p = src.get_pixel(x, y).0;
        let a = u32::from(p[3]);
        let mix = |c: u8| ((u32::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([mix(p[0]), mix(p[1]), mix(p[2])])
    })
}

/// Flatten and encode as JPEG at `quality` (1..=100).
pub fn encode(image: &StitchedImage, quality: u8) -> Result<EncodedImage> {
    if !(1..=100).contains(&quality) {
        return Err(CaptureError::InvalidConfig(format!("JPEG quality {} outside 1..=100", quality)));
    }

    let flat = flatten(image);
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&flat)
        .map_err(|e| CaptureError::EncodeFailed(e.to_string()))?;

    Ok(EncodedImage {
        bytes,
        width: flat.width(),
        height: flat.height(),
        mime_type: JPEG_MIME,
    })
}

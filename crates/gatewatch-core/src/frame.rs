//! Frame decoding, down-scaling and JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
    #[error("undecodable image: {0}")]
    Image(#[from] image::ImageError),
}

/// Decode an encoded (JPEG/PNG) payload into an RGB frame.
pub fn decode_frame(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Resize by `factor` in each dimension, rounding to the nearest pixel.
pub fn downscale(frame: &RgbImage, factor: f32) -> RgbImage {
    let width = ((frame.width() as f32 * factor).round() as u32).max(1);
    let height = ((frame.height() as f32 * factor).round() as u32).max(1);
    imageops::resize(frame, width, height, FilterType::Triangle)
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(frame)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_roundtrip_dimensions() {
        let frame = RgbImage::from_pixel(64, 48, image::Rgb([120, 80, 40]));
        let jpeg = encode_jpeg(&frame, 90).unwrap();
        let decoded = decode_frame(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(decode_frame(&[]), Err(DecodeError::Empty)));
        assert!(matches!(decode_frame(b"not a jpeg"), Err(DecodeError::Image(_))));
    }

    #[test]
    fn test_downscale_quarter() {
        let frame = RgbImage::new(640, 480);
        assert_eq!(downscale(&frame, 0.25).dimensions(), (160, 120));
    }

    #[test]
    fn test_downscale_never_zero() {
        let frame = RgbImage::new(2, 2);
        assert_eq!(downscale(&frame, 0.1).dimensions(), (1, 1));
    }
}

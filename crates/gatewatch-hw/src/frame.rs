//! Captured frame type and YUYV→RGB conversion.

use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("odd frame width {0} (YUYV packs pixel pairs)")]
    OddWidth(u32),
}

/// A captured camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

/// Convert packed YUYV 4:2:2 (`[Y0, U, Y1, V]` per pixel pair) to RGB using
/// BT.601 full-range coefficients.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    if width % 2 != 0 {
        return Err(FrameError::OddWidth(width));
    }
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push(clamp_u8(y + 1.402 * v));
            rgb.push(clamp_u8(y - 0.344_136 * u - 0.714_136 * v));
            rgb.push(clamp_u8(y + 1.772 * u));
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// Copy a packed RGB24 buffer into an image.
pub fn rgb24_to_image(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 3) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    RgbImage::from_raw(width, height, buf[..expected].to_vec()).ok_or(FrameError::InvalidLength {
        expected,
        actual: buf.len(),
    })
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_grey_is_neutral() {
        // Chroma at 128 leaves R = G = B = Y.
        let buf = [200, 128, 50, 128];
        let img = yuyv_to_rgb(&buf, 2, 1).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [200, 200, 200]);
        assert_eq!(img.get_pixel(1, 0).0, [50, 50, 50]);
    }

    #[test]
    fn test_yuyv_red_dominant() {
        // Saturated V pushes red up and clamps.
        let buf = [128, 128, 128, 255];
        let img = yuyv_to_rgb(&buf, 2, 1).unwrap();
        let [r, g, b] = img.get_pixel(0, 0).0;
        assert_eq!(r, 255);
        assert!(g < 128);
        assert_eq!(b, 128);
    }

    #[test]
    fn test_yuyv_short_buffer() {
        assert!(matches!(
            yuyv_to_rgb(&[0; 6], 2, 2),
            Err(FrameError::InvalidLength { expected: 8, actual: 6 })
        ));
    }

    #[test]
    fn test_yuyv_odd_width() {
        assert!(matches!(yuyv_to_rgb(&[0; 6], 3, 1), Err(FrameError::OddWidth(3))));
    }

    #[test]
    fn test_rgb24_passthrough() {
        let img = rgb24_to_image(&[1, 2, 3, 4, 5, 6, 7], 2, 1).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [4, 5, 6]);
    }
}

//! Raw buffer → grayscale conversion for the supported pixel formats.

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("MJPEG decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("MJPEG frame is {actual_w}x{actual_h}, negotiated {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_w: u32,
        actual_h: u32,
    },
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "YUYV",
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Copy an 8-bit grayscale buffer, dropping any driver padding.
pub fn grey_to_grayscale(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "GREY",
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf[..expected].to_vec())
}

/// Decode a Motion-JPEG frame (most USB webcams) to grayscale.
pub fn mjpeg_to_grayscale(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let decoded = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)?.to_luma8();
    let (actual_w, actual_h) = decoded.dimensions();
    if (actual_w, actual_h) != (width, height) {
        return Err(FrameError::SizeMismatch {
            width,
            height,
            actual_w,
            actual_h,
        });
    }
    Ok(decoded.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::io::Cursor;

    #[test]
    fn test_yuyv_to_grayscale() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        assert_eq!(yuyv_to_grayscale(&yuyv, 2, 1).unwrap(), vec![100, 200]);
    }

    #[test]
    fn test_yuyv_ignores_trailing_padding() {
        let mut yuyv: Vec<u8> = (0..16).collect();
        yuyv.extend([255; 8]);
        let gray = yuyv_to_grayscale(&yuyv, 4, 2).unwrap();
        assert_eq!(gray, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(matches!(
            yuyv_to_grayscale(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { expected: 4, .. })
        ));
    }

    #[test]
    fn test_grey_too_short() {
        assert!(grey_to_grayscale(&[0u8; 5], 3, 2).is_err());
        assert_eq!(grey_to_grayscale(&[7u8; 8], 3, 2).unwrap(), vec![7u8; 6]);
    }

    #[test]
    fn test_mjpeg_decodes_to_luma() {
        let img = GrayImage::from_pixel(16, 8, Luma([200]));
        let mut jpeg = Vec::new();
        img.write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let gray = mjpeg_to_grayscale(&jpeg, 16, 8).unwrap();
        assert_eq!(gray.len(), 16 * 8);
        assert!(gray.iter().all(|&p| (195..=205).contains(&p)));

        assert!(matches!(
            mjpeg_to_grayscale(&jpeg, 32, 8),
            Err(FrameError::SizeMismatch { .. })
        ));
    }
}

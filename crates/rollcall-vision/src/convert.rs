//! Grayscale buffers ↔ OpenCV matrices.

use opencv::core::Mat;
use opencv::prelude::*;

/// Copy a row-major 8-bit grayscale buffer into an owned `CV_8UC1` matrix.
pub(crate) fn gray_mat(data: &[u8], width: u32, height: u32) -> opencv::Result<Mat> {
    let len = (width * height) as usize;
    let pixels = &data[..len.min(data.len())];
    let view = Mat::new_rows_cols_with_data(height as i32, width as i32, pixels)?;
    view.try_clone()
}

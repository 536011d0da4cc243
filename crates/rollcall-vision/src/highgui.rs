//! HighGUI preview window.

use crate::convert::gray_mat;
use crate::VisionError;
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::{highgui, imgproc};
use rollcall_core::{Annotation, Frame, KeyAction, Preview};

const ESC: i32 = 27;

/// Shows each frame with a green box and a label per region.
pub struct HighGuiPreview {
    window: String,
    open: bool,
}

impl HighGuiPreview {
    pub fn open(title: &str) -> Result<Self, VisionError> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            window: title.to_string(),
            open: true,
        })
    }

    fn draw(&self, frame: &Frame, annotations: &[Annotation]) -> opencv::Result<i32> {
        let gray = gray_mat(&frame.data, frame.width, frame.height)?;
        let mut canvas = Mat::default();
        imgproc::cvt_color_def(&gray, &mut canvas, imgproc::COLOR_GRAY2BGR)?;

        for a in annotations {
            let r = a.region;
            let (x, y) = (r.x as i32, r.y as i32);
            imgproc::rectangle(
                &mut canvas,
                Rect::new(x, y, r.width as i32, r.height as i32),
                Scalar::new(0.0, 255.0, 0.0, 0.0),
                2,
                imgproc::LINE_8,
                0,
            )?;
            imgproc::put_text(
                &mut canvas,
                &a.text,
                Point::new(x, (y - 10).max(12)),
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.8,
                Scalar::new(255.0, 255.0, 255.0, 0.0),
                2,
                imgproc::LINE_8,
                false,
            )?;
        }

        highgui::imshow(&self.window, &canvas)?;
        highgui::wait_key(1)
    }
}

impl Preview for HighGuiPreview {
    fn present(&mut self, frame: &Frame, annotations: &[Annotation]) -> KeyAction {
        match self.draw(frame, annotations) {
            Ok(ESC) => KeyAction::Stop,
            Ok(_) => KeyAction::Continue,
            Err(e) => {
                tracing::warn!(error = %e, "preview failed");
                KeyAction::Continue
            }
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = highgui::destroy_window(&self.window) {
            tracing::warn!(error = %e, "failed to close preview window");
        }
    }
}

impl Drop for HighGuiPreview {
    fn drop(&mut self) {
        self.close();
    }
}

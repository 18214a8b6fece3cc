//! Display sinks for annotated frames, and the operator's quit request.

use image::RgbImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Window title of the live preview.
pub const WINDOW_TITLE: &str = "Webcam - Attendance System";

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("failed to write preview frame: {0}")]
    Preview(#[from] image::ImageError),
    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[cfg(feature = "window")]
    #[error("window: {0}")]
    Window(#[from] opencv::Error),
}

/// Where annotated frames go, and where the quit request comes from.
pub trait DisplaySink {
    fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;

    /// Polled once per frame, after `show`.
    fn quit_requested(&mut self) -> Result<bool, DisplayError>;

    fn close(&mut self) {}
}

/// No window. Ctrl-C requests quit; the latest frame can be mirrored to a file.
pub struct HeadlessSink {
    stop: Arc<AtomicBool>,
    preview: Option<PathBuf>,
}

impl HeadlessSink {
    pub fn new(stop: Arc<AtomicBool>, preview: Option<PathBuf>) -> Self {
        Self { stop, preview }
    }

    /// Headless sink whose quit flag is raised by SIGINT.
    pub fn with_ctrlc(preview: Option<PathBuf>) -> Result<Self, DisplayError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        ctrlc::set_handler(move || {
            tracing::info!("interrupt received, stopping");
            flag.store(true, Ordering::SeqCst);
        })?;
        Ok(Self::new(stop, preview))
    }
}

impl DisplaySink for HeadlessSink {
    fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
        if let Some(path) = &self.preview {
            frame.save(path)?;
        }
        Ok(())
    }

    fn quit_requested(&mut self) -> Result<bool, DisplayError> {
        Ok(self.stop.load(Ordering::SeqCst))
    }
}

#[cfg(feature = "window")]
pub use window::WindowSink;

#[cfg(feature = "window")]
mod window {
    use super::{DisplayError, DisplaySink};
    use image::RgbImage;
    use opencv::{core, highgui, prelude::*};

    const QUIT_KEY: i32 = b'q' as i32;

    /// OpenCV HighGUI window; pressing `q` requests quit.
    pub struct WindowSink {
        name: String,
    }

    impl WindowSink {
        pub fn open(name: &str) -> Result<Self, DisplayError> {
            highgui::named_window_def(name)?;
            Ok(Self {
                name: name.to_string(),
            })
        }
    }

    impl DisplaySink for WindowSink {
        fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
            let (width, height) = frame.dimensions();
            let mut mat = Mat::new_rows_cols_with_default(
                height as i32,
                width as i32,
                core::CV_8UC3,
                core::Scalar::all(0.0),
            )?;
            // OpenCV wants BGR.
            for (dst, src) in mat.data_bytes_mut()?.chunks_exact_mut(3).zip(frame.pixels()) {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            }
            highgui::imshow(&self.name, &mat)?;
            Ok(())
        }

        fn quit_requested(&mut self) -> Result<bool, DisplayError> {
            let key = highgui::wait_key(1)?;
            Ok(key >= 0 && (key & 0xFF) == QUIT_KEY)
        }

        fn close(&mut self) {
            if let Err(e) = highgui::destroy_window(&self.name) {
                tracing::warn!(error = %e, "failed to close preview window");
            }
        }
    }
}

//! Webcam attendance: configuration, overlays, display sinks and the live
//! recognition loop. The `rollcall` binary wires them to the camera.

pub mod config;
pub mod display;
pub mod overlay;
pub mod session;

pub use config::Config;
pub use display::{DisplayError, DisplaySink, HeadlessSink, WINDOW_TITLE};
#[cfg(feature = "window")]
pub use display::WindowSink;
pub use overlay::Overlay;
pub use session::{
    FrameSource, LoopState, Recognition, RecognitionLoop, SessionError, SessionSummary, StopReason,
};

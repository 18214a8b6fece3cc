//! Live recognition loop: frames in, labelled overlays and attendance marks out.

use crate::display::{DisplayError, DisplaySink};
use crate::overlay::{Overlay, MATCH_COLOR, UNKNOWN_COLOR};
use image::imageops::{self, FilterType};
use image::RgbImage;
use rollcall_core::{
    BoundingBox, DistanceMatcher, EncoderError, FaceEncoder, KnownFaces, Ledger, MarkOutcome,
    Matcher,
};
use rollcall_hw::{Camera, CameraError};
use std::collections::BTreeSet;
use std::fmt::Display;
use thiserror::Error;

/// Frames are analysed at 1/`DOWNSCALE_FACTOR` linear size.
pub const DOWNSCALE_FACTOR: u32 = 4;

/// Label drawn for faces that match no enrolled person.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no encoded faces available; add images to the dataset first")]
    NoKnownFaces,
    #[error("could not open video stream: {0}")]
    SourceUnavailable(String),
    #[error("recognition loop is not running")]
    NotRunning,
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("display error: {0}")]
    Display(#[from] DisplayError),
}

/// A blocking source of RGB frames. An error ends the stream.
pub trait FrameSource {
    type Error: Display;

    fn next_frame(&mut self) -> Result<RgbImage, Self::Error>;
}

impl FrameSource for Camera {
    type Error = CameraError;

    fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
        let frame = self.capture_frame()?;
        tracing::trace!(
            sequence = frame.sequence,
            width = frame.width(),
            height = frame.height(),
            "frame captured"
        );
        Ok(frame.image)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source failed to deliver a frame.
    EndOfStream,
    /// The display sink reported a quit request.
    QuitRequested,
    /// Encoding or display failed mid-run.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped(StopReason),
}

/// Outcome for one face in one frame.
#[derive(Debug, Clone)]
pub struct Recognition {
    /// Face box in full-frame coordinates.
    pub bbox: BoundingBox,
    /// Upper-cased person name, or [`UNKNOWN_LABEL`].
    pub label: String,
    pub matched: bool,
    /// Distance to the closest enrolled face.
    pub distance: f32,
    /// Whether the ledger was called for this face.
    pub credited: bool,
    /// What the ledger answered, when it was called and succeeded.
    pub mark: Option<MarkOutcome>,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub stop: StopReason,
    pub frames: u64,
    /// Names the ledger was called for during this run.
    pub credited: Vec<String>,
}

/// The recognition loop: `Idle` until [`start`](Self::start), then `Running`
/// until the stream ends or the operator quits.
pub struct RecognitionLoop<'a, E, L> {
    known: &'a KnownFaces,
    encoder: E,
    ledger: L,
    matcher: DistanceMatcher,
    threshold: f32,
    overlay: Overlay,
    /// Names already credited this run; separate from the ledger's own per-day check.
    recognized: BTreeSet<String>,
    state: LoopState,
    frames: u64,
}

impl<'a, E: FaceEncoder, L: Ledger> RecognitionLoop<'a, E, L> {
    pub fn new(
        known: &'a KnownFaces,
        encoder: E,
        ledger: L,
        matcher: DistanceMatcher,
        threshold: f32,
        overlay: Overlay,
    ) -> Self {
        Self {
            known,
            encoder,
            ledger,
            matcher,
            threshold,
            overlay,
            recognized: BTreeSet::new(),
            state: LoopState::Idle,
            frames: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn recognized(&self) -> &BTreeSet<String> {
        &self.recognized
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Enter `Running`: requires enrolled faces and an opened source.
    ///
    /// The gallery is checked before `open` is called, so an empty enrollment
    /// never touches the camera. On failure the loop stays `Idle`.
    pub fn start<S, F, Err>(&mut self, open: F) -> Result<S, SessionError>
    where
        F: FnOnce() -> Result<S, Err>,
        Err: Display,
    {
        if self.known.is_empty() {
            return Err(SessionError::NoKnownFaces);
        }
        let source = open().map_err(|e| SessionError::SourceUnavailable(e.to_string()))?;

        self.recognized.clear();
        self.frames = 0;
        self.state = LoopState::Running;
        tracing::info!(known = self.known.len(), "recognition loop running");
        Ok(source)
    }

    /// Pull frames from `source` until it ends or `display` asks to quit.
    ///
    /// The source is dropped (released) and the display closed on exit.
    pub fn run<S, D>(
        &mut self,
        mut source: S,
        display: &mut D,
    ) -> Result<SessionSummary, SessionError>
    where
        S: FrameSource,
        D: DisplaySink + ?Sized,
    {
        if self.state != LoopState::Running {
            return Err(SessionError::NotRunning);
        }

        let outcome = self.pump(&mut source, display);
        drop(source);
        display.close();

        let stop = match &outcome {
            Ok(stop) => *stop,
            Err(e) => {
                tracing::error!(error = %e, "recognition loop failed");
                StopReason::Failed
            }
        };
        self.state = LoopState::Stopped(stop);
        tracing::info!(
            ?stop,
            frames = self.frames,
            credited = self.recognized.len(),
            "recognition loop stopped"
        );

        outcome.map(|stop| SessionSummary {
            stop,
            frames: self.frames,
            credited: self.recognized.iter().cloned().collect(),
        })
    }

    fn pump<S, D>(&mut self, source: &mut S, display: &mut D) -> Result<StopReason, SessionError>
    where
        S: FrameSource,
        D: DisplaySink + ?Sized,
    {
        loop {
            let mut frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to grab frame");
                    return Ok(StopReason::EndOfStream);
                }
            };

            self.process_frame(&mut frame)?;

            display.show(&frame)?;
            if display.quit_requested()? {
                return Ok(StopReason::QuitRequested);
            }
        }
    }

    /// Recognise every face in `frame`, draw the overlays onto it, and credit
    /// newly recognised people.
    pub fn process_frame(
        &mut self,
        frame: &mut RgbImage,
    ) -> Result<Vec<Recognition>, SessionError> {
        if self.state != LoopState::Running {
            return Err(SessionError::NotRunning);
        }
        self.frames += 1;

        let small = downscale(frame);
        let faces = self.encoder.locate(&small)?;
        let embeddings = self.encoder.encode(&small, &faces)?;
        if embeddings.len() != faces.len() {
            return Err(EncoderError::CountMismatch {
                expected: faces.len(),
                got: embeddings.len(),
            }
            .into());
        }

        let mut recognitions = Vec::with_capacity(faces.len());
        for (face, embedding) in faces.iter().zip(embeddings.iter()) {
            let result = self
                .matcher
                .compare(embedding, &self.known.models, self.threshold);
            let bbox = face.scaled(DOWNSCALE_FACTOR as f32);

            let recognition = match result.label {
                Some(label) if result.matched => {
                    let name = label.to_uppercase();
                    self.overlay
                        .draw_label(frame, bbox.corners(), &name, MATCH_COLOR);
                    let (credited, mark) = self.credit(&name);
                    Recognition {
                        bbox,
                        label: name,
                        matched: true,
                        distance: result.distance,
                        credited,
                        mark,
                    }
                }
                _ => {
                    self.overlay
                        .draw_label(frame, bbox.corners(), UNKNOWN_LABEL, UNKNOWN_COLOR);
                    Recognition {
                        bbox,
                        label: UNKNOWN_LABEL.to_string(),
                        matched: false,
                        distance: result.distance,
                        credited: false,
                        mark: None,
                    }
                }
            };
            recognitions.push(recognition);
        }

        Ok(recognitions)
    }

    /// Call the ledger once per session per name. A failed write is retried
    /// on the next sighting.
    ///
    /// Returns whether the ledger was called, and its answer if it succeeded.
    fn credit(&mut self, name: &str) -> (bool, Option<MarkOutcome>) {
        if self.recognized.contains(name) {
            return (false, None);
        }
        match self.ledger.mark(name) {
            Ok(outcome) => {
                match &outcome {
                    MarkOutcome::Recorded(record) => {
                        tracing::info!(
                            name,
                            date = %record.date,
                            time = %record.time,
                            "attendance credited"
                        );
                    }
                    MarkOutcome::AlreadyMarked => {
                        tracing::info!(name, "already present today");
                    }
                }
                self.recognized.insert(name.to_string());
                (true, Some(outcome))
            }
            Err(e) => {
                tracing::error!(name, error = %e, "failed to mark attendance");
                (true, None)
            }
        }
    }
}

fn downscale(frame: &RgbImage) -> RgbImage {
    let width = (frame.width() / DOWNSCALE_FACTOR).max(1);
    let height = (frame.height() / DOWNSCALE_FACTOR).max(1);
    imageops::resize(frame, width, height, FilterType::Triangle)
}

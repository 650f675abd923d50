use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::stream::unfold;
use tokio::sync::mpsc::{self, Sender};

use stimline_types::{ExtractResult, ImageStim};

/// Stream of frames entering the extraction driver.
pub type FrameStream = Pin<Box<dyn Stream<Item = ExtractResult<ImageStim>> + Send>>;

pub type DynFrameProvider = Box<dyn FrameProvider>;

/// What a frame source knows about itself up front.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMetadata {
    pub duration: Option<Duration>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_frames: Option<u64>,
}

impl Default for SourceMetadata {
    fn default() -> Self {
        Self {
            duration: None,
            fps: None,
            width: None,
            height: None,
            total_frames: None,
        }
    }
}

impl SourceMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration_and_fps(duration: Duration, fps: f64) -> Self {
        Self {
            duration: Some(duration),
            fps: Some(fps),
            ..Default::default()
        }
    }

    /// Nominal sampling interval between frames, in seconds.
    pub fn period(&self) -> Option<f64> {
        match self.fps {
            Some(fps) if fps > 0.0 => Some(1.0 / fps),
            _ => None,
        }
    }

    pub fn calculate_total_frames(&self) -> Option<u64> {
        if let Some(total) = self.total_frames {
            return Some(total);
        }

        if let (Some(duration), Some(fps)) = (self.duration, self.fps) {
            let seconds = duration.as_secs_f64();
            let total = (seconds * fps).round();
            if total.is_finite() && total >= 0.0 {
                return Some(total as u64);
            }
        }

        None
    }
}

/// Source of timed image frames: decoded video, sampled screenshots, or a
/// synthetic generator. Implementations run wherever they like; the driver
/// only sees the stream.
pub trait FrameProvider: Send + 'static {
    fn metadata(&self) -> SourceMetadata {
        SourceMetadata::default()
    }

    fn into_stream(self: Box<Self>) -> FrameStream;
}

/// Bridge a blocking frame producer onto a bounded async stream.
pub fn spawn_stream_from_channel(
    capacity: usize,
    task: impl FnOnce(Sender<ExtractResult<ImageStim>>) + Send + 'static,
) -> FrameStream {
    let (tx, rx) = mpsc::channel(capacity);
    tokio::task::spawn_blocking(move || task(tx));
    let stream = unfold(rx, |mut receiver| async {
        receiver.recv().await.map(|item| (item, receiver))
    });
    Box::pin(stream)
}

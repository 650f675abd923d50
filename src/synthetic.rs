use std::time::Duration;

use tokio::sync::mpsc::Sender;

use stimline_types::{ExtractResult, ImageStim};

use crate::provider::{FrameProvider, FrameStream, SourceMetadata, spawn_stream_from_channel};

/// In-memory frame source emitting row-gradient frames with derived timing.
/// Stands in for a real decoder in tests and demos.
pub struct SyntheticProvider {
    width: u32,
    height: u32,
    stride: usize,
    frame_count: usize,
    fps: f64,
    channel_capacity: usize,
}

impl SyntheticProvider {
    const DEFAULT_CHANNEL_CAPACITY: usize = 8;

    pub fn new(frame_count: usize, fps: f64) -> Self {
        Self {
            width: 64,
            height: 36,
            stride: 64,
            frame_count,
            fps,
            channel_capacity: Self::DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self.stride = width as usize;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// One frame's worth of gradient pixels; rows shift by index so frames
    /// are distinguishable downstream.
    pub fn frame(&self, index: usize) -> ExtractResult<ImageStim> {
        let mut buffer = vec![0u8; self.stride * self.height as usize];
        for (row, chunk) in buffer.chunks_mut(self.stride).enumerate() {
            let value = ((row + index) % 256) as u8;
            chunk.fill(value);
        }
        let period = 1.0 / self.fps;
        Ok(ImageStim::from_owned(self.width, self.height, self.stride, buffer)?
            .with_frame_index(Some(index as u64))
            .with_onset(index as f64 * period)
            .with_duration(period))
    }

    fn emit_frames(&self, tx: Sender<ExtractResult<ImageStim>>) {
        for index in 0..self.frame_count {
            if tx.is_closed() {
                break;
            }
            if tx.blocking_send(self.frame(index)).is_err() {
                break;
            }
        }
    }
}

impl FrameProvider for SyntheticProvider {
    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            duration: Some(Duration::from_secs_f64(self.frame_count as f64 / self.fps)),
            fps: Some(self.fps),
            width: Some(self.width),
            height: Some(self.height),
            total_frames: Some(self.frame_count as u64),
        }
    }

    fn into_stream(self: Box<Self>) -> FrameStream {
        let provider = *self;
        let capacity = provider.channel_capacity;
        spawn_stream_from_channel(capacity, move |tx| {
            provider.emit_frames(tx);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DynFrameProvider;
    use tokio_stream::StreamExt;

    #[tokio::test(flavor = "multi_thread")]
    async fn synthetic_provider_emits_timed_frames() {
        let provider = Box::new(SyntheticProvider::new(4, 30.0)) as DynFrameProvider;
        let metadata = provider.metadata();
        assert_eq!(metadata.total_frames, Some(4));
        assert_eq!(metadata.fps, Some(30.0));

        let mut stream = provider.into_stream();
        let mut frames = Vec::new();
        while let Some(frame) = stream.next().await {
            frames.push(frame.unwrap());
        }
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].onset(), Some(0.0));
        assert_eq!(frames[2].frame_index(), Some(2));
        assert_eq!(frames[2].onset(), Some(2.0 / 30.0));
        assert!(frames.iter().all(ImageStim::has_payload));
    }
}

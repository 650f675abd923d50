use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ExtractError, ExtractResult};
use crate::provenance::Provenance;

/// Kinds of stimuli a transformer can declare it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StimKind {
    Image,
    Text,
    Video,
    KeyframeVideo,
}

impl StimKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StimKind::Image => "image",
            StimKind::Text => "text",
            StimKind::Video => "video",
            StimKind::KeyframeVideo => "keyframe-video",
        }
    }
}

impl fmt::Display for StimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single image frame: a 2D pixel array plus optional timing and the index
/// of the frame inside its source clip.
#[derive(Clone)]
pub struct ImageStim {
    width: u32,
    height: u32,
    stride: usize,
    data: Arc<[u8]>,
    onset: Option<f64>,
    duration: Option<f64>,
    frame_index: Option<u64>,
    history: Option<Arc<Provenance>>,
}

impl fmt::Debug for ImageStim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageStim")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .field("onset", &self.onset)
            .field("duration", &self.duration)
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl ImageStim {
    pub fn from_owned(width: u32, height: u32, stride: usize, data: Vec<u8>) -> ExtractResult<Self> {
        let required = stride.checked_mul(height as usize).ok_or_else(|| {
            ExtractError::validation("calculated pixel buffer length overflowed")
        })?;
        if data.len() < required {
            return Err(ExtractError::validation(format!(
                "insufficient pixel bytes: got {} expected at least {}",
                data.len(),
                required
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            data: Arc::from(data.into_boxed_slice()),
            onset: None,
            duration: None,
            frame_index: None,
            history: None,
        })
    }

    /// An image with no pixel payload. Skipped by per-frame drivers.
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            stride: 0,
            data: Arc::from(Vec::new().into_boxed_slice()),
            onset: None,
            duration: None,
            frame_index: None,
            history: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn has_payload(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn onset(&self) -> Option<f64> {
        self.onset
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn with_onset(mut self, onset: f64) -> Self {
        self.onset = Some(onset);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }

    pub fn history(&self) -> Option<&Arc<Provenance>> {
        self.history.as_ref()
    }

    pub fn with_history(mut self, history: Arc<Provenance>) -> Self {
        self.history = Some(history);
        self
    }

    /// New image carrying a transformed payload but the source's timing and
    /// history. The dimensions are revalidated against the new buffer.
    pub fn derived(&self, data: Vec<u8>) -> ExtractResult<Self> {
        let mut derived = Self::from_owned(self.width, self.height, self.stride, data)?;
        derived.onset = self.onset;
        derived.duration = self.duration;
        derived.frame_index = self.frame_index;
        derived.history = self.history.clone();
        Ok(derived)
    }
}

/// Byte range of one token inside a text stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

/// A span of text plus the byte offsets of its whitespace-delimited tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStim {
    text: String,
    tokens: Vec<TokenSpan>,
    onset: Option<f64>,
    duration: Option<f64>,
    #[serde(skip)]
    history: Option<Arc<Provenance>>,
}

impl TextStim {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = tokenize(&text);
        Self {
            text,
            tokens,
            onset: None,
            duration: None,
            history: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[TokenSpan] {
        &self.tokens
    }

    pub fn has_payload(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn onset(&self) -> Option<f64> {
        self.onset
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn with_onset(mut self, onset: f64) -> Self {
        self.onset = Some(onset);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn history(&self) -> Option<&Arc<Provenance>> {
        self.history.as_ref()
    }

    pub fn with_history(mut self, history: Arc<Provenance>) -> Self {
        self.history = Some(history);
        self
    }
}

fn tokenize(text: &str) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push(TokenSpan { start: s, end: idx });
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        spans.push(TokenSpan {
            start: s,
            end: text.len(),
        });
    }
    spans
}

/// A whole clip: an ordered in-memory frame sequence plus its frame rate.
#[derive(Clone)]
pub struct VideoStim {
    frames: Arc<[ImageStim]>,
    fps: f64,
    onset: Option<f64>,
}

impl fmt::Debug for VideoStim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoStim")
            .field("frames", &self.frames.len())
            .field("fps", &self.fps)
            .field("onset", &self.onset)
            .finish()
    }
}

impl VideoStim {
    pub fn new(frames: Vec<ImageStim>, fps: f64) -> ExtractResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ExtractError::validation(format!(
                "frame rate must be a positive number, got {fps}"
            )));
        }
        Ok(Self {
            frames: Arc::from(frames.into_boxed_slice()),
            fps,
            onset: None,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Nominal sampling interval between frames, in seconds.
    pub fn period(&self) -> f64 {
        1.0 / self.fps
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[ImageStim] {
        &self.frames
    }

    pub fn onset(&self) -> Option<f64> {
        self.onset
    }

    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 * self.period()
    }

    pub fn with_onset(mut self, onset: f64) -> Self {
        self.onset = Some(onset);
        self
    }

    /// Frames in index order, each stamped with `onset = index / fps` and a
    /// duration of one frame period.
    pub fn iter_frames(&self) -> impl Iterator<Item = ImageStim> + '_ {
        let period = self.period();
        self.frames.iter().enumerate().map(move |(index, frame)| {
            frame
                .clone()
                .with_onset(index as f64 * period)
                .with_duration(period)
                .with_frame_index(Some(index as u64))
        })
    }
}

/// A clip reduced to representative keyframes, one per detected scene.
///
/// Each element arrives with its own onset and duration; iteration trusts the
/// supplied timing and never recomputes it from the frame rate.
#[derive(Clone, Debug)]
pub struct KeyframeVideoStim {
    video: VideoStim,
    elements: Vec<ImageStim>,
    source_frames: Vec<u64>,
}

impl KeyframeVideoStim {
    pub fn new(
        video: VideoStim,
        elements: Vec<ImageStim>,
        source_frames: Vec<u64>,
    ) -> ExtractResult<Self> {
        for (idx, element) in elements.iter().enumerate() {
            if element.onset().is_none() {
                return Err(ExtractError::validation(format!(
                    "keyframe element {idx} is missing an onset"
                )));
            }
        }
        if source_frames.len() != elements.len() {
            return Err(ExtractError::validation(format!(
                "keyframe index length {} does not match element count {}",
                source_frames.len(),
                elements.len()
            )));
        }
        Ok(Self {
            video,
            elements,
            source_frames,
        })
    }

    pub fn video(&self) -> &VideoStim {
        &self.video
    }

    pub fn elements(&self) -> &[ImageStim] {
        &self.elements
    }

    pub fn source_frames(&self) -> &[u64] {
        &self.source_frames
    }
}

/// A timed unit of input media.
#[derive(Clone, Debug)]
pub enum Stimulus {
    Image(ImageStim),
    Text(TextStim),
    Video(VideoStim),
    KeyframeVideo(KeyframeVideoStim),
}

impl Stimulus {
    pub fn kind(&self) -> StimKind {
        match self {
            Stimulus::Image(_) => StimKind::Image,
            Stimulus::Text(_) => StimKind::Text,
            Stimulus::Video(_) => StimKind::Video,
            Stimulus::KeyframeVideo(_) => StimKind::KeyframeVideo,
        }
    }

    pub fn onset(&self) -> Option<f64> {
        match self {
            Stimulus::Image(stim) => stim.onset(),
            Stimulus::Text(stim) => stim.onset(),
            Stimulus::Video(stim) => stim.onset(),
            Stimulus::KeyframeVideo(stim) => stim.video().onset(),
        }
    }

    pub fn duration(&self) -> Option<f64> {
        match self {
            Stimulus::Image(stim) => stim.duration(),
            Stimulus::Text(stim) => stim.duration(),
            Stimulus::Video(stim) => Some(stim.duration()),
            Stimulus::KeyframeVideo(stim) => Some(stim.video().duration()),
        }
    }

    pub fn has_payload(&self) -> bool {
        match self {
            Stimulus::Image(stim) => stim.has_payload(),
            Stimulus::Text(stim) => stim.has_payload(),
            Stimulus::Video(stim) => stim.n_frames() > 0,
            Stimulus::KeyframeVideo(stim) => !stim.elements().is_empty(),
        }
    }

    pub fn history(&self) -> Option<&Arc<Provenance>> {
        match self {
            Stimulus::Image(stim) => stim.history(),
            Stimulus::Text(stim) => stim.history(),
            Stimulus::Video(_) | Stimulus::KeyframeVideo(_) => None,
        }
    }
}

impl From<ImageStim> for Stimulus {
    fn from(stim: ImageStim) -> Self {
        Stimulus::Image(stim)
    }
}

impl From<TextStim> for Stimulus {
    fn from(stim: TextStim) -> Self {
        Stimulus::Text(stim)
    }
}

impl From<VideoStim> for Stimulus {
    fn from(stim: VideoStim) -> Self {
        Stimulus::Video(stim)
    }
}

impl From<KeyframeVideoStim> for Stimulus {
    fn from(stim: KeyframeVideoStim) -> Self {
        Stimulus::KeyframeVideo(stim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: u8) -> ImageStim {
        ImageStim::from_owned(4, 2, 4, vec![value; 8]).unwrap()
    }

    #[test]
    fn image_rejects_short_buffers() {
        let err = ImageStim::from_owned(4, 2, 4, vec![0; 7]).unwrap_err();
        assert!(matches!(err, ExtractError::Validation { .. }));
    }

    #[test]
    fn video_frames_get_derived_timing() {
        let video = VideoStim::new(vec![frame(0), frame(1), frame(2)], 25.0).unwrap();
        let frames: Vec<ImageStim> = video.iter_frames().collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].onset(), Some(0.0));
        assert_eq!(frames[2].onset(), Some(2.0 / 25.0));
        assert_eq!(frames[1].duration(), Some(1.0 / 25.0));
        assert_eq!(frames[1].frame_index(), Some(1));
        assert_eq!(video.duration(), 3.0 / 25.0);
    }

    #[test]
    fn keyframe_video_requires_element_onsets() {
        let video = VideoStim::new(vec![frame(0), frame(1)], 30.0).unwrap();
        let err = KeyframeVideoStim::new(video.clone(), vec![frame(0)], vec![0]).unwrap_err();
        assert!(matches!(err, ExtractError::Validation { .. }));

        let element = frame(0).with_onset(0.5).with_duration(1.5);
        let derived = KeyframeVideoStim::new(video, vec![element], vec![0]).unwrap();
        assert_eq!(derived.elements()[0].onset(), Some(0.5));
    }

    #[test]
    fn text_tokens_carry_byte_offsets() {
        let stim = TextStim::new("the quick  fox");
        let spans = stim.tokens();
        assert_eq!(spans.len(), 3);
        assert_eq!(&stim.text()[spans[1].start..spans[1].end], "quick");
        assert_eq!(&stim.text()[spans[2].start..spans[2].end], "fox");
    }
}

use tokio_stream::StreamExt;

use stimline_extract::{Extractor, Scope};
use stimline_types::{
    Event, ExtractError, ExtractResult, ImageStim, KeyframeVideoStim, Stimulus, Timeline,
    VideoStim,
};

use crate::progress::build_progress;
use crate::provider::DynFrameProvider;

#[derive(Debug, Clone, Copy)]
pub struct DriveOptions {
    /// Fold events landing on an existing slot into it instead of inserting
    /// a sibling.
    pub merge_events: bool,
}

impl Default for DriveOptions {
    fn default() -> Self {
        Self { merge_events: true }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamOptions {
    pub drive: DriveOptions,
    /// Sampling interval to assume when the source reports no frame rate.
    pub period: Option<f64>,
    pub progress: bool,
}

/// Run a set of extractors over one in-memory clip.
///
/// Whole-scope extractors see the entire clip once and contribute their
/// events directly; per-frame extractors run on every frame with a payload,
/// each output anchored at `frame_index * period`. Everything folds into one
/// timeline per clip.
pub fn extract_clip(
    video: &VideoStim,
    extractors: &[&dyn Extractor],
    options: &DriveOptions,
) -> ExtractResult<Timeline> {
    let period = video.period();
    let mut timeline = Timeline::with_period(period).with_duration(video.duration());

    for extractor in extractors {
        match extractor.scope() {
            Scope::Whole => {
                let stim = Stimulus::Video(video.clone());
                add_whole_events(*extractor, &stim, &mut timeline, options)?;
            }
            Scope::PerFrame => {
                for frame in video.iter_frames() {
                    if !frame.has_payload() {
                        continue;
                    }
                    let onset = frame.frame_index().unwrap_or(0) as f64 * period;
                    add_frame_event(*extractor, frame, onset, None, &mut timeline, options)?;
                }
            }
        }
    }

    Ok(timeline)
}

/// Like [`extract_clip`], but iterating the precomputed keyframe elements
/// instead of every frame. Element timing is supplied by whoever derived the
/// keyframes and is trusted as-is.
pub fn extract_keyframes(
    video: &KeyframeVideoStim,
    extractors: &[&dyn Extractor],
    options: &DriveOptions,
) -> ExtractResult<Timeline> {
    let mut timeline = Timeline::with_period(video.video().period())
        .with_duration(video.video().duration());

    for extractor in extractors {
        match extractor.scope() {
            Scope::Whole => {
                let stim = Stimulus::KeyframeVideo(video.clone());
                add_whole_events(*extractor, &stim, &mut timeline, options)?;
            }
            Scope::PerFrame => {
                for element in video.elements() {
                    if !element.has_payload() {
                        continue;
                    }
                    let onset = element.onset().unwrap_or(0.0);
                    let duration = element.duration();
                    add_frame_event(
                        *extractor,
                        element.clone(),
                        onset,
                        duration,
                        &mut timeline,
                        options,
                    )?;
                }
            }
        }
    }

    Ok(timeline)
}

/// Run per-frame extractors over a frame stream, folding events into one
/// timeline as frames arrive.
///
/// Whole-scope extractors need the entire clip in hand and are skipped here.
/// A stream error ends the run and reports how many frames were processed
/// before it, in the manner of the source decode loops this descends from.
pub async fn run_stream(
    provider: DynFrameProvider,
    extractors: &[&dyn Extractor],
    options: &StreamOptions,
) -> Result<Timeline, (ExtractError, u64)> {
    let metadata = provider.metadata();
    let period = options.period.or_else(|| metadata.period());

    let mut timeline = match period {
        Some(period) => Timeline::with_period(period),
        None => Timeline::new(),
    };
    if let Some(duration) = metadata.duration {
        timeline = timeline.with_duration(duration.as_secs_f64());
    }

    let skipped_whole = extractors
        .iter()
        .filter(|extractor| extractor.scope() == Scope::Whole)
        .count();
    if skipped_whole > 0 {
        log::warn!("{skipped_whole} whole-scope extractor(s) cannot run over a frame stream; skipping");
    }

    let progress = options.progress.then(|| build_progress(metadata.calculate_total_frames()));

    let mut stream = provider.into_stream();
    let mut processed: u64 = 0;

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                if let Some(bar) = progress.as_ref() {
                    bar.abandon_with_message(format!("failed after {processed} frames"));
                }
                return Err((err, processed));
            }
        };

        processed = processed.saturating_add(1);
        if let Some(bar) = progress.as_ref() {
            bar.set_position(processed);
        }
        if !frame.has_payload() {
            continue;
        }

        let onset = frame
            .onset()
            .or_else(|| {
                frame
                    .frame_index()
                    .zip(period)
                    .map(|(index, period)| index as f64 * period)
            })
            .unwrap_or(0.0);

        for extractor in extractors {
            if extractor.scope() != Scope::PerFrame {
                continue;
            }
            if let Err(err) = add_frame_event(
                *extractor,
                frame.clone(),
                onset,
                None,
                &mut timeline,
                &options.drive,
            ) {
                if let Some(bar) = progress.as_ref() {
                    bar.abandon_with_message(format!("failed after {processed} frames"));
                }
                return Err((err, processed));
            }
        }
    }

    if let Some(bar) = progress {
        bar.finish_with_message(format!(
            "extracted {} events from {processed} frames",
            timeline.len()
        ));
    }

    Ok(timeline)
}

/// One whole-stimulus pass: every event the extractor emits is folded into
/// the timeline. Extractors that do not accept the stimulus kind are logged
/// and skipped.
fn add_whole_events(
    extractor: &dyn Extractor,
    stim: &Stimulus,
    timeline: &mut Timeline,
    options: &DriveOptions,
) -> ExtractResult<()> {
    if !extractor.accepts(stim) {
        log::warn!(
            "{} does not accept {} stimuli; skipping whole-stimulus pass",
            extractor.name(),
            stim.kind()
        );
        return Ok(());
    }
    let events = match extractor.extract_events(stim) {
        Ok(events) => events,
        Err(err @ ExtractError::AuthConfig { .. }) => return Err(err),
        Err(err) => {
            log::warn!("{} failed on whole stimulus: {err}; skipping", extractor.name());
            return Ok(());
        }
    };
    for event in events {
        timeline.add_event(event, options.merge_events)?;
    }
    Ok(())
}

/// One per-frame pass: the extractor's features become a single event at the
/// given onset. Item-level failures are logged and skipped; configuration
/// failures abort.
fn add_frame_event(
    extractor: &dyn Extractor,
    frame: ImageStim,
    onset: f64,
    duration: Option<f64>,
    timeline: &mut Timeline,
    options: &DriveOptions,
) -> ExtractResult<()> {
    let frame_index = frame.frame_index();
    let stim = Stimulus::Image(frame);
    if !extractor.accepts(&stim) {
        log::warn!(
            "{} does not accept {} stimuli; skipping frame {frame_index:?}",
            extractor.name(),
            stim.kind()
        );
        return Ok(());
    }
    let features = match extractor.extract(&stim) {
        Ok(features) => features,
        Err(err @ ExtractError::AuthConfig { .. }) => return Err(err),
        Err(err) => {
            log::warn!(
                "{} failed on frame {frame_index:?}: {err}; skipping",
                extractor.name()
            );
            return Ok(());
        }
    };
    let mut event = Event::new(onset).with_features(features);
    if let Some(duration) = duration {
        event = event.with_duration(duration);
    }
    timeline.add_event(event, options.merge_events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stimline_extract::Transformer;
    use stimline_types::{FeatureSet, StimKind};

    /// Mean pixel value of one frame.
    struct FrameMean;

    impl Transformer for FrameMean {
        fn name(&self) -> &'static str {
            "frame-mean"
        }

        fn accepted_kinds(&self) -> &[StimKind] {
            &[StimKind::Image]
        }
    }

    impl Extractor for FrameMean {
        fn extract(&self, stim: &Stimulus) -> ExtractResult<FeatureSet> {
            let Stimulus::Image(image) = stim else {
                return Err(ExtractError::validation("expected an image"));
            };
            let sum: u64 = image.data().iter().map(|b| *b as u64).sum();
            let mean = sum as f64 / image.data().len().max(1) as f64;
            let mut features = FeatureSet::new();
            features.insert("mean", json!(mean));
            Ok(features)
        }
    }

    /// Whole-clip extractor reporting clip-level shape features.
    struct ClipShape;

    impl Transformer for ClipShape {
        fn name(&self) -> &'static str {
            "clip-shape"
        }

        fn accepted_kinds(&self) -> &[StimKind] {
            &[StimKind::Video, StimKind::KeyframeVideo]
        }

        fn scope(&self) -> Scope {
            Scope::Whole
        }
    }

    impl Extractor for ClipShape {
        fn extract(&self, stim: &Stimulus) -> ExtractResult<FeatureSet> {
            let mut features = FeatureSet::new();
            match stim {
                Stimulus::Video(video) => {
                    features.insert("n_frames", json!(video.n_frames()));
                    features.insert("fps", json!(video.fps()));
                }
                Stimulus::KeyframeVideo(video) => {
                    features.insert("n_frames", json!(video.elements().len()));
                    features.insert("fps", json!(video.video().fps()));
                }
                _ => return Err(ExtractError::validation("expected a clip")),
            }
            Ok(features)
        }
    }

    fn gradient_frame(value: u8) -> ImageStim {
        ImageStim::from_owned(4, 2, 4, vec![value; 8]).unwrap()
    }

    fn clip(frames: usize, fps: f64) -> VideoStim {
        let frames = (0..frames).map(|i| gradient_frame(i as u8)).collect();
        VideoStim::new(frames, fps).unwrap()
    }

    #[test]
    fn per_frame_events_anchor_at_frame_onsets() {
        let video = clip(5, 30.0);
        let timeline =
            extract_clip(&video, &[&FrameMean, &ClipShape], &DriveOptions::default()).unwrap();

        // The whole-clip contribution lands at onset 0 and merges into the
        // first frame's slot; every frame slot carries the per-frame value.
        assert_eq!(timeline.len(), 5);
        let period = 1.0 / 30.0;
        for (i, event) in timeline.events().iter().enumerate() {
            assert!((event.onset() - i as f64 * period).abs() < 1e-9);
            assert!(event.features().contains("mean"));
        }
        assert!(timeline.events()[0].features().contains("n_frames"));
        assert_eq!(
            timeline.events()[0].features().get("n_frames"),
            Some(&json!(5))
        );
    }

    #[test]
    fn empty_frames_are_skipped() {
        let mut frames: Vec<ImageStim> = (0..3).map(|i| gradient_frame(i as u8)).collect();
        frames.insert(1, ImageStim::empty());
        let video = VideoStim::new(frames, 10.0).unwrap();
        let timeline = extract_clip(&video, &[&FrameMean], &DriveOptions::default()).unwrap();
        assert_eq!(timeline.len(), 3);
    }

    #[test]
    fn keyframe_elements_keep_their_supplied_timing() {
        let video = clip(6, 30.0);
        let elements = vec![
            gradient_frame(0).with_onset(0.0).with_duration(0.8),
            gradient_frame(9).with_onset(0.8).with_duration(1.2),
        ];
        let derived = KeyframeVideoStim::new(video, elements, vec![0, 4]).unwrap();
        let timeline =
            extract_keyframes(&derived, &[&FrameMean], &DriveOptions::default()).unwrap();

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.events()[0].duration(), Some(0.8));
        assert_eq!(timeline.events()[1].onset(), 0.8);
        assert_eq!(timeline.events()[1].duration(), Some(1.2));
    }

    #[test]
    fn whole_scope_runs_once_on_keyframe_clips() {
        let video = clip(6, 30.0);
        let elements = vec![gradient_frame(3).with_onset(0.1).with_duration(0.2)];
        let derived = KeyframeVideoStim::new(video, elements, vec![2]).unwrap();
        let timeline =
            extract_keyframes(&derived, &[&ClipShape], &DriveOptions::default()).unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(
            timeline.events()[0].features().get("n_frames"),
            Some(&json!(1))
        );
    }
}

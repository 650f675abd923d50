//! Time-aligned feature extraction over multimedia stimuli.
//!
//! stimline runs pluggable extractor transforms over timed stimuli (image
//! frames, text spans, whole clips) and folds the per-instant results into a
//! unified temporal annotation. This crate holds the driver layer: frame
//! providers, the dynamic extraction drivers, settings resolution, and table
//! export. The domain models live in `stimline-types` and the extraction
//! contracts in `stimline-extract`.

pub mod driver;
pub mod export;
pub mod progress;
pub mod provider;
pub mod settings;
pub mod synthetic;

pub use stimline_extract::{
    AnnotationHandling, BatchConfig, BatchExtractor, BatchFailure, BulkService, Converter,
    Extractor, ExtractorResult, FeatureRow, FeatureTable, Filter, ImageMapFilter, Scope,
    ServiceCredentials, StimIdentity, TransformOptions, Transformer, merge_results,
    resolve_features, resolve_texts, texts_to_stims, transform_convert, transform_extract,
    transform_filter,
};
pub use stimline_types::{
    Event, ExtractError, ExtractResult, FeatureSet, ImageStim, KeyframeVideoStim, Provenance,
    StimKind, Stimulus, TextStim, Timeline, VideoStim,
};

pub use driver::{DriveOptions, StreamOptions, extract_clip, extract_keyframes, run_stream};
pub use export::{ExportFormat, render_delimited, table_to_json, write_table};
pub use provider::{
    DynFrameProvider, FrameProvider, FrameStream, SourceMetadata, spawn_stream_from_channel,
};
pub use settings::{ConfigError, EffectiveSettings, ExportSettings, resolve_settings};
pub use synthetic::SyntheticProvider;

//! Shared domain models for the stimline workspace.
//!
//! This crate centralizes the lightweight data structures used across the
//! extraction, driver, and export crates: timed stimuli, events, timelines,
//! and the common error taxonomy. Keep it backend-agnostic and free of heavy
//! dependencies so every crate can depend on it.

mod error;
mod event;
mod feature;
mod provenance;
mod stim;
mod timeline;

pub use error::{ExtractError, ExtractResult};
pub use event::Event;
pub use feature::FeatureSet;
pub use provenance::Provenance;
pub use stim::{ImageStim, KeyframeVideoStim, StimKind, Stimulus, TextStim, TokenSpan, VideoStim};
pub use timeline::{ONSET_TOLERANCE, Timeline};

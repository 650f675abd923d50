use serde::Serialize;

use crate::error::{ExtractError, ExtractResult};
use crate::event::Event;

/// Onsets closer than this are treated as the same instant.
pub const ONSET_TOLERANCE: f64 = 1e-6;

/// An ordered sequence of events spanning one stimulus's duration.
///
/// Built incrementally while extractors run; events are always retrievable in
/// non-decreasing onset order. When a `period` is set, two events share a slot
/// when they fall into the same period bucket; otherwise slot identity is
/// onset equality within [`ONSET_TOLERANCE`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct Timeline {
    events: Vec<Event>,
    period: Option<f64>,
    duration: Option<f64>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_period(period: f64) -> Self {
        Self {
            events: Vec::new(),
            period: Some(period),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn period(&self) -> Option<f64> {
        self.period
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Add an event, keeping the sequence sorted by onset.
    ///
    /// With `merge = true`, an event landing on an existing slot is folded
    /// into it: names present in both take the incoming event's value, names
    /// unique to either side are preserved, and the slot keeps the duration of
    /// whichever event defined it first. An incoming event with no features
    /// leaves the slot unchanged and still counts as a successful merge.
    ///
    /// Without merging (and when no slot matches), the event is inserted at
    /// its sorted position; equal onsets are stable, later insertions landing
    /// after earlier ones.
    pub fn add_event(&mut self, event: Event, merge: bool) -> ExtractResult<()> {
        let onset = event.onset();
        if !onset.is_finite() || onset < 0.0 {
            return Err(ExtractError::validation(format!(
                "event onset must be >= 0, got {onset}"
            )));
        }
        if let Some(duration) = event.duration() {
            if !duration.is_finite() || duration < 0.0 {
                return Err(ExtractError::validation(format!(
                    "event duration must be >= 0, got {duration}"
                )));
            }
        }

        if merge {
            if let Some(slot) = self
                .events
                .iter_mut()
                .find(|existing| same_slot(existing.onset(), onset, self.period))
            {
                slot.merge_features(&event);
                return Ok(());
            }
        }

        let index = self
            .events
            .partition_point(|existing| existing.onset() <= onset + ONSET_TOLERANCE);
        self.events.insert(index, event);
        Ok(())
    }
}

fn same_slot(a: f64, b: f64, period: Option<f64>) -> bool {
    match period {
        Some(period) if period > 0.0 => bucket(a, period) == bucket(b, period),
        _ => (a - b).abs() <= ONSET_TOLERANCE,
    }
}

// Nudged so onsets computed as index * period never round down into the
// previous bucket.
fn bucket(onset: f64, period: f64) -> f64 {
    (onset / period + ONSET_TOLERANCE).floor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureSet;
    use serde_json::json;

    fn event(onset: f64, pairs: &[(&str, serde_json::Value)]) -> Event {
        let mut ev = Event::new(onset);
        for (name, value) in pairs {
            ev.add_value(*name, value.clone());
        }
        ev
    }

    #[test]
    fn merge_unions_names_with_newer_values_winning() {
        let mut timeline = Timeline::new();
        timeline
            .add_event(event(1.0, &[("a", json!(1)), ("b", json!(2))]), true)
            .unwrap();
        timeline
            .add_event(event(1.0, &[("b", json!(20)), ("c", json!(3))]), true)
            .unwrap();

        assert_eq!(timeline.len(), 1);
        let slot = &timeline.events()[0];
        assert_eq!(slot.features().get("a"), Some(&json!(1)));
        assert_eq!(slot.features().get("b"), Some(&json!(20)));
        assert_eq!(slot.features().get("c"), Some(&json!(3)));
    }

    #[test]
    fn merge_keeps_first_duration() {
        let mut timeline = Timeline::new();
        timeline
            .add_event(
                event(2.0, &[("a", json!(1))]).with_duration(0.5),
                true,
            )
            .unwrap();
        timeline
            .add_event(
                event(2.0, &[("b", json!(2))]).with_duration(9.0),
                true,
            )
            .unwrap();
        assert_eq!(timeline.events()[0].duration(), Some(0.5));
    }

    #[test]
    fn merging_a_timeline_with_itself_is_idempotent() {
        let mut timeline = Timeline::new();
        for i in 0..4 {
            timeline
                .add_event(event(i as f64 * 0.25, &[("v", json!(i))]), true)
                .unwrap();
        }
        let before = timeline.clone();
        for ev in before.events() {
            timeline.add_event(ev.clone(), true).unwrap();
        }
        assert_eq!(timeline.len(), before.len());
        for (merged, original) in timeline.events().iter().zip(before.events()) {
            assert_eq!(merged.features(), original.features());
        }
    }

    #[test]
    fn empty_event_merge_leaves_slot_unchanged() {
        let mut timeline = Timeline::new();
        timeline
            .add_event(event(0.5, &[("a", json!(1))]), true)
            .unwrap();
        timeline
            .add_event(Event::new(0.5).with_features(FeatureSet::new()), true)
            .unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.events()[0].features().len(), 1);
    }

    #[test]
    fn tolerance_matches_near_equal_onsets() {
        let mut timeline = Timeline::new();
        timeline
            .add_event(event(1.0, &[("a", json!(1))]), true)
            .unwrap();
        timeline
            .add_event(event(1.0 + 1e-9, &[("b", json!(2))]), true)
            .unwrap();
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn period_buckets_define_slots() {
        let mut timeline = Timeline::with_period(1.0 / 30.0);
        timeline
            .add_event(event(0.001, &[("a", json!(1))]), true)
            .unwrap();
        // Lands inside the same 1/30 s bucket.
        timeline
            .add_event(event(0.02, &[("b", json!(2))]), true)
            .unwrap();
        // Next bucket.
        timeline
            .add_event(event(0.04, &[("c", json!(3))]), true)
            .unwrap();
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn non_merge_insert_is_sorted_and_stable_on_ties() {
        let mut timeline = Timeline::new();
        timeline
            .add_event(event(1.0, &[("first", json!(1))]), false)
            .unwrap();
        timeline
            .add_event(event(0.5, &[("earlier", json!(0))]), false)
            .unwrap();
        timeline
            .add_event(event(1.0, &[("second", json!(2))]), false)
            .unwrap();

        let names: Vec<&str> = timeline
            .events()
            .iter()
            .map(|ev| ev.features().names().next().unwrap())
            .collect();
        assert_eq!(names, vec!["earlier", "first", "second"]);
    }

    #[test]
    fn negative_onset_is_rejected() {
        let mut timeline = Timeline::new();
        let err = timeline.add_event(Event::new(-0.1), false).unwrap_err();
        assert!(matches!(err, ExtractError::Validation { .. }));
        assert!(timeline.is_empty());
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut timeline = Timeline::new();
        let err = timeline
            .add_event(Event::new(0.0).with_duration(-1.0), false)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Validation { .. }));
    }
}

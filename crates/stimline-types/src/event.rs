use serde::Serialize;
use serde_json::Value;

use crate::feature::FeatureSet;

/// A named set of feature values anchored at a moment or interval of a
/// timeline.
///
/// Validation of the timing fields happens when the event is added to a
/// [`Timeline`](crate::Timeline), so partially built events stay cheap to
/// construct.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    onset: f64,
    duration: Option<f64>,
    features: FeatureSet,
}

impl Event {
    pub fn new(onset: f64) -> Self {
        Self {
            onset,
            duration: None,
            features: FeatureSet::new(),
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn onset(&self) -> f64 {
        self.onset
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn add_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.features.insert(name, value);
    }

    /// Fold another event's features into this one, newer values winning on
    /// name conflicts. The receiver's onset and duration are kept: the slot's
    /// timing is fixed by whichever event defined it first.
    pub fn merge_features(&mut self, newer: &Event) {
        self.features.merge_from(newer.features());
    }
}

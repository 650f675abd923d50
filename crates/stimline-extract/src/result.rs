use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use stimline_types::{FeatureSet, Provenance, Stimulus};

/// Identity of a source stimulus inside one extraction run: its timing plus a
/// stable position in the input order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StimIdentity {
    pub onset: Option<f64>,
    pub duration: Option<f64>,
    pub index: usize,
}

impl StimIdentity {
    pub fn of(stim: &Stimulus, index: usize) -> Self {
        Self {
            onset: stim.onset(),
            duration: stim.duration(),
            index,
        }
    }
}

/// One transformer's feature output for one stimulus.
///
/// The producing transformer is referenced by name only; results do not keep
/// the transformer alive.
#[derive(Debug, Clone)]
pub struct ExtractorResult {
    features: FeatureSet,
    stim: StimIdentity,
    extractor: String,
    provenance: Option<Arc<Provenance>>,
}

impl ExtractorResult {
    pub fn new(features: FeatureSet, stim: StimIdentity, extractor: impl Into<String>) -> Self {
        Self {
            features,
            stim,
            extractor: extractor.into(),
            provenance: None,
        }
    }

    /// Result for an item whose extraction failed: every feature absent.
    pub fn placeholder(stim: StimIdentity, extractor: impl Into<String>) -> Self {
        Self::new(FeatureSet::new(), stim, extractor)
    }

    pub fn with_provenance(mut self, provenance: Arc<Provenance>) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn into_features(self) -> FeatureSet {
        self.features
    }

    pub fn stim(&self) -> &StimIdentity {
        &self.stim
    }

    pub fn extractor(&self) -> &str {
        &self.extractor
    }

    pub fn provenance(&self) -> Option<&Arc<Provenance>> {
        self.provenance.as_ref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.features.is_empty()
    }
}

/// One row of a merged feature table: a stimulus identity plus one cell per
/// column. `None` marks a feature the stimulus's own results never measured,
/// as opposed to a measured empty value.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    stim: StimIdentity,
    cells: Vec<Option<Value>>,
}

impl FeatureRow {
    pub fn stim(&self) -> &StimIdentity {
        &self.stim
    }

    pub fn cells(&self) -> &[Option<Value>] {
        &self.cells
    }

    pub fn cell(&self, column: usize) -> Option<&Value> {
        self.cells.get(column).and_then(|cell| cell.as_ref())
    }
}

/// Tabular view over many per-stimulus results: one row per source stimulus,
/// one column per feature name.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Merge many results into one table.
///
/// Columns are the union of all feature names in first-seen order. Rows are
/// keyed by stimulus identity, ordered by onset with input order breaking
/// ties; several results for the same stimulus fold together, newer values
/// winning on name conflicts. Cells a stimulus never measured stay `None`.
/// Everything is vector-backed, so the same inputs always produce the same
/// structure.
pub fn merge_results(results: &[ExtractorResult]) -> FeatureTable {
    let mut columns: Vec<String> = Vec::new();
    for result in results {
        for name in result.features().names() {
            if !columns.iter().any(|existing| existing == name) {
                columns.push(name.to_string());
            }
        }
    }

    let mut grouped: Vec<(StimIdentity, FeatureSet)> = Vec::new();
    for result in results {
        match grouped
            .iter_mut()
            .find(|(identity, _)| *identity == *result.stim())
        {
            Some((_, features)) => features.merge_from(result.features()),
            None => grouped.push((*result.stim(), result.features().clone())),
        }
    }

    grouped.sort_by(|(a, _), (b, _)| {
        let a_onset = a.onset.unwrap_or(f64::NEG_INFINITY);
        let b_onset = b.onset.unwrap_or(f64::NEG_INFINITY);
        a_onset.partial_cmp(&b_onset).unwrap_or(Ordering::Equal)
    });

    let rows = grouped
        .into_iter()
        .map(|(stim, features)| FeatureRow {
            stim,
            cells: columns
                .iter()
                .map(|column| features.get(column).cloned())
                .collect(),
        })
        .collect();

    FeatureTable { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(
        index: usize,
        onset: f64,
        extractor: &str,
        pairs: &[(&str, Value)],
    ) -> ExtractorResult {
        let features: FeatureSet = pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect();
        ExtractorResult::new(
            features,
            StimIdentity {
                onset: Some(onset),
                duration: None,
                index,
            },
            extractor,
        )
    }

    #[test]
    fn rows_and_columns_follow_union_semantics() {
        let results = vec![
            result(0, 0.0, "a", &[("x", json!(1)), ("y", json!(2))]),
            result(1, 1.0, "a", &[("y", json!(3)), ("z", json!(4))]),
            result(2, 2.0, "b", &[]),
        ];
        let table = merge_results(&results);

        assert_eq!(table.columns(), &["x", "y", "z"]);
        assert_eq!(table.rows().len(), 3);

        // Row 0 never measured z, row 1 never measured x, row 2 measured
        // nothing at all.
        assert_eq!(table.rows()[0].cell(0), Some(&json!(1)));
        assert_eq!(table.rows()[0].cell(2), None);
        assert_eq!(table.rows()[1].cell(0), None);
        assert_eq!(table.rows()[1].cell(1), Some(&json!(3)));
        assert!(table.rows()[2].cells().iter().all(|cell| cell.is_none()));
    }

    #[test]
    fn rows_are_ordered_by_onset_with_input_order_breaking_ties() {
        let results = vec![
            result(0, 2.0, "a", &[("x", json!("late"))]),
            result(1, 0.0, "a", &[("x", json!("early"))]),
            result(2, 2.0, "a", &[("x", json!("late-second"))]),
        ];
        let table = merge_results(&results);
        let order: Vec<usize> = table.rows().iter().map(|row| row.stim().index).collect();
        assert_eq!(order, vec![1, 0, 2]);
    }

    #[test]
    fn results_for_the_same_stimulus_fold_into_one_row() {
        let results = vec![
            result(0, 0.5, "colors", &[("hue", json!(10))]),
            result(0, 0.5, "edges", &[("density", json!(0.2))]),
        ];
        let table = merge_results(&results);
        assert_eq!(table.rows().len(), 1);
        assert_eq!(table.columns(), &["hue", "density"]);
        assert_eq!(table.rows()[0].cell(0), Some(&json!(10)));
        assert_eq!(table.rows()[0].cell(1), Some(&json!(0.2)));
    }

    #[test]
    fn merging_twice_yields_identical_structure() {
        let results = vec![
            result(0, 0.0, "a", &[("m", json!(1))]),
            result(1, 1.0, "b", &[("n", json!(2))]),
        ];
        let first = merge_results(&results);
        let second = merge_results(&results);
        assert_eq!(first.columns(), second.columns());
        assert_eq!(first.rows().len(), second.rows().len());
        for (a, b) in first.rows().iter().zip(second.rows()) {
            assert_eq!(a.stim(), b.stim());
            assert_eq!(a.cells(), b.cells());
        }
    }
}

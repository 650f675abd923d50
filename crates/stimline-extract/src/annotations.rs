use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use stimline_types::{ExtractError, FeatureSet, Stimulus, TextStim};

/// How to resolve multiple sub-annotations returned for one stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationHandling {
    /// Keep only the first annotation.
    First,
    /// Fold all annotations into one set, later values winning.
    Concatenate,
    /// Collect each feature's values across annotations into an array.
    List,
    /// Keep every annotation, prefixing names with a numbered label when more
    /// than one annotation is present.
    Prefix,
}

impl Default for AnnotationHandling {
    fn default() -> Self {
        AnnotationHandling::Prefix
    }
}

impl AnnotationHandling {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationHandling::First => "first",
            AnnotationHandling::Concatenate => "concatenate",
            AnnotationHandling::List => "list",
            AnnotationHandling::Prefix => "prefix",
        }
    }
}

impl fmt::Display for AnnotationHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationHandling {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(AnnotationHandling::First),
            "concatenate" => Ok(AnnotationHandling::Concatenate),
            "list" => Ok(AnnotationHandling::List),
            "prefix" => Ok(AnnotationHandling::Prefix),
            other => Err(ExtractError::validation(format!(
                "unknown annotation handling '{other}'"
            ))),
        }
    }
}

/// Collapse the feature sets of a stimulus's sub-annotations into one set.
///
/// Pure function of its inputs: the prefix numbering depends only on the
/// annotation list passed in, and `Prefix` leaves names untouched when a
/// single annotation is present.
pub fn resolve_features(
    mode: AnnotationHandling,
    label: &str,
    annotations: &[FeatureSet],
) -> FeatureSet {
    match annotations {
        [] => FeatureSet::new(),
        [single] => single.clone(),
        _ => match mode {
            AnnotationHandling::First => annotations[0].clone(),
            AnnotationHandling::Concatenate => {
                let mut merged = FeatureSet::new();
                for set in annotations {
                    merged.merge_from(set);
                }
                merged
            }
            AnnotationHandling::List => {
                let mut merged = FeatureSet::new();
                for set in annotations {
                    for name in set.names() {
                        if !merged.contains(name) {
                            let values: Vec<Value> = annotations
                                .iter()
                                .filter_map(|s| s.get(name).cloned())
                                .collect();
                            merged.insert(name, Value::Array(values));
                        }
                    }
                }
                merged
            }
            AnnotationHandling::Prefix => {
                let mut merged = FeatureSet::new();
                for (idx, set) in annotations.iter().enumerate() {
                    for (name, value) in set.iter() {
                        merged.insert(format!("{label}{}_{name}", idx + 1), value.clone());
                    }
                }
                merged
            }
        },
    }
}

/// Collapse the text annotations of one stimulus into output strings.
/// `Prefix` has no meaning for plain text and behaves as `List`.
pub fn resolve_texts(mode: AnnotationHandling, texts: &[String]) -> Vec<String> {
    match mode {
        AnnotationHandling::First => texts.first().cloned().into_iter().collect(),
        AnnotationHandling::Concatenate => {
            if texts.is_empty() {
                Vec::new()
            } else {
                vec![texts.join(" ")]
            }
        }
        AnnotationHandling::List | AnnotationHandling::Prefix => texts.to_vec(),
    }
}

/// Turn resolved text annotations into text stimuli carrying the source's
/// timing. A source with no annotations yields one empty text stimulus so
/// downstream alignment is preserved.
pub fn texts_to_stims(
    mode: AnnotationHandling,
    texts: &[String],
    source: &Stimulus,
) -> Vec<TextStim> {
    let resolved = resolve_texts(mode, texts);
    let outputs = if resolved.is_empty() {
        vec![String::new()]
    } else {
        resolved
    };
    outputs
        .into_iter()
        .map(|text| {
            let mut stim = TextStim::new(text);
            if let Some(onset) = source.onset() {
                stim = stim.with_onset(onset);
            }
            if let Some(duration) = source.duration() {
                stim = stim.with_duration(duration);
            }
            stim
        })
        .collect()
}

use std::sync::Arc;

use stimline_types::{
    Event, ExtractError, ExtractResult, FeatureSet, Provenance, StimKind, Stimulus,
};

use crate::result::{ExtractorResult, StimIdentity};

/// How a transformer wants to see a dynamic stimulus: once as a whole, or
/// once per frame/element. Declared at construction, never inferred from the
/// stimulus at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Whole,
    PerFrame,
}

/// Common surface for every unit of work that turns stimuli into features or
/// other stimuli.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stimulus kinds this transformer is willing to receive.
    fn accepted_kinds(&self) -> &[StimKind];

    fn scope(&self) -> Scope {
        Scope::PerFrame
    }

    /// Parameter summary recorded in provenance chains.
    fn params(&self) -> String {
        String::new()
    }

    fn accepts(&self, stim: &Stimulus) -> bool {
        self.accepted_kinds().contains(&stim.kind())
    }
}

/// Produces feature values from a stimulus.
pub trait Extractor: Transformer {
    fn extract(&self, stim: &Stimulus) -> ExtractResult<FeatureSet>;

    /// Whole-stimulus extraction producing timed events.
    ///
    /// The default anchors a single event at the stimulus onset (or zero).
    /// Whole-scope extractors that annotate several instants of a clip
    /// override this.
    fn extract_events(&self, stim: &Stimulus) -> ExtractResult<Vec<Event>> {
        let features = self.extract(stim)?;
        let mut event = Event::new(stim.onset().unwrap_or(0.0)).with_features(features);
        if let Some(duration) = stim.duration() {
            event = event.with_duration(duration);
        }
        Ok(vec![event])
    }
}

/// Produces a new stimulus of the same modality.
pub trait Filter: Transformer {
    fn filter(&self, stim: &Stimulus) -> ExtractResult<Stimulus>;
}

/// Produces stimuli of a different modality; one input may yield several
/// outputs.
pub trait Converter: Transformer {
    fn convert(&self, stim: &Stimulus) -> ExtractResult<Vec<Stimulus>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransformOptions {
    /// Turn a stimulus-kind mismatch into a hard error instead of logging and
    /// skipping that item.
    pub propagate_mismatch: bool,
}

/// Run an extractor over a batch of stimuli.
///
/// Mismatched stimulus kinds are logged and skipped (or propagated per
/// `options`). A per-item extraction failure yields a placeholder result with
/// every feature absent; a service-configuration failure aborts the whole
/// call with no partial results.
pub fn transform_extract(
    extractor: &dyn Extractor,
    stims: &[Stimulus],
    options: TransformOptions,
) -> ExtractResult<Vec<ExtractorResult>> {
    let mut results = Vec::with_capacity(stims.len());
    for (index, stim) in stims.iter().enumerate() {
        let Some(stim) = check_accepts(extractor, stim, index, options)? else {
            continue;
        };
        let identity = StimIdentity::of(stim, index);
        let provenance = Arc::new(provenance_for(extractor, stim));
        match extractor.extract(stim) {
            Ok(features) => {
                results.push(
                    ExtractorResult::new(features, identity, extractor.name())
                        .with_provenance(provenance),
                );
            }
            Err(err @ ExtractError::AuthConfig { .. }) => return Err(err),
            Err(err) => {
                log::warn!(
                    "{} failed on item {index}: {err}; emitting placeholder",
                    extractor.name()
                );
                results.push(
                    ExtractorResult::placeholder(identity, extractor.name())
                        .with_provenance(provenance),
                );
            }
        }
    }
    Ok(results)
}

/// Run a filter over a batch of stimuli, producing same-modality outputs.
/// Items that fail are logged and dropped; configuration failures abort.
pub fn transform_filter(
    filter: &dyn Filter,
    stims: &[Stimulus],
    options: TransformOptions,
) -> ExtractResult<Vec<Stimulus>> {
    let mut outputs = Vec::with_capacity(stims.len());
    for (index, stim) in stims.iter().enumerate() {
        let Some(stim) = check_accepts(filter, stim, index, options)? else {
            continue;
        };
        match filter.filter(stim) {
            Ok(output) => outputs.push(output),
            Err(err @ ExtractError::AuthConfig { .. }) => return Err(err),
            Err(err) => {
                log::warn!("{} failed on item {index}: {err}; skipping", filter.name());
            }
        }
    }
    Ok(outputs)
}

/// Run a converter over a batch of stimuli, flattening each item's outputs in
/// order. Items that fail are logged and dropped; configuration failures
/// abort.
pub fn transform_convert(
    converter: &dyn Converter,
    stims: &[Stimulus],
    options: TransformOptions,
) -> ExtractResult<Vec<Stimulus>> {
    let mut outputs = Vec::new();
    for (index, stim) in stims.iter().enumerate() {
        let Some(stim) = check_accepts(converter, stim, index, options)? else {
            continue;
        };
        match converter.convert(stim) {
            Ok(converted) => outputs.extend(converted),
            Err(err @ ExtractError::AuthConfig { .. }) => return Err(err),
            Err(err) => {
                log::warn!(
                    "{} failed on item {index}: {err}; skipping",
                    converter.name()
                );
            }
        }
    }
    Ok(outputs)
}

/// Same-modality image filter applying a pixel-payload transform. The output
/// keeps the source's dimensions and timing and extends its history chain.
pub struct ImageMapFilter {
    name: &'static str,
    map: fn(&[u8]) -> Vec<u8>,
}

impl ImageMapFilter {
    pub fn new(name: &'static str, map: fn(&[u8]) -> Vec<u8>) -> Self {
        Self { name, map }
    }
}

impl Transformer for ImageMapFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn accepted_kinds(&self) -> &[StimKind] {
        &[StimKind::Image]
    }
}

impl Filter for ImageMapFilter {
    fn filter(&self, stim: &Stimulus) -> ExtractResult<Stimulus> {
        let Stimulus::Image(image) = stim else {
            return Err(ExtractError::type_mismatch(
                self.name,
                kinds_label(self.accepted_kinds()),
                stim.kind().as_str(),
            ));
        };
        let derived = image
            .derived((self.map)(image.data()))?
            .with_history(Arc::new(provenance_for(self, stim)));
        Ok(Stimulus::Image(derived))
    }
}

fn check_accepts<'a, T: Transformer + ?Sized>(
    transformer: &T,
    stim: &'a Stimulus,
    index: usize,
    options: TransformOptions,
) -> ExtractResult<Option<&'a Stimulus>> {
    if transformer.accepts(stim) {
        return Ok(Some(stim));
    }
    let err = ExtractError::type_mismatch(
        transformer.name(),
        kinds_label(transformer.accepted_kinds()),
        stim.kind().as_str(),
    );
    if options.propagate_mismatch {
        return Err(err);
    }
    log::warn!("{err}; skipping item {index}");
    Ok(None)
}

pub(crate) fn kinds_label(kinds: &[StimKind]) -> String {
    kinds
        .iter()
        .map(StimKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn provenance_for<T: Transformer + ?Sized>(
    transformer: &T,
    stim: &Stimulus,
) -> Provenance {
    match stim.history() {
        Some(parent) => {
            Provenance::derived(transformer.name(), transformer.params(), Arc::clone(parent))
        }
        None => Provenance::new(transformer.name(), transformer.params()),
    }
}

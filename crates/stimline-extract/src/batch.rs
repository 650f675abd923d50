use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use stimline_types::{
    ExtractError, ExtractResult, FeatureSet, Provenance, StimKind, Stimulus,
};

use crate::annotations::{AnnotationHandling, resolve_features};
use crate::result::{ExtractorResult, StimIdentity};
use crate::transformer::{Extractor, Transformer, kinds_label};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_NUM_RETRIES: u32 = 3;

/// Opaque credential material for a bulk service, threaded in at
/// construction. Never read from the environment at call time.
#[derive(Clone)]
pub struct ServiceCredentials {
    token: String,
}

impl ServiceCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_empty(&self) -> bool {
        self.token.trim().is_empty()
    }
}

impl fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Adapter for an external bulk-capable service. Implementations stay free of
/// chunking, retry, and alignment concerns; the batch transformer owns those.
pub trait BulkService: Send + Sync {
    fn name(&self) -> &'static str;

    /// One request payload covering every stimulus in the chunk, in order.
    fn build_request(
        &self,
        stims: &[&Stimulus],
        credentials: &ServiceCredentials,
    ) -> ExtractResult<Value>;

    /// Perform exactly one external call. Responses must come back in request
    /// order.
    fn call(&self, request: &Value) -> ExtractResult<Vec<Value>>;

    /// The upstream error message embedded in a per-item response, if any.
    fn is_error(&self, response: &Value) -> Option<String>;

    /// The sub-annotations of one successful per-item response.
    fn response_to_features(&self, response: &Value) -> ExtractResult<Vec<FeatureSet>>;
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub num_retries: u32,
    pub handling: AnnotationHandling,
    /// Label used by `AnnotationHandling::Prefix` when numbering names.
    pub annotation_label: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            num_retries: DEFAULT_NUM_RETRIES,
            handling: AnnotationHandling::default(),
            annotation_label: "item".to_string(),
        }
    }
}

/// A chunk-level failure carrying the results of the chunks that completed
/// before it.
#[derive(Debug)]
pub struct BatchFailure {
    pub error: ExtractError,
    pub completed: Vec<ExtractorResult>,
}

/// Serves many stimuli per external call.
///
/// Splits input into chunks of at most `batch_size`, performs one call per
/// chunk with up to `num_retries` retries on transient failures, and
/// demultiplexes responses back onto items by position. Per-item upstream
/// errors become placeholder results; a response count that disagrees with
/// the request is a protocol violation and stops the run.
pub struct BatchExtractor<S: BulkService> {
    service: S,
    credentials: ServiceCredentials,
    accepted: Vec<StimKind>,
    config: BatchConfig,
}

impl<S: BulkService> BatchExtractor<S> {
    pub fn new(
        service: S,
        credentials: ServiceCredentials,
        accepted: Vec<StimKind>,
        config: BatchConfig,
    ) -> ExtractResult<Self> {
        if credentials.is_empty() {
            return Err(ExtractError::auth_config(format!(
                "no credentials provided for service '{}'",
                service.name()
            )));
        }
        if config.batch_size == 0 {
            return Err(ExtractError::validation("batch_size must be at least 1"));
        }
        Ok(Self {
            service,
            credentials,
            accepted,
            config,
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run the whole input through the service.
    ///
    /// The output is aligned 1:1 with the accepted input order regardless of
    /// chunking; mismatched stimulus kinds are logged and skipped up front.
    /// On a chunk-level failure the results of prior chunks are preserved in
    /// the returned [`BatchFailure`].
    pub fn transform(&self, stims: &[Stimulus]) -> Result<Vec<ExtractorResult>, BatchFailure> {
        let mut accepted: Vec<(usize, &Stimulus)> = Vec::with_capacity(stims.len());
        for (index, stim) in stims.iter().enumerate() {
            if Transformer::accepts(self, stim) {
                accepted.push((index, stim));
            } else {
                let err = ExtractError::type_mismatch(
                    self.name(),
                    kinds_label(self.accepted_kinds()),
                    stim.kind().as_str(),
                );
                log::warn!("{err}; skipping item {index}");
            }
        }

        let provenance = Arc::new(Provenance::new(self.name(), self.params()));
        let mut results: Vec<ExtractorResult> = Vec::with_capacity(accepted.len());

        for chunk in accepted.chunks(self.config.batch_size) {
            let chunk_stims: Vec<&Stimulus> = chunk.iter().map(|(_, stim)| *stim).collect();

            let request = match self.service.build_request(&chunk_stims, &self.credentials) {
                Ok(request) => request,
                Err(error) => {
                    return Err(BatchFailure {
                        error,
                        completed: results,
                    });
                }
            };

            let responses = match self.call_with_retries(&request) {
                Ok(responses) => responses,
                Err(error) => {
                    return Err(BatchFailure {
                        error,
                        completed: results,
                    });
                }
            };

            if responses.len() != chunk.len() {
                let error = ExtractError::protocol(format!(
                    "{} returned {} responses for {} requests",
                    self.name(),
                    responses.len(),
                    chunk.len()
                ));
                return Err(BatchFailure {
                    error,
                    completed: results,
                });
            }

            for ((index, stim), response) in chunk.iter().zip(&responses) {
                let identity = StimIdentity::of(stim, *index);
                if let Some(message) = self.service.is_error(response) {
                    let err = ExtractError::upstream_item(*index, message);
                    log::warn!("{}: {err}; emitting placeholder", self.name());
                    results.push(
                        ExtractorResult::placeholder(identity, self.name())
                            .with_provenance(Arc::clone(&provenance)),
                    );
                    continue;
                }
                match self.service.response_to_features(response) {
                    Ok(annotations) => {
                        let features = resolve_features(
                            self.config.handling,
                            &self.config.annotation_label,
                            &annotations,
                        );
                        results.push(
                            ExtractorResult::new(features, identity, self.name())
                                .with_provenance(Arc::clone(&provenance)),
                        );
                    }
                    Err(err) => {
                        log::warn!(
                            "{} failed to parse response for item {index}: {err}; emitting placeholder",
                            self.name()
                        );
                        results.push(
                            ExtractorResult::placeholder(identity, self.name())
                                .with_provenance(Arc::clone(&provenance)),
                        );
                    }
                }
            }
        }

        Ok(results)
    }

    /// One external call, retried with an unchanged payload on transient
    /// failures.
    fn call_with_retries(&self, request: &Value) -> ExtractResult<Vec<Value>> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.service.call(request) {
                Ok(responses) => return Ok(responses),
                Err(err) if err.is_transient() && attempts <= self.config.num_retries => {
                    log::debug!(
                        "{} call failed ({err}); retry {attempts}/{}",
                        self.name(),
                        self.config.num_retries
                    );
                }
                Err(ExtractError::Transient { message, .. }) => {
                    return Err(ExtractError::transient(message, attempts));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<S: BulkService> Transformer for BatchExtractor<S> {
    fn name(&self) -> &'static str {
        self.service.name()
    }

    fn accepted_kinds(&self) -> &[StimKind] {
        &self.accepted
    }

    fn params(&self) -> String {
        format!(
            "batch_size={}, num_retries={}, handling={}",
            self.config.batch_size, self.config.num_retries, self.config.handling
        )
    }
}

impl<S: BulkService> Extractor for BatchExtractor<S> {
    fn extract(&self, stim: &Stimulus) -> ExtractResult<FeatureSet> {
        let results = self
            .transform(std::slice::from_ref(stim))
            .map_err(|failure| failure.error)?;
        match results.into_iter().next() {
            Some(result) => Ok(result.into_features()),
            None => Err(ExtractError::type_mismatch(
                self.name(),
                kinds_label(self.accepted_kinds()),
                stim.kind().as_str(),
            )),
        }
    }
}

//! Extraction contracts for the stimline workspace: the transformer traits,
//! the batch transformer with its bulk-service seam, and the tabular merge of
//! per-stimulus results.

mod annotations;
mod batch;
mod result;
mod transformer;

pub use annotations::{AnnotationHandling, resolve_features, resolve_texts, texts_to_stims};
pub use batch::{
    BatchConfig, BatchExtractor, BatchFailure, BulkService, DEFAULT_BATCH_SIZE,
    DEFAULT_NUM_RETRIES, ServiceCredentials,
};
pub use result::{ExtractorResult, FeatureRow, FeatureTable, StimIdentity, merge_results};
pub use transformer::{
    Converter, Extractor, Filter, ImageMapFilter, Scope, TransformOptions, Transformer,
    transform_convert, transform_extract, transform_filter,
};

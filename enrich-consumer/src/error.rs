use enrich_common::store::StoreError;
use rdkafka::error::KafkaError;
use reqwest::StatusCode;
use thiserror::Error;

use crate::lookup::LookupKind;
use crate::validator::Alphabet;

/// Reasons a record is kept off the enrichment path. The message becomes the
/// `err` field of the dead-lettered record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required fields")]
    MissingField,
    #[error("name and surname must start with a capital letter and contain only {0} letters")]
    InvalidScript(Alphabet),
}

/// Enumeration of errors for a single enrichment lookup. All of them leave the
/// attribute empty, none of them fail the record.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("{kind} lookup request failed: {error}")]
    Request {
        kind: LookupKind,
        error: reqwest::Error,
    },
    #[error("{kind} lookup returned {status}")]
    Status { kind: LookupKind, status: StatusCode },
    #[error("{kind} lookup response could not be decoded: {error}")]
    Decode {
        kind: LookupKind,
        error: serde_json::Error,
    },
    #[error("{kind} lookup response carries no {kind}")]
    Missing { kind: LookupKind },
}

impl LookupError {
    pub fn kind(&self) -> LookupKind {
        match self {
            LookupError::Request { kind, .. }
            | LookupError::Status { kind, .. }
            | LookupError::Decode { kind, .. }
            | LookupError::Missing { kind } => *kind,
        }
    }
}

/// Enumeration of errors when publishing to the dead-letter topic.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to serialize failed record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to create dead-letter producer: {0}")]
    Connect(KafkaError),
    #[error("failed to produce to dead-letter topic: {0}")]
    Produce(KafkaError),
    #[error("dead-letter delivery was canceled before it was acknowledged")]
    Canceled,
}

/// Enumeration of errors that end a pipeline cycle without acknowledging.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to fetch message: {0}")]
    Fetch(KafkaError),
    #[error("failed to store record: {0}")]
    Store(#[from] StoreError),
    #[error("failed to acknowledge message: {0}")]
    Acknowledge(KafkaError),
    #[error("failed to rewind to unstored message at offset {offset}: {error}")]
    Release { offset: i64, error: KafkaError },
}

impl PipelineError {
    /// Short label for metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Store(_) => "store",
            PipelineError::Acknowledge(_) => "acknowledge",
            PipelineError::Release { .. } => "release",
        }
    }

    /// The source can no longer redeliver an unstored message. Committing anything
    /// after it would mark it consumed, so the pipeline has to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Release { .. })
    }
}

/// Enumeration of errors building the enrichment client at startup.
#[derive(Error, Debug)]
pub enum ClientBuildError {
    #[error("invalid {kind} service url: {error}")]
    InvalidUrl {
        kind: LookupKind,
        error: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

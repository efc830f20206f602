use thiserror::Error;

/// Errors raised while constructing a stage.
///
/// These are the only failures surfaced to the caller; everything that goes
/// wrong while handling a request degrades to default header values instead.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Provider {0} requires an endpoint")]
    MissingEndpoint(String),

    #[error("Invalid provider endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Invalid header name for flag {0}: {1}")]
    InvalidHeaderName(String, String),

    #[error("Flag {0} maps to header {1}, which another flag already uses")]
    DuplicateHeaderName(String, String),

    #[error("Invalid authorization value")]
    InvalidAuthorization,

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Provider {provider} is unreachable: {source}")]
    ProviderUnreachable {
        provider: &'static str,
        source: EvaluationError,
    },
}

/// Errors returned by a flag evaluator for a single flag.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Flag not found: {0}")]
    FlagNotFound(String),

    #[error("Flag {key} is not of type {expected}: {value}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        value: String,
    },

    #[error("Provider returned status {status} for flag {key}")]
    Provider { key: String, status: u16 },

    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Errors raised by the forwarding service and the listener.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

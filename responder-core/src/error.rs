use thiserror::Error;

/// Normalized failure of a single provider attempt.
///
/// Adapters never let these escape the engine: the fallback chain consumes
/// them and moves on to the next provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Timeout, connection failure, non-2xx status or provider-side overload.
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// Credential rejected by the provider.
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),

    /// Provider answered but had no result for the request.
    #[error("provider returned no result: {0}")]
    NotFound(String),

    /// Payload did not have the expected shape.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Short machine-friendly label, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Unreachable(_) => "unreachable",
            ProviderError::Unauthorized(_) => "unauthorized",
            ProviderError::NotFound(_) => "not_found",
            ProviderError::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::MalformedResponse(err.to_string())
    }
}

impl From<PolylineError> for ProviderError {
    fn from(err: PolylineError) -> Self {
        ProviderError::MalformedResponse(format!("route geometry: {err}"))
    }
}

/// Encoded polyline could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolylineError {
    #[error("polyline ends in the middle of a value at byte {0}")]
    Truncated(usize),

    #[error("byte {byte:#04x} at offset {offset} is outside the polyline alphabet")]
    InvalidByte { offset: usize, byte: u8 },

    #[error("value starting before byte {0} does not fit in 64 bits")]
    Overflow(usize),
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Rejected before any upstream request was made.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("upstream unreachable: {reason}")]
    UpstreamUnreachable { reason: String, timed_out: bool },

    #[error("API error: {status} {status_text}")]
    UpstreamError { status: u16, status_text: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    EmptyResult(String),

    /// The upstream answered with success but the body did not decode.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// HTTP status a transport should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::InvalidArgument(_) => 400,
            GatewayError::NotFound(_) | GatewayError::EmptyResult(_) => 404,
            GatewayError::UpstreamError { status, .. } if (100..=599).contains(status) => *status,
            GatewayError::UpstreamError { .. } => 502,
            GatewayError::UpstreamUnreachable {
                timed_out: true, ..
            } => 504,
            GatewayError::UpstreamUnreachable { .. } | GatewayError::Malformed(_) => 502,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return GatewayError::UpstreamError {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            };
        }
        if err.is_decode() {
            return GatewayError::Malformed(err.to_string());
        }
        GatewayError::UpstreamUnreachable {
            reason: err.to_string(),
            timed_out: err.is_timeout(),
        }
    }
}

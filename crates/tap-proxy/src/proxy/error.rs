//! Failures while forwarding one request.

use super::response_ext::ProxyBody;
use super::response_ext::{text_response, ResponseExt};
use hyper::{Method, Response, StatusCode};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("read request body err: {0}")]
    ReadRequestBody(#[source] BoxError),
    #[error("{0} is not supported yet")]
    UnsupportedMethod(Method),
    #[error("invalid target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("get response err: {0}")]
    UpstreamDispatch(#[source] hyper_util::client::legacy::Error),
    #[error("read body err: {0}")]
    ReadResponseBody(#[source] hyper::Error),
    #[error("read body err: {0}")]
    Decode(#[source] std::io::Error),
    #[error("response transfer failed: {0}")]
    Transfer(#[source] BoxError),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::ReadRequestBody(_) | ForwardError::InvalidTarget { .. } => {
                StatusCode::BAD_REQUEST
            }
            ForwardError::UnsupportedMethod(_) => StatusCode::NOT_IMPLEMENTED,
            ForwardError::UpstreamDispatch(_)
            | ForwardError::ReadResponseBody(_)
            | ForwardError::Decode(_)
            | ForwardError::Transfer(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Plain-text error response for the client.
    pub fn to_response(&self) -> Response<ProxyBody> {
        text_response(self.status(), self.to_string()).into_boxed()
    }
}

//! Model backend integration

pub mod gemini;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::core::reducer::PartialResult;
use crate::core::request::ModelRequest;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// The lazy partial-result sequence of one exchange.
pub type PartialResultStream = BoxStream<'static, PartialResult>;

/// Seam between the engine and the hosted model. Errors returned here are
/// transport-level (the call never started streaming); failures after the
/// stream opens surface as [`PartialResult::Error`] elements instead.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate_stream(
        &self,
        request: ModelRequest,
    ) -> Result<PartialResultStream, ProviderError>;
}

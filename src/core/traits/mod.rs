//! Provider abstraction seam
//!
//! One implementation per backend; the gateway treats all implementations
//! uniformly and never inspects vendor wire formats itself.

use crate::core::types::{CompletionRequest, CompletionResponse};
use crate::utils::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Raw chunk data emitted by a streaming provider adapter
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Unified interface every backend adapter implements
///
/// The invocation is the only operation in the gateway expected to block for
/// meaningful time; everything else must return quickly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Adapter name, used for logging only
    fn name(&self) -> &'static str;

    /// Perform a completion request
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Perform a streaming completion request
    ///
    /// The default implementation reports the capability as absent.
    async fn complete_streaming(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        let _ = request;
        Err(crate::utils::error::GatewayError::Internal(format!(
            "provider {} does not support streaming",
            self.name()
        )))
    }
}

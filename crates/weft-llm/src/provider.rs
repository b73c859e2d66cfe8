//! Provider adapter contract.

use async_trait::async_trait;

use crate::errors::SDKError;
use crate::stream::{StreamEventStream, stream_from_response};
use crate::types::{Request, Response};

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: Request) -> Result<Response, SDKError>;

    async fn stream(&self, request: Request) -> Result<StreamEventStream, SDKError> {
        let response = self.complete(request).await?;
        Ok(stream_from_response(response))
    }
}

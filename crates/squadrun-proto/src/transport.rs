//! The seam between the API client and the network.

use async_trait::async_trait;
use serde_json::Value;

use crate::{ApiRequest, ApiResult};

/// Carries one request to the server and returns the raw JSON body.
///
/// Implementations never panic on server or network failure; every fault is
/// reported as an [`ApiError`](crate::ApiError). Schema decoding happens
/// above this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> ApiResult<Value>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &ApiRequest) -> ApiResult<Value> {
        (**self).send(request).await
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use crate::handlers::custom_resource::CustomResourceResponse;

#[derive(Debug, Error)]
pub enum ResponseDeliveryError {
    #[error("failed to serialize custom resource response: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to deliver custom resource response: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("custom resource response was rejected with status {status}")]
    Rejected { status: u16 },
}

/// Delivers the final resource status back to the orchestration framework.
#[async_trait]
pub trait ResponseSender: Send + Sync {
    async fn send(
        &self,
        response_url: &str,
        response: &CustomResourceResponse,
    ) -> Result<(), ResponseDeliveryError>;
}

/// Puts the response to the presigned S3 URL CloudFormation supplies.
#[derive(Debug, Clone)]
pub struct HttpResponseSender {
    http_client: reqwest::Client,
}

impl HttpResponseSender {
    pub fn new(timeout: Duration) -> Result<Self, ResponseDeliveryError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ResponseSender for HttpResponseSender {
    async fn send(
        &self,
        response_url: &str,
        response: &CustomResourceResponse,
    ) -> Result<(), ResponseDeliveryError> {
        let body = serde_json::to_vec(response)?;

        // The presigned URL is signed without a content type.
        let reply = self
            .http_client
            .put(response_url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await?;

        let status = reply.status();
        if !status.is_success() {
            return Err(ResponseDeliveryError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

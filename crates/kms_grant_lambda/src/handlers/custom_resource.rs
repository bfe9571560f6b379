//! CloudFormation custom resource envelope.
//!
//! Decodes the request CloudFormation sends to the Lambda, routes it to the
//! [`GrantHandler`], and shapes the outcome into the response document that
//! must be PUT back to the request's `ResponseURL`.

use std::collections::BTreeMap;

use kms_grant_core::contract::{GrantResult, LifecycleEvent, ResourceProperties};
use kms_grant_core::lifecycle::is_legacy_physical_id;
use kms_grant_core::validation::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::Instrument;

use crate::adapters::key_management::KeyManagementClient;
use crate::adapters::response::{ResponseDeliveryError, ResponseSender};
use crate::handlers::grant::{GrantError, GrantHandler};

pub const GRANT_TOKEN_ATTRIBUTE: &str = "GrantToken";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceRequest {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    #[serde(default)]
    pub resource_type: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    /// Kept raw so a mistyped property fails the resource, not the envelope.
    #[serde(default)]
    pub resource_properties: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Value>,
}

impl CustomResourceRequest {
    pub fn lifecycle_event(&self) -> Result<LifecycleEvent, ValidationError> {
        let old_resource_properties = match &self.old_resource_properties {
            Some(old) => Some(ResourceProperties::from_json("OldResourceProperties", old)?),
            None => None,
        };
        Ok(LifecycleEvent {
            resource_properties: ResourceProperties::from_json(
                "ResourceProperties",
                &self.resource_properties,
            )?,
            old_resource_properties,
            physical_resource_id: self.physical_resource_id.clone(),
        })
    }

    fn current_physical_id(&self, log_stream_name: &str) -> String {
        self.physical_resource_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| log_stream_name.to_string())
    }
}

/// The fields needed to answer a request whose envelope did not decode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseTarget {
    #[serde(rename = "ResponseURL")]
    response_url: String,
    #[serde(default)]
    stack_id: String,
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    logical_resource_id: String,
    #[serde(default)]
    physical_resource_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid custom resource request without a ResponseURL: {0}")]
    Unanswerable(serde_json::Error),
    #[error(transparent)]
    Delivery(#[from] ResponseDeliveryError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
}

/// Runs one custom resource request and builds its response.
///
/// Create and Update are validated before any KMS call. When the request has
/// no physical id yet (a failed Create), the Lambda log stream name stands in;
/// its `YYYY/MM/DD/` prefix is what lets a later Delete skip KMS entirely.
pub async fn handle_custom_resource_request<C: KeyManagementClient>(
    request: &CustomResourceRequest,
    handler: &GrantHandler<C>,
    log_stream_name: &str,
) -> CustomResourceResponse {
    let span = tracing::info_span!(
        "custom_resource",
        request_type = ?request.request_type,
        logical_resource_id = %request.logical_resource_id,
        stack_id = %request.stack_id,
    );

    async {
        tracing::info!(
            physical_resource_id = request.physical_resource_id.as_deref(),
            "custom resource request received"
        );

        let outcome = match request.lifecycle_event() {
            Ok(event) => dispatch(request.request_type, &event, handler).await,
            // A Create that failed on its properties left a log stream id
            // behind; deleting it must not depend on those properties.
            Err(_)
                if request.request_type == RequestType::Delete
                    && request
                        .physical_resource_id
                        .as_deref()
                        .is_some_and(is_legacy_physical_id) =>
            {
                Ok(None)
            }
            Err(error) => Err(GrantError::from(error)),
        };
        let response = build_response(request, outcome, log_stream_name);

        match &response.reason {
            None => tracing::info!(
                physical_resource_id = %response.physical_resource_id,
                "custom resource request succeeded"
            ),
            Some(reason) => tracing::warn!(
                physical_resource_id = %response.physical_resource_id,
                reason = %reason,
                "custom resource request failed"
            ),
        }
        response
    }
    .instrument(span)
    .await
}

/// Decodes a raw invocation payload, runs it and delivers the response.
///
/// Any payload carrying a `ResponseURL` is answered, even when the rest of the
/// envelope is malformed; only a payload with nowhere to reply is an error.
pub async fn respond_to_payload<C: KeyManagementClient, S: ResponseSender>(
    payload: &Value,
    handler: &GrantHandler<C>,
    sender: &S,
    log_stream_name: &str,
) -> Result<CustomResourceResponse, EnvelopeError> {
    let (response_url, response) = match CustomResourceRequest::deserialize(payload) {
        Ok(request) => {
            let response = handle_custom_resource_request(&request, handler, log_stream_name).await;
            (request.response_url, response)
        }
        Err(error) => {
            let target = ResponseTarget::deserialize(payload).map_err(EnvelopeError::Unanswerable)?;
            tracing::warn!(
                logical_resource_id = %target.logical_resource_id,
                error = %error,
                "custom resource request could not be decoded"
            );
            let response = rejected_response(&target, &error, log_stream_name);
            (target.response_url, response)
        }
    };

    sender.send(&response_url, &response).await?;
    Ok(response)
}

fn rejected_response(
    target: &ResponseTarget,
    error: &serde_json::Error,
    log_stream_name: &str,
) -> CustomResourceResponse {
    CustomResourceResponse {
        status: ResponseStatus::Failed,
        reason: Some(format!("Invalid custom resource request: {error}")),
        physical_resource_id: target
            .physical_resource_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| log_stream_name.to_string()),
        stack_id: target.stack_id.clone(),
        request_id: target.request_id.clone(),
        logical_resource_id: target.logical_resource_id.clone(),
        data: None,
    }
}

async fn dispatch<C: KeyManagementClient>(
    request_type: RequestType,
    event: &LifecycleEvent,
    handler: &GrantHandler<C>,
) -> Result<Option<GrantResult>, GrantError> {
    match request_type {
        RequestType::Create => {
            handler.validate(event)?;
            handler.create(event).await.map(Some)
        }
        RequestType::Update => {
            handler.validate(event)?;
            handler.update(event).await.map(Some)
        }
        RequestType::Delete => handler.delete(event).await.map(|()| None),
    }
}

fn build_response(
    request: &CustomResourceRequest,
    outcome: Result<Option<GrantResult>, GrantError>,
    log_stream_name: &str,
) -> CustomResourceResponse {
    let current_physical_id = request.current_physical_id(log_stream_name);

    let (status, reason, physical_resource_id, data) = match outcome {
        Ok(Some(grant)) => (
            ResponseStatus::Success,
            None,
            grant.physical_resource_id,
            Some(BTreeMap::from([(
                GRANT_TOKEN_ATTRIBUTE.to_string(),
                grant.grant_token,
            )])),
        ),
        Ok(None) => (ResponseStatus::Success, None, current_physical_id, None),
        Err(error) => (
            ResponseStatus::Failed,
            Some(error.to_string()),
            current_physical_id,
            None,
        ),
    };

    CustomResourceResponse {
        status,
        reason,
        physical_resource_id,
        stack_id: request.stack_id.clone(),
        request_id: request.request_id.clone(),
        logical_resource_id: request.logical_resource_id.clone(),
        data,
    }
}

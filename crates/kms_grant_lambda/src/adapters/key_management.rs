use async_trait::async_trait;
use kms_grant_core::contract::{CreateGrantRequest, GrantReference, GrantResult};
use thiserror::Error;

/// Failure reported by the key-management service, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    code: Option<String>,
    message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
pub trait KeyManagementClient: Send + Sync {
    async fn create_grant(&self, request: &CreateGrantRequest) -> Result<GrantResult, ServiceError>;

    async fn revoke_grant(&self, grant: &GrantReference) -> Result<(), ServiceError>;

    async fn retire_grant(&self, grant: &GrantReference) -> Result<(), ServiceError>;
}

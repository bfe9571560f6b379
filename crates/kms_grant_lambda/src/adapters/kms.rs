use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_kms::types::{GrantConstraints as SdkGrantConstraints, GrantOperation};
use kms_grant_core::contract::{
    CreateGrantRequest, EncryptionContext, GrantConstraints, GrantReference, GrantResult,
};

use crate::adapters::key_management::{KeyManagementClient, ServiceError};

#[derive(Debug, Clone)]
pub struct KmsGrantClient {
    kms_client: aws_sdk_kms::Client,
}

impl KmsGrantClient {
    pub fn new(kms_client: aws_sdk_kms::Client) -> Self {
        Self { kms_client }
    }

    /// Builds a client from shared AWS config, optionally pointing at a
    /// non-default KMS endpoint.
    pub fn from_sdk_config(
        sdk_config: &aws_config::SdkConfig,
        endpoint_url: Option<&str>,
    ) -> Self {
        let mut builder = aws_sdk_kms::config::Builder::from(sdk_config);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }
        Self::new(aws_sdk_kms::Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl KeyManagementClient for KmsGrantClient {
    async fn create_grant(&self, request: &CreateGrantRequest) -> Result<GrantResult, ServiceError> {
        let output = self
            .kms_client
            .create_grant()
            .key_id(&request.key_id)
            .grantee_principal(&request.grantee_principal)
            .set_operations(Some(grant_operations(&request.operations)))
            .set_name(request.name.clone())
            .set_retiring_principal(request.retiring_principal.clone())
            .set_constraints(request.constraints.as_ref().map(sdk_constraints))
            .set_grant_tokens(request.grant_tokens.clone())
            .send()
            .await
            .map_err(|error| service_error(&error))?;

        let physical_resource_id = output
            .grant_id()
            .ok_or_else(|| ServiceError::new("CreateGrant response did not include a GrantId"))?;
        let grant_token = output
            .grant_token()
            .ok_or_else(|| ServiceError::new("CreateGrant response did not include a GrantToken"))?;

        Ok(GrantResult {
            physical_resource_id: physical_resource_id.to_string(),
            grant_token: grant_token.to_string(),
        })
    }

    async fn revoke_grant(&self, grant: &GrantReference) -> Result<(), ServiceError> {
        self.kms_client
            .revoke_grant()
            .key_id(&grant.key_id)
            .grant_id(&grant.grant_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| service_error(&error))
    }

    async fn retire_grant(&self, grant: &GrantReference) -> Result<(), ServiceError> {
        self.kms_client
            .retire_grant()
            .key_id(&grant.key_id)
            .grant_id(&grant.grant_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| service_error(&error))
    }
}

fn grant_operations(operations: &[String]) -> Vec<GrantOperation> {
    operations
        .iter()
        .map(|operation| GrantOperation::from(operation.as_str()))
        .collect()
}

fn sdk_constraints(constraints: &GrantConstraints) -> SdkGrantConstraints {
    SdkGrantConstraints::builder()
        .set_encryption_context_subset(
            constraints
                .encryption_context_subset
                .as_ref()
                .map(to_hash_map),
        )
        .set_encryption_context_equals(
            constraints
                .encryption_context_equals
                .as_ref()
                .map(to_hash_map),
        )
        .build()
}

fn to_hash_map(context: &EncryptionContext) -> HashMap<String, String> {
    context
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn service_error<E>(error: &E) -> ServiceError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let message = error
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(error).to_string());
    match error.code() {
        Some(code) => ServiceError::with_code(code, message),
        None => ServiceError::new(message),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn maps_known_and_unknown_operations() {
        let operations = grant_operations(&[
            "Decrypt".to_string(),
            "GenerateDataKey".to_string(),
            "FutureOperation".to_string(),
        ]);

        assert_eq!(operations[0], GrantOperation::Decrypt);
        assert_eq!(operations[1], GrantOperation::GenerateDataKey);
        assert_eq!(operations[2].as_str(), "FutureOperation");
    }

    #[test]
    fn converts_encryption_context_constraints() {
        let constraints = GrantConstraints {
            encryption_context_subset: Some(BTreeMap::from([(
                "Department".to_string(),
                "IT".to_string(),
            )])),
            encryption_context_equals: None,
        };

        let converted = sdk_constraints(&constraints);

        assert_eq!(
            converted
                .encryption_context_subset()
                .and_then(|context| context.get("Department"))
                .map(String::as_str),
            Some("IT")
        );
        assert!(converted.encryption_context_equals().is_none());
    }
}

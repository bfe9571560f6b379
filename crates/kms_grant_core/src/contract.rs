use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::{required_grant_fields, ValidationError};

/// Property CloudFormation injects to route responses back to the handler.
/// It must never reach the key-management API.
pub const SERVICE_TOKEN_PROPERTY: &str = "ServiceToken";

pub type EncryptionContext = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct GrantConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_context_subset: Option<EncryptionContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_context_equals: Option<EncryptionContext>,
}

/// Desired grant state as declared on the custom resource.
///
/// Keys this handler does not model are collected in `passthrough`; apart
/// from `ServiceToken`, a grant request refuses to be built while any remain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grantee_principal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retiring_principal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<GrantConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_tokens: Option<Vec<String>>,
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, Value>,
}

impl ResourceProperties {
    /// Decodes a property bag, reporting type mismatches as validation
    /// failures. `null` or an absent bag decodes to empty properties.
    pub fn from_json(label: &str, value: &Value) -> Result<Self, ValidationError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Self::deserialize(value)
            .map_err(|error| ValidationError::new(format!("Invalid {label}: {error}")))
    }

    /// Returns the non-empty `Name`, if one is set.
    pub fn grant_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}

/// One lifecycle invocation, already decoded from the framework envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LifecycleEvent {
    pub resource_properties: ResourceProperties,
    pub old_resource_properties: Option<ResourceProperties>,
    pub physical_resource_id: Option<String>,
}

impl LifecycleEvent {
    pub fn new(resource_properties: ResourceProperties) -> Self {
        Self {
            resource_properties,
            ..Self::default()
        }
    }

    pub fn with_physical_resource_id(mut self, physical_resource_id: impl Into<String>) -> Self {
        self.physical_resource_id = Some(physical_resource_id.into());
        self
    }

    pub fn with_old_resource_properties(mut self, old: ResourceProperties) -> Self {
        self.old_resource_properties = Some(old);
        self
    }

    /// Properties describing the grant currently backing the resource: the
    /// old properties on update, the current ones otherwise.
    pub fn prior_properties(&self) -> &ResourceProperties {
        self.old_resource_properties
            .as_ref()
            .unwrap_or(&self.resource_properties)
    }
}

/// Validated, sanitized parameters for a `CreateGrant` call.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateGrantRequest {
    pub key_id: String,
    pub grantee_principal: String,
    pub operations: Vec<String>,
    pub name: Option<String>,
    pub retiring_principal: Option<String>,
    pub constraints: Option<GrantConstraints>,
    pub grant_tokens: Option<Vec<String>>,
}

impl CreateGrantRequest {
    pub fn from_properties(properties: &ResourceProperties) -> Result<Self, ValidationError> {
        let (grantee_principal, key_id, operations) = required_grant_fields(properties)?;

        let unsupported: Vec<&str> = properties
            .passthrough
            .keys()
            .map(String::as_str)
            .filter(|name| *name != SERVICE_TOKEN_PROPERTY)
            .collect();
        if !unsupported.is_empty() {
            return Err(ValidationError::new(format!(
                "Unsupported properties for CreateGrant: {}",
                unsupported.join(", ")
            )));
        }

        Ok(Self {
            key_id: key_id.to_string(),
            grantee_principal: grantee_principal.to_string(),
            operations: operations.to_vec(),
            name: properties.name.clone(),
            retiring_principal: properties.retiring_principal.clone(),
            constraints: properties.constraints.clone(),
            grant_tokens: properties.grant_tokens.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantReference {
    pub grant_id: String,
    pub key_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantResult {
    #[serde(rename = "physicalResourceId")]
    pub physical_resource_id: String,
    #[serde(rename = "GrantToken")]
    pub grant_token: String,
}

use crate::contract::ResourceProperties;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn missing_property(name: &str) -> Self {
        Self::new(format!("Missing required property {name}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Checks that the properties describe a grant that can be created.
///
/// Checks run in a fixed order and the first failure is reported, so a
/// resource missing both `GranteePrincipal` and `KeyId` always reports
/// `GranteePrincipal`.
pub fn validate_properties(properties: &ResourceProperties) -> Result<(), ValidationError> {
    required_grant_fields(properties).map(|_| ())
}

/// Returns `(GranteePrincipal, KeyId, Operations)` once all three are usable.
pub(crate) fn required_grant_fields(
    properties: &ResourceProperties,
) -> Result<(&str, &str, &[String]), ValidationError> {
    let grantee_principal = non_blank(properties.grantee_principal.as_deref())
        .ok_or_else(|| ValidationError::missing_property("GranteePrincipal"))?;

    let key_id = non_blank(properties.key_id.as_deref())
        .ok_or_else(|| ValidationError::missing_property("KeyId"))?;

    let operations = properties
        .operations
        .as_deref()
        .ok_or_else(|| ValidationError::missing_property("Operations"))?;
    if operations.is_empty() {
        return Err(ValidationError::new("Operations cannot be empty"));
    }

    Ok((grantee_principal, key_id, operations))
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.is_empty())
}

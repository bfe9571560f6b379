use once_cell::sync::Lazy;
use regex::Regex;

use crate::contract::{GrantReference, LifecycleEvent, ResourceProperties};
use crate::validation::{non_blank, ValidationError};

// Earlier versions of the resource reported the Lambda log stream name
// (`YYYY/MM/DD/[$LATEST]...`) as the physical id. Those ids never had a grant.
static LEGACY_PHYSICAL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}/[0-9]{2}/[0-9]{2}").expect("legacy id pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePlan {
    /// Re-issue the grant with the new properties and keep the old one.
    InPlace,
    /// Release the current grant, then create a new one.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleasePlan {
    /// Nothing was ever granted for this id.
    LegacyNoop,
    Release(GrantReference),
}

pub fn is_legacy_physical_id(physical_resource_id: &str) -> bool {
    LEGACY_PHYSICAL_ID.is_match(physical_resource_id)
}

/// A grant keeps its identity only when both old and new properties carry the
/// same non-empty `Name`. Anything else replaces it.
pub fn requires_replacement(
    new_properties: &ResourceProperties,
    old_properties: Option<&ResourceProperties>,
) -> bool {
    let Some(new_name) = new_properties.grant_name() else {
        return true;
    };
    old_properties.and_then(ResourceProperties::grant_name) != Some(new_name)
}

pub fn plan_update(event: &LifecycleEvent) -> UpdatePlan {
    if requires_replacement(
        &event.resource_properties,
        event.old_resource_properties.as_ref(),
    ) {
        UpdatePlan::Replace
    } else {
        UpdatePlan::InPlace
    }
}

pub fn plan_release(
    physical_resource_id: Option<&str>,
    properties: &ResourceProperties,
) -> Result<ReleasePlan, ValidationError> {
    let grant_id = non_blank(physical_resource_id)
        .ok_or_else(|| ValidationError::missing_property("PhysicalResourceId"))?;

    if is_legacy_physical_id(grant_id) {
        return Ok(ReleasePlan::LegacyNoop);
    }

    let key_id = non_blank(properties.key_id.as_deref())
        .ok_or_else(|| ValidationError::missing_property("KeyId"))?;

    Ok(ReleasePlan::Release(GrantReference {
        grant_id: grant_id.to_string(),
        key_id: key_id.to_string(),
    }))
}

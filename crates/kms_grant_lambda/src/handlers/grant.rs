use kms_grant_core::contract::{CreateGrantRequest, GrantResult, LifecycleEvent, ResourceProperties};
use kms_grant_core::fallback::attempt_with_fallback;
use kms_grant_core::lifecycle::{plan_release, plan_update, ReleasePlan, UpdatePlan};
use kms_grant_core::validation::{validate_properties, ValidationError};
use thiserror::Error;

use crate::adapters::key_management::{KeyManagementClient, ServiceError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Create, update and delete transitions for a grant-backed custom resource.
///
/// Every external call is awaited before the next one starts.
#[derive(Debug, Clone)]
pub struct GrantHandler<C> {
    client: C,
}

impl<C: KeyManagementClient> GrantHandler<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn validate(&self, event: &LifecycleEvent) -> Result<(), GrantError> {
        validate_properties(&event.resource_properties)?;
        Ok(())
    }

    pub async fn create(&self, event: &LifecycleEvent) -> Result<GrantResult, GrantError> {
        let request = CreateGrantRequest::from_properties(&event.resource_properties)?;
        Ok(self.client.create_grant(&request).await?)
    }

    /// The replacement grant request is built before the old grant is
    /// released, so invalid properties never cost the resource its grant.
    pub async fn update(&self, event: &LifecycleEvent) -> Result<GrantResult, GrantError> {
        let request = CreateGrantRequest::from_properties(&event.resource_properties)?;

        if plan_update(event) == UpdatePlan::Replace {
            self.release(
                event.physical_resource_id.as_deref(),
                event.prior_properties(),
            )
            .await?;
        }
        Ok(self.client.create_grant(&request).await?)
    }

    pub async fn delete(&self, event: &LifecycleEvent) -> Result<(), GrantError> {
        self.release(
            event.physical_resource_id.as_deref(),
            &event.resource_properties,
        )
        .await
    }

    async fn release(
        &self,
        physical_resource_id: Option<&str>,
        properties: &ResourceProperties,
    ) -> Result<(), GrantError> {
        let grant = match plan_release(physical_resource_id, properties)? {
            ReleasePlan::LegacyNoop => return Ok(()),
            ReleasePlan::Release(grant) => grant,
        };

        attempt_with_fallback(self.client.revoke_grant(&grant), || {
            self.client.retire_grant(&grant)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use kms_grant_core::contract::GrantReference;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum KmsCall {
        Create(CreateGrantRequest),
        Revoke(GrantReference),
        Retire(GrantReference),
    }

    struct RecordingKms {
        calls: Mutex<Vec<KmsCall>>,
        create_result: Result<GrantResult, ServiceError>,
        revoke_result: Result<(), ServiceError>,
        retire_result: Result<(), ServiceError>,
    }

    impl RecordingKms {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                create_result: Ok(GrantResult {
                    physical_resource_id: "grant-new".to_string(),
                    grant_token: "token-new".to_string(),
                }),
                revoke_result: Ok(()),
                retire_result: Ok(()),
            }
        }

        fn failing_create(mut self, error: ServiceError) -> Self {
            self.create_result = Err(error);
            self
        }

        fn failing_revoke(mut self, error: ServiceError) -> Self {
            self.revoke_result = Err(error);
            self
        }

        fn failing_retire(mut self, error: ServiceError) -> Self {
            self.retire_result = Err(error);
            self
        }

        fn calls(&self) -> Vec<KmsCall> {
            self.calls.lock().expect("poisoned mutex").clone()
        }

        fn record(&self, call: KmsCall) {
            self.calls.lock().expect("poisoned mutex").push(call);
        }
    }

    #[async_trait]
    impl KeyManagementClient for RecordingKms {
        async fn create_grant(
            &self,
            request: &CreateGrantRequest,
        ) -> Result<GrantResult, ServiceError> {
            self.record(KmsCall::Create(request.clone()));
            self.create_result.clone()
        }

        async fn revoke_grant(&self, grant: &GrantReference) -> Result<(), ServiceError> {
            self.record(KmsCall::Revoke(grant.clone()));
            self.revoke_result.clone()
        }

        async fn retire_grant(&self, grant: &GrantReference) -> Result<(), ServiceError> {
            self.record(KmsCall::Retire(grant.clone()));
            self.retire_result.clone()
        }
    }

    fn properties(name: Option<&str>) -> ResourceProperties {
        let mut value = json!({
            "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:kms-grant",
            "GranteePrincipal": "arn:aws:iam::123456789012:role/app",
            "KeyId": "key-1",
            "Operations": ["Decrypt"]
        });
        if let Some(name) = name {
            value["Name"] = json!(name);
        }
        serde_json::from_value(value).expect("properties should parse")
    }

    fn update_event(new_name: Option<&str>, old_name: Option<&str>) -> LifecycleEvent {
        LifecycleEvent::new(properties(new_name))
            .with_old_resource_properties(properties(old_name))
            .with_physical_resource_id("grant-old")
    }

    fn old_grant() -> GrantReference {
        GrantReference {
            grant_id: "grant-old".to_string(),
            key_id: "key-1".to_string(),
        }
    }

    fn kinds(calls: &[KmsCall]) -> Vec<&'static str> {
        calls
            .iter()
            .map(|call| match call {
                KmsCall::Create(_) => "create",
                KmsCall::Revoke(_) => "revoke",
                KmsCall::Retire(_) => "retire",
            })
            .collect()
    }

    #[test]
    fn validate_reports_missing_fields_without_calls() {
        let handler = GrantHandler::new(RecordingKms::new());
        let mut event = LifecycleEvent::new(properties(None));
        event.resource_properties.key_id = None;

        let error = handler.validate(&event).unwrap_err();

        assert_eq!(error.to_string(), "Missing required property KeyId");
        assert!(handler.client().calls().is_empty());
    }

    #[tokio::test]
    async fn create_returns_service_grant_and_token() {
        let handler = GrantHandler::new(RecordingKms::new());

        let result = handler
            .create(&LifecycleEvent::new(properties(Some("app"))))
            .await
            .expect("create should succeed");

        assert_eq!(result.physical_resource_id, "grant-new");
        assert_eq!(result.grant_token, "token-new");
        let calls = handler.client().calls();
        assert_eq!(kinds(&calls), vec!["create"]);
        let KmsCall::Create(request) = &calls[0] else {
            panic!("expected a create call");
        };
        assert_eq!(request.grantee_principal, "arn:aws:iam::123456789012:role/app");
        assert_eq!(request.name.as_deref(), Some("app"));
    }

    #[tokio::test]
    async fn create_propagates_service_error_verbatim() {
        let failure = ServiceError::with_code("NotFoundException", "Key 'key-1' does not exist");
        let handler = GrantHandler::new(RecordingKms::new().failing_create(failure.clone()));

        let error = handler
            .create(&LifecycleEvent::new(properties(None)))
            .await
            .unwrap_err();

        assert_eq!(error, GrantError::Service(failure));
        assert_eq!(error.to_string(), "Key 'key-1' does not exist");
    }

    #[tokio::test]
    async fn create_rejects_invalid_properties_before_calling_kms() {
        let handler = GrantHandler::new(RecordingKms::new());
        let mut event = LifecycleEvent::new(properties(None));
        event.resource_properties.operations = Some(Vec::new());

        let error = handler.create(&event).await.unwrap_err();

        assert_eq!(error.to_string(), "Operations cannot be empty");
        assert!(handler.client().calls().is_empty());
    }

    #[tokio::test]
    async fn update_with_stable_name_recreates_without_revoking() {
        let handler = GrantHandler::new(RecordingKms::new());

        let result = handler
            .update(&update_event(Some("app"), Some("app")))
            .await
            .expect("update should succeed");

        assert_eq!(result.physical_resource_id, "grant-new");
        assert_eq!(kinds(&handler.client().calls()), vec!["create"]);
    }

    #[tokio::test]
    async fn update_without_name_replaces_grant() {
        let handler = GrantHandler::new(RecordingKms::new());

        handler
            .update(&update_event(None, None))
            .await
            .expect("update should succeed");

        let calls = handler.client().calls();
        assert_eq!(kinds(&calls), vec!["revoke", "create"]);
        assert_eq!(calls[0], KmsCall::Revoke(old_grant()));
    }

    #[tokio::test]
    async fn update_with_changed_name_revokes_then_creates() {
        let handler = GrantHandler::new(RecordingKms::new());

        let result = handler
            .update(&update_event(Some("app-v2"), Some("app")))
            .await
            .expect("update should succeed");

        assert_eq!(result.grant_token, "token-new");
        assert_eq!(kinds(&handler.client().calls()), vec!["revoke", "create"]);
    }

    #[tokio::test]
    async fn invalid_update_keeps_old_grant() {
        let handler = GrantHandler::new(RecordingKms::new());
        let mut event = update_event(Some("app-v2"), Some("app"));
        event.resource_properties.operations = Some(Vec::new());

        let error = handler.update(&event).await.unwrap_err();

        assert_eq!(error.to_string(), "Operations cannot be empty");
        assert!(handler.client().calls().is_empty());
    }

    #[tokio::test]
    async fn create_with_unsupported_property_makes_no_calls() {
        let handler = GrantHandler::new(RecordingKms::new());
        let mut event = LifecycleEvent::new(properties(Some("app")));
        event
            .resource_properties
            .passthrough
            .insert("Audit".to_string(), json!("ticket-42"));

        let error = handler.create(&event).await.unwrap_err();

        assert_eq!(
            error.to_string(),
            "Unsupported properties for CreateGrant: Audit"
        );
        assert!(handler.client().calls().is_empty());
    }

    #[tokio::test]
    async fn update_releases_grant_on_previous_key() {
        let handler = GrantHandler::new(RecordingKms::new());
        let mut event = update_event(None, None);
        event.resource_properties.key_id = Some("key-2".to_string());

        handler.update(&event).await.expect("update should succeed");

        let calls = handler.client().calls();
        assert_eq!(calls[0], KmsCall::Revoke(old_grant()));
        let KmsCall::Create(request) = &calls[1] else {
            panic!("expected a create call");
        };
        assert_eq!(request.key_id, "key-2");
    }

    #[tokio::test]
    async fn update_stops_when_release_fails() {
        let retire_failure = ServiceError::with_code("AccessDeniedException", "retire denied");
        let handler = GrantHandler::new(
            RecordingKms::new()
                .failing_revoke(ServiceError::new("revoke denied"))
                .failing_retire(retire_failure.clone()),
        );

        let error = handler
            .update(&update_event(Some("app-v2"), Some("app")))
            .await
            .unwrap_err();

        assert_eq!(error, GrantError::Service(retire_failure));
        assert_eq!(kinds(&handler.client().calls()), vec!["revoke", "retire"]);
    }

    #[tokio::test]
    async fn delete_revokes_grant() {
        let handler = GrantHandler::new(RecordingKms::new());
        let event = LifecycleEvent::new(properties(None)).with_physical_resource_id("grant-old");

        handler.delete(&event).await.expect("delete should succeed");

        assert_eq!(handler.client().calls(), vec![KmsCall::Revoke(old_grant())]);
    }

    #[tokio::test]
    async fn delete_retires_when_revoke_fails() {
        let handler = GrantHandler::new(
            RecordingKms::new().failing_revoke(ServiceError::new("revoke denied")),
        );
        let event = LifecycleEvent::new(properties(None)).with_physical_resource_id("grant-old");

        handler.delete(&event).await.expect("retire should recover");

        assert_eq!(
            handler.client().calls(),
            vec![KmsCall::Revoke(old_grant()), KmsCall::Retire(old_grant())]
        );
    }

    #[tokio::test]
    async fn delete_surfaces_retire_error_when_both_fail() {
        let handler = GrantHandler::new(
            RecordingKms::new()
                .failing_revoke(ServiceError::new("revoke denied"))
                .failing_retire(ServiceError::new("retire denied")),
        );
        let event = LifecycleEvent::new(properties(None)).with_physical_resource_id("grant-old");

        let error = handler.delete(&event).await.unwrap_err();

        assert_eq!(error.to_string(), "retire denied");
    }

    #[tokio::test]
    async fn delete_of_legacy_id_makes_no_calls() {
        let handler = GrantHandler::new(
            RecordingKms::new().failing_revoke(ServiceError::new("should not be called")),
        );
        let event = LifecycleEvent::new(ResourceProperties::default())
            .with_physical_resource_id("2016/12/09/[$LATEST]0123456789abcdef");

        handler.delete(&event).await.expect("legacy delete is a no-op");

        assert!(handler.client().calls().is_empty());
    }
}

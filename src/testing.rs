//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] without spinning up a gRPC
//! server, and [`InMemoryFoodApi`] stands in for the HashiCups API.
//!
//! # Example
//!
//! ```ignore
//! use hashicups_provider::testing::{InMemoryFoodApi, ProviderTester};
//! use hashicups_provider::{HashicupsProvider, SharedFoodApi};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_create_food() {
//!     let api: SharedFoodApi = Arc::new(InMemoryFoodApi::new());
//!     let tester = ProviderTester::new(HashicupsProvider::with_client(api));
//!
//!     let state = tester
//!         .lifecycle_create("hashicups_food", json!({"items": [{"name": "Burger", "price": 9.99}]}))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(state["id"], "1");
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{Food, FoodApi, FoodItem};
use crate::error::{ClientError, ProviderError};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::PlanResult;

/// Drives a [`ProviderService`] the way a host would, without gRPC.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Configure the provider.
    ///
    /// Returns `Err` with the error diagnostics if configuration failed.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation. The proposed state doubles as the config.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update. The proposed state doubles as the config.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Plan with prior state, proposed state and config all given.
    pub async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, prior_state, proposed_state, config)
            .await
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Refresh `state`.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Run plan → create → read and return the state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self.plan_create(resource_type, config).await?;
        let created_state = self
            .create(resource_type, plan_result.planned_state)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run plan → update → read and return the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan_result = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan_result.planned_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run plan → delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Run create → update → delete, returning the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;
        Ok(updated_state)
    }
}

/// Failure of a tester call.
#[derive(Debug)]
pub enum TestError {
    /// Error diagnostics were reported.
    Diagnostics(Vec<Diagnostic>),
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "{} error diagnostic(s):", diags.len())?;
                for diag in diags {
                    writeln!(f, "  [{:?}] {}", diag.severity, diag)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

/// Panics unless `plan` changes `path`.
///
/// # Panics
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "plan leaves '{}' unchanged; changed: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Panics if `plan` changes `path`.
///
/// # Panics
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        !has_change,
        "plan unexpectedly changes '{}'",
        path
    );
}

/// Panics if `plan` has any change.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "expected an empty plan, got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that an error carries an error diagnostic whose summary contains `substring`.
///
/// # Panics
///
/// Panics if the error has no diagnostics or none of them match.
pub fn assert_error_contains(err: &ProviderError, substring: &str) {
    let summaries: Vec<_> = err
        .diagnostics()
        .map(|diags| diags.errors().map(|d| d.summary.as_str()).collect())
        .unwrap_or_default();

    assert!(
        summaries.iter().any(|s| s.contains(substring)),
        "Expected an error containing '{}', but no matching error found. Errors: {:?} ({})",
        substring,
        summaries,
        err
    );
}

/// A remote call observed by [`InMemoryFoodApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoodCall {
    /// `create_food`.
    Create,
    /// `get_food` with the requested ID.
    Get(String),
    /// `update_food` with the requested ID.
    Update(String),
    /// `delete_food` with the requested ID.
    Delete(String),
}

#[derive(Debug, Default)]
struct Store {
    foods: BTreeMap<i64, Vec<FoodItem>>,
    next_id: i64,
    calls: Vec<FoodCall>,
}

/// An in-memory [`FoodApi`].
///
/// IDs are assigned sequentially from 1. Every call is recorded, including
/// the ones made to fail with [`InMemoryFoodApi::failing_on`]. Like the real
/// API, updates answer without the item list.
#[derive(Debug, Default)]
pub struct InMemoryFoodApi {
    store: Mutex<Store>,
    fail_on: Option<FoodCall>,
    extra_echo: Option<FoodItem>,
}

impl InMemoryFoodApi {
    /// An empty API.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call equal to `call` fail with a 500 response.
    pub fn failing_on(mut self, call: FoodCall) -> Self {
        self.fail_on = Some(call);
        self
    }

    /// Assign IDs from `id` onwards.
    pub fn with_first_id(self, id: i64) -> Self {
        self.lock().next_id = id - 1;
        self
    }

    /// Append `item` to every create response.
    pub fn with_extra_echo(mut self, item: FoodItem) -> Self {
        self.extra_echo = Some(item);
        self
    }

    /// Seed a record.
    pub fn insert(&self, id: i64, items: Vec<FoodItem>) {
        let mut store = self.lock();
        store.foods.insert(id, items);
        store.next_id = store.next_id.max(id);
    }

    /// Items of a stored record.
    pub fn items(&self, id: i64) -> Option<Vec<FoodItem>> {
        self.lock().foods.get(&id).cloned()
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<FoodCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `call` and fail it if it was configured to fail.
    fn record(&self, call: FoodCall) -> Result<MutexGuard<'_, Store>, ClientError> {
        let mut store = self.lock();
        store.calls.push(call.clone());
        if self.fail_on.as_ref() == Some(&call) {
            return Err(ClientError::Status {
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(store)
    }
}

fn parse_id(id: &str) -> Result<i64, ClientError> {
    id.parse()
        .map_err(|_| ClientError::NotFound(format!("/foods/{}", id)))
}

#[async_trait]
impl FoodApi for InMemoryFoodApi {
    async fn create_food(&self, items: &[FoodItem]) -> Result<Food, ClientError> {
        let mut store = self.record(FoodCall::Create)?;
        store.next_id += 1;
        let id = store.next_id;
        store.foods.insert(id, items.to_vec());

        let mut echoed = items.to_vec();
        echoed.extend(self.extra_echo.clone());
        Ok(Food { id, items: echoed })
    }

    async fn get_food(&self, id: &str) -> Result<Food, ClientError> {
        let store = self.record(FoodCall::Get(id.to_string()))?;
        let key = parse_id(id)?;
        store
            .foods
            .get(&key)
            .map(|items| Food {
                id: key,
                items: items.clone(),
            })
            .ok_or_else(|| ClientError::NotFound(format!("/foods/{}", id)))
    }

    async fn update_food(&self, id: &str, items: &[FoodItem]) -> Result<Food, ClientError> {
        let mut store = self.record(FoodCall::Update(id.to_string()))?;
        let key = parse_id(id)?;
        match store.foods.get_mut(&key) {
            Some(stored) => {
                *stored = items.to_vec();
                Ok(Food {
                    id: key,
                    items: Vec::new(),
                })
            },
            None => Err(ClientError::NotFound(format!("/foods/{}", id))),
        }
    }

    async fn delete_food(&self, id: &str) -> Result<(), ClientError> {
        let mut store = self.record(FoodCall::Delete(id.to_string()))?;
        let key = parse_id(id)?;
        store
            .foods
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(format!("/foods/{}", id)))
    }
}

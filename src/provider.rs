//! The HashiCups provider.
//!
//! Resources are registered as factories and instantiated for every call.
//! Each fresh instance receives the provider data produced by the last
//! successful Configure before the requested operation runs.

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::client::{HashicupsClient, SharedFoodApi};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::food::FoodResource;
use crate::resource::{ProviderData, Resource, ResourceFactory, ResourceResponse};
use crate::schema::{Diagnostic, Diagnostics, PlanModifier, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{AttributeChange, PlanResult};
use crate::validation;

/// Type name prefixed to every resource the provider serves.
pub const PROVIDER_TYPE_NAME: &str = "hashicups";

/// Lookup used to read `HASHICUPS_*` variables during Configure.
pub type EnvLookup = fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// The provider exposing the `hashicups_food` resource.
pub struct HashicupsProvider {
    factories: Vec<ResourceFactory>,
    provider_data: RwLock<Option<ProviderData>>,
    env: EnvLookup,
}

impl Default for HashicupsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HashicupsProvider {
    /// An unconfigured provider with every resource registered.
    pub fn new() -> Self {
        Self {
            factories: vec![FoodResource::boxed as ResourceFactory],
            provider_data: RwLock::new(None),
            env: process_env,
        }
    }

    /// A provider already configured with `client`. Configure is still
    /// honored and replaces it.
    pub fn with_client(client: SharedFoodApi) -> Self {
        Self::with_provider_data(ProviderData::new(client))
    }

    /// A provider handing `data` to its resources as-is.
    pub fn with_provider_data(data: ProviderData) -> Self {
        Self {
            provider_data: RwLock::new(Some(data)),
            ..Self::new()
        }
    }

    /// Replace the environment lookup used to fill unset configuration.
    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Whether provider data is currently available to resources.
    pub async fn is_configured(&self) -> bool {
        self.provider_data.read().await.is_some()
    }

    fn instantiate(&self, resource_type: &str) -> Result<Box<dyn Resource>, ProviderError> {
        self.factories
            .iter()
            .map(|factory| factory())
            .find(|resource| resource.metadata(PROVIDER_TYPE_NAME) == resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn resource_schema(&self, resource_type: &str) -> Result<Schema, ProviderError> {
        Ok(self.instantiate(resource_type)?.schema())
    }

    /// Instantiate `resource_type` and hand it the current provider data.
    async fn configured_resource(
        &self,
        resource_type: &str,
    ) -> Result<Box<dyn Resource>, ProviderError> {
        let mut resource = self.instantiate(resource_type)?;
        let data = self.provider_data.read().await.clone();
        let diags = resource.configure(data.as_ref());
        if diags.has_error() {
            return Err(diags.into());
        }
        Ok(resource)
    }
}

fn into_state(response: ResourceResponse) -> Result<Value, ProviderError> {
    for warning in response.diagnostics.iter().filter(|d| !d.is_error()) {
        warn!(warning = %warning, "Resource reported a warning");
    }
    if response.diagnostics.has_error() {
        return Err(response.diagnostics.into());
    }
    response
        .state
        .ok_or_else(|| ProviderError::Sdk("resource returned no state".to_string()))
}

#[async_trait::async_trait]
impl ProviderService for HashicupsProvider {
    fn schema(&self) -> ProviderSchema {
        self.factories.iter().fold(
            ProviderSchema::new().with_provider_config(ProviderConfig::schema()),
            |schema, factory| {
                let resource = factory();
                schema.with_resource(resource.metadata(PROVIDER_TYPE_NAME), resource.schema())
            },
        )
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(config)?.with_fallback(self.env);
        debug!(config = ?config, "Configuring HashiCups client");

        let client_config = match config.into_client_config() {
            Ok(client_config) => client_config,
            Err(diags) => return Ok(diags.into_vec()),
        };

        let client = match HashicupsClient::new(client_config).await {
            Ok(client) => client,
            Err(e) => {
                let mut diags = Diagnostics::new();
                diags.add_error(
                    "Unable to Create HashiCups API Client",
                    format!(
                        "An unexpected error occurred when creating the HashiCups API client. \
                         If the error is not clear, please contact the provider developers.\n\n\
                         HashiCups Client Error: {}",
                        e
                    ),
                );
                return Ok(diags.into_vec());
            },
        };

        info!(host = %client.host(), "Configured HashiCups client");
        let shared: SharedFoodApi = Arc::new(client);
        *self.provider_data.write().await = Some(ProviderData::new(shared));
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stopping HashiCups provider");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.resource_schema(resource_type)?;
        Ok(validation::validate(&schema, &config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource_schema(resource_type)?;

        if proposed_state.is_null() {
            return Ok(plan_destroy(prior_state.unwrap_or(Value::Null)));
        }

        let diags: Diagnostics = validation::validate(&schema, &config).into();
        if diags.has_error() {
            return Err(diags.into());
        }

        let proposed = as_object(proposed_state, "proposed_state")?;
        match prior_state.filter(|prior| !prior.is_null()) {
            None => Ok(plan_create(&schema, proposed, &config)),
            Some(prior) => Ok(plan_update(&schema, as_object(prior, "prior_state")?, proposed)),
        }
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.configured_resource(resource_type).await?;
        into_state(resource.create(&planned_state).await)
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.configured_resource(resource_type).await?;
        into_state(resource.read(&current_state).await)
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.configured_resource(resource_type).await?;
        into_state(resource.update(&planned_state, &prior_state).await)
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.configured_resource(resource_type).await?;
        let diags = resource.delete(&current_state).await;
        if diags.has_error() {
            return Err(diags.into());
        }
        Ok(())
    }
}

fn as_object(value: Value, field: &str) -> Result<Map<String, Value>, ProviderError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ProviderError::InvalidRequest(format!(
            "{} must be an object, got {}",
            field, other
        ))),
    }
}

fn sorted(map: Map<String, Value>) -> Vec<(String, Value)> {
    let mut entries: Vec<_> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn plan_destroy(prior_state: Value) -> PlanResult {
    let changes = match prior_state {
        Value::Object(prior) => sorted(prior)
            .into_iter()
            .map(|(path, value)| AttributeChange::removed(path, value))
            .collect(),
        _ => Vec::new(),
    };
    PlanResult::with_changes(Value::Null, changes, false)
}

/// Computed attributes not set in the configuration are unknown until apply.
fn plan_create(schema: &Schema, mut proposed: Map<String, Value>, config: &Value) -> PlanResult {
    for (name, attr) in &schema.block.attributes {
        let configured = config.get(name).is_some_and(|v| !v.is_null());
        if attr.flags.computed && !configured {
            proposed.insert(name.clone(), Value::Null);
        }
    }

    let changes = sorted(proposed.clone())
        .into_iter()
        .map(|(path, value)| AttributeChange::added(path, value))
        .collect();
    PlanResult::with_changes(Value::Object(proposed), changes, false)
}

/// JSON equality that compares numbers by value.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        },
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| same_value(x, y)))
        },
        _ => a == b,
    }
}

/// Configurable attributes are diffed against the prior state; computed
/// attributes carry over when nothing changed or when they opt in through
/// [`PlanModifier::UseStateForUnknown`], and become unknown otherwise.
fn plan_update(
    schema: &Schema,
    prior: Map<String, Value>,
    mut proposed: Map<String, Value>,
) -> PlanResult {
    let mut changes = Vec::new();
    let mut requires_replace = false;

    let mut names: Vec<_> = schema.block.attributes.keys().collect();
    names.sort();

    for name in &names {
        let attr = &schema.block.attributes[*name];
        if attr.flags.is_computed_only() {
            continue;
        }
        let before = prior.get(*name).cloned().unwrap_or(Value::Null);
        let after = proposed.get(*name).cloned().unwrap_or(Value::Null);
        if same_value(&before, &after) {
            // Keep the stored encoding so `4` and `4.0` plan identically.
            if proposed.contains_key(*name) {
                proposed.insert((*name).clone(), before);
            }
        } else {
            requires_replace |= attr.force_new;
            changes.push(AttributeChange::modified(name.as_str(), before, after));
        }
    }

    if changes.is_empty() {
        for name in &names {
            if schema.block.attributes[*name].flags.is_computed_only() {
                let prior_value = prior.get(*name).cloned().unwrap_or(Value::Null);
                proposed.insert((*name).clone(), prior_value);
            }
        }
        return PlanResult::no_change(Value::Object(proposed));
    }

    for name in &names {
        let attr = &schema.block.attributes[*name];
        if !attr.flags.is_computed_only() {
            continue;
        }
        let prior_value = prior.get(*name).cloned().unwrap_or(Value::Null);
        let keep = attr.has_plan_modifier(PlanModifier::UseStateForUnknown) && !requires_replace;
        if keep {
            proposed.insert((*name).clone(), prior_value);
        } else {
            if !prior_value.is_null() {
                changes.push(AttributeChange::modified(name.as_str(), prior_value, Value::Null));
            }
            proposed.insert((*name).clone(), Value::Null);
        }
    }

    PlanResult::with_changes(Value::Object(proposed), changes, requires_replace)
}

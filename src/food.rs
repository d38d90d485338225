//! The `food` resource.
//!
//! Every lifecycle call decodes the host state into [`FoodResourceModel`],
//! issues the matching remote call(s) through the configured [`FoodApi`]
//! and encodes the result back. Remote failures are reported verbatim and
//! nothing is retried.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::client::{FoodItem, SharedFoodApi};
use crate::resource::{ProviderData, Resource, ResourceResponse};
use crate::schema::{Attribute, Block, Diagnostic, Diagnostics, PlanModifier, Schema};

/// Go's `time.RFC850` layout, e.g. `Monday, 02-Jan-06 15:04:05 UTC`.
const RFC850_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S %Z";

/// One line item as tracked by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodItemModel {
    /// Item name.
    pub name: String,
    /// Item price.
    pub price: f64,
}

impl From<FoodItem> for FoodItemModel {
    fn from(item: FoodItem) -> Self {
        Self {
            name: item.name,
            price: item.price,
        }
    }
}

impl From<&FoodItemModel> for FoodItem {
    fn from(item: &FoodItemModel) -> Self {
        FoodItem::new(item.name.clone(), item.price)
    }
}

/// The state of one `food` resource instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodResourceModel {
    /// Remote identifier; `None` until created or while unknown in a plan.
    pub id: Option<String>,
    /// Ordered line items.
    pub items: Vec<FoodItemModel>,
    /// RFC 850 timestamp of the last create/update.
    pub last_updated: Option<String>,
}

impl FoodResourceModel {
    /// Decode a host state or plan.
    ///
    /// `id` and `last_updated` may be null. `items` is required, may be empty,
    /// and every element needs a string `name` and a numeric `price`.
    pub fn from_value(value: &Value) -> Result<Self, Diagnostics> {
        let mut diags = Diagnostics::new();

        let obj = match value.as_object() {
            Some(obj) => obj,
            None => {
                diags.push(
                    Diagnostic::error("Invalid resource state")
                        .with_detail(format!("Expected an object, got {}", value_kind(value))),
                );
                return Err(diags);
            },
        };

        let id = optional_string(obj, "id", &mut diags);
        let last_updated = optional_string(obj, "last_updated", &mut diags);

        let mut items = Vec::new();
        match obj.get("items") {
            Some(Value::Array(elements)) => {
                for (i, element) in elements.iter().enumerate() {
                    if let Some(item) = decode_item(element, i, &mut diags) {
                        items.push(item);
                    }
                }
            },
            None | Some(Value::Null) => diags.add_attribute_error(
                "items",
                "Missing required attribute 'items'",
                "A food resource must declare its item list, even if empty",
            ),
            Some(other) => diags.add_attribute_error(
                "items",
                "Invalid type for attribute 'items'",
                format!("Expected list, got {}", value_kind(other)),
            ),
        }

        if diags.has_error() {
            return Err(diags);
        }

        Ok(Self {
            id,
            items,
            last_updated,
        })
    }

    /// Encode for the host. Unset values become `null`.
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "items": self
                .items
                .iter()
                .map(|item| json!({"name": item.name, "price": item.price}))
                .collect::<Vec<_>>(),
            "last_updated": self.last_updated,
        })
    }

    /// The items in the API's request shape.
    pub fn api_items(&self) -> Vec<FoodItem> {
        self.items.iter().map(FoodItem::from).collect()
    }
}

fn optional_string(obj: &Map<String, Value>, key: &str, diags: &mut Diagnostics) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            diags.add_attribute_error(
                key,
                format!("Invalid type for attribute '{}'", key),
                format!("Expected string, got {}", value_kind(other)),
            );
            None
        },
    }
}

fn decode_item(value: &Value, index: usize, diags: &mut Diagnostics) -> Option<FoodItemModel> {
    let path = format!("items.{}", index);
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            diags.add_attribute_error(
                path,
                "Invalid item",
                format!("Expected object, got {}", value_kind(value)),
            );
            return None;
        },
    };

    let name = match obj.get("name") {
        Some(Value::String(name)) => Some(name.clone()),
        other => {
            diags.add_attribute_error(
                format!("{}.name", path),
                "Invalid item name",
                format!("Expected string, got {}", other.map(value_kind).unwrap_or("nothing")),
            );
            None
        },
    };

    let price = match obj.get("price").and_then(Value::as_f64) {
        Some(price) => Some(price),
        None => {
            diags.add_attribute_error(
                format!("{}.price", path),
                "Invalid item price",
                format!(
                    "Expected number, got {}",
                    obj.get("price").map(value_kind).unwrap_or("nothing")
                ),
            );
            None
        },
    };

    Some(FoodItemModel {
        name: name?,
        price: price?,
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Format a timestamp the way `last_updated` is stored.
pub fn format_rfc850(time: DateTime<Utc>) -> String {
    time.format(RFC850_FORMAT).to_string()
}

/// The `food` resource adapter.
#[derive(Default)]
pub struct FoodResource {
    client: Option<SharedFoodApi>,
}

impl FoodResource {
    /// Create an unconfigured resource.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resource that already holds a client.
    pub fn with_client(client: SharedFoodApi) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Factory registered with the provider.
    pub fn boxed() -> Box<dyn Resource> {
        Box::new(Self::new())
    }

    /// Whether a client has been injected.
    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&SharedFoodApi, Diagnostics> {
        self.client.as_ref().ok_or_else(|| {
            Diagnostic::error("Unconfigured HashiCups Client")
                .with_detail(
                    "The food resource was called before the provider was configured. \
                     Please report this issue to the provider developers.",
                )
                .into()
        })
    }

    fn decode(value: &Value) -> Result<FoodResourceModel, ResourceResponse> {
        FoodResourceModel::from_value(value).map_err(ResourceResponse::failed)
    }
}

#[async_trait]
impl Resource for FoodResource {
    fn metadata(&self, provider_type_name: &str) -> String {
        format!("{}_food", provider_type_name)
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Manages a HashiCups food order.")
            .with_attribute(
                "id",
                Attribute::computed_string()
                    .with_description("Identifier assigned by HashiCups.")
                    .with_plan_modifier(PlanModifier::UseStateForUnknown),
            )
            .with_attribute(
                "last_updated",
                Attribute::computed_string()
                    .with_description("Timestamp of the last create or update (RFC 850)."),
            )
            .with_attribute(
                "items",
                Attribute::required_list_nested(
                    Block::new()
                        .with_attribute("name", Attribute::required_string())
                        .with_attribute("price", Attribute::required_float64()),
                )
                .with_description("Line items of the order."),
            )
    }

    fn configure(&mut self, provider_data: Option<&ProviderData>) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(data) = provider_data else {
            return diags;
        };

        match data.downcast_ref::<SharedFoodApi>() {
            Some(client) => self.client = Some(client.clone()),
            None => {
                warn!(received = data.type_name(), "Unexpected provider data type");
                diags.add_error(
                    "Unexpected Resource Configure Type",
                    format!(
                        "Expected {}, got: {}. Please report this issue to the provider developers.",
                        std::any::type_name::<SharedFoodApi>(),
                        data.type_name()
                    ),
                );
            },
        }
        diags
    }

    async fn create(&self, plan: &Value) -> ResourceResponse {
        let mut plan = match Self::decode(plan) {
            Ok(plan) => plan,
            Err(resp) => return resp,
        };
        let client = match self.client() {
            Ok(client) => client,
            Err(diags) => return ResourceResponse::failed(diags),
        };

        debug!(items = plan.items.len(), "Creating food");
        let food = match client.create_food(&plan.api_items()).await {
            Ok(food) => food,
            Err(e) => {
                let mut diags = Diagnostics::new();
                diags.add_error(
                    "Error creating food",
                    format!("Could not create food, unexpected error: {}", e),
                );
                return ResourceResponse::failed(diags);
            },
        };

        plan.id = Some(food.id.to_string());
        for (slot, item) in plan.items.iter_mut().zip(food.items) {
            *slot = item.into();
        }
        plan.last_updated = Some(format_rfc850(Utc::now()));

        info!(id = %food.id, "Created food");
        ResourceResponse::with_state(plan.to_value())
    }

    async fn read(&self, state: &Value) -> ResourceResponse {
        let mut state = match Self::decode(state) {
            Ok(state) => state,
            Err(resp) => return resp,
        };
        let client = match self.client() {
            Ok(client) => client,
            Err(diags) => return ResourceResponse::failed(diags),
        };
        let id = state.id.clone().unwrap_or_default();

        debug!(id = %id, "Reading food");
        let food = match client.get_food(&id).await {
            Ok(food) => food,
            Err(e) => {
                let mut diags = Diagnostics::new();
                diags.add_error(
                    "Error Reading HashiCups Food",
                    format!("Could not read HashiCups food ID {}: {}", id, e),
                );
                return ResourceResponse::failed(diags);
            },
        };

        state.items = food.items.into_iter().map(FoodItemModel::from).collect();
        ResourceResponse::with_state(state.to_value())
    }

    async fn update(&self, plan: &Value, prior_state: &Value) -> ResourceResponse {
        let mut plan = match Self::decode(plan) {
            Ok(plan) => plan,
            Err(resp) => return resp,
        };
        let client = match self.client() {
            Ok(client) => client,
            Err(diags) => return ResourceResponse::failed(diags),
        };

        let id = match plan
            .id
            .clone()
            .or_else(|| prior_state.get("id").and_then(Value::as_str).map(str::to_string))
        {
            Some(id) => id,
            None => {
                let mut diags = Diagnostics::new();
                diags.add_attribute_error(
                    "id",
                    "Missing food identifier",
                    "Neither the plan nor the prior state carries the food ID to update",
                );
                return ResourceResponse::failed(diags);
            },
        };

        debug!(id = %id, items = plan.items.len(), "Updating food");
        if let Err(e) = client.update_food(&id, &plan.api_items()).await {
            let mut diags = Diagnostics::new();
            diags.add_error(
                "Error Updating HashiCups Food",
                format!("Could not update food, unexpected error: {}", e),
            );
            return ResourceResponse::failed(diags);
        }

        // The update response does not carry the items; read them back.
        let food = match client.get_food(&id).await {
            Ok(food) => food,
            Err(e) => {
                let mut diags = Diagnostics::new();
                diags.add_error(
                    "Error Reading HashiCups Food",
                    format!("Could not read HashiCups food ID {}: {}", id, e),
                );
                return ResourceResponse::failed(diags);
            },
        };

        plan.id = Some(id);
        plan.items = food.items.into_iter().map(FoodItemModel::from).collect();
        plan.last_updated = Some(format_rfc850(Utc::now()));

        info!(id = ?plan.id, "Updated food");
        ResourceResponse::with_state(plan.to_value())
    }

    async fn delete(&self, state: &Value) -> Diagnostics {
        let state = match FoodResourceModel::from_value(state) {
            Ok(state) => state,
            Err(diags) => return diags,
        };
        let client = match self.client() {
            Ok(client) => client,
            Err(diags) => return diags,
        };
        let id = state.id.unwrap_or_default();

        debug!(id = %id, "Deleting food");
        let mut diags = Diagnostics::new();
        if let Err(e) = client.delete_food(&id).await {
            diags.add_error(
                "Error Deleting HashiCups Food",
                format!("Could not delete food, unexpected error: {}", e),
            );
            return diags;
        }

        info!(id = %id, "Deleted food");
        diags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FoodCall, InMemoryFoodApi};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn configured(api: &Arc<InMemoryFoodApi>) -> FoodResource {
        let shared: SharedFoodApi = api.clone();
        FoodResource::with_client(shared)
    }

    fn burger_and_fries() -> Value {
        json!({
            "id": null,
            "last_updated": null,
            "items": [
                {"name": "Burger", "price": 9.99},
                {"name": "Fries", "price": 3.5}
            ]
        })
    }

    #[test]
    fn test_metadata_appends_food() {
        assert_eq!(FoodResource::new().metadata("hashicups"), "hashicups_food");
    }

    #[test]
    fn test_schema_shape() {
        let schema = FoodResource::new().schema();

        let id = schema.attribute("id").unwrap();
        assert!(id.flags.is_computed_only());
        assert!(id.has_plan_modifier(PlanModifier::UseStateForUnknown));

        let last_updated = schema.attribute("last_updated").unwrap();
        assert!(last_updated.flags.is_computed_only());
        assert!(last_updated.plan_modifiers.is_empty());

        let items = schema.attribute("items").unwrap();
        assert!(items.flags.required);
        let element = items.nested.as_ref().unwrap();
        assert!(element.attributes["name"].flags.required);
        assert!(element.attributes["price"].flags.required);
    }

    #[test]
    fn test_model_round_trip() {
        let model = FoodResourceModel {
            id: Some("42".to_string()),
            items: vec![FoodItemModel {
                name: "Burger".to_string(),
                price: 9.99,
            }],
            last_updated: None,
        };
        let value = model.to_value();
        assert_eq!(value["last_updated"], Value::Null);
        assert_eq!(FoodResourceModel::from_value(&value).unwrap(), model);
    }

    #[test]
    fn test_model_decode_errors_carry_paths() {
        let diags = FoodResourceModel::from_value(&json!({
            "id": 42,
            "items": [{"name": "Burger"}, "Fries"]
        }))
        .unwrap_err();

        let paths: Vec<_> = diags
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(paths, vec!["id", "items.0.price", "items.1"]);
    }

    #[test]
    fn test_model_requires_items() {
        let diags = FoodResourceModel::from_value(&json!({"id": "42"})).unwrap_err();
        assert_eq!(diags.iter().next().unwrap().attribute.as_deref(), Some("items"));

        let diags = FoodResourceModel::from_value(&json!(null)).unwrap_err();
        assert_eq!(diags.iter().next().unwrap().summary, "Invalid resource state");
    }

    #[test]
    fn test_format_rfc850() {
        let time = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(format_rfc850(time), "Monday, 02-Jan-06 15:04:05 UTC");
    }

    #[test]
    fn test_configure_none_is_noop() {
        let mut resource = FoodResource::new();
        let diags = resource.configure(None);
        assert!(diags.is_empty());
        assert!(!resource.is_configured());
    }

    #[test]
    fn test_configure_accepts_shared_client() {
        let shared: SharedFoodApi = Arc::new(InMemoryFoodApi::new());
        let mut resource = FoodResource::new();
        let diags = resource.configure(Some(&ProviderData::new(shared)));
        assert!(diags.is_empty());
        assert!(resource.is_configured());
    }

    #[tokio::test]
    async fn test_configure_wrong_type_reports_received_type() {
        let mut resource = FoodResource::new();
        let diags = resource.configure(Some(&ProviderData::new(String::from("not a client"))));

        assert!(diags.has_error());
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Unexpected Resource Configure Type");
        assert!(diag
            .detail
            .as_deref()
            .unwrap()
            .contains("got: alloc::string::String"));
        assert!(!resource.is_configured());

        let resp = resource.create(&burger_and_fries()).await;
        assert!(resp.state.is_none());
        assert_eq!(
            resp.diagnostics.iter().next().unwrap().summary,
            "Unconfigured HashiCups Client"
        );
        assert!(resource.delete(&json!({"id": "42", "items": []})).await.has_error());
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_timestamp() {
        let api = Arc::new(InMemoryFoodApi::new());
        let resource = configured(&api);

        let resp = resource.create(&burger_and_fries()).await;
        assert!(!resp.diagnostics.has_error());
        let state = resp.state.unwrap();

        assert_eq!(state["id"], "1");
        assert_eq!(state["items"].as_array().unwrap().len(), 2);
        assert_eq!(state["items"][0]["name"], "Burger");
        assert!(state["last_updated"].as_str().unwrap().ends_with("UTC"));
        assert_eq!(api.calls(), vec![FoodCall::Create]);
    }

    #[tokio::test]
    async fn test_create_empty_item_list() {
        let api = Arc::new(InMemoryFoodApi::new());
        let resp = configured(&api).create(&json!({"items": []})).await;
        let state = resp.state.unwrap();
        assert_eq!(state["items"], json!([]));
        assert!(state["id"].is_string());
    }

    #[tokio::test]
    async fn test_create_keeps_planned_length() {
        let api = Arc::new(InMemoryFoodApi::new().with_extra_echo(FoodItem::new("Napkin", 0.0)));
        let resp = configured(&api).create(&burger_and_fries()).await;
        assert_eq!(resp.state.unwrap()["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_failure_returns_no_state() {
        let api = Arc::new(InMemoryFoodApi::new().failing_on(FoodCall::Create));
        let resp = configured(&api).create(&burger_and_fries()).await;

        assert!(resp.state.is_none());
        let diag = resp.diagnostics.iter().next().unwrap();
        assert_eq!(diag.summary, "Error creating food");
        assert!(diag
            .detail
            .as_deref()
            .unwrap()
            .starts_with("Could not create food, unexpected error: "));
    }

    #[tokio::test]
    async fn test_create_decode_failure_skips_remote_call() {
        let api = Arc::new(InMemoryFoodApi::new());
        let resp = configured(&api)
            .create(&json!({"items": [{"name": 7, "price": 1.0}]}))
            .await;

        assert!(resp.diagnostics.has_error());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_replaces_items_wholesale() {
        let api = Arc::new(InMemoryFoodApi::new());
        api.insert(42, vec![FoodItem::new("Latte", 4.25)]);

        let resp = configured(&api)
            .read(&json!({
                "id": "42",
                "last_updated": "Monday, 02-Jan-06 15:04:05 UTC",
                "items": [{"name": "Burger", "price": 9.99}, {"name": "Fries", "price": 3.5}]
            }))
            .await;
        let state = resp.state.unwrap();

        assert_eq!(state["items"], json!([{"name": "Latte", "price": 4.25}]));
        assert_eq!(state["last_updated"], "Monday, 02-Jan-06 15:04:05 UTC");
        assert_eq!(api.calls(), vec![FoodCall::Get("42".to_string())]);
    }

    #[tokio::test]
    async fn test_read_not_found_is_an_error() {
        let api = Arc::new(InMemoryFoodApi::new());
        let resp = configured(&api).read(&json!({"id": "99", "items": []})).await;

        assert!(resp.state.is_none());
        let diag = resp.diagnostics.iter().next().unwrap();
        assert_eq!(diag.summary, "Error Reading HashiCups Food");
        assert!(diag
            .detail
            .as_deref()
            .unwrap()
            .starts_with("Could not read HashiCups food ID 99: "));
    }

    #[tokio::test]
    async fn test_update_reads_back_items() {
        let api = Arc::new(InMemoryFoodApi::new());
        api.insert(42, vec![FoodItem::new("Burger", 9.99)]);

        let resp = configured(&api)
            .update(
                &json!({
                    "id": "42",
                    "last_updated": null,
                    "items": [{"name": "Fries", "price": 4.0}]
                }),
                &json!({"id": "42", "items": [{"name": "Burger", "price": 9.99}]}),
            )
            .await;
        let state = resp.state.unwrap();

        assert_eq!(state["items"], json!([{"name": "Fries", "price": 4.0}]));
        assert!(state["last_updated"].is_string());
        assert_eq!(
            api.calls(),
            vec![
                FoodCall::Update("42".to_string()),
                FoodCall::Get("42".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_update_uses_prior_id_when_plan_id_unknown() {
        let api = Arc::new(InMemoryFoodApi::new());
        api.insert(7, vec![]);

        let resp = configured(&api)
            .update(&json!({"id": null, "items": []}), &json!({"id": "7", "items": []}))
            .await;
        assert_eq!(resp.state.unwrap()["id"], "7");
    }

    #[tokio::test]
    async fn test_update_failure_skips_read_back() {
        let api = Arc::new(InMemoryFoodApi::new().failing_on(FoodCall::Update("42".to_string())));
        api.insert(42, vec![]);

        let resp = configured(&api)
            .update(&json!({"id": "42", "items": []}), &json!({"id": "42", "items": []}))
            .await;

        assert!(resp.state.is_none());
        assert_eq!(
            resp.diagnostics.iter().next().unwrap().summary,
            "Error Updating HashiCups Food"
        );
        assert_eq!(api.calls(), vec![FoodCall::Update("42".to_string())]);
    }

    #[tokio::test]
    async fn test_update_read_back_failure_keeps_remote_mutation() {
        let api = Arc::new(InMemoryFoodApi::new().failing_on(FoodCall::Get("42".to_string())));
        api.insert(42, vec![FoodItem::new("Burger", 9.99)]);

        let resp = configured(&api)
            .update(
                &json!({"id": "42", "items": [{"name": "Fries", "price": 4.0}]}),
                &json!({"id": "42", "items": [{"name": "Burger", "price": 9.99}]}),
            )
            .await;

        assert!(resp.state.is_none());
        assert_eq!(
            resp.diagnostics.iter().next().unwrap().summary,
            "Error Reading HashiCups Food"
        );
        assert_eq!(api.items(42), Some(vec![FoodItem::new("Fries", 4.0)]));
    }

    #[tokio::test]
    async fn test_delete_does_not_read_back() {
        let api = Arc::new(InMemoryFoodApi::new());
        api.insert(42, vec![]);

        let diags = configured(&api).delete(&json!({"id": "42", "items": []})).await;
        assert!(diags.is_empty());
        assert_eq!(api.calls(), vec![FoodCall::Delete("42".to_string())]);
        assert!(api.items(42).is_none());
    }

    #[tokio::test]
    async fn test_delete_failure() {
        let api = Arc::new(InMemoryFoodApi::new().failing_on(FoodCall::Delete("42".to_string())));
        api.insert(42, vec![]);

        let diags = configured(&api).delete(&json!({"id": "42", "items": []})).await;
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Error Deleting HashiCups Food");
        assert!(api.items(42).is_some());
    }
}

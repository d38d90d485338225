//! HashiCups API client.
//!
//! [`FoodApi`] is the narrow interface the food resource depends on.
//! [`HashicupsClient`] implements it over HTTP with reqwest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::ClientError;

/// A single line item of a food order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: f64,
}

impl FoodItem {
    /// Create a new line item.
    pub fn new(name: impl Into<String>, price: f64) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

/// A food record as stored by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    /// Identifier assigned by the API.
    pub id: i64,
    /// Items of the record. The update endpoint may leave this empty.
    #[serde(default)]
    pub items: Vec<FoodItem>,
}

/// Remote operations on food records.
#[async_trait]
pub trait FoodApi: Send + Sync {
    /// Create a record holding `items`.
    async fn create_food(&self, items: &[FoodItem]) -> Result<Food, ClientError>;

    /// Fetch a record by identifier.
    async fn get_food(&self, id: &str) -> Result<Food, ClientError>;

    /// Replace the items of a record.
    async fn update_food(&self, id: &str, items: &[FoodItem]) -> Result<Food, ClientError>;

    /// Delete a record.
    async fn delete_food(&self, id: &str) -> Result<(), ClientError>;
}

/// The client handle shared between the provider and its resources.
pub type SharedFoodApi = Arc<dyn FoodApi>;

/// Settings used to build a [`HashicupsClient`].
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the API.
    pub host: String,
    /// Username and password used to sign in, if any.
    pub credentials: Option<(String, String)>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field(
                "username",
                &self.credentials.as_ref().map(|(username, _)| username),
            )
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct SignInResponse {
    token: String,
}

/// HTTP client for the HashiCups API.
#[derive(Clone)]
pub struct HashicupsClient {
    client: reqwest::Client,
    host: String,
    token: Option<String>,
}

impl fmt::Debug for HashicupsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashicupsClient")
            .field("host", &self.host)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl HashicupsClient {
    /// Build a client, signing in when credentials are configured.
    pub async fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let host = normalize_host(&config.host)?;
        let mut client = Self {
            client: reqwest::Client::new(),
            host,
            token: None,
        };

        if let Some((username, password)) = &config.credentials {
            client.token = Some(client.sign_in(username, password).await?);
        }

        Ok(client)
    }

    /// The normalized base URL requests are sent to.
    pub fn host(&self) -> &str {
        &self.host
    }

    async fn sign_in(&self, username: &str, password: &str) -> Result<String, ClientError> {
        debug!(host = %self.host, username = %username, "Signing in to HashiCups");
        let response = self
            .client
            .post(format!("{}/signin", self.host))
            .json(&SignInRequest { username, password })
            .send()
            .await?;
        let response = check_status(response, "/signin").await?;
        let body: SignInResponse = response.json().await?;
        Ok(body.token)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.host, path));
        if let Some(token) = &self.token {
            req = req.header(reqwest::header::AUTHORIZATION, token);
        }
        req
    }
}

#[async_trait]
impl FoodApi for HashicupsClient {
    async fn create_food(&self, items: &[FoodItem]) -> Result<Food, ClientError> {
        debug!(items = items.len(), "POST /foods");
        let response = self
            .request(reqwest::Method::POST, "/foods")
            .json(items)
            .send()
            .await?;
        let response = check_status(response, "/foods").await?;
        Ok(response.json().await?)
    }

    async fn get_food(&self, id: &str) -> Result<Food, ClientError> {
        let path = format!("/foods/{}", id);
        debug!(%path, "GET");
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let response = check_status(response, &path).await?;
        Ok(response.json().await?)
    }

    async fn update_food(&self, id: &str, items: &[FoodItem]) -> Result<Food, ClientError> {
        let path = format!("/foods/{}", id);
        debug!(%path, items = items.len(), "PUT");
        let response = self
            .request(reqwest::Method::PUT, &path)
            .json(items)
            .send()
            .await?;
        let response = check_status(response, &path).await?;
        Ok(response.json().await?)
    }

    async fn delete_food(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("/foods/{}", id);
        debug!(%path, "DELETE");
        let response = self.request(reqwest::Method::DELETE, &path).send().await?;
        check_status(response, &path).await?;
        Ok(())
    }
}

fn normalize_host(host: &str) -> Result<String, ClientError> {
    let trimmed = host.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ClientError::InvalidUrl(host.to_string()));
    }
    Ok(trimmed.to_string())
}

async fn check_status(
    response: reqwest::Response,
    path: &str,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(path.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("http://localhost:19090/").unwrap(),
            "http://localhost:19090"
        );
        assert_eq!(
            normalize_host(" https://hashicups.example.com ").unwrap(),
            "https://hashicups.example.com"
        );
        assert!(matches!(
            normalize_host("localhost:19090"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_food_deserializes_without_items() {
        let food: Food = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(food.id, 42);
        assert!(food.items.is_empty());
    }

    #[test]
    fn test_item_wire_shape() {
        let json = serde_json::to_value(FoodItem::new("Fries", 3.5)).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Fries", "price": 3.5}));
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ClientConfig {
            host: "http://localhost:19090".to_string(),
            credentials: Some(("education".to_string(), "test123".to_string())),
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("education"));
        assert!(!debug.contains("test123"));
    }
}

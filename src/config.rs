//! Provider configuration.
//!
//! The host sends the provider block as JSON during Configure. Values set in
//! the block win; the `HASHICUPS_*` environment variables fill the gaps.

use serde::Deserialize;
use std::fmt;

use crate::client::ClientConfig;
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostics, Schema};

/// Environment variable holding the API base URL.
pub const HOST_ENV: &str = "HASHICUPS_HOST";
/// Environment variable holding the API username.
pub const USERNAME_ENV: &str = "HASHICUPS_USERNAME";
/// Environment variable holding the API password.
pub const PASSWORD_ENV: &str = "HASHICUPS_PASSWORD";

/// The provider block as sent by the host.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the HashiCups API, e.g. `http://localhost:19090`.
    #[serde(default)]
    pub host: Option<String>,
    /// Username used to sign in.
    #[serde(default)]
    pub username: Option<String>,
    /// Password used to sign in.
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ProviderConfig {
    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Interact with the HashiCups API.")
            .with_attribute(
                "host",
                Attribute::optional_string()
                    .with_description(format!(
                        "URI for the HashiCups API. May also be provided via {HOST_ENV}."
                    )),
            )
            .with_attribute(
                "username",
                Attribute::optional_string()
                    .with_description(format!(
                        "Username for the HashiCups API. May also be provided via {USERNAME_ENV}."
                    )),
            )
            .with_attribute(
                "password",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!(
                        "Password for the HashiCups API. May also be provided via {PASSWORD_ENV}."
                    )),
            )
    }

    /// Decode the provider block. A `null` block is treated as empty.
    pub fn from_value(config: serde_json::Value) -> Result<Self, ProviderError> {
        if config.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(config).map_err(|e| {
            ProviderError::Configuration(format!("invalid provider configuration: {}", e))
        })
    }

    /// Fill unset (or empty) values using `lookup`, keyed by environment variable name.
    pub fn with_fallback<F>(self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |value: Option<String>, key: &str| {
            value
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(key).filter(|v| !v.is_empty()))
        };

        Self {
            host: pick(self.host, HOST_ENV),
            username: pick(self.username, USERNAME_ENV),
            password: pick(self.password, PASSWORD_ENV),
        }
    }

    /// Turn the configuration into client settings.
    ///
    /// The host is mandatory. Credentials are optional but must come as a pair.
    pub fn into_client_config(self) -> Result<ClientConfig, Diagnostics> {
        let mut diags = Diagnostics::new();

        let host = match self.host {
            Some(host) => host,
            None => {
                diags.add_attribute_error(
                    "host",
                    "Missing HashiCups API Host",
                    format!(
                        "The provider cannot create the HashiCups API client as there is a missing or empty value for the HashiCups API host. \
                         Set the host value in the configuration or use the {HOST_ENV} environment variable."
                    ),
                );
                String::new()
            },
        };

        let credentials = match (self.username, self.password) {
            (Some(username), Some(password)) => Some((username, password)),
            (None, None) => None,
            (username, _) => {
                let missing = if username.is_some() { "password" } else { "username" };
                diags.add_attribute_error(
                    missing,
                    "Incomplete HashiCups API Credentials",
                    format!(
                        "Both username and password must be set to sign in to the HashiCups API; {missing} is missing."
                    ),
                );
                None
            },
        };

        if diags.has_error() {
            return Err(diags);
        }

        Ok(ClientConfig { host, credentials })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_value() {
        let config = ProviderConfig::from_value(json!({
            "host": "http://localhost:19090",
            "username": "education",
            "password": "test123"
        }))
        .unwrap();
        assert_eq!(config.host.as_deref(), Some("http://localhost:19090"));
        assert_eq!(config.username.as_deref(), Some("education"));

        let empty = ProviderConfig::from_value(serde_json::Value::Null).unwrap();
        assert_eq!(empty, ProviderConfig::default());
    }

    #[test]
    fn test_from_value_wrong_type() {
        let err = ProviderConfig::from_value(json!({"host": 19090})).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_block_values_win_over_env() {
        let config = ProviderConfig {
            host: Some("http://block:19090".to_string()),
            ..Default::default()
        }
        .with_fallback(env(&[
            (HOST_ENV, "http://env:19090"),
            (USERNAME_ENV, "education"),
        ]));

        assert_eq!(config.host.as_deref(), Some("http://block:19090"));
        assert_eq!(config.username.as_deref(), Some("education"));
        assert!(config.password.is_none());
    }

    #[test]
    fn test_empty_values_fall_back() {
        let config = ProviderConfig {
            host: Some(String::new()),
            ..Default::default()
        }
        .with_fallback(env(&[(HOST_ENV, "http://env:19090")]));

        assert_eq!(config.host.as_deref(), Some("http://env:19090"));
    }

    #[test]
    fn test_missing_host() {
        let diags = ProviderConfig::default().into_client_config().unwrap_err();
        assert_eq!(diags.len(), 1);
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Missing HashiCups API Host");
        assert_eq!(diag.attribute.as_deref(), Some("host"));
    }

    #[test]
    fn test_incomplete_credentials() {
        let diags = ProviderConfig {
            host: Some("http://localhost:19090".to_string()),
            username: Some("education".to_string()),
            password: None,
        }
        .into_client_config()
        .unwrap_err();

        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Incomplete HashiCups API Credentials");
        assert_eq!(diag.attribute.as_deref(), Some("password"));
    }

    #[test]
    fn test_into_client_config() {
        let client = ProviderConfig {
            host: Some("http://localhost:19090".to_string()),
            username: Some("education".to_string()),
            password: Some("test123".to_string()),
        }
        .into_client_config()
        .unwrap();

        assert_eq!(client.host, "http://localhost:19090");
        assert_eq!(
            client.credentials,
            Some(("education".to_string(), "test123".to_string()))
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ProviderConfig {
            password: Some("test123".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("test123"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_schema_marks_password_sensitive() {
        let schema = ProviderConfig::schema();
        assert!(schema.attribute("password").unwrap().flags.sensitive);
        assert!(!schema.attribute("host").unwrap().flags.required);
    }
}

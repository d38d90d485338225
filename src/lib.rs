//! HashiCups provider
//!
//! A provider plugin exposing a single managed resource, `hashicups_food`,
//! backed by the HashiCups HTTP API. The host drives the resource lifecycle
//! (plan, create, read, update, delete) over gRPC; this crate translates each
//! call into requests against the API and reports failures as diagnostics.
//!
//! # Overview
//!
//! - **Resource**: [`FoodResource`] maps the `hashicups_food` state onto the API
//! - **Provider**: [`HashicupsProvider`] builds the API client during Configure
//!   and hands it to every resource instance
//! - **Client**: [`HashicupsClient`] implements [`FoodApi`] over HTTP
//! - **Server helpers**: [`serve`] starts the gRPC server behind the handshake protocol
//! - **Logging**: structured logs via `tracing`, written to stderr
//!
//! # Quick Start
//!
//! ```ignore
//! use hashicups_provider::{init_logging, serve, HashicupsProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     serve(HashicupsProvider::new()).await
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! Once listening, the provider prints a single line to stdout:
//!
//! ```text
//! HASHICUPS_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HASHICUPS_PROVIDER|<protocol_version>|<address>`

#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod food;
pub mod logging;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(clippy::all)]
pub mod generated;

// Re-export main types at crate root
pub use client::{ClientConfig, Food, FoodApi, FoodItem, HashicupsClient, SharedFoodApi};
pub use config::ProviderConfig;
pub use error::{ClientError, ProviderError};
pub use food::{FoodItemModel, FoodResource, FoodResourceModel};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{HashicupsProvider, PROVIDER_TYPE_NAME};
pub use resource::{ProviderData, Resource, ResourceFactory, ResourceResponse};
pub use schema::{Diagnostic, Diagnostics, ProviderSchema};
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use types::{AttributeChange, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION};
pub use validation::{is_valid, validate, validate_result};

//! The contract between the provider and the resources it serves.
//!
//! The provider instantiates a resource for every call, hands it the
//! provider data produced during Configure, and then invokes exactly one
//! lifecycle operation. Failures never escape as panics or errors: every
//! operation returns its diagnostics alongside whatever state it produced.

use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::schema::{Diagnostics, Schema};

/// Opaque value the provider hands to resources at configure time.
///
/// Resources downcast it to the type they expect. The original type name is
/// kept so a mismatch can be reported precisely.
#[derive(Clone)]
pub struct ProviderData {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ProviderData {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the wrapped value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for ProviderData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderData")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Result of a state-producing lifecycle call.
///
/// `state` is only set when the operation succeeded completely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceResponse {
    /// The new state to track, if any.
    pub state: Option<Value>,
    /// Diagnostics produced by the call.
    pub diagnostics: Diagnostics,
}

impl ResourceResponse {
    /// A successful response carrying `state`.
    pub fn with_state(state: Value) -> Self {
        Self {
            state: Some(state),
            diagnostics: Diagnostics::new(),
        }
    }

    /// A failed response carrying only diagnostics.
    pub fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }
}

/// A managed resource type.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Full type name, derived from the provider's type name.
    fn metadata(&self, provider_type_name: &str) -> String;

    /// Attribute schema of the resource.
    fn schema(&self) -> Schema;

    /// Receive the provider data. `None` means the provider is not configured yet.
    fn configure(&mut self, provider_data: Option<&ProviderData>) -> Diagnostics {
        let _ = provider_data;
        Diagnostics::new()
    }

    /// Create the remote object described by `plan`.
    async fn create(&self, plan: &Value) -> ResourceResponse;

    /// Refresh `state` from the remote object.
    async fn read(&self, state: &Value) -> ResourceResponse;

    /// Apply `plan` to the remote object currently described by `prior_state`.
    async fn update(&self, plan: &Value, prior_state: &Value) -> ResourceResponse;

    /// Delete the remote object described by `state`.
    async fn delete(&self, state: &Value) -> Diagnostics;
}

/// Constructor registered with the provider for each resource type.
pub type ResourceFactory = fn() -> Box<dyn Resource>;

//! Server helpers for running the provider.
//!
//! This module defines the [`ProviderService`] trait the provider implements
//! and the `serve` functions that expose it over gRPC behind the handshake
//! protocol.
//!
//! # Signal Handling
//!
//! The server handles SIGTERM and SIGINT for graceful shutdown. When a signal
//! is received, the server:
//! 1. Stops accepting new connections
//! 2. Waits for in-flight requests to complete (bounded by [`ServeOptions::shutdown_timeout`])
//! 3. Calls the provider's `stop()` method

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated::{self as pb, provider_server::Provider, provider_server::ProviderServer};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION};

/// Operations the host drives through the plugin protocol.
///
/// States and configurations travel as JSON values; failures are reported as
/// [`ProviderError`], with [`ProviderError::Diagnostics`] carrying the
/// user-facing diagnostics of a failed operation.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return the resource type names. Derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        let mut resources: Vec<String> = self.schema().resources.into_keys().collect();
        resources.sort();
        ProviderMetadata { resources }
    }

    /// Configure the provider. Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Check a resource block against its schema.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource. `prior_state` is `None` on create and a
    /// `null` `proposed_state` means destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value)
        -> Result<Value, ProviderError>;

    /// Refresh a resource from the remote API.
    async fn read(&self, resource_type: &str, current_state: Value)
        -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;
}

/// Adapts a [`ProviderService`] to the generated `Provider` server trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

fn diagnostic_to_proto(d: Diagnostic) -> pb::Diagnostic {
    pb::Diagnostic {
        severity: match d.severity {
            DiagnosticSeverity::Error => pb::diagnostic::Severity::Error as i32,
            DiagnosticSeverity::Warning => pb::diagnostic::Severity::Warning as i32,
        },
        summary: d.summary,
        detail: d.detail.unwrap_or_default(),
        attribute: d.attribute.unwrap_or_default(),
    }
}

fn diagnostics_to_proto(
    diagnostics: impl IntoIterator<Item = Diagnostic>,
) -> Vec<pb::Diagnostic> {
    diagnostics.into_iter().map(diagnostic_to_proto).collect()
}

/// Diagnostics carried by an error are forwarded as-is; any other error
/// becomes a single error diagnostic.
fn error_to_diagnostics(err: ProviderError) -> Vec<pb::Diagnostic> {
    match err {
        ProviderError::Diagnostics(diags) => diagnostics_to_proto(diags),
        other => vec![diagnostic_to_proto(Diagnostic::error(other.to_string()))],
    }
}

fn schema_to_proto(schema: &crate::schema::Schema) -> pb::Schema {
    pb::Schema {
        version: schema.version as i64,
        block: Some(block_to_proto(&schema.block)),
    }
}

fn block_to_proto(block: &crate::schema::Block) -> pb::Block {
    let mut attributes: Vec<_> = block
        .attributes
        .iter()
        .map(|(name, attr)| pb::Attribute {
            name: name.clone(),
            r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
            required: attr.flags.required,
            optional: attr.flags.optional,
            computed: attr.flags.computed,
            sensitive: attr.flags.sensitive,
            description: attr.description.clone().unwrap_or_default(),
            force_new: attr.force_new,
            plan_modifiers: attr
                .plan_modifiers
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
            nested: attr.nested.as_ref().map(block_to_proto),
        })
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    pb::Block {
        attributes,
        description: block.description.clone().unwrap_or_default(),
    }
}

/// Decode a JSON payload. An empty payload is `null`.
fn decode_json(bytes: &[u8], field: &str) -> Result<Value, ProviderError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::InvalidRequest(format!("{} is not valid JSON: {}", field, e)))
}

type PlanInputs = (Option<Value>, Value, Value);

fn decode_plan_request(req: &pb::PlanRequest) -> Result<PlanInputs, ProviderError> {
    let prior_state = if req.prior_state.is_empty() {
        None
    } else {
        Some(decode_json(&req.prior_state, "prior_state")?)
    };
    let proposed_state = decode_json(&req.proposed_state, "proposed_state")?;
    let config = decode_json(&req.config, "config")?;
    Ok((prior_state, proposed_state, config))
}

fn encode_json(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn log_diagnostics(operation: &str, diagnostics: &[Diagnostic]) {
    if diagnostics.iter().any(Diagnostic::is_error) {
        warn!(operation, diagnostics = diagnostics.len(), "finished with errors");
    } else {
        info!(operation, "finished");
    }
}

#[tonic::async_trait]
impl<P: ProviderService> Provider for ProviderGrpcService<P> {
    #[instrument(skip(self, _request), name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<pb::GetMetadataRequest>,
    ) -> Result<tonic::Response<pb::GetMetadataResponse>, tonic::Status> {
        debug!("metadata requested");
        let metadata = self.provider.metadata();
        info!(resources = metadata.resources.len(), "GetMetadata completed");
        Ok(tonic::Response::new(
            pb::GetMetadataResponse {
                resources: metadata.resources,
                diagnostics: vec![],
            },
        ))
    }

    #[instrument(skip(self, _request), name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<pb::GetSchemaRequest>,
    ) -> Result<tonic::Response<pb::GetSchemaResponse>, tonic::Status> {
        debug!("schema requested");
        let schema = self.provider.schema();
        info!(resources = schema.resources.len(), "GetSchema completed");
        Ok(tonic::Response::new(pb::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, request), name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<pb::ConfigureRequest>,
    ) -> Result<tonic::Response<pb::ConfigureResponse>, tonic::Status> {
        debug!("configuring provider");
        let req = request.into_inner();
        let result = match decode_json(&req.config, "config") {
            Ok(config) => self.provider.configure(config).await,
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("Configure", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "configure failed");
                error_to_diagnostics(e)
            },
        };
        Ok(tonic::Response::new(pb::ConfigureResponse {
            diagnostics,
        }))
    }

    #[instrument(skip(self, _request), name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<pb::StopRequest>,
    ) -> Result<tonic::Response<pb::StopResponse>, tonic::Status> {
        info!("stop requested");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                error!(error = %e, "stop failed");
                e.to_string()
            },
        };
        Ok(tonic::Response::new(pb::StopResponse { error }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<pb::ValidateResourceConfigRequest>,
    ) -> Result<tonic::Response<pb::ValidateResourceConfigResponse>, tonic::Status>
    {
        let req = request.into_inner();
        debug!(resource = %req.resource_type, "validating resource config");
        let result = match decode_json(&req.config, "config") {
            Ok(config) => {
                self.provider
                    .validate_resource_config(&req.resource_type, config)
                    .await
            },
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(diagnostics) => {
                log_diagnostics("ValidateResourceConfig", &diagnostics);
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(
                    resource = %req.resource_type,
                    error = %e,
                    "resource config validation failed"
                );
                error_to_diagnostics(e)
            },
        };
        Ok(tonic::Response::new(
            pb::ValidateResourceConfigResponse { diagnostics },
        ))
    }

    #[instrument(skip(self, request), name = "grpc.plan")]
    async fn plan(
        &self,
        request: tonic::Request<pb::PlanRequest>,
    ) -> Result<tonic::Response<pb::PlanResponse>, tonic::Status> {
        let req = request.into_inner();
        let is_create = req.prior_state.is_empty();
        debug!(resource = %req.resource_type, is_create = is_create, "planning");

        let result = match decode_plan_request(&req) {
            Ok((prior_state, proposed_state, config)) => {
                self.provider
                    .plan(&req.resource_type, prior_state, proposed_state, config)
                    .await
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(result) => {
                info!(
                    resource = %req.resource_type,
                    changes = result.changes.len(),
                    requires_replace = result.requires_replace,
                    "Plan completed"
                );
                Ok(tonic::Response::new(pb::PlanResponse {
                    planned_state: encode_json(&result.planned_state),
                    changes: result.changes.into_iter().map(Into::into).collect(),
                    requires_replace: result.requires_replace,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource = %req.resource_type, error = %e, "plan failed");
                Ok(tonic::Response::new(pb::PlanResponse {
                    planned_state: vec![],
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_to_diagnostics(e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.create")]
    async fn create(
        &self,
        request: tonic::Request<pb::CreateRequest>,
    ) -> Result<tonic::Response<pb::CreateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource = %req.resource_type, "create requested");
        let result = match decode_json(&req.planned_state, "planned_state") {
            Ok(planned_state) => self.provider.create(&req.resource_type, planned_state).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => {
                info!(resource = %req.resource_type, "create finished");
                Ok(tonic::Response::new(pb::CreateResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource = %req.resource_type, error = %e, "create failed");
                Ok(tonic::Response::new(pb::CreateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.read")]
    async fn read(
        &self,
        request: tonic::Request<pb::ReadRequest>,
    ) -> Result<tonic::Response<pb::ReadResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource = %req.resource_type, "read requested");
        let result = match decode_json(&req.current_state, "current_state") {
            Ok(current_state) => self.provider.read(&req.resource_type, current_state).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => {
                debug!(resource = %req.resource_type, "read finished");
                Ok(tonic::Response::new(pb::ReadResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource = %req.resource_type, error = %e, "read failed");
                Ok(tonic::Response::new(pb::ReadResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.update")]
    async fn update(
        &self,
        request: tonic::Request<pb::UpdateRequest>,
    ) -> Result<tonic::Response<pb::UpdateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource = %req.resource_type, "update requested");
        let decoded = decode_json(&req.prior_state, "prior_state").and_then(|prior| {
            Ok((prior, decode_json(&req.planned_state, "planned_state")?))
        });
        let result = match decoded {
            Ok((prior_state, planned_state)) => {
                self.provider
                    .update(&req.resource_type, prior_state, planned_state)
                    .await
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => {
                info!(resource = %req.resource_type, "update finished");
                Ok(tonic::Response::new(pb::UpdateResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource = %req.resource_type, error = %e, "update failed");
                Ok(tonic::Response::new(pb::UpdateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.delete")]
    async fn delete(
        &self,
        request: tonic::Request<pb::DeleteRequest>,
    ) -> Result<tonic::Response<pb::DeleteResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource = %req.resource_type, "delete requested");
        let result = match decode_json(&req.current_state, "current_state") {
            Ok(current_state) => self.provider.delete(&req.resource_type, current_state).await,
            Err(e) => Err(e),
        };

        let diagnostics = match result {
            Ok(()) => {
                info!(resource = %req.resource_type, "delete finished");
                vec![]
            },
            Err(e) => {
                error!(resource = %req.resource_type, error = %e, "delete failed");
                error_to_diagnostics(e)
            },
        };
        Ok(tonic::Response::new(pb::DeleteResponse {
            diagnostics,
        }))
    }
}

/// Server tuning.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long to wait for in-flight requests after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Options with a 30 second shutdown timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for SIGTERM or SIGINT (CTRL+C on Windows).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                    _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Failed to install signal handlers");
                std::future::pending::<()>().await;
            },
        }
    }

    #[cfg(windows)]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL+C, initiating graceful shutdown"),
            Err(e) => {
                error!(error = %e, "Failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            },
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::future::pending::<()>().await;
    }
}

/// Run `provider` on an ephemeral localhost port until shutdown.
///
/// Binds an ephemeral port on localhost, prints the handshake
/// `HASHICUPS_PROVIDER|<version>|<address>` to stdout and serves until a
/// shutdown signal arrives.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options. See [`serve`].
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    serve_on_listener(provider, listener, addr, options).await
}

/// Run `provider` on `addr`.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

/// Run `provider` on `addr` with custom options.
pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    serve_on_listener(provider, listener, actual_addr, options).await
}

/// Format the line printed on stdout once the server is listening.
pub fn handshake_line(addr: SocketAddr) -> String {
    format!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr)
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", handshake_line(addr));
    serve_until(provider, listener, options, wait_for_shutdown_signal()).await
}

/// Serve on `listener` until `shutdown` resolves, then give in-flight
/// requests up to `options.shutdown_timeout` to finish.
async fn serve_until<P, F>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: ProviderService,
    F: Future<Output = ()> + Send + 'static,
{
    info!(address = ?listener.local_addr().ok(), "listening");

    let provider = Arc::new(provider);
    let grpc_service = ProviderGrpcService {
        provider: Arc::clone(&provider),
    };

    let (draining_tx, draining_rx) = oneshot::channel::<()>();
    let signal = async move {
        shutdown.await;
        let _ = draining_tx.send(());
    };

    let server_future = Server::builder()
        .add_service(ProviderServer::new(grpc_service))
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            signal,
        );
    tokio::pin!(server_future);

    // The drain deadline only starts once shutdown has been requested.
    let outcome = tokio::select! {
        biased;
        result = &mut server_future => Some(result),
        _ = draining_rx => {
            tokio::time::timeout(options.shutdown_timeout, &mut server_future)
                .await
                .ok()
        },
    };

    match outcome {
        Some(Ok(())) => info!("server stopped"),
        Some(Err(e)) => {
            error!(error = %e, "server error during shutdown");
            return Err(e.into());
        },
        None => warn!(
            timeout = ?options.shutdown_timeout,
            "graceful shutdown timed out"
        ),
    }

    debug!("calling provider stop");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "provider stop failed");
    }

    info!("provider stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HashicupsProvider;
    use crate::client::SharedFoodApi;
    use crate::testing::InMemoryFoodApi;
    use serde_json::json;

    fn service() -> ProviderGrpcService<HashicupsProvider> {
        let api: SharedFoodApi = Arc::new(InMemoryFoodApi::new());
        ProviderGrpcService {
            provider: Arc::new(HashicupsProvider::with_client(api)),
        }
    }

    #[test]
    fn test_handshake_line() {
        let addr: SocketAddr = "127.0.0.1:50051".parse().unwrap();
        assert_eq!(handshake_line(addr), "HASHICUPS_PROVIDER|1|127.0.0.1:50051");
    }

    #[test]
    fn test_serve_options_default_timeout() {
        assert_eq!(ServeOptions::new().shutdown_timeout, Duration::from_secs(30));
        let options = ServeOptions::new().with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_error_to_diagnostics_expands_diagnostics() {
        let mut diags = crate::schema::Diagnostics::new();
        diags.add_error("Error creating food", "boom");
        diags.push(Diagnostic::warning("careful"));

        let proto = error_to_diagnostics(ProviderError::Diagnostics(diags));
        assert_eq!(proto.len(), 2);
        assert_eq!(proto[0].summary, "Error creating food");
        assert_eq!(proto[0].detail, "boom");
        assert_eq!(
            proto[1].severity,
            crate::generated::diagnostic::Severity::Warning as i32
        );

        let proto = error_to_diagnostics(ProviderError::UnknownResource("x".into()));
        assert_eq!(proto.len(), 1);
        assert_eq!(proto[0].summary, "Unknown resource type: x");
    }

    #[test]
    fn test_decode_json() {
        assert_eq!(decode_json(b"", "state").unwrap(), Value::Null);
        assert_eq!(decode_json(b"{\"a\":1}", "state").unwrap(), json!({"a": 1}));
        assert!(matches!(
            decode_json(b"{", "state"),
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_get_schema_includes_nested_items() {
        let resp = service()
            .get_schema(tonic::Request::new(crate::generated::GetSchemaRequest {}))
            .await
            .unwrap()
            .into_inner();

        let food = &resp.resources["hashicups_food"];
        let block = food.block.as_ref().unwrap();
        let names: Vec<_> = block.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "items", "last_updated"]);

        let id = &block.attributes[0];
        assert_eq!(id.plan_modifiers, vec!["use_state_for_unknown".to_string()]);

        let items = &block.attributes[1];
        let nested = items.nested.as_ref().unwrap();
        assert_eq!(nested.attributes.len(), 2);
        assert!(resp.provider.is_some());
    }

    #[tokio::test]
    async fn test_get_metadata_lists_food() {
        let resp = service()
            .get_metadata(tonic::Request::new(crate::generated::GetMetadataRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.resources, vec!["hashicups_food".to_string()]);
    }

    #[tokio::test]
    async fn test_create_over_grpc() {
        let resp = service()
            .create(tonic::Request::new(crate::generated::CreateRequest {
                resource_type: "hashicups_food".to_string(),
                planned_state: serde_json::to_vec(&json!({
                    "id": null,
                    "last_updated": null,
                    "items": [{"name": "Burger", "price": 9.99}]
                }))
                .unwrap(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(resp.diagnostics.is_empty());
        let state: Value = serde_json::from_slice(&resp.state).unwrap();
        assert_eq!(state["id"], "1");
    }

    #[tokio::test]
    async fn test_read_failure_becomes_diagnostics() {
        let resp = service()
            .read(tonic::Request::new(crate::generated::ReadRequest {
                resource_type: "hashicups_food".to_string(),
                current_state: serde_json::to_vec(&json!({"id": "404", "items": []})).unwrap(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(resp.state.is_empty());
        assert_eq!(resp.diagnostics.len(), 1);
        assert_eq!(resp.diagnostics[0].summary, "Error Reading HashiCups Food");
    }

    #[tokio::test]
    async fn test_invalid_json_is_reported() {
        let resp = service()
            .delete(tonic::Request::new(crate::generated::DeleteRequest {
                resource_type: "hashicups_food".to_string(),
                current_state: b"not json".to_vec(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(resp.diagnostics.len(), 1);
        assert!(resp.diagnostics[0].summary.starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn test_stop_returns_empty_error() {
        let resp = service()
            .stop(tonic::Request::new(crate::generated::StopRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.error.is_empty());
    }

    #[tokio::test]
    async fn test_server_outlives_shutdown_timeout_without_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let options = ServeOptions::new().with_shutdown_timeout(Duration::from_millis(100));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            serve_until(HashicupsProvider::new(), listener, options, async {
                let _ = stop_rx.await;
            })
            .await
            .map_err(|e| e.to_string())
        });

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!handle.is_finished());
        tokio::net::TcpStream::connect(addr).await.unwrap();

        stop_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}

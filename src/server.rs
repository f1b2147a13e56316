//! Server helpers for running the provider.
//!
//! [`serve`] binds a local TCP port, prints the handshake line on stdout and
//! answers framed [`Request`]s from the host on every accepted connection.
//!
//! # Signal Handling
//!
//! SIGTERM and SIGINT stop the accept loop. Connections still in flight get
//! [`ServeOptions::shutdown_timeout`] to finish, then the provider's `stop()`
//! is called and the server returns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::protocol::{self, ProtocolError, Request, Response, DEFAULT_TIMEOUT};
use crate::schema::{has_errors, Diagnostic};
use crate::service::ProviderService;
use crate::types::{HANDSHAKE_PREFIX, PROTOCOL_VERSION};

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// After a shutdown signal, how long in-flight connections may keep
    /// running. Default: 30 seconds.
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
    /// Create new serve options with default values.
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
///
/// If a handler cannot be installed the failure is logged and this waits
/// on the remaining signal only.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate());
        let sigint = signal(SignalKind::interrupt());
        match (sigterm, sigint) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                    _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
                }
            }
            (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
                warn!(error = %e, "Failed to install a signal handler");
                only.recv().await;
                info!("Received shutdown signal");
            }
            (Err(e), Err(_)) => {
                warn!(error = %e, "Failed to install signal handlers; waiting forever");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(windows)]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL+C, initiating graceful shutdown"),
            Err(e) => {
                warn!(error = %e, "Failed to install CTRL+C handler; waiting forever");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::future::pending::<()>().await;
    }
}

/// Serve a provider on an ephemeral localhost port.
///
/// Prints `CIRCLECI_PROVIDER|<version>|<address>` on stdout once the port
/// is bound, then serves until a shutdown signal arrives.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options. See [`serve`].
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_on_listener(provider, listener, options, wait_for_shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// Exposed so tests and embedders can supply their own listener and
/// shutdown trigger.
pub async fn serve_on_listener<P, F>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: ProviderService,
    F: std::future::Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    println!("{}", handshake_line(addr));

    info!(address = %addr, "Provider server starting");

    let provider = Arc::new(provider);
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted connection");
                    let provider = Arc::clone(&provider);
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(provider.as_ref(), stream).await {
                            warn!(peer = %peer, error = %e, "Connection ended with error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "Error accepting connection"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(options.shutdown_timeout, drain).await.is_err() {
        warn!(
            timeout = ?options.shutdown_timeout,
            "Shutdown timeout exceeded, aborting open connections"
        );
        connections.abort_all();
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}

/// The line printed on stdout once the server is listening.
pub fn handshake_line(addr: SocketAddr) -> String {
    format!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr)
}

/// Answer requests on one connection until the host closes it.
pub async fn handle_connection<P: ProviderService + ?Sized>(
    provider: &P,
    stream: TcpStream,
) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let response = match protocol::read_request(&mut reader).await {
            Ok(request) => handle_request(provider, request).await,
            Err(ProtocolError::ConnectionClosed) => {
                debug!("Host closed connection");
                return Ok(());
            }
            Err(ProtocolError::Json(e)) => {
                warn!(error = %e, "Undecodable request");
                failure(ProviderError::Protocol(e.to_string()))
            }
            Err(e) => return Err(e),
        };
        respond(&mut writer, &response).await?;
    }
}

/// Write `response`. One too large for a frame is replaced by an error
/// response so the host is not left waiting.
async fn respond<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<(), ProtocolError> {
    match protocol::write_response(writer, response, DEFAULT_TIMEOUT).await {
        Err(ProtocolError::MessageTooLarge { size, max }) => {
            warn!(size, max, "Response exceeds frame limit");
            let err = ProviderError::Protocol(format!(
                "response of {} bytes exceeds the {} byte frame limit",
                size, max
            ));
            protocol::write_response(writer, &failure(err), DEFAULT_TIMEOUT).await
        }
        other => other,
    }
}

fn failure(err: ProviderError) -> Response {
    Response::Error {
        diagnostics: vec![err.to_diagnostic()],
    }
}

fn diagnostics(operation: &str, diagnostics: Vec<Diagnostic>) -> Response {
    if has_errors(&diagnostics) {
        warn!(operation, diagnostics = diagnostics.len(), "Completed with errors");
    } else {
        info!(operation, "Completed successfully");
    }
    Response::Diagnostics { diagnostics }
}

fn state(operation: &str, result: Result<serde_json::Value, ProviderError>) -> Response {
    state_with_warnings(operation, result.map(|state| (state, Vec::new())))
}

fn state_with_warnings(
    operation: &str,
    result: Result<(serde_json::Value, Vec<Diagnostic>), ProviderError>,
) -> Response {
    match result {
        Ok((state, diagnostics)) => {
            info!(operation, warnings = diagnostics.len(), "Completed successfully");
            Response::State { state, diagnostics }
        }
        Err(e) => {
            error!(operation, error = %e, "Operation failed");
            failure(e)
        }
    }
}

fn checked(operation: &str, result: Result<Vec<Diagnostic>, ProviderError>) -> Response {
    match result {
        Ok(diags) => diagnostics(operation, diags),
        Err(e) => {
            error!(operation, error = %e, "Operation failed");
            failure(e)
        }
    }
}

/// Dispatch one request to the provider.
#[instrument(skip(provider, request), name = "provider.request")]
pub async fn handle_request<P: ProviderService + ?Sized>(provider: &P, request: Request) -> Response {
    match request {
        Request::GetMetadata => Response::Metadata {
            metadata: provider.metadata(),
        },
        Request::GetSchema => Response::Schema {
            schema: provider.schema(),
        },
        Request::ValidateProviderConfig { config } => checked(
            "validate_provider_config",
            provider.validate_provider_config(config).await,
        ),
        Request::Configure { config } => checked("configure", provider.configure(config).await),
        Request::Stop => match provider.stop().await {
            Ok(()) => Response::Stopped,
            Err(e) => failure(e),
        },
        Request::ValidateResourceConfig {
            resource_type,
            config,
        } => {
            debug!(resource_type = %resource_type, "ValidateResourceConfig called");
            checked(
                "validate_resource_config",
                provider.validate_resource_config(&resource_type, config).await,
            )
        }
        Request::UpgradeResourceState {
            resource_type,
            version,
            state: raw,
        } => state(
            "upgrade_resource_state",
            provider.upgrade_resource_state(&resource_type, version, raw).await,
        ),
        Request::Plan {
            resource_type,
            prior_state,
            proposed_state,
            config,
        } => {
            debug!(resource_type = %resource_type, "Plan called");
            match provider
                .plan(&resource_type, prior_state, proposed_state, config)
                .await
            {
                Ok(plan) => {
                    info!(
                        resource_type = %resource_type,
                        changes = plan.changes.len(),
                        requires_replace = plan.requires_replace,
                        "Plan completed"
                    );
                    Response::Plan { plan }
                }
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "Plan failed");
                    failure(e)
                }
            }
        }
        Request::Create {
            resource_type,
            planned_state,
        } => state("create", provider.create(&resource_type, planned_state).await),
        Request::Read {
            resource_type,
            current_state,
        } => state("read", provider.read(&resource_type, current_state).await),
        Request::Update {
            resource_type,
            prior_state,
            planned_state,
        } => state_with_warnings(
            "update",
            provider.update(&resource_type, prior_state, planned_state).await,
        ),
        Request::Delete {
            resource_type,
            current_state,
        } => checked("delete", provider.delete(&resource_type, current_state).await),
        Request::ImportResource { resource_type, id } => {
            match provider.import_resource(&resource_type, &id).await {
                Ok(resources) => {
                    info!(resource_type = %resource_type, count = resources.len(), "Import completed");
                    Response::Imported { resources }
                }
                Err(e) => {
                    error!(resource_type = %resource_type, error = %e, "Import failed");
                    failure(e)
                }
            }
        }
        Request::ValidateDataSourceConfig {
            data_source_type,
            config,
        } => checked(
            "validate_data_source_config",
            provider
                .validate_data_source_config(&data_source_type, config)
                .await,
        ),
        Request::ReadDataSource {
            data_source_type,
            config,
        } => state(
            "read_data_source",
            provider.read_data_source(&data_source_type, config).await,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, ProviderSchema, Schema};
    use crate::types::PlanResult;
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct EchoProvider;

    #[async_trait::async_trait]
    impl ProviderService for EchoProvider {
        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new().with_resource(
                "circleci_context",
                Schema::v0().with_attribute("name", Attribute::required_string()),
            )
        }

        async fn configure(&self, _config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
            Ok(vec![Diagnostic::warning("configured")])
        }

        async fn plan(
            &self,
            _resource_type: &str,
            _prior_state: Option<Value>,
            proposed_state: Value,
            _config: Value,
        ) -> Result<PlanResult, ProviderError> {
            Ok(PlanResult::no_change(proposed_state))
        }

        async fn create(&self, _resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
            Ok(planned_state)
        }

        async fn read(&self, _resource_type: &str, _current_state: Value) -> Result<Value, ProviderError> {
            Ok(Value::Null)
        }

        async fn update(
            &self,
            _resource_type: &str,
            _prior_state: Value,
            planned_state: Value,
        ) -> Result<(Value, Vec<Diagnostic>), ProviderError> {
            if planned_state["name"] == "renamed" {
                return Ok((planned_state, vec![Diagnostic::warning("Renamed")]));
            }
            Err(ProviderError::Unimplemented("no updates".to_string()))
        }

        async fn delete(
            &self,
            _resource_type: &str,
            _current_state: Value,
        ) -> Result<Vec<Diagnostic>, ProviderError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_handshake_line() {
        let addr: SocketAddr = "127.0.0.1:50051".parse().unwrap();
        assert_eq!(handshake_line(addr), "CIRCLECI_PROVIDER|1|127.0.0.1:50051");
    }

    #[test]
    fn test_serve_options_default() {
        assert_eq!(ServeOptions::new().shutdown_timeout, Duration::from_secs(30));
        let custom = ServeOptions::new().with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(custom.shutdown_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_handle_request_maps_results() {
        let provider = EchoProvider;

        match handle_request(&provider, Request::GetMetadata).await {
            Response::Metadata { metadata } => {
                assert_eq!(metadata.resources, vec!["circleci_context".to_string()]);
                assert_eq!(metadata.type_name, "circleci");
            }
            other => panic!("unexpected response {:?}", other),
        }

        let configured = handle_request(&provider, Request::Configure { config: json!({}) }).await;
        assert!(matches!(configured, Response::Diagnostics { ref diagnostics } if diagnostics.len() == 1));

        let updated = handle_request(
            &provider,
            Request::Update {
                resource_type: "circleci_context".to_string(),
                prior_state: json!({}),
                planned_state: json!({}),
            },
        )
        .await;
        match updated {
            Response::Error { diagnostics } => {
                assert_eq!(diagnostics[0].summary, "Update Not Supported");
            }
            other => panic!("unexpected response {:?}", other),
        }

        let renamed = handle_request(
            &provider,
            Request::Update {
                resource_type: "circleci_context".to_string(),
                prior_state: json!({"name": "deploy"}),
                planned_state: json!({"name": "renamed"}),
            },
        )
        .await;
        match renamed {
            Response::State { state, diagnostics } => {
                assert_eq!(state, json!({"name": "renamed"}));
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].summary, "Renamed");
                assert!(!diagnostics[0].is_error());
            }
            other => panic!("unexpected response {:?}", other),
        }

        let unknown = handle_request(
            &provider,
            Request::ReadDataSource {
                data_source_type: "circleci_nothing".to_string(),
                config: json!({}),
            },
        )
        .await;
        assert!(matches!(unknown, Response::Error { .. }));
    }

    #[tokio::test]
    async fn test_connection_serves_until_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_connection(&EchoProvider, stream).await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        for request in [
            Request::Create {
                resource_type: "circleci_context".to_string(),
                planned_state: json!({"name": "deploy"}),
            },
            Request::Read {
                resource_type: "circleci_context".to_string(),
                current_state: json!({"name": "deploy"}),
            },
        ] {
            let body = protocol::encode(&request).unwrap();
            protocol::write_message(&mut client, &body).await.unwrap();
        }

        let first: Response = protocol::decode(&protocol::read_message(&mut client).await.unwrap()).unwrap();
        assert_eq!(
            first,
            Response::State {
                state: json!({"name": "deploy"}),
                diagnostics: vec![],
            }
        );
        let second: Response = protocol::decode(&protocol::read_message(&mut client).await.unwrap()).unwrap();
        assert_eq!(
            second,
            Response::State {
                state: Value::Null,
                diagnostics: vec![],
            }
        );

        // Garbage body gets an error response, not a dropped connection.
        protocol::write_message(&mut client, b"not json").await.unwrap();
        let third: Response = protocol::decode(&protocol::read_message(&mut client).await.unwrap()).unwrap();
        match third {
            Response::Error { diagnostics } => assert_eq!(diagnostics[0].summary, "Protocol Error"),
            other => panic!("unexpected response {:?}", other),
        }

        client.shutdown().await.unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_oversized_response_becomes_error() {
        let huge = Response::State {
            state: Value::String("x".repeat(protocol::MAX_MESSAGE_SIZE)),
            diagnostics: vec![],
        };
        let mut buffer = Vec::new();
        respond(&mut buffer, &huge).await.unwrap();

        let mut cursor = std::io::Cursor::new(buffer);
        let sent: Response = protocol::decode(&protocol::read_message(&mut cursor).await.unwrap()).unwrap();
        match sent {
            Response::Error { diagnostics } => {
                assert_eq!(diagnostics[0].summary, "Protocol Error");
                assert!(diagnostics[0].detail.as_deref().unwrap_or("").contains("frame limit"));
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert!(matches!(
            protocol::read_message(&mut cursor).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_serve_on_listener_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();

        let result = serve_on_listener(
            EchoProvider,
            listener,
            ServeOptions::new().with_shutdown_timeout(Duration::from_millis(100)),
            async move {
                let _ = rx.await;
            },
        )
        .await;
        assert!(result.is_ok());
    }
}

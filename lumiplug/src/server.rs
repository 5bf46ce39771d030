//! Server module for running provider plugins
//!
//! This module starts a provider's gRPC server on a loopback port and prints
//! the handshake line the host waits for.

use crate::error::Result;
use crate::logging::{init_logging, LogLevel};
use crate::plugin::PROTOCOL_VERSION;
use crate::proto::ResourceProviderServer;
use crate::provider::ResourceProvider;
use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// Server configuration for running a provider plugin
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Whether to install a stderr subscriber
    pub enable_logging: bool,
    /// Log level
    pub log_level: LogLevel,
    /// Timeout for graceful shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_size: 256 << 20, // 256MB
            enable_logging: true,
            log_level: LogLevel::Info,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Disable logging
    pub fn without_logging(mut self) -> Self {
        self.enable_logging = false;
        self
    }

    /// Set the log level
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Handshake line announcing `addr` to the host
pub fn handshake_line(addr: std::net::SocketAddr) -> String {
    format!("{}|tcp|{}|grpc", PROTOCOL_VERSION, addr)
}

/// Main entry point for running a provider
///
/// Binds a loopback port, prints the handshake on stdout and serves until
/// ctrl-c. In-flight calls then get up to `shutdown_timeout` to finish.
pub async fn serve(provider: ResourceProvider, config: ServerConfig) -> Result<()> {
    if config.enable_logging {
        init_logging(config.log_level);
    }

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", handshake_line(addr))?;
    stdout.flush()?;
    tracing::info!(package = %provider.package(), addr = %addr, "Provider server started");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = run(listener, provider, config.max_message_size, async move {
        let _ = stop_rx.await;
    });
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(config.shutdown_timeout, server).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout = ?config.shutdown_timeout, "Graceful shutdown timed out");
            Ok(())
        }
    }
}

/// Convenience function to run a provider with default configuration
pub async fn serve_default(provider: ResourceProvider) -> Result<()> {
    serve(provider, ServerConfig::default()).await
}

/// Serves `provider` on an already bound listener until `shutdown` resolves
pub async fn serve_on<F>(listener: TcpListener, provider: ResourceProvider, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    run(listener, provider, ServerConfig::default().max_message_size, shutdown).await
}

async fn run<F>(
    listener: TcpListener,
    provider: ResourceProvider,
    max_message_size: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let service = ResourceProviderServer::new(provider)
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);

    Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    Ok(())
}

//! HTTP server hosting an [`HttpTransport`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, body::Incoming};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use strand_mcp_server::{
    CapabilityCatalog, HandlerRegistry, McpTransport, MessageProcessor, TransportMetadata,
};
use strand_mcp_session_storage::{
    BoxedEventStore, BoxedSessionStore, InMemorySessionConfig, InMemorySessionStore,
};

use crate::Result;
use crate::auth::Authenticator;
use crate::response::{self, HttpResponse};
use crate::transport::{DEFAULT_MAX_BODY_SIZE, HttpTransport};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub mcp_path: String,
    pub max_body_size: usize,
    /// Idle TTL of the default in-memory session store
    pub session_expiry: Duration,
    /// How often expired sessions and events are purged
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            mcp_path: "/mcp".to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            session_expiry: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

pub struct HttpMcpServerBuilder {
    config: ServerConfig,
    metadata: TransportMetadata,
    handlers: Option<HandlerRegistry>,
    session_store: Option<BoxedSessionStore>,
    event_store: Option<BoxedEventStore>,
    authenticator: Option<Arc<dyn Authenticator>>,
    catalog: Option<CapabilityCatalog>,
}

impl HttpMcpServerBuilder {
    pub fn new(metadata: TransportMetadata) -> Self {
        Self {
            config: ServerConfig::default(),
            metadata,
            handlers: None,
            session_store: None,
            event_store: None,
            authenticator: None,
            catalog: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    pub fn mcp_path(mut self, path: impl Into<String>) -> Self {
        self.config.mcp_path = path.into();
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    pub fn session_expiry(mut self, expiry: Duration) -> Self {
        self.config.session_expiry = expiry;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    /// Defaults to [`HandlerRegistry::standard`].
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Defaults to an in-memory store expiring after `session_expiry`.
    pub fn session_store(mut self, store: BoxedSessionStore) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Enables stream recording and `GET` replay.
    pub fn event_store(mut self, store: BoxedEventStore) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn catalog(mut self, catalog: CapabilityCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> HttpMcpServer {
        let handlers = Arc::new(self.handlers.unwrap_or_else(HandlerRegistry::standard));
        let sessions = self.session_store.unwrap_or_else(|| {
            Arc::new(InMemorySessionStore::with_config(InMemorySessionConfig {
                session_ttl: self.config.session_expiry,
                ..Default::default()
            }))
        });

        let mut transport = HttpTransport::new(MessageProcessor::new(handlers), self.metadata, sessions)
            .with_max_body_size(self.config.max_body_size);
        if let Some(events) = self.event_store {
            transport = transport.with_event_store(events);
        }
        if let Some(authenticator) = self.authenticator {
            transport = transport.with_authenticator(authenticator);
        }
        if let Some(catalog) = self.catalog {
            transport = transport.with_catalog(catalog);
        }

        HttpMcpServer {
            config: self.config,
            transport: Arc::new(transport),
        }
    }
}

#[derive(Clone)]
pub struct HttpMcpServer {
    config: ServerConfig,
    transport: Arc<HttpTransport>,
}

impl HttpMcpServer {
    pub fn builder(metadata: TransportMetadata) -> HttpMcpServerBuilder {
        HttpMcpServerBuilder::new(metadata)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<HttpTransport> {
        &self.transport
    }

    /// Bind `bind_address` and serve until the process exits.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        self.serve(listener, std::future::pending()).await
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        self.transport.start().await?;
        let cleanup = self.spawn_cleanup();

        info!("HTTP MCP server listening on {}", listener.local_addr()?);
        info!("MCP endpoint available at: {}", self.config.mcp_path);
        info!("Session storage: {}", self.transport.sessions().backend_name());

        let result = tokio::select! {
            result = self.accept_loop(&listener) => result,
            _ = shutdown => {
                info!("HTTP MCP server shutting down");
                Ok(())
            }
        };

        cleanup.abort();
        self.transport.stop().await?;
        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!("New connection from {}", peer_addr);

            let server = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.route(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    let err_str = err.to_string();
                    if err_str.contains("connection closed before message completed") {
                        debug!("Client disconnected (normal): {}", err);
                    } else {
                        error!("Error serving connection: {}", err);
                    }
                }
            });
        }
    }

    async fn route(&self, req: Request<Incoming>) -> HttpResponse {
        if req.uri().path() == self.config.mcp_path {
            self.transport.handle_request(req).await
        } else {
            debug!(path = req.uri().path(), "No route");
            response::not_found()
        }
    }

    fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let server = self.clone();
        let period = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                server.cleanup_once().await;
            }
        })
    }

    /// One purge of expired sessions and, when attached, expired events.
    /// Returns `(sessions, events)` removed.
    pub async fn cleanup_once(&self) -> (usize, usize) {
        let sessions = match self.transport.sessions().cleanup_expired().await {
            Ok(removed) => removed,
            Err(err) => {
                error!("Session cleanup error: {}", err);
                0
            }
        };
        let events = match self.transport.events() {
            Some(events) => events.evict_expired().await.unwrap_or_else(|err| {
                error!("Event eviction error: {}", err);
                0
            }),
            None => 0,
        };
        if sessions > 0 || events > 0 {
            info!(sessions, events, "Expired sessions and events removed");
        }
        (sessions, events)
    }
}

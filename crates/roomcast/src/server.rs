//! `RoomcastServer` builder and HTTP server.
//!
//! Ties the layers together: store → dispatch registry → chat service →
//! axum routes.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::get;
use roomcast_dispatch::{DispatchConfig, Registry};
use roomcast_store::{MemoryStore, RoomStore};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::RoomcastError;
use crate::bot::{CommandProcessor, StockBot, StooqQuotes};
use crate::config::{ServerConfig, ServiceConfig};
use crate::handler::{self, AppState};
use crate::service::ChatService;

/// Builder for configuring and starting a Roomcast server.
///
/// # Example
///
/// ```rust,ignore
/// let server = RoomcastServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct RoomcastServerBuilder {
    bind_addr: String,
    dispatch: DispatchConfig,
    service: ServiceConfig,
    store: Option<Arc<dyn RoomStore>>,
    bot: Option<Arc<dyn CommandProcessor>>,
}

impl RoomcastServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(ServerConfig::default())
    }

    /// Starts from a loaded [`ServerConfig`].
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            bind_addr: config.bind_addr.to_string(),
            dispatch: config.dispatch,
            service: config.service,
            store: None,
            bot: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    pub fn service_config(mut self, config: ServiceConfig) -> Self {
        self.service = config;
        self
    }

    /// Uses `store` instead of a fresh [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn RoomStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `bot` instead of the stooq-backed [`StockBot`].
    pub fn bot(mut self, bot: Arc<dyn CommandProcessor>) -> Self {
        self.bot = Some(bot);
        self
    }

    /// Binds the listener and wires up the service.
    pub async fn build(self) -> Result<RoomcastServer, RoomcastError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let bot = match self.bot {
            Some(bot) => bot,
            None => Arc::new(StockBot::new(StooqQuotes::new()?)),
        };

        let registry = Registry::new(store, self.dispatch);
        let service = Arc::new(ChatService::new(registry, bot, self.service));

        Ok(RoomcastServer { listener, service })
    }
}

impl Default for RoomcastServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Roomcast server.
///
/// Call [`run()`](Self::run) to start serving requests.
pub struct RoomcastServer {
    listener: TcpListener,
    service: AppState,
}

impl RoomcastServer {
    /// Creates a new builder.
    pub fn builder() -> RoomcastServerBuilder {
        RoomcastServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn service(&self) -> &AppState {
        &self.service
    }

    /// Serves until Ctrl-C.
    pub async fn run(self) -> Result<(), RoomcastError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serves until `shutdown` resolves, then stops every room worker and
    /// drains in-flight requests.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), RoomcastError> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "Roomcast server running");

        let service = Arc::clone(&self.service);
        axum::serve(self.listener, router(self.service))
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("shutdown requested");
                service.shutdown().await;
            })
            .await?;

        tracing::info!("Roomcast server stopped");
        Ok(())
    }
}

/// All routes, with request tracing and permissive CORS.
pub fn router(service: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(handler::health))
        .route("/api/v1/rooms", get(handler::list_rooms))
        .route("/api/v1/rooms/{room}/bind", get(handler::bind_room))
        .route(
            "/api/v1/rooms/{room}/{nickname}/send",
            get(handler::send_message).post(handler::send_message),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

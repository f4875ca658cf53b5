//! The gateway: registry, data sources and HTTP server wired together.

use std::net::SocketAddr;
use std::sync::Arc;

use derivative::Derivative;
use displaydoc::Display;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::net::TcpListener;

use crate::axum_factory::make_axum_router;
use crate::axum_factory::serve_router;
use crate::configuration::Configuration;
use crate::context::ContextFactory;
use crate::context::DataSources;
use crate::error::GatewayError;
use crate::execution::DispatchEngine;
use crate::registry::Registry;
use crate::services::SupergraphService;

type ShutdownFuture = BoxFuture<'static, ()>;

/// Shutdown for the gateway.
#[derive(Display, Derivative)]
#[derivative(Debug)]
#[non_exhaustive]
pub enum ShutdownSource {
    /// No graceful shutdown
    None,

    /// A custom shutdown future.
    Custom(#[derivative(Debug = "ignore")] ShutdownFuture),

    /// Watch for Ctl-C and SIGTERM.
    CtrlC,
}

impl ShutdownSource {
    /// Convert this shutdown hook into a future. Allows for unified handling later.
    fn into_future(self) -> ShutdownFuture {
        match self {
            ShutdownSource::None => futures::future::pending().boxed(),
            ShutdownSource::Custom(future) => future,
            ShutdownSource::CtrlC => {
                #[cfg(not(unix))]
                {
                    async {
                        if let Err(error) = tokio::signal::ctrl_c().await {
                            tracing::error!("failed to listen for CTRL+C: {error}");
                            futures::future::pending::<()>().await;
                        }
                    }
                    .boxed()
                }

                #[cfg(unix)]
                async {
                    let terminate = async {
                        match tokio::signal::unix::signal(
                            tokio::signal::unix::SignalKind::terminate(),
                        ) {
                            Ok(mut signal) => {
                                signal.recv().await;
                            }
                            Err(error) => {
                                tracing::error!("failed to install SIGTERM handler: {error}");
                                futures::future::pending::<()>().await;
                            }
                        }
                    };
                    futures::future::select(tokio::signal::ctrl_c().boxed(), terminate.boxed())
                        .await;
                }
                .boxed()
            }
        }
    }
}

/// A configured gateway, ready to serve.
#[derive(Debug)]
pub struct Gateway {
    configuration: Configuration,
    registry: Arc<Registry>,
    sources: DataSources,
}

impl Gateway {
    /// Builds the chat gateway and the data sources named in `configuration`.
    ///
    /// Nothing connects yet: sources are contacted by [`Gateway::prepare`].
    pub fn new(configuration: Configuration) -> Result<Self, GatewayError> {
        let sources = DataSources::from_configuration(configuration.sources())?;
        Ok(Self::with_sources(
            configuration,
            crate::chat::registry()?,
            sources,
        ))
    }

    /// Builds a gateway over already constructed parts.
    pub fn with_sources(
        configuration: Configuration,
        registry: Registry,
        sources: DataSources,
    ) -> Self {
        Self {
            configuration,
            registry: Arc::new(registry),
            sources,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn sources(&self) -> &DataSources {
        &self.sources
    }

    /// Connects every data source, creating missing storage.
    pub async fn prepare(&self) -> Result<(), GatewayError> {
        self.sources.prepare().await?;
        Ok(())
    }

    /// The GraphQL pipeline, without HTTP.
    pub fn supergraph_service(&self) -> SupergraphService {
        SupergraphService::builder()
            .engine(DispatchEngine::new(self.registry.clone()))
            .context_factory(ContextFactory::new(self.sources.clone()))
            .build()
    }

    /// The HTTP routes.
    pub fn router(&self) -> axum::Router {
        make_axum_router(self.supergraph_service(), self.configuration.server())
    }

    /// Binds the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, GatewayError> {
        let listen = self.configuration.server().listen();
        TcpListener::bind(listen)
            .await
            .map_err(|error| GatewayError::ServerCreation { listen, error })
    }

    /// Prepares the sources, then serves until `shutdown` fires.
    pub async fn serve(self, shutdown: ShutdownSource) -> Result<(), GatewayError> {
        self.prepare().await?;
        let listener = self.bind().await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` fires.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: ShutdownSource,
    ) -> Result<(), GatewayError> {
        let address: Option<SocketAddr> = listener.local_addr().ok();
        let server = self.configuration.server();
        tracing::info!(
            "GraphQL endpoint exposed at http://{}{} 🚀",
            address.map(|a| a.to_string()).unwrap_or_default(),
            server.graphql_path
        );

        let result = serve_router(listener, self.router(), shutdown.into_future())
            .await
            .map_err(GatewayError::Server);
        tracing::info!("stopped");
        result
    }
}

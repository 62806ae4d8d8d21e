//! Application wiring: configuration, scheduler, dispatcher task and HTTP server.
//!
//! 1. **Create**: [`Application::new`] builds the external call adapter and the
//!    scheduler from config and starts the dispatcher
//! 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests
//! 3. **Shutdown**: when the shutdown signal fires, or the dispatcher stops on its own,
//!    the server drains connections and the dispatcher finishes its in-flight batch

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::api::{build_router, AppState};
use crate::config::Config;
use crate::manager::in_memory::InMemoryIngestManager;
use crate::manager::IngestManager;

pub struct Application {
    router: Router,
    config: Config,
    shutdown_token: CancellationToken,
    dispatcher: JoinHandle<()>,
}

impl Application {
    /// Create a new application instance and start the dispatcher
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting scheduler with configuration: {:#?}", config);

        let call = Arc::new(config.external_call.build());
        let manager = Arc::new(InMemoryIngestManager::new(
            call,
            (&config.scheduler).into(),
            config.scheduler.idempotency_window,
        ));

        let shutdown_token = CancellationToken::new();
        let handle = manager.run(shutdown_token.clone())?;

        // A dispatcher that stops on its own takes the server down with it
        let dispatcher = {
            let shutdown_token = shutdown_token.clone();
            tokio::spawn(async move {
                match handle.await {
                    Ok(Ok(())) => info!("Dispatcher exited"),
                    Ok(Err(e)) => error!(error = %e, "Dispatcher failed"),
                    Err(e) => error!(error = %e, "Dispatcher task panicked"),
                }
                shutdown_token.cancel();
            })
        };

        let router = build_router(AppState::new(manager));

        Ok(Self {
            router,
            config,
            shutdown_token,
            dispatcher,
        })
    }

    /// Convert application into a test server (for tests). Dropping the guard stops
    /// the dispatcher.
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, tokio_util::sync::DropGuard) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.shutdown_token.drop_guard())
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Scheduler listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        let token = self.shutdown_token.clone();
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown => {}
                    _ = token.cancelled() => {}
                }
            })
            .await?;

        // Let the in-flight batch finish before exiting
        info!("Stopping dispatcher...");
        self.shutdown_token.cancel();
        self.dispatcher.await?;

        Ok(())
    }
}

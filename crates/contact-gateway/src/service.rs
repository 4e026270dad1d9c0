//! Contact Gateway service - wiring and server lifecycle.
//!
//! Builds the adapters named by the configuration, assembles the pipeline
//! and serves the router until the shutdown future resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::adapters::file_log::{FileAppendLog, FileRateLimitLog};
use crate::adapters::mail::{LogOnlyTransport, SendmailTransport};
use crate::adapters::session::SessionStore;
use crate::domain::audit::SubmissionLogger;
use crate::domain::config::{GatewayConfig, TransportKind};
use crate::domain::dispatch::Dispatcher;
use crate::domain::error::{GatewayError, StoreError};
use crate::domain::rate_limit::RateLimiter;
use crate::middleware::GatewayMetrics;
use crate::pipeline::SubmissionGateway;
use crate::ports::{AppendLog, MailTransport, RateLimitLog, SystemTimeSource, TimeSource};
use crate::router::{build_router, AppState};

/// Outbound adapters the gateway runs against.
#[derive(Clone)]
pub struct GatewayComponents {
    pub rate_log: Arc<dyn RateLimitLog>,
    pub audit_log: Arc<dyn AppendLog>,
    pub fallback_log: Arc<dyn AppendLog>,
    pub transport: Arc<dyn MailTransport>,
    pub clock: Arc<dyn TimeSource>,
}

impl GatewayComponents {
    /// Flat files under the data directory and the configured transport.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let storage = &config.storage;
        let lock_timeout = config.rate_limit.lock_timeout;

        let transport: Arc<dyn MailTransport> = match config.mail.transport {
            TransportKind::Sendmail => {
                Arc::new(SendmailTransport::new(config.mail.sendmail_path.clone()))
            }
            TransportKind::Log => Arc::new(LogOnlyTransport),
        };

        Self {
            rate_log: Arc::new(FileRateLimitLog::new(
                storage.rate_limit_path(),
                lock_timeout,
            )),
            audit_log: Arc::new(FileAppendLog::new(
                storage.submissions_path(),
                lock_timeout,
            )),
            fallback_log: Arc::new(FileAppendLog::new(storage.fallback_path(), lock_timeout)),
            transport,
            clock: Arc::new(SystemTimeSource),
        }
    }
}

/// Contact Gateway service state
pub struct ContactGatewayService {
    config: Arc<GatewayConfig>,
    gateway: Arc<SubmissionGateway>,
    metrics: Arc<GatewayMetrics>,
}

impl ContactGatewayService {
    /// Create a service backed by the adapters the configuration names.
    ///
    /// The data directory is created if missing.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let data_dir = &config.storage.data_dir;
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::io(data_dir, e))?;

        let components = GatewayComponents::from_config(&config);
        Self::with_components(config, components)
    }

    /// Create a service over explicit adapters.
    pub fn with_components(
        config: GatewayConfig,
        components: GatewayComponents,
    ) -> Result<Self, GatewayError> {
        // Validate configuration
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let config = Arc::new(config);
        let metrics = Arc::new(GatewayMetrics::new());
        let clock = components.clock;

        let sessions = Arc::new(SessionStore::new(
            config.session.clone(),
            Arc::clone(&clock),
        ));
        let rate_limiter = RateLimiter::new(components.rate_log, Arc::clone(&clock));
        let dispatcher = Dispatcher::new(
            config.mail.clone(),
            components.transport,
            components.fallback_log,
            Arc::clone(&clock),
        );
        let audit = SubmissionLogger::new(components.audit_log);

        let gateway = Arc::new(SubmissionGateway::new(
            Arc::clone(&config),
            rate_limiter,
            sessions,
            dispatcher,
            audit,
            Arc::clone(&metrics),
            clock,
        ));

        Ok(Self {
            config,
            gateway,
            metrics,
        })
    }

    /// Router with the full middleware stack
    pub fn router(&self) -> Router {
        build_router(AppState {
            gateway: Arc::clone(&self.gateway),
            config: Arc::clone(&self.config),
            metrics: Arc::clone(&self.metrics),
        })
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn gateway(&self) -> Arc<SubmissionGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve until Ctrl+C.
    pub async fn start(&self) -> Result<(), GatewayError> {
        self.serve_until(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await
    }

    /// Serve until `shutdown` resolves. In-flight requests are allowed to
    /// finish.
    pub async fn serve_until<F>(&self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.http_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))?;

        info!(
            addr = %addr,
            data_dir = %self.config.storage.data_dir.display(),
            "Contact Gateway listening"
        );

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatewayError::Serve(e.to_string()))?;

        info!("Contact Gateway stopped");
        Ok(())
    }
}

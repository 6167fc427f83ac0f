//! Alarm API Server
//!
//! REST API over the alarm lifecycle service.

use alarm_lifecycle::{AlarmLifecycleService, CallerIdentity};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use notifier::{LogNotifier, MqttNotifier, Notifier};
use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use storage::{AlarmRepository, MemoryRepository, SqliteRepository};
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod auth;
pub mod error;
pub mod policy;
pub mod rate_limit;
pub mod routes;
pub mod settings;

use error::ApiError;
use policy::{Credentials, PolicyEnforcer, Target};
use rate_limit::create_governor_config;
use settings::{NotifierKind, Settings};

/// Application state shared across handlers
pub struct AppState {
    pub service: AlarmLifecycleService,
    pub policy: PolicyEnforcer,
    /// Storage backend name for health reporting
    pub storage_backend: &'static str,
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(service: AlarmLifecycleService, policy: PolicyEnforcer) -> Self {
        Self {
            service,
            policy,
            storage_backend: "memory",
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    /// Wire repository, notifier and policy from settings
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let repository: Arc<dyn AlarmRepository> = match &settings.storage.database_url {
            Some(url) => Arc::new(
                SqliteRepository::connect(url)
                    .await
                    .with_context(|| format!("Failed to open database {}", url))?,
            ),
            None => Arc::new(MemoryRepository::new()),
        };
        let backend = if settings.storage.database_url.is_some() {
            "sqlite"
        } else {
            "memory"
        };

        let notifier: Arc<dyn Notifier> = match settings.notifier.kind {
            NotifierKind::Log => Arc::new(LogNotifier),
            NotifierKind::Mqtt => {
                let mut mqtt = MqttNotifier::new(settings.notifier.mqtt.clone());
                mqtt.connect().await?;
                Arc::new(mqtt)
            }
        };

        let policy = PolicyEnforcer::new(settings.policy.clone());
        policy.init()?;

        let service = AlarmLifecycleService::new(settings.alarm.clone(), repository, notifier);
        Ok(Self {
            storage_backend: backend,
            ..Self::new(service, policy)
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Require the policy to allow an action
    pub fn authorize(
        &self,
        action: &str,
        target: &Target,
        credentials: &Credentials,
    ) -> Result<(), ApiError> {
        Ok(self.policy.enforce(action, target, credentials)?)
    }

    /// Caller identity; restricted unless the segregation rule passes
    pub fn caller(&self, credentials: &Credentials) -> Result<CallerIdentity, ApiError> {
        let unrestricted = self
            .policy
            .check("segregation", &Target::new(), credentials)?;
        Ok(CallerIdentity {
            user_id: credentials.user_id.clone(),
            project_id: credentials.project_id.clone(),
            restricted: !unrestricted,
        })
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub storage: String,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(
            "/v2/alarms",
            get(routes::alarms::list_alarms).post(routes::alarms::create_alarm),
        )
        .route(
            "/v2/alarms/:alarm_id",
            get(routes::alarms::get_alarm)
                .put(routes::alarms::update_alarm)
                .delete(routes::alarms::delete_alarm),
        )
        .route(
            "/v2/alarms/:alarm_id/history",
            get(routes::history::get_history),
        )
        .route(
            "/v2/alarms/:alarm_id/state",
            get(routes::state::get_state).put(routes::state::put_state),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        storage: state.storage_backend.to_string(),
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed".to_string()),
    }
}

/// Initialize logging
pub fn init_logging(level: &str) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::from_str(level).unwrap_or(Level::INFO))
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run the server
pub async fn run_server(settings: Settings) -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let state = Arc::new(AppState::from_settings(&settings).await?.with_metrics(handle));
    let governor = create_governor_config(&settings.rate_limit)?;
    let app = create_router(state).layer(GovernorLayer { config: governor });

    info!("Starting alarm API server on {}", settings.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

use crate::cli::ServeArgs;
use crate::infra::{build_engine, seed_engine, AppState};
use crate::routes::with_engine_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use campaign_match::config::AppConfig;
use campaign_match::error::AppError;
use campaign_match::telemetry;
use std::sync::atomic::Ordering;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(seed_dir) = args.seed_dir.take() {
        config.seed_dir = Some(seed_dir);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let engine = build_engine(config.engine.clone())?;
    let app_state = AppState::new(prometheus_handle, engine.clone());
    let readiness_flag = app_state.readiness.clone();

    let app = with_engine_routes(engine.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (report, source) = seed_engine(&engine, config.seed_dir.as_deref())?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        seed = source.describe(),
        supporters = report.supporters,
        candidates = report.candidates,
        "campaign match engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

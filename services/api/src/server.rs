use crate::cli::ServeArgs;
use crate::infra::{build_engine, AppState};
use crate::routes::with_engine_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use consent_rewards::config::AppConfig;
use consent_rewards::error::AppError;
use consent_rewards::telemetry;
use consent_rewards::workflows::consent::{
    bootstrap_partners, offer_channel, offer_templates, spawn_offer_listener, spawn_offer_ticker,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(data_dir) = args.data_dir.take() {
        config.engine.data_dir = Some(data_dir);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let engine = build_engine(&config.engine)?;
    let seeded = engine.seed_partners(bootstrap_partners());
    let engine = Arc::new(engine);
    info!(
        seeded,
        partners = engine.partners().len(),
        reset = ?engine.reset_keys(),
        "partner catalog loaded"
    );

    if let Some(every) = config.engine.offer_interval {
        let (offers, inbox) = offer_channel();
        spawn_offer_listener(Arc::clone(&engine), inbox);
        spawn_offer_ticker(offers, offer_templates(), every);
        info!(interval_secs = every.as_secs(), "periodic partner offers enabled");
    }

    let app = with_engine_routes(Arc::clone(&engine))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "consent rewards engine ready");

    axum::serve(listener, app).await?;
    engine.flushed().await;
    Ok(())
}

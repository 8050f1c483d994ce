use freight_audit_rust::{
    api::{self, AppState},
    load_dataset, AppConfig, Auditor, BatchAuditor, RateCardStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt::time::ChronoLocal, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载配置
    let config = AppConfig::load()?;

    // 初始化日志 - 本地时间格式，RUST_LOG 优先于配置
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();

    info!("Starting server with config: {:?}", config);

    let policy = config.tolerance_policy()?;
    let store = Arc::new(RateCardStore::new(config.store.retain_versions));

    // 预加载费率数据集
    if let Some(path) = &config.store.rate_card_path {
        let snapshot = store.publish(load_dataset(path)?)?;
        info!("Rate card snapshot v{} loaded from {}", snapshot.version, path);
    } else {
        info!("No rate card dataset configured, waiting for POST /api/rate-cards");
    }

    let state = AppState {
        store,
        auditor: Arc::new(Auditor::new(policy.clone())),
        batch: Arc::new(BatchAuditor::new(config.batch.workers, policy)?),
    };
    let app = api::router(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/rate-cards          - publish rate card dataset");
    info!("  GET  /api/rate-cards/current  - current snapshot summary");
    info!("  POST /api/audit               - audit one shipment");
    info!("  POST /api/audit/batch         - audit a batch of shipments");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

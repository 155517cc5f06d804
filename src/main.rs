use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workshop_registry::api::router;
use workshop_registry::config::Config;
use workshop_registry::db;
use workshop_registry::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "workshop_registry=debug,tower_http=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::connect(&config.database_url, config.store_timeout).await?;

    if config.seed_sample_data {
        let seeded = db::workshops::seed_sample_workshops(&pool).await?;
        if seeded > 0 {
            info!("seeded {} sample workshops", seeded);
        }
    }

    let addr = config.bind_addr;
    let state = AppState::new(pool, config);
    let app = router(state);

    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

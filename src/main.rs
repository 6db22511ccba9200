use std::error::Error;

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use tokio::{fs, net, task};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter,
};

use lockbox::{db, http, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (db_client, db_connection) = db::connect(config.db).await?;

    task::spawn(async move {
        if let Err(e) = db_connection.await {
            error!("database connection failed: {e}");
            std::process::exit(1);
        }
    });

    db_client.migrate().await?;

    let allowed_origins = config
        .http
        .cors
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_origin(allowed_origins);

    let app = http::router(http::AppState::new(db_client, &config.jwt))
        .layer(cors);

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    info!("listening on {}", config.http.server.addr);
    axum::serve(listener, app).await?;

    Ok(())
}

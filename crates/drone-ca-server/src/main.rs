use std::sync::Arc;

use clap::Parser;
use drone_ca::Issuer;
use tracing::info;

mod config;
mod http;

use config::{Args, Config};

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] drone_ca::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(args.env_filter())
        .json()
        .init();

    let config = Config::load(&args)?;
    let issuer = Issuer::new(Arc::new(config.trust));
    let app = http::router(issuer);

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!("drone-ca listening on {}", config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}

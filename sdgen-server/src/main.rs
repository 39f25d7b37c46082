use anyhow::Result;
use clap::Parser;
use sdgen_server::{
    config::ServerConfig,
    observability::init_tracing,
    startup::{load_state, run},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    init_tracing(&config.log_level);

    let state = load_state(&config).await;
    run(&config, state).await
}

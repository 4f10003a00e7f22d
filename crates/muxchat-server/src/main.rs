use clap::Parser as _;
use muxchat_server::{
    ProviderCredentials, ServerConfig, build_relay, init_observability, load_env, serve,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_observability();

    let config = ServerConfig::parse();
    let relay = build_relay(&config, &ProviderCredentials::from_env())?;
    serve(relay, &config.host, config.port).await?;
    Ok(())
}

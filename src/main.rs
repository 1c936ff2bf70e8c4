use tracing_subscriber::EnvFilter;

use bili_relay_lib::relay::RelayConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = match RelayConfig::from_env() {
        Ok(config) => bili_relay_lib::run(config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "bili-relay exited with error");
        std::process::exit(1);
    }
}

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use commentboard::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "startup", "commentboard starting: RUST_LOG='{}'", rust_log);

    let args: Vec<String> = std::env::args().collect();
    let config = ServerConfig::load(&args)?;
    commentboard::server::run(config).await
}

//!
//! commentboard server binary
//! --------------------------
//! Command-line entry point for the comments endpoint. Every setting can come from
//! a CLI flag or an environment variable; flags win.

use anyhow::Result;
use std::env;

use commentboard::config::{has_flag, ServerConfig, DEFAULT_HTTP_PORT};

fn print_usage() {
    println!(
        "commentboard server\n\nUSAGE:\n  board_server [--http-port N] [--store memory|parquet|rest] [--data-dir PATH] [--auth verify-session|trust-client]\n\nOPTIONS:\n  --http-port N        HTTP port (env: BOARD_HTTP_PORT, default {DEFAULT_HTTP_PORT})\n  --store KIND         Comment store backend (env: BOARD_STORE, default memory)\n  --data-dir PATH      Directory of the parquet table (env: BOARD_DATA_DIR, default data)\n  --auth MODE          Author check on create (env: BOARD_AUTH, default verify-session)\n  --rest-url URL       Hosted table base URL (env: BOARD_REST_URL)\n  --rest-key KEY       Hosted table API key (env: BOARD_REST_KEY)\n  --rest-table NAME    Hosted table name (env: BOARD_REST_TABLE, default comments)\n\nENVIRONMENT:\n  BOARD_SESSION_SECRET Shared secret that signs session tokens\n"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    println!(r"                                     __    __                         __
  _________  ____ ___  ____ ___  ___  / /_  / /_  ____  ____ __________/ /
 / ___/ __ \/ __ `__ \/ __ `__ \/ _ \/ __ \/ __ \/ __ \/ __ `/ ___/ __  /
/ /__/ /_/ / / / / / / / / / / /  __/ / / / /_/ / /_/ / /_/ / /  / /_/ /
\___/\____/_/ /_/ /_/_/ /_/ /_/\___/_/ /_/_.___/\____/\__,_/_/   \__,_/");

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        print_usage();
        return Ok(());
    }

    let config = ServerConfig::load(&args)?;
    println!(
        "commentboard starting: http={}, store={}, auth={}",
        config.http_port,
        config.store.kind(),
        config.auth.as_str()
    );
    commentboard::server::run(config).await
}

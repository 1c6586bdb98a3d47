use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use spoiler_shield::config::Config;
use spoiler_shield::hub::{LocalTabs, SyncHub};
use spoiler_shield::init::{init_store, setup_logging};
use spoiler_shield::protocol::{Request, Response};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or("spoiler-shield.toml".to_string());
    let config_exists = std::path::Path::new(&config_path).exists();
    let config = if config_exists {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting spoiler-shield...");
    if !config_exists {
        info!("Config file not found, using defaults.");
    }

    // 3. Open Store & start the Hub
    let store = init_store(&config);
    let tabs = LocalTabs::new();
    let hub = SyncHub::spawn(store, Arc::new(tabs), config.hub.clone());

    // 4. Serve the message contract, one JSON request per line
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("Accepting getState/setState requests on stdin");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read request")?,
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received.");
                break;
            }
        };
        let Some(line) = line else {
            info!("Input closed, shutting down.");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => match hub.handle(request).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Request failed: {}", e);
                    Response::SetResult { success: false }
                }
            },
            Err(e) => {
                warn!("Malformed request: {}", e);
                Response::SetResult { success: false }
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    Ok(())
}

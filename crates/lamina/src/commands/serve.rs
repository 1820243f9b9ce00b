//! Development server command.

use std::path::PathBuf;

use anyhow::Result;
use lamina_server::{DevServer, DevServerConfig};

/// Run the dev server against the built output directory.
pub async fn run(port: u16, dir: PathBuf, open: bool) -> Result<()> {
    tracing::info!("Starting development server on port {}", port);

    let config = DevServerConfig {
        serve_dir: dir,
        port,
        open,
        ..Default::default()
    };

    DevServer::new(config).start().await?;

    Ok(())
}

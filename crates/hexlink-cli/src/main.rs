mod app;
mod cli;

use crate::cli::CLI;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CLI::parse();
    hexlink_telemetry::init(cli.log_format.into())?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    let mut stdout = std::io::stdout();
    app::run(cli, tokio::io::stdin(), &mut stdout, cancel_rx).await?;

    info!("done");
    Ok(())
}

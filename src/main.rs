use astra::args::Args;
use astra::{App, config, logger, shutdown_signal};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::try_init(args.log_level).map_err(|e| anyhow::anyhow!(e))?;

    let mut cfg = config::load(&args.config).await?;
    if let Some(secs) = args.sweep_interval_secs {
        cfg.sweep_interval_secs = secs;
    }
    info!("\u{1F680}  Booting {}...", cfg.name);

    let app = App::from_config(&cfg).await?;
    if args.sweep_once {
        let report = app.sweep.run_once(Utc::now()).await;
        info!(?report, "sweep finished");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });
    app.run(cancel).await
}

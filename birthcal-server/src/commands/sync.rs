use std::io::Write;

use anyhow::{Context, Result};
use birthcal_core::AppConfig;

use super::{build_service, interrupt_token};

/// Run one sync and write the feed to stdout.
pub async fn run(config: AppConfig) -> Result<()> {
    let service = build_service(&config)?;
    service.sync_now(&interrupt_token()).await?;

    let snapshot = service
        .cache()
        .load()
        .context("Sync finished without producing a feed")?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(snapshot.data())?;
    stdout.flush()?;

    Ok(())
}

pub mod list;
pub mod serve;
pub mod sync;

use std::sync::Arc;

use anyhow::Result;
use birthcal_core::{
    AgeSummaryFormatter, AppConfig, BirthdayService, EntryStore, FeedCache, Generator,
    HttpFetcher, SourceMode, SystemClock,
};
use tokio_util::sync::CancellationToken;

/// Wire the sync service from the loaded configuration.
pub fn build_service(config: &AppConfig) -> Result<BirthdayService> {
    let sync_config = config.sync_config()?;

    let mut generator =
        Generator::new(Arc::new(SystemClock)).with_formatter(Arc::new(AgeSummaryFormatter));
    if sync_config.mode == SourceMode::Web {
        generator = generator.with_fetcher(Arc::new(HttpFetcher::new()?));
    }

    Ok(BirthdayService::new(
        generator,
        sync_config,
        Arc::new(FeedCache::new()),
        Arc::new(EntryStore::new()),
    ))
}

/// Token cancelled on Ctrl-C, for one-shot commands.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    token
}

use anyhow::Result;
use birthcal_core::{AppConfig, SortColumn, SystemClock, TimeSource, sort_entries};
use owo_colors::OwoColorize;

use super::{build_service, interrupt_token};
use crate::render::render_entries;

pub async fn run(config: AppConfig, sort: SortColumn, descending: bool) -> Result<()> {
    let service = build_service(&config)?;
    let stats = service.sync_now(&interrupt_token()).await?;

    let mut entries = service.entries().snapshot();
    if entries.is_empty() {
        println!("{}", "No birthdays found.".dimmed());
        return Ok(());
    }

    sort_entries(&mut entries, sort, !descending);

    let today = SystemClock.now().date_naive();
    for line in render_entries(&entries, today) {
        println!("{line}");
    }

    println!();
    let summary = format!(
        "{} birthdays from {} contacts, {} today",
        stats.with_birthday, stats.processed, stats.today
    );
    println!("{}", summary.dimmed());

    Ok(())
}

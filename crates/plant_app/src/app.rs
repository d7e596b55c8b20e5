use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use plant_core::{
    blob::FileBlob,
    config::ReminderConfig,
    notifications::MemoryNotifier,
    query::PlantList,
    store::BlobRecordStore,
    ReminderScheduler,
};
use tracing::info;

/// Open the plant store under the configured data directory and print the
/// upcoming waterings.
///
/// Desktop builds have no OS notification service, so the scheduler runs
/// over an in-process backend and only its read paths are used here.
pub async fn run(config: ReminderConfig) -> Result<()> {
    info!(path = %config.data_dir.display(), key = %config.storage_key, "opening plant store");
    let store = Arc::new(BlobRecordStore::with_key(
        FileBlob::new(&config.data_dir),
        config.storage_key.clone(),
    ));
    let scheduler = ReminderScheduler::builder(store, Arc::new(MemoryNotifier::new()))
        .with_config(config)
        .build();

    let list = scheduler
        .list()
        .await
        .context("unable to load saved plants")?;
    print!("{}", render_list(&list));
    Ok(())
}

pub fn render_list(list: &PlantList) -> String {
    let mut out = String::new();
    match &list.headline {
        Some(headline) => {
            let _ = writeln!(out, "{}", headline.message);
        }
        None => {
            let _ = writeln!(out, "No plants to water yet.");
            return out;
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Upcoming waterings");
    for view in &list.plants {
        let _ = writeln!(
            out,
            "  {}  {}  {}",
            view.record.next_trigger_at.format("%Y-%m-%d"),
            view.hour,
            view.record.name()
        );
    }
    out
}

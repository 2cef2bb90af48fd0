//! Watch one slot's prediction
//!
//! Polls a single slot on the global refresh interval and prints every
//! update. Halfway through, the refresh interval is changed and predictions
//! are toggled off and back on.
//!
//! Run with: cargo run --example watch_slot
//!
//! To watch a specific slot:
//!   cargo run --example watch_slot -- --slot 4

use parking_prediction_sync::{ClientConfig, PredictionHub, RefreshCadence, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,parking_prediction_sync=debug")
        .init();

    let args: Vec<String> = std::env::args().collect();
    let slot_id = args
        .iter()
        .position(|arg| arg == "--slot")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(1);

    let config = ClientConfig::from_env();
    println!("Backend: {}", config.base_url);
    println!("Watching slot {}...\n", slot_id);

    let hub = PredictionHub::new(config)?;
    let settings = hub.settings();
    settings.set_refresh_interval(RefreshCadence::FifteenSeconds);

    let fetcher = hub.watch_slot(slot_id, true);
    let _handle = fetcher.on_prediction_updated(|snapshot| {
        if snapshot.loading {
            return;
        }
        match (&snapshot.prediction, &snapshot.error) {
            (Some(p), _) => match p.frees_up_in() {
                Some(minutes) => println!(
                    "Slot {}: {}, free in ~{} min ({}% confidence)",
                    p.slot_id,
                    p.current_status,
                    minutes,
                    p.confidence_percent()
                ),
                None => println!("Slot {}: {}", p.slot_id, p.current_status),
            },
            (None, Some(error)) => println!("Error: {}", error),
            (None, None) => {}
        }
    });

    tokio::time::sleep(Duration::from_secs(45)).await;

    println!("\nSwitching to a {} refresh interval", RefreshCadence::OneMinute.label());
    settings.set_refresh_interval(RefreshCadence::OneMinute);

    println!("Pausing predictions for 30 s");
    settings.toggle();
    tokio::time::sleep(Duration::from_secs(30)).await;
    settings.toggle();
    println!("Predictions resumed\n");

    fetcher.refetch().await;
    tokio::time::sleep(Duration::from_secs(65)).await;

    println!("\nPoll state at exit: {}", fetcher.poll_state());
    hub.shutdown();
    Ok(())
}

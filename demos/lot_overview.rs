//! Lot-wide overview: insights and occupancy forecast
//!
//! Compiles the insight list and the 60-minute occupancy trend once, prints
//! both, then keeps the monitors running and reports each refresh.
//!
//! Run with: cargo run --example lot_overview

use parking_prediction_sync::{ClientConfig, PredictionHub, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parking_prediction_sync=info".parse().unwrap()),
        )
        .init();

    let hub = PredictionHub::new(ClientConfig::from_env())?;

    match hub.lot_status().await {
        Ok(lot) => println!(
            "Lot: {}/{} slots available ({}% occupied)\n",
            lot.available_slots,
            lot.total_slots,
            lot.occupancy_pct()
        ),
        Err(e) => println!("Lot status unavailable: {}\n", e),
    }

    let insights = hub.start_insights();
    let trend = hub.start_trend(Duration::from_secs(60), true);

    let _insight_handle = insights.on_insights_updated(|list| {
        println!("=== Insights ===");
        for insight in list {
            println!("  {}", insight.message());
        }
        println!();
    });

    let _trend_handle = trend.on_trend_updated(|trend| {
        println!("=== Occupancy forecast ({} slots) ===", trend.total_slots);
        for point in &trend.points {
            let bar = "#".repeat(usize::from(point.occupancy_pct / 5));
            println!("  {:>5} {:>3}% {}", point.label(), point.occupancy_pct, bar);
        }
        if let Some(peak) = trend.peak() {
            println!("  Peak: {}% at {}", peak.occupancy_pct, peak.label());
        }
        println!();
    });

    tokio::time::sleep(Duration::from_secs(15)).await;

    if let Some(error) = insights.error() {
        println!("Insights error: {}", error);
    }
    if let Some(error) = trend.error() {
        println!("Trend error: {}", error);
    }

    println!("Refreshing the forecast by hand...");
    trend.refresh().await;

    tokio::time::sleep(Duration::from_secs(120)).await;

    hub.shutdown();
    Ok(())
}

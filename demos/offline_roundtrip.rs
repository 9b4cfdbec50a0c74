// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline round-trip example.
//!
//! Demonstrates:
//! 1. Saving settings and progress while offline (queued, durable on disk)
//! 2. Another device writing a newer settings record meanwhile
//! 3. Reconnecting through the session monitor: merge, then queue replay
//! 4. Displaying metrics
//! 5. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=userdata_sync=debug cargo run --example offline_roundtrip
//! ```

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;
use userdata_sync::{
    AuthEvent, Connectivity, FileLocalStore, InMemoryGateway, Record, SessionMonitor, SyncEngine,
    SyncEngineConfig, SyncEvent, UserData, UserId,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           userdata-sync: Offline Round-Trip Example           ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and start offline
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let config = SyncEngineConfig {
        debounce_ms: 200,
        ..Default::default()
    }
    .with_env_overrides()?;

    let store = Arc::new(FileLocalStore::new(dir.path())?);
    let gateway = Arc::new(InMemoryGateway::new());
    let engine = SyncEngine::new(config, store, gateway.clone());
    let mut events = engine.subscribe();

    let user = UserId::from("demo-user");
    println!("📦 Local store: {}", dir.path().display());
    engine.start(Some(user.clone()), Connectivity::Offline).await;
    println!("   State: {}, session: {}", engine.state(), engine.session());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Save while offline
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Saving while offline...");
    engine.save_settings(Record::from_json(json!({"theme": "dark", "fontSize": 16}))).await;
    engine.save_progress(Record::from_json(json!({"lesson-1": true, "lesson-2": true}))).await;

    for entry in engine.pending_entries() {
        println!("   └─ Queued {} (seq {}) at {}", entry.kind, entry.seq, entry.enqueued_at);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Another device edits settings later
    // ─────────────────────────────────────────────────────────────────────────
    let mut remote_settings = Record::from_json(json!({"theme": "light", "fontSize": 18}));
    remote_settings.stamp(Utc::now() + chrono::Duration::seconds(5));
    gateway.seed(&user, UserData::new(remote_settings, Record::new()));
    println!("\n📱 Another device saved settings {{theme: light}}");

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Reconnect through the monitor
    // ─────────────────────────────────────────────────────────────────────────
    let (auth_tx, auth_rx) = mpsc::channel(8);
    let (net_tx, net_rx) = mpsc::channel(8);
    let (_stop_tx, stop_rx) = watch::channel(false);
    let monitor = tokio::spawn(SessionMonitor::new(engine.clone(), auth_rx, net_rx).run(stop_rx));

    println!("\n🌐 Connectivity restored...");
    net_tx.send(Connectivity::Online).await?;

    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(SyncEvent::DataSynced)) => {
                println!("   └─ Event: data synced");
                break;
            }
            Ok(Ok(event)) => println!("   └─ Event: {:?}", event),
            Ok(Err(e)) => {
                println!("   └─ Event stream error: {}", e);
                break;
            }
            Err(_) => {
                println!("   └─ ⚠️  Timed out waiting for sync");
                break;
            }
        }
    }

    let settings = engine.get_settings().await;
    let progress = engine.get_progress().await;
    println!("\n📖 After reconnect:");
    println!("   ├─ settings: {}", settings.clone().into_value());
    println!("   ├─ progress: {}", progress.clone().into_value());
    println!("   └─ queue:    {:?}", engine.queue_stats());

    if let Some(row) = gateway.row(&user) {
        println!("\n☁️  Remote row:");
        println!("   ├─ settings: {}", row.settings.into_value());
        println!("   └─ progress: {}", row.progress.into_value());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Sign out and shut down
    // ─────────────────────────────────────────────────────────────────────────
    auth_tx.send(AuthEvent::SignedOut).await?;
    // Closing both channels ends the monitor once the sign-out is applied
    drop((auth_tx, net_tx));
    let applied = monitor.await?;
    println!("\n🛑 Monitor applied {} events", applied);

    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    engine.shutdown().await;
    println!("\n   ✅ Shutdown complete! State: {}", engine.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => v.to_string(),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}

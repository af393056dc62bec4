//! Live Stats Example
//!
//! Demonstrates:
//! - Starting the aggregation service against an in-memory log
//! - Catch-up over pre-existing history, then live processing
//! - Reading the in-memory snapshot while events keep flowing
//!
//! Run with: cargo run --example live_stats

use std::sync::Arc;
use std::time::Duration;

use tally::StatsService;
use tally_core::types::{BoxInfo, EventKind, ItemDrop, TradeParty};
use tally_memstore::{MemoryBoxStore, MemoryEventLog, MemoryStatsStore};
use tokio::time::sleep;

fn case_opened(user: &str, box_id: &str, item: &str, price: f64) -> EventKind {
    EventKind::CaseOpened {
        user_id: user.into(),
        user_name: user.into(),
        user_avatar: None,
        box_id: box_id.into(),
        item: ItemDrop {
            name: item.into(),
            price: Some(price),
            rarity: None,
            image: None,
        },
    }
}

#[tokio::main]
async fn main() -> tally_core::Result<()> {
    tracing_subscriber::fmt::init();

    let log = Arc::new(MemoryEventLog::new());
    let stats = Arc::new(MemoryStatsStore::new());
    let boxes = Arc::new(MemoryBoxStore::new());

    boxes.insert(BoxInfo {
        id: "chroma".into(),
        name: "Chroma Case".into(),
        price: 2.5,
    });

    // History that catch-up will replay.
    log.append(case_opened("alice", "chroma", "AK Redline", 12.0));
    log.append(case_opened("alice", "chroma", "P250 Sand Dune", 0.1));
    log.append(case_opened("bob", "chroma", "AWP Asiimov", 95.0));

    let service = StatsService::builder(log.clone(), stats.clone())
        .with_box_store(boxes)
        .start()
        .await?;

    println!(
        "caught up: {} restored, {} replayed, checkpoint {}",
        service.report().restored_records,
        service.report().replayed_events,
        service.report().checkpoint,
    );

    // Live traffic.
    log.append(case_opened("bob", "chroma", "Glock Fade", 40.0));
    log.append(EventKind::TradeOffer {
        sender: Some(TradeParty {
            user_id: "alice".into(),
            user_name: "alice".into(),
        }),
        recipient: Some(TradeParty {
            user_id: "bob".into(),
            user_name: "bob".into(),
        }),
        value: Some(12.0),
    });

    // Give the live loop a moment to drain.
    sleep(Duration::from_millis(200)).await;

    for record in service.list() {
        println!(
            "{}: {} cases, spent {:.2}, drops {:.2} (best: {}), trades {}/{}",
            record.subject,
            record.cases_opened,
            record.total_spent,
            record.total_drop_value,
            record.best_drop_name.as_deref().unwrap_or("-"),
            record.trades_sent,
            record.trades_received,
        );
    }

    service.shutdown();
    service.join().await;
    Ok(())
}

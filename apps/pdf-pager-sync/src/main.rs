//! PDF Pager sync demo
//!
//! Runs two clients against one in-memory host: a game master draws an ink
//! stroke on page 2 of a shared handout and a player's viewer picks it up.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_pager_sync::annotations::{AnnotationDescriptor, AnnotationKind};
use pdf_pager_sync::config::ActorConfig;
use pdf_pager_sync::host::{DocumentRef, RecordKind, SheetKind};
use pdf_pager_sync::memory::{MemoryHost, MemoryViewer};
use pdf_pager_sync::{AnnotationSync, Config};

const PAGE_COUNT: u32 = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "pdf_pager_sync=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting PDF Pager sync demo v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Flush debounce: {:?}", config.sync.flush_debounce());
    tracing::info!("Namespace: {}", config.sync.namespace);

    let host = MemoryHost::new();
    let handout = DocumentRef::new(RecordKind::JournalEntryPage, "Shared Handout");
    host.register(&handout);
    host.set_property(
        handout.id,
        &format!("flags.{}.objects.page1", config.sync.namespace),
        Value::String(r#"[{"kind":"stamp","x":10,"y":20}]"#.to_string()),
    );

    let gm_config = config.clone();
    let player_config = Config {
        actor: ActorConfig {
            id: format!("{}-player", config.actor.id),
        },
        ..config.clone()
    };

    let gm = AnnotationSync::new(gm_config.clone(), host.client(&gm_config.actor.id));
    let player = AnnotationSync::new(player_config.clone(), host.client(&player_config.actor.id));
    gm.install(host.events());
    player.install(host.events());

    let gm_viewer = open_viewer(&gm, &handout).await;
    let player_viewer = open_viewer(&player, &handout).await;

    gm_viewer.draw(
        2,
        AnnotationDescriptor::new(AnnotationKind::Ink, 120.0, 80.0)
            .with_size(30.0, 12.0)
            .with_payload("paths", json!([[0, 0], [15, 6], [30, 12]]))
            .with_payload("color", json!([0, 0, 255])),
    );

    // Let the flush debounce elapse and the update reach the player
    tokio::time::sleep(config.sync.flush_debounce() * 2).await;

    for page in 1..=PAGE_COUNT {
        let kinds: Vec<String> = player_viewer
            .surface()
            .objects(page)
            .iter()
            .map(|object| object.descriptor().kind.to_string())
            .collect();
        tracing::info!(page, annotations = ?kinds, "Player view");
    }

    for (who, engine) in [("gm", &gm), ("player", &player)] {
        let session = engine
            .session(handout.id)
            .context("session missing after attach")?;
        let status = serde_json::to_string(&session.status())?;
        tracing::info!(client = who, %status, "Session status");
    }

    host.close_sheet(SheetKind::PdfPage, handout.id);
    gm.shutdown().await;
    player.shutdown().await;

    tracing::info!("Demo complete after {} host updates", host.update_count());
    Ok(())
}

async fn open_viewer(engine: &AnnotationSync, document: &DocumentRef) -> Arc<MemoryViewer> {
    let viewer = MemoryViewer::new(PAGE_COUNT);
    engine.attach(document.clone(), viewer.clone()).await;
    viewer.acquire_surface();
    viewer.render_pages(1..=PAGE_COUNT);
    viewer
}

// src/main.rs
//
// Bootstrap: config -> logging -> store -> services -> view models,
// then a short scripted session against the configured database.

use std::path::PathBuf;

use anyhow::Context;
use eventlogger::{AppConfig, AppState, ButtonEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. CONFIG (optional JSON file as first argument)
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).context("failed to load configuration")?;

    // 2. LOGGING (RUST_LOG wins over the configured filter)
    env_logger::Builder::new()
        .parse_filters(&config.log_filter)
        .parse_default_env()
        .init();

    // 3. STORE + SERVICES + VIEW MODELS
    let state = AppState::initialize(config).context("failed to open the event store")?;
    state.store.verify_integrity().await?;
    log::info!("using database at {}", state.store.path().display());

    // 4. SESSION
    let main_vm = &state.main_view_model;
    main_vm.fetch_button_datasource().await?;
    main_vm.bump_page().await?;
    let buttons = main_vm.state().items;
    println!("loaded {} buttons", buttons.len());

    let kinds = [ButtonEvent::Tap, ButtonEvent::DoubleTap, ButtonEvent::LongPress];
    for (button, kind) in buttons.iter().zip(kinds) {
        let event = main_vm.track_event(button, kind).await??;
        println!("tracked {} on {}", event.kind, event.title);
    }

    let log_vm = &state.event_log_view_model;
    log_vm.refresh().await;
    let log_state = log_vm.state();
    if log_state.has_error {
        anyhow::bail!("could not read the event log");
    }
    for event in &log_state.items {
        println!("{}", log_vm.formatted(event));
    }
    if log_state.has_more {
        println!("(more events available)");
    }

    let stats = state.store.main_context().stats().await?;
    log::info!(
        "main context: {} registered, {} merges applied",
        stats.registered,
        stats.merges_applied
    );

    Ok(())
}

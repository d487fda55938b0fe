mod app;
mod config;
mod cover_fetcher;
mod credential_form;
mod error;
mod pill_view;
mod poll_engine;
mod secret_store;
mod spotify_client;

use crate::app::WidgetApp;
use crate::config::AppConfig;
use crate::error::WidgetError;
use eframe::egui::{self, ViewportBuilder};

fn main() -> Result<(), WidgetError> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting spotipill...");

    // eframe owns the main thread, so the runtime is built explicitly and
    // entered for the lifetime of the UI loop; the poll engine and cover
    // fetches are spawned onto it.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let _enter = runtime.enter();

    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config: {}", e);
        AppConfig::default()
    });

    let mut viewport = ViewportBuilder::default()
        .with_transparent(true)
        .with_decorations(false)
        .with_always_on_top()
        .with_resizable(false)
        .with_inner_size(pill_view::PILL_SIZE);
    if let Some((x, y)) = config.window_position {
        viewport = viewport.with_position(egui::pos2(x, y));
    }

    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "Spotify Now Playing",
        native_options,
        Box::new(
            move |cc| -> std::result::Result<
                Box<dyn eframe::App>,
                Box<dyn std::error::Error + Send + Sync>,
            > { Ok(Box::new(WidgetApp::new(cc, config))) },
        ),
    )
    .map_err(|e| WidgetError::Ui(e.to_string()))?;

    Ok(())
}

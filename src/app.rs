use crate::config::AppConfig;
use crate::cover_fetcher::CoverFetcher;
use crate::credential_form::{CredentialForm, FormAction, FORM_SIZE};
use crate::error::{Result, WidgetError};
use crate::pill_view::{PillView, PILL_SIZE};
use crate::poll_engine::{PlaybackState, PollEngine, SharedPlayback};
use crate::secret_store::SecretStore;
use crate::spotify_client::SpotifyClient;
use eframe::egui::{self, ViewportCommand};
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum View {
    Form(CredentialForm),
    Pill(PillView),
}

/// Top-level controller: owns the one optional poll engine and whichever
/// view is active. Bootstrap sequence: load credentials, attempt start, show
/// the entry form on failure, retry once per successful save.
pub struct WidgetApp {
    store: SecretStore,
    config: AppConfig,
    state: SharedPlayback,
    engine: Option<PollEngine>,
    view: View,
    positioned: bool,
    last_window_pos: Option<(f32, f32)>,
}

impl WidgetApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        let positioned = config.window_position.is_some();

        let mut app = Self {
            store: SecretStore::new(),
            config,
            state: Arc::new(Mutex::new(PlaybackState::new())),
            engine: None,
            view: View::Pill(PillView::new()),
            positioned,
            last_window_pos: None,
        };
        app.attempt_start(&cc.egui_ctx);
        app
    }

    fn attempt_start(&mut self, ctx: &egui::Context) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }
        *self.state.lock().unwrap() = PlaybackState::new();

        match self.try_start() {
            Ok(engine) => {
                log::info!("Poll engine started");
                self.engine = Some(engine);
                self.view = View::Pill(PillView::new());
                ctx.send_viewport_cmd(ViewportCommand::InnerSize(PILL_SIZE));
            }
            Err(e) => {
                log::warn!("Startup attempt failed: {}", e);
                let mut form = CredentialForm::new();
                if !matches!(e, WidgetError::MissingCredentials) {
                    form.set_error(e.to_string());
                }
                self.view = View::Form(form);
                ctx.send_viewport_cmd(ViewportCommand::InnerSize(FORM_SIZE));
            }
        }
    }

    fn try_start(&mut self) -> Result<PollEngine> {
        let creds = self
            .store
            .load_credentials()?
            .ok_or(WidgetError::MissingCredentials)?;

        let client = SpotifyClient::new(&creds);
        let fetcher = CoverFetcher::new()?;

        Ok(PollEngine::start(client, Arc::clone(&self.state), fetcher))
    }

    /// Place the pill bottom-center of the monitor on first paint unless a
    /// saved position was restored.
    fn position_pill(&mut self, ctx: &egui::Context) {
        if self.positioned || !matches!(self.view, View::Pill(_)) {
            return;
        }

        if let Some(size) = ctx.input(|i| i.viewport().monitor_size) {
            if size.x > 0.0 && size.y > 0.0 {
                let pos = egui::pos2(
                    (size.x - PILL_SIZE.x) / 2.0,
                    size.y - PILL_SIZE.y - 20.0,
                );
                ctx.send_viewport_cmd(ViewportCommand::OuterPosition(pos));
                self.positioned = true;
            }
        }
    }
}

impl eframe::App for WidgetApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.position_pill(ctx);

        if let Some(rect) = ctx.input(|i| i.viewport().outer_rect) {
            self.last_window_pos = Some((rect.min.x, rect.min.y));
        }

        let action = match &mut self.view {
            View::Form(form) => Some(form.show(ctx)),
            View::Pill(pill) => {
                let state = self.state.lock().unwrap();
                pill.show(ctx, &state);
                drop(state);

                // The poll engine runs on its own cadence; repaint often
                // enough to pick up state and cover changes promptly.
                ctx.request_repaint_after(Duration::from_millis(250));
                None
            }
        };

        if let Some(FormAction::Saved(creds)) = action {
            match self.store.save_credentials(&creds) {
                Ok(()) => self.attempt_start(ctx),
                Err(e) => {
                    log::error!("Failed to save credentials: {}", e);
                    if let View::Form(form) = &mut self.view {
                        form.set_error(format!("Failed to save credentials: {}", e));
                    }
                }
            }
        }
    }

    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        egui::Rgba::TRANSPARENT.to_array()
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }

        self.config.window_position = self.last_window_pos;
        if let Err(e) = self.config.save() {
            log::warn!("Failed to save config: {}", e);
        }
    }
}

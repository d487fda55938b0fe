use crate::secret_store::{StoredCredentials, DEFAULT_REDIRECT_URI};
use eframe::egui::{self, Color32, FontId, RichText, Vec2};

pub const FORM_SIZE: Vec2 = Vec2::new(400.0, 360.0);

const SPOTIFY_GREEN: Color32 = Color32::from_rgb(0x1D, 0xB9, 0x54);
const FIELD_LABEL: Color32 = Color32::from_rgb(0xEE, 0xEE, 0xEE);
const ERROR_COLOR: Color32 = Color32::from_rgb(0xFF, 0x45, 0x00);

/// What the form produced this frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormAction {
    None,
    Saved(StoredCredentials),
}

/// Credential-entry form shown when the app cannot start. Owns only the
/// in-progress field text; saved values go to the secret store.
pub struct CredentialForm {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    error: Option<String>,
}

impl CredentialForm {
    pub fn new() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            error: None,
        }
    }

    pub fn set_error(&mut self, message: String) {
        self.error = Some(message);
    }

    pub fn show(&mut self, ctx: &egui::Context) -> FormAction {
        let mut action = FormAction::None;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(8.0);
            ui.label(
                RichText::new("Please enter your Spotify credentials")
                    .font(FontId::proportional(20.0))
                    .color(FIELD_LABEL),
            );
            ui.add_space(16.0);

            ui.label(RichText::new("Client ID:").color(FIELD_LABEL));
            ui.add(
                egui::TextEdit::singleline(&mut self.client_id).desired_width(f32::INFINITY),
            );
            ui.add_space(12.0);

            ui.label(RichText::new("Client Secret:").color(FIELD_LABEL));
            ui.add(
                egui::TextEdit::singleline(&mut self.client_secret)
                    .password(true)
                    .desired_width(f32::INFINITY),
            );
            ui.add_space(12.0);

            ui.label(RichText::new("Redirect URI:").color(FIELD_LABEL));
            ui.add(
                egui::TextEdit::singleline(&mut self.redirect_uri).desired_width(f32::INFINITY),
            );
            ui.add_space(16.0);

            if let Some(error) = &self.error {
                ui.colored_label(ERROR_COLOR, error);
                ui.add_space(8.0);
            }

            let save = egui::Button::new(RichText::new("Save Credentials").color(Color32::WHITE))
                .fill(SPOTIFY_GREEN)
                .min_size(Vec2::new(ui.available_width(), 32.0));

            if ui.add(save).clicked() {
                match self.validate() {
                    Ok(creds) => {
                        self.error = None;
                        action = FormAction::Saved(creds);
                    }
                    Err(message) => self.error = Some(message),
                }
            }
        });

        action
    }

    /// Trim the fields and require all three to be non-empty.
    fn validate(&self) -> Result<StoredCredentials, String> {
        let client_id = self.client_id.trim();
        let client_secret = self.client_secret.trim();
        let redirect_uri = self.redirect_uri.trim();

        if client_id.is_empty() || client_secret.is_empty() || redirect_uri.is_empty() {
            return Err("Please fill in all three fields.".to_string());
        }

        Ok(StoredCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
        })
    }
}

impl Default for CredentialForm {
    fn default() -> Self {
        Self::new()
    }
}

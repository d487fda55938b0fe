use crate::poll_engine::{PlayStatus, PlaybackState};
use eframe::egui::{
    self, Align2, Color32, ColorImage, CornerRadius, FontId, Rect, Sense, Stroke, StrokeKind,
    TextureHandle, TextureOptions, Vec2, ViewportCommand,
};

pub const PILL_SIZE: Vec2 = Vec2::new(280.0, 70.0);

const PILL_BACKGROUND: Color32 = Color32::from_rgb(0x10, 0x10, 0x10);
const PILL_BORDER: Color32 = Color32::from_rgb(0x48, 0x48, 0x48);
const TITLE_NORMAL: Color32 = Color32::WHITE;
const TITLE_WARN: Color32 = Color32::from_rgb(0xFF, 0x45, 0x00);
const TITLE_PAUSED: Color32 = Color32::from_rgb(0xFF, 0xFF, 0x00);
const ARTIST_COLOR: Color32 = Color32::from_rgb(0xB3, 0xB3, 0xB3);
const GLYPH_COLOR: Color32 = Color32::from_rgb(0xEE, 0xEE, 0xEE);

/// Renders the pill from a read-only playback snapshot. Holds only GPU-side
/// texture state; all playback state belongs to the poll engine.
pub struct PillView {
    cover_texture: Option<TextureHandle>,
    cover_epoch: u64,
}

impl PillView {
    pub fn new() -> Self {
        Self {
            cover_texture: None,
            cover_epoch: 0,
        }
    }

    pub fn show(&mut self, ctx: &egui::Context, state: &PlaybackState) {
        self.sync_cover_texture(ctx, state);

        egui::CentralPanel::default()
            .frame(egui::Frame::default())
            .show(ctx, |ui| {
                self.paint(ui, state);
            });
    }

    /// Re-upload the cover texture only when the engine delivered new art.
    fn sync_cover_texture(&mut self, ctx: &egui::Context, state: &PlaybackState) {
        match &state.cover {
            Some(art) => {
                if self.cover_texture.is_none() || self.cover_epoch != state.cover_epoch {
                    let img =
                        ColorImage::from_rgba_unmultiplied([art.width, art.height], &art.rgba);
                    self.cover_texture =
                        Some(ctx.load_texture("pill.cover", img, TextureOptions::LINEAR));
                    self.cover_epoch = state.cover_epoch;
                }
            }
            None => {
                self.cover_texture = None;
            }
        }
    }

    fn paint(&self, ui: &mut egui::Ui, state: &PlaybackState) {
        let rect = ui.max_rect();
        let painter = ui.painter();

        painter.rect_filled(rect, CornerRadius::same(22), PILL_BACKGROUND);
        painter.rect_stroke(
            rect,
            CornerRadius::same(22),
            Stroke::new(1.0, PILL_BORDER),
            StrokeKind::Inside,
        );

        let cover_rect = Rect::from_min_size(
            rect.min + Vec2::new(8.0, 8.0),
            Vec2::new(54.0, 54.0),
        );

        if let Some(texture) = &self.cover_texture {
            egui::Image::new(texture)
                .uv(center_crop_uv(texture.size_vec2()))
                .corner_radius(14.0)
                .paint_at(ui, cover_rect);
        } else {
            painter.text(
                cover_rect.center(),
                Align2::CENTER_CENTER,
                status_glyph(state.status),
                FontId::proportional(30.0),
                GLYPH_COLOR,
            );
        }

        let text_left = rect.min.x + 70.0;
        let text_right = rect.max.x - 10.0;

        let title_rect = Rect::from_min_max(
            egui::pos2(text_left, rect.min.y + 14.0),
            egui::pos2(text_right, rect.min.y + 38.0),
        );
        ui.put(
            title_rect,
            egui::Label::new(
                egui::RichText::new(&state.title)
                    .font(FontId::proportional(15.0))
                    .strong()
                    .color(title_color(state.status)),
            )
            .truncate(),
        );

        let artist_rect = Rect::from_min_max(
            egui::pos2(text_left, rect.min.y + 40.0),
            egui::pos2(text_right, rect.min.y + 58.0),
        );
        ui.put(
            artist_rect,
            egui::Label::new(
                egui::RichText::new(&state.artist)
                    .font(FontId::proportional(11.0))
                    .color(ARTIST_COLOR),
            )
            .truncate(),
        );

        let response = ui.interact(rect, ui.id().with("pill"), Sense::click_and_drag());
        if response.drag_started() {
            ui.ctx().send_viewport_cmd(ViewportCommand::StartDrag);
        }
        if let Some(notice) = &state.notice {
            response.on_hover_text(notice);
        }
    }
}

impl Default for PillView {
    fn default() -> Self {
        Self::new()
    }
}

/// UV rect that center-crops a non-square texture to a square, matching the
/// 54x54 cover slot.
fn center_crop_uv(size: Vec2) -> Rect {
    if size.x > size.y && size.x > 0.0 {
        let margin = (1.0 - size.y / size.x) / 2.0;
        Rect::from_min_max(egui::pos2(margin, 0.0), egui::pos2(1.0 - margin, 1.0))
    } else if size.y > size.x && size.y > 0.0 {
        let margin = (1.0 - size.x / size.y) / 2.0;
        Rect::from_min_max(egui::pos2(0.0, margin), egui::pos2(1.0, 1.0 - margin))
    } else {
        Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0))
    }
}

fn status_glyph(status: PlayStatus) -> &'static str {
    match status {
        PlayStatus::AdPlaying => "📢",
        PlayStatus::Paused => "⏸",
        PlayStatus::Idle => "🌙",
        PlayStatus::Error => "⚠",
        PlayStatus::Loading | PlayStatus::Playing => "🎶",
    }
}

fn title_color(status: PlayStatus) -> Color32 {
    match status {
        PlayStatus::Error | PlayStatus::AdPlaying => TITLE_WARN,
        PlayStatus::Paused => TITLE_PAUSED,
        _ => TITLE_NORMAL,
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use eframe::egui;

use crate::gemini::{self, EditOutcome, GeminiConfig};
use crate::overlay::{AnnotationOverlay, OverlayEvent, OverlayInputs};
use crate::types::{Annotation, Offset};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AppMode {
    Translate,
    Edit,
}

/// The loaded source image: the encoded bytes we send to the service plus
/// the decoded form we render.
struct Picture {
    bytes: Vec<u8>,
    mime: String,
    raw: image::DynamicImage,
    texture: Option<egui::TextureHandle>,
}

impl Picture {
    fn ensure_texture(&mut self, ctx: &egui::Context) {
        if self.texture.is_some() {
            return;
        }
        let rgba = self.raw.to_rgba8();
        let size = [rgba.width() as usize, rgba.height() as usize];
        let pixels = rgba.as_flat_samples();
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
        self.texture = Some(ctx.load_texture("picture", color_image, egui::TextureOptions::LINEAR));
    }
}

enum ServiceReply {
    Annotations(Result<Vec<Annotation>, String>),
    Edited(Result<EditOutcome, String>),
}

enum EditedOutput {
    Image { id: u64, bytes: Vec<u8> },
    Text(String),
}

pub struct TranslateOverlayApp {
    mode: AppMode,
    config: GeminiConfig,

    picture: Option<Picture>,
    annotations: Vec<Annotation>,
    offsets: HashMap<usize, Offset>,
    // Bumped on every image load / annotation replacement so the overlay
    // can invalidate in-flight drag or edit sessions.
    epoch: u64,
    overlay: AnnotationOverlay,

    prompt: String,
    edited: Option<EditedOutput>,
    edited_seq: u64,

    pending: Option<mpsc::Receiver<ServiceReply>>,
    error: Option<String>,
}

impl TranslateOverlayApp {
    pub fn new(cc: &eframe::CreationContext<'_>, initial_image: Option<PathBuf>) -> Self {
        egui_extras::install_image_loaders(&cc.egui_ctx);
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let mut this = Self {
            mode: AppMode::Translate,
            config: GeminiConfig::from_env(),
            picture: None,
            annotations: Vec::new(),
            offsets: HashMap::new(),
            epoch: 0,
            overlay: AnnotationOverlay::new(),
            prompt: String::new(),
            edited: None,
            edited_seq: 0,
            pending: None,
            error: None,
        };
        if let Some(path) = initial_image {
            if let Err(err) = this.load_image_path(&path) {
                this.error = Some(err.to_string());
            }
        }
        this
    }

    fn load_image_path(&mut self, path: &Path) -> Result<()> {
        let mime = mime_for_path(path).ok_or_else(|| {
            anyhow!("only image files (PNG, JPEG, WEBP, GIF) are supported")
        })?;
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.load_image_bytes(bytes, mime.to_string())
    }

    fn load_image_bytes(&mut self, bytes: Vec<u8>, mime: String) -> Result<()> {
        let raw = image::load_from_memory(&bytes).context("failed to decode image")?;
        tracing::info!(
            mime = %mime,
            width = raw.width(),
            height = raw.height(),
            "image loaded"
        );
        self.picture = Some(Picture {
            bytes,
            mime,
            raw,
            texture: None,
        });
        self.annotations.clear();
        self.offsets.clear();
        self.edited = None;
        self.epoch += 1;
        self.error = None;
        Ok(())
    }

    fn load_dropped(&mut self, file: egui::DroppedFile) -> Result<()> {
        if let Some(bytes) = file.bytes {
            let mime = if file.mime.starts_with("image/") {
                file.mime.clone()
            } else {
                mime_for_path(Path::new(&file.name))
                    .ok_or_else(|| {
                        anyhow!("only image files (PNG, JPEG, WEBP, GIF) are supported")
                    })?
                    .to_string()
            };
            self.load_image_bytes(bytes.to_vec(), mime)
        } else if let Some(path) = file.path {
            self.load_image_path(&path)
        } else {
            Err(anyhow!("dropped file carried no data"))
        }
    }

    fn request_translate(&mut self) {
        let Some(picture) = &self.picture else {
            return;
        };
        let (tx, rx) = mpsc::channel();
        let cfg = self.config.clone();
        let bytes = picture.bytes.clone();
        let mime = picture.mime.clone();
        std::thread::spawn(move || {
            let result = gemini::translate_image(&cfg, &bytes, &mime).map_err(|err| err.to_string());
            let _ = tx.send(ServiceReply::Annotations(result));
        });
        self.pending = Some(rx);
        self.error = None;
    }

    fn request_edit(&mut self) {
        let Some(picture) = &self.picture else {
            return;
        };
        let (tx, rx) = mpsc::channel();
        let cfg = self.config.clone();
        let bytes = picture.bytes.clone();
        let mime = picture.mime.clone();
        let prompt = self.prompt.clone();
        std::thread::spawn(move || {
            let result =
                gemini::edit_image(&cfg, &bytes, &mime, &prompt).map_err(|err| err.to_string());
            let _ = tx.send(ServiceReply::Edited(result));
        });
        self.pending = Some(rx);
        self.error = None;
    }

    fn poll_pending(&mut self, ctx: &egui::Context) {
        let Some(rx) = &self.pending else {
            return;
        };
        match rx.try_recv() {
            Ok(reply) => {
                self.pending = None;
                self.apply_reply(reply);
            }
            Err(mpsc::TryRecvError::Empty) => {
                ctx.request_repaint_after(std::time::Duration::from_millis(100));
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                self.pending = None;
                self.error = Some("background request was dropped".to_string());
            }
        }
    }

    fn apply_reply(&mut self, reply: ServiceReply) {
        match reply {
            ServiceReply::Annotations(Ok(annotations)) => {
                tracing::info!(count = annotations.len(), "annotations received");
                self.annotations = annotations;
                self.offsets.clear();
                self.epoch += 1;
            }
            ServiceReply::Edited(Ok(EditOutcome::Image(bytes))) => {
                self.edited_seq += 1;
                self.edited = Some(EditedOutput::Image {
                    id: self.edited_seq,
                    bytes,
                });
            }
            ServiceReply::Edited(Ok(EditOutcome::Text(text))) => {
                self.edited = Some(EditedOutput::Text(text));
            }
            ServiceReply::Annotations(Err(err)) | ServiceReply::Edited(Err(err)) => {
                tracing::warn!(error = %err, "service request failed");
                self.error = Some(err);
            }
        }
    }

    fn apply_overlay_events(&mut self, events: Vec<OverlayEvent>) {
        for event in events {
            match event {
                OverlayEvent::OffsetChanged(index, offset) => {
                    self.offsets.insert(index, offset);
                }
                OverlayEvent::TextChanged(index, text) => {
                    if let Some(ann) = self.annotations.get_mut(index) {
                        ann.translation = text;
                    }
                }
            }
        }
    }

    fn handle_file_drops(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if let Some(file) = dropped.into_iter().next() {
            if let Err(err) = self.load_dropped(file) {
                self.error = Some(err.to_string());
            }
        }

        if ctx.input(|i| !i.raw.hovered_files.is_empty()) {
            let painter = ctx.layer_painter(egui::LayerId::new(
                egui::Order::Foreground,
                egui::Id::new("file_drop_overlay"),
            ));
            let rect = ctx.screen_rect();
            painter.rect_filled(rect, 0.0, egui::Color32::from_black_alpha(128));
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Drop image to load",
                egui::FontId::proportional(28.0),
                egui::Color32::WHITE,
            );
        }
    }

    fn open_file_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Image", &["png", "jpg", "jpeg", "webp", "gif"])
            .pick_file()
        {
            if let Err(err) = self.load_image_path(&path) {
                self.error = Some(err.to_string());
            }
        }
    }

    fn draw_plain_image(ui: &mut egui::Ui, texture: &egui::TextureHandle) {
        let tex_size = texture.size_vec2();
        let avail = ui.available_size();
        let scale = (avail.x / tex_size.x).min(avail.y / tex_size.y);
        if scale.is_finite() && scale > 0.0 {
            ui.add(egui::Image::new((texture.id(), tex_size * scale)));
        }
    }
}

impl eframe::App for TranslateOverlayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_pending(ctx);
        self.handle_file_drops(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Open...").clicked() {
                    self.open_file_dialog();
                }
                ui.separator();
                ui.selectable_value(&mut self.mode, AppMode::Translate, "Translate");
                ui.selectable_value(&mut self.mode, AppMode::Edit, "Edit");
                ui.separator();
                match self.mode {
                    AppMode::Translate => {
                        let ready = self.picture.is_some() && self.pending.is_none();
                        if ui
                            .add_enabled(ready, egui::Button::new("Translate image"))
                            .clicked()
                        {
                            self.request_translate();
                        }
                        if !self.annotations.is_empty() {
                            ui.label(format!("{} regions", self.annotations.len()));
                        }
                    }
                    AppMode::Edit => {
                        ui.label("Prompt:");
                        ui.add(
                            egui::TextEdit::singleline(&mut self.prompt).desired_width(320.0),
                        );
                        let ready = self.picture.is_some()
                            && self.pending.is_none()
                            && !self.prompt.trim().is_empty();
                        if ui.add_enabled(ready, egui::Button::new("Apply")).clicked() {
                            self.request_edit();
                        }
                    }
                }
                if self.pending.is_some() {
                    ui.spinner();
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(err) = &self.error {
                ui.colored_label(egui::Color32::RED, err);
            }

            if self.picture.is_none() {
                ui.centered_and_justified(|ui| {
                    ui.label("Open an image or drop one onto the window");
                });
                return;
            }

            match self.mode {
                AppMode::Translate => {
                    if let Some(picture) = &mut self.picture {
                        picture.ensure_texture(ctx);
                        if let Some(texture) = &picture.texture {
                            let events = self.overlay.show(
                                ui,
                                OverlayInputs {
                                    texture,
                                    annotations: &self.annotations,
                                    offsets: &self.offsets,
                                    epoch: self.epoch,
                                },
                            );
                            self.apply_overlay_events(events);
                        }
                    }
                }
                AppMode::Edit => match &self.edited {
                    Some(EditedOutput::Image { id, bytes }) => {
                        ui.add(
                            egui::Image::from_bytes(
                                format!("bytes://edited-{id}"),
                                bytes.clone(),
                            )
                            .max_size(ui.available_size()),
                        );
                    }
                    Some(EditedOutput::Text(text)) => {
                        if let Some(picture) = &mut self.picture {
                            picture.ensure_texture(ctx);
                            if let Some(texture) = &picture.texture {
                                Self::draw_plain_image(ui, texture);
                            }
                        }
                        ui.separator();
                        ui.label(text.as_str());
                    }
                    None => {
                        if let Some(picture) = &mut self.picture {
                            picture.ensure_texture(ctx);
                            if let Some(texture) = &picture.texture {
                                Self::draw_plain_image(ui, texture);
                            }
                        }
                    }
                },
            }
        });
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

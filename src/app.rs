use egui::{Align2, Color32, FontId, Pos2, Shape, Stroke, Vec2, pos2};
use std::path::PathBuf;

use crate::asset::AssetCatalog;
use crate::config::EditorConfig;
use futures::channel::oneshot;

use crate::error::EditorResult;
use crate::export::batch::{self, BatchSummary, SleepThrottle};
use crate::export::{FsBitmapLoader, RasterExporter, SoftwareRenderer};
use crate::io::FixedPrompt;
use crate::layer::{Layer, LayerId, LayerPatch, TextPatch};
use crate::state::{EditorSession, EframeStorage, FileStorage, KeyValueStorage, copy_keys};
use crate::text_format::parse_formatted_text;
use crate::util::time::current_time_secs;

/// Seconds a status message stays visible
const STATUS_TIMEOUT: f64 = 5.0;

/// Where the app finds its assets and writes its files
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub assets_dir: PathBuf,
    /// Import, export and batch prompts resolve inside this directory
    pub workspace: PathBuf,
    pub config: EditorConfig,
}

impl AppOptions {
    fn state_dir(&self) -> PathBuf {
        self.workspace.join(".card-editor")
    }
}

pub struct CardEditorApp {
    session: EditorSession,
    exporter: RasterExporter<SoftwareRenderer<FsBitmapLoader>>,
    options: AppOptions,
    /// File name, relative to the workspace, offered to the import prompt
    import_name: String,
    title_edit: String,
    dragging: Option<LayerId>,
    status: Option<(String, f64)>,
    /// Result of the batch export running on a worker thread
    batch: Option<oneshot::Receiver<EditorResult<BatchSummary>>>,
}

impl CardEditorApp {
    /// Called once before the first frame.
    pub fn new(cc: &eframe::CreationContext<'_>, options: AppOptions) -> Self {
        let catalog = match AssetCatalog::scan_dir(&options.assets_dir) {
            Ok(catalog) => catalog,
            Err(err) => {
                log::error!("Failed to scan assets in {}: {}", options.assets_dir.display(), err);
                AssetCatalog::from_paths(std::iter::empty::<(&str, String)>())
            }
        };

        let mut storage = FileStorage::new(options.state_dir());
        if let Some(saved) = cc.storage {
            restore_from_app_storage(saved, &mut storage, &storage_keys(&options.config));
        }

        let session = EditorSession::new(Box::new(storage), catalog, options.config.clone());
        let exporter = session.exporter(SoftwareRenderer::new(FsBitmapLoader::default()));
        let title_edit = session.canvas_title().to_owned();

        Self {
            session,
            exporter,
            options,
            import_name: String::new(),
            title_edit,
            dragging: None,
            status: None,
            batch: None,
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), current_time_secs()));
    }

    fn report<T>(&mut self, action: &str, result: EditorResult<Option<T>>, describe: impl FnOnce(T) -> String) {
        match result {
            Ok(Some(value)) => {
                let message = describe(value);
                self.set_status(message);
            }
            Ok(None) => log::debug!("{} cancelled", action),
            Err(err) => {
                log::error!("{} failed: {}", action, err);
                self.set_status(format!("{action} failed: {err}"));
            }
        }
    }

    fn workspace_prompt(&self) -> FixedPrompt {
        FixedPrompt::default()
            .with_save_dir(&self.options.workspace)
    }

    fn import(&mut self) {
        let name = self.import_name.trim();
        let mut prompt = if name.is_empty() {
            FixedPrompt::cancelled()
        } else {
            FixedPrompt::default().with_open(self.options.workspace.join(name))
        };
        let result = self.session.import_from_prompt(&mut prompt);
        self.report("Import", result, |report| {
            if report.unresolved.is_empty() {
                format!("Imported {} layers", report.layer_count)
            } else {
                format!(
                    "Imported {} layers, {} assets missing",
                    report.layer_count,
                    report.unresolved.len()
                )
            }
        });
        self.title_edit = self.session.canvas_title().to_owned();
    }

    fn export_json(&mut self) {
        let mut prompt = self.workspace_prompt();
        let result = self.session.export_json_to_prompt(&mut prompt);
        self.report("Export JSON", result, |path| format!("Saved {}", path.display()));
    }

    fn export_png(&mut self) {
        let mut prompt = self.workspace_prompt();
        let result = self.session.export_png_to_prompt(&mut prompt, &mut self.exporter);
        self.report("Export PNG", result, |path| format!("Saved {}", path.display()));
    }

    /// Render the workspace documents on a worker thread; the result arrives in `poll_batch`
    fn batch_export(&mut self, ctx: &egui::Context) {
        if self.batch.is_some() {
            return;
        }
        let dir = self.options.workspace.clone();
        let catalog = self.session.catalog().clone();
        let config = self.session.config().clone();
        let ctx = ctx.clone();
        let (sender, receiver) = oneshot::channel();

        let spawned = std::thread::Builder::new()
            .name("batch-export".to_owned())
            .spawn(move || {
                let mut exporter = RasterExporter::new(
                    SoftwareRenderer::new(FsBitmapLoader::default()),
                    config.export,
                    config.canvas_size,
                );
                let result = futures::executor::block_on(batch::export_directory(
                    &dir,
                    &catalog,
                    &mut exporter,
                    &mut SleepThrottle,
                    config.batch.directory,
                ));
                if sender.send(result).is_err() {
                    log::debug!("Batch export finished after the app closed");
                }
                ctx.request_repaint();
            });

        match spawned {
            Ok(_) => {
                self.batch = Some(receiver);
                self.set_status("Batch export running");
            }
            Err(err) => {
                log::error!("Failed to start batch export: {}", err);
                self.set_status(format!("Batch export failed: {err}"));
            }
        }
    }

    fn poll_batch(&mut self) {
        let Some(receiver) = self.batch.as_mut() else {
            return;
        };
        match receiver.try_recv() {
            Ok(None) => {}
            Ok(Some(result)) => {
                self.batch = None;
                self.report("Batch export", result.map(Some), |summary| summary.to_string());
            }
            Err(oneshot::Canceled) => {
                self.batch = None;
                log::error!("Batch export worker stopped without a result");
                self.set_status("Batch export stopped");
            }
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let title = ui.text_edit_singleline(&mut self.title_edit);
            if title.lost_focus() && self.title_edit != self.session.canvas_title() {
                let title = self.title_edit.clone();
                self.session.set_canvas_title(&title);
            }

            ui.separator();
            if ui.add_enabled(self.session.can_undo(), egui::Button::new("Undo")).clicked() {
                self.session.undo();
            }
            if ui.add_enabled(self.session.can_redo(), egui::Button::new("Redo")).clicked() {
                self.session.redo();
            }

            let mut capacity = self.session.history().capacity();
            let response = ui.add(egui::DragValue::new(&mut capacity).range(10..=200).prefix("History: "));
            if response.changed() {
                self.session.set_history_capacity(capacity);
            }

            ui.separator();
            ui.add(egui::TextEdit::singleline(&mut self.import_name).hint_text("document.json"));
            if ui.button("Import").clicked() {
                self.import();
            }
            if ui.button("Export JSON").clicked() {
                self.export_json();
            }
            if ui.button("Export PNG").clicked() {
                self.export_png();
            }
            if ui
                .add_enabled(self.batch.is_none(), egui::Button::new("Batch export"))
                .clicked()
            {
                self.batch_export(ui.ctx());
            }
        });
    }

    fn assets_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Assets");
        let mut picked = None;
        egui::ScrollArea::vertical().show(ui, |ui| {
            for (category, assets) in self.session.catalog().by_category() {
                egui::CollapsingHeader::new(category)
                    .default_open(true)
                    .show(ui, |ui| {
                        for asset in assets {
                            if ui.button(&asset.name).clicked() {
                                picked = Some(asset.id.clone());
                            }
                        }
                    });
            }
        });

        if let Some(asset_id) = picked {
            if let Err(err) = self.session.add_asset(&asset_id, None) {
                self.set_status(err.to_string());
            }
        }
    }

    fn layers_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Layers");
        let layers: Vec<(LayerId, String, bool)> = self
            .session
            .layers()
            .iter()
            .rev()
            .map(|layer| (layer.id.clone(), layer.name.clone(), layer.locked))
            .collect();

        for (index, (id, name, locked)) in layers.iter().enumerate() {
            ui.horizontal(|ui| {
                let selected = self.session.selected() == Some(id);
                let label = if *locked { format!("🔒 {name}") } else { name.clone() };
                if ui.selectable_label(selected, label).clicked() {
                    self.session.select(Some(id.clone()));
                }
                if ui.small_button(if *locked { "Unlock" } else { "Lock" }).clicked() {
                    self.session.update_layer(id, LayerPatch::Locked(!locked));
                }
                if *locked {
                    return;
                }
                // The list shows the top layer first; locked neighbours are not drop targets
                let above = index.checked_sub(1).map(|i| &layers[i]).filter(|(_, _, l)| !l);
                let below = layers.get(index + 1).filter(|(_, _, l)| !l);
                if let Some((target, _, _)) = above {
                    if ui.small_button("⬆").clicked() {
                        self.session.reorder_layers(id, target);
                    }
                }
                if let Some((target, _, _)) = below {
                    if ui.small_button("⬇").clicked() {
                        self.session.reorder_layers(id, target);
                    }
                }
                if ui.small_button("Duplicate").clicked() {
                    self.session.duplicate_layer(id);
                }
                if ui.small_button("Delete").clicked() {
                    self.session.delete_layer(id);
                }
            });
        }

        if !layers.is_empty() && ui.button("Clear all").clicked() {
            self.session.clear_layers();
        }

        ui.separator();
        self.properties(ui);
    }

    fn properties(&mut self, ui: &mut egui::Ui) {
        let Some(layer) = self.session.selected_layer().cloned() else {
            return;
        };
        ui.heading(&layer.name);

        let mut rotation = layer.rotation;
        if ui
            .add(egui::DragValue::new(&mut rotation).speed(1.0).suffix("°"))
            .changed()
        {
            self.session.update_layer(&layer.id, LayerPatch::Rotation(rotation));
        }

        let mut opacity = layer.opacity;
        if ui.add(egui::Slider::new(&mut opacity, 0.1..=1.0).text("Opacity")).changed() {
            self.session.update_layer(&layer.id, LayerPatch::Opacity(opacity));
        }

        let mut scale = layer.scale;
        let changed_x = ui.add(egui::DragValue::new(&mut scale.x).speed(0.01).range(0.01..=20.0)).changed();
        let changed_y = ui.add(egui::DragValue::new(&mut scale.y).speed(0.01).range(0.01..=20.0)).changed();
        if changed_x || changed_y {
            self.session.resize_layer(&layer.id, scale);
        }

        if let Some(style) = layer.text_style() {
            let mut text = style.text.clone();
            if ui.text_edit_multiline(&mut text).changed() {
                self.session.update_layer(
                    &layer.id,
                    LayerPatch::Text(TextPatch {
                        text: Some(text),
                        ..TextPatch::default()
                    }),
                );
            }
        }
    }

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        let origin = response.rect.min.to_vec2();
        let board = self.session.config().canvas_size;
        painter.rect_stroke(
            egui::Rect::from_min_size(response.rect.min, board.to_vec2()),
            0.0,
            Stroke::new(1.0, Color32::GRAY),
        );

        for layer in self.session.layers() {
            paint_layer_outline(&painter, layer, origin, self.session.selected() == Some(&layer.id));
        }

        let pointer = response.interact_pointer_pos().map(|pos| pos - origin);
        if response.drag_started() {
            self.dragging = pointer.and_then(|pos| self.topmost_at(pos));
            self.session.select(self.dragging.clone());
            if self.dragging.is_some() {
                self.session.begin_gesture();
            }
        }
        if response.dragged() {
            if let Some(id) = self.dragging.clone() {
                self.session.drag_layer(&id, response.drag_delta());
            }
        }
        if response.drag_stopped() && self.dragging.take().is_some() {
            self.session.end_gesture();
        }
        if response.clicked() {
            let hit = pointer.and_then(|pos| self.topmost_at(pos));
            self.session.select(hit);
        }
    }

    /// Topmost unlocked layer under `pos`, in canvas space
    fn topmost_at(&self, pos: Pos2) -> Option<LayerId> {
        self.session
            .layers()
            .iter()
            .rev()
            .filter(|layer| !layer.locked)
            .find(|layer| layer.rotated_bounds().contains(pos))
            .map(|layer| layer.id.clone())
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let (undo, redo, delete) = ctx.input(|i| {
            let command = i.modifiers.command;
            (
                command && !i.modifiers.shift && i.key_pressed(egui::Key::Z),
                command && (i.key_pressed(egui::Key::Y) || (i.modifiers.shift && i.key_pressed(egui::Key::Z))),
                i.key_pressed(egui::Key::Delete),
            )
        });

        if undo {
            self.session.undo();
        }
        if redo {
            self.session.redo();
        }
        if delete && !ctx.wants_keyboard_input() {
            if let Some(id) = self.session.selected().cloned() {
                self.session.delete_layer(&id);
            }
        }
    }
}

fn paint_layer_outline(painter: &egui::Painter, layer: &Layer, origin: Vec2, selected: bool) {
    let rect = layer.bounds().translate(origin);
    let center = rect.center();
    let (sin, cos) = layer.rotation.to_radians().sin_cos();
    let corners = [rect.left_top(), rect.right_top(), rect.right_bottom(), rect.left_bottom()]
        .map(|corner| {
            let d = corner - center;
            pos2(center.x + d.x * cos - d.y * sin, center.y + d.x * sin + d.y * cos)
        })
        .to_vec();

    let fill = match layer.src {
        Some(_) => Color32::from_rgba_unmultiplied(120, 160, 220, (layer.opacity * 80.0) as u8),
        None if layer.text_style().is_some() => Color32::from_white_alpha(40),
        None => Color32::from_rgba_unmultiplied(200, 60, 60, 60),
    };
    let stroke = if selected {
        Stroke::new(2.0, Color32::LIGHT_BLUE)
    } else if layer.locked {
        Stroke::new(1.0, Color32::DARK_GRAY)
    } else {
        Stroke::new(1.0, Color32::GRAY)
    };
    painter.add(Shape::convex_polygon(corners, fill, stroke));

    let label = match layer.text_style() {
        Some(style) => parse_formatted_text(&style.text)
            .into_iter()
            .map(|span| span.text)
            .collect::<String>(),
        None => layer.name.clone(),
    };
    painter.text(center, Align2::CENTER_CENTER, label, FontId::proportional(14.0), layer.tint.color());
}

fn storage_keys(config: &EditorConfig) -> [&str; 3] {
    [
        config.storage.layers.as_str(),
        config.storage.canvas_title.as_str(),
        config.storage.history_size.as_str(),
    ]
}

/// Seed empty file storage from what eframe saved last run
fn restore_from_app_storage(saved: &dyn eframe::Storage, storage: &mut FileStorage, keys: &[&str]) {
    for key in keys {
        if storage.get(key).is_some() {
            continue;
        }
        if let Some(value) = saved.get_string(key).filter(|value| !value.is_empty()) {
            if let Err(err) = storage.set(key, value) {
                log::warn!("Failed to restore {}: {}", key, err);
            }
        }
    }
}

impl eframe::App for CardEditorApp {
    /// Called by the frame work to save state before shutdown.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let keys = storage_keys(&self.options.config);
        let mut target = EframeStorage::new(storage);
        if let Err(err) = copy_keys(self.session.store().storage(), &mut target, &keys) {
            log::error!("Failed to save editor state: {}", err);
        }
    }

    /// Called each time the UI needs repainting, which may be many times per second.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_batch();
        self.handle_shortcuts(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            let expired = self
                .status
                .as_ref()
                .is_some_and(|(_, since)| current_time_secs() - since > STATUS_TIMEOUT);
            if expired {
                self.status = None;
            }
            match (&self.status, self.session.store().last_persistence_error()) {
                (Some((message, _)), _) => ui.label(message),
                (None, Some(err)) => ui.colored_label(Color32::RED, format!("Not saved: {err}")),
                (None, None) => ui.label(format!("{} layers", self.session.layers().len())),
            };
        });

        egui::SidePanel::left("assets").show(ctx, |ui| self.assets_panel(ui));
        egui::SidePanel::right("layers").show(ctx, |ui| self.layers_panel(ui));
        egui::CentralPanel::default().show(ctx, |ui| self.canvas(ui));
    }
}

impl std::fmt::Debug for CardEditorApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardEditorApp")
            .field("session", &self.session)
            .field("workspace", &self.options.workspace)
            .finish()
    }
}

use std::collections::HashMap;

use eframe::egui;

use crate::types::{Annotation, Offset};

// ── Layout computation ──────────────────────────────────────────────────────

/// Gap between a box edge and its label, in pixels.
const LABEL_GAP: f32 = 4.0;

/// Inner padding of a label, in pixels.
const LABEL_PADDING: egui::Vec2 = egui::vec2(8.0, 4.0);

/// Bounding box mapped from the 0-1000 scale to percentages of the
/// rendered image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxPercent {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

pub fn box_percent(box_2d: [i32; 4]) -> BoxPercent {
    let [ymin, xmin, ymax, xmax] = box_2d;
    BoxPercent {
        top: ymin as f32 / 10.0,
        left: xmin as f32 / 10.0,
        width: (xmax - xmin) as f32 / 10.0,
        height: (ymax - ymin) as f32 / 10.0,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerticalPlacement {
    Above,
    Below,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HorizontalAnchor {
    Left,
    Right,
    Center,
}

/// Resolved placement policy for one label, recomputed every frame from
/// current container geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelLayout {
    pub vertical: VerticalPlacement,
    pub horizontal: HorizontalAnchor,
    pub font_size: f32,
}

pub fn label_layout(box_2d: [i32; 4], container_width: f32) -> LabelLayout {
    let [_, xmin, ymax, xmax] = box_2d;

    // A box in the bottom 15% of the image gets its label above, so the
    // label is not pushed off the bottom edge.
    let vertical = if ymax > 850 {
        VerticalPlacement::Above
    } else {
        VerticalPlacement::Below
    };

    let horizontal = if xmin < 100 {
        HorizontalAnchor::Left
    } else if xmax > 900 {
        HorizontalAnchor::Right
    } else {
        HorizontalAnchor::Center
    };

    LabelLayout {
        vertical,
        horizontal,
        font_size: label_font_size(container_width),
    }
}

pub fn label_font_size(container_width: f32) -> f32 {
    (container_width * 0.02).clamp(12.0, 16.0)
}

/// Convert a percentage box into a pixel rect over the rendered image.
pub fn box_rect_px(pct: BoxPercent, image_rect: egui::Rect) -> egui::Rect {
    let size = image_rect.size();
    egui::Rect::from_min_size(
        image_rect.min
            + egui::vec2(pct.left / 100.0 * size.x, pct.top / 100.0 * size.y),
        egui::vec2(pct.width / 100.0 * size.x, pct.height / 100.0 * size.y),
    )
}

/// Top-left pixel position of a label of `label_size`, anchored to
/// `box_rect` per the layout policy, displaced by the user offset.
pub fn label_pos(
    layout: LabelLayout,
    box_rect: egui::Rect,
    label_size: egui::Vec2,
    offset_px: egui::Vec2,
) -> egui::Pos2 {
    let x = match layout.horizontal {
        HorizontalAnchor::Left => box_rect.left(),
        HorizontalAnchor::Right => box_rect.right() - label_size.x,
        HorizontalAnchor::Center => box_rect.center().x - label_size.x * 0.5,
    };
    let y = match layout.vertical {
        VerticalPlacement::Above => box_rect.top() - LABEL_GAP - label_size.y,
        VerticalPlacement::Below => box_rect.bottom() + LABEL_GAP,
    };
    egui::pos2(x, y) + offset_px
}

/// Pixel delta from a drag-session press, converted back into the 0-1000
/// scale and added to the session's baseline offset.
pub fn drag_to_offset(baseline: Offset, delta_px: egui::Vec2, container: egui::Vec2) -> Offset {
    Offset::new(
        baseline.x + delta_px.x / container.x * 1000.0,
        baseline.y + delta_px.y / container.y * 1000.0,
    )
}

pub fn offset_to_px(offset: Offset, container: egui::Vec2) -> egui::Vec2 {
    egui::vec2(
        offset.x / 1000.0 * container.x,
        offset.y / 1000.0 * container.y,
    )
}

// ── Interaction state ───────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct DragSession {
    index: usize,
    press_pos: egui::Pos2,
    baseline: Offset,
    last_pos: Option<egui::Pos2>,
}

#[derive(Clone, Debug)]
struct EditSession {
    index: usize,
    buffer: String,
}

/// Mutation reported to the owner. The engine never touches caller-owned
/// annotations or offsets; the owner applies these after `show`.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayEvent {
    OffsetChanged(usize, Offset),
    TextChanged(usize, String),
}

pub struct OverlayInputs<'a> {
    pub texture: &'a egui::TextureHandle,
    pub annotations: &'a [Annotation],
    pub offsets: &'a HashMap<usize, Offset>,
    /// Identity of the annotation list; bumped by the owner on every new
    /// upload or translation result. A change invalidates any active
    /// drag or edit session so stale deltas never hit mismatched indices.
    pub epoch: u64,
}

/// The annotation overlay engine: a projection/interaction layer over
/// caller-owned data. Holds only transient per-session state.
#[derive(Default)]
pub struct AnnotationOverlay {
    drag: Option<DragSession>,
    edit: Option<EditSession>,
    epoch: Option<u64>,
}

impl AnnotationOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    fn editing_index(&self) -> Option<usize> {
        self.edit.as_ref().map(|e| e.index)
    }

    fn dragging_index(&self) -> Option<usize> {
        self.drag.as_ref().map(|d| d.index)
    }

    fn sync_epoch(&mut self, epoch: u64) {
        if self.epoch != Some(epoch) {
            self.epoch = Some(epoch);
            self.drag = None;
            self.edit = None;
        }
    }

    /// Start a drag session. A press on a label in edit mode is ignored;
    /// a press while another session is active replaces it (last press
    /// wins).
    fn begin_drag(&mut self, index: usize, press_pos: egui::Pos2, baseline: Offset) {
        if self.editing_index() == Some(index) {
            return;
        }
        self.drag = Some(DragSession {
            index,
            press_pos,
            baseline,
            last_pos: None,
        });
    }

    /// Enter edit mode for `index`, implicitly exiting any prior edit
    /// session. A drag session on the same index is dropped.
    fn begin_edit(&mut self, index: usize, current: &str) {
        self.edit = Some(EditSession {
            index,
            buffer: current.to_owned(),
        });
        if self.dragging_index() == Some(index) {
            self.drag = None;
        }
    }

    fn end_edit(&mut self) {
        self.edit = None;
    }

    /// Advance the active drag session from global pointer state. Returns
    /// an offset emission when the pointer moved; ends the session on
    /// release or when the annotation list no longer covers its index.
    fn drag_update(
        &mut self,
        pointer: Option<egui::Pos2>,
        primary_down: bool,
        annotation_count: usize,
        container: egui::Vec2,
    ) -> Option<(usize, Offset)> {
        let drag = self.drag.as_mut()?;
        if !primary_down || drag.index >= annotation_count {
            self.drag = None;
            return None;
        }
        let pos = pointer?;
        if drag.last_pos == Some(pos) {
            return None;
        }
        drag.last_pos = Some(pos);
        let delta = pos - drag.press_pos;
        Some((drag.index, drag_to_offset(drag.baseline, delta, container)))
    }

    /// Render the image plus its annotation overlay into the available
    /// space and process one frame of interaction.
    pub fn show(&mut self, ui: &mut egui::Ui, inputs: OverlayInputs<'_>) -> Vec<OverlayEvent> {
        let mut events = Vec::new();
        self.sync_epoch(inputs.epoch);

        // Fit the image into the panel, preserving aspect ratio. The
        // drawn rect is the container geometry for this frame.
        let tex_size = inputs.texture.size_vec2();
        let avail = ui.available_size();
        let scale = (avail.x / tex_size.x).min(avail.y / tex_size.y);
        let draw_size = tex_size * scale;
        if !draw_size.is_finite() || draw_size.x <= 0.0 || draw_size.y <= 0.0 {
            return events;
        }

        let (response, painter) = ui.allocate_painter(draw_size, egui::Sense::hover());
        let image_rect = response.rect;
        let container = image_rect.size();

        painter.image(
            inputs.texture.id(),
            image_rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            egui::Color32::WHITE,
        );

        let font_size = label_font_size(container.x);
        let box_stroke = egui::Color32::from_rgba_unmultiplied(59, 130, 246, 110);

        for (idx, ann) in inputs.annotations.iter().enumerate() {
            let box_rect = box_rect_px(box_percent(ann.box_2d), image_rect);
            painter.rect_stroke(
                box_rect,
                2.0,
                egui::Stroke::new(2.0, box_stroke),
                egui::StrokeKind::Middle,
            );

            // Identical original/translation carries no information for
            // the user: box only, no label.
            if ann.is_identical() {
                continue;
            }

            let layout = label_layout(ann.box_2d, container.x);
            let offset = inputs.offsets.get(&idx).copied().unwrap_or_default();
            let offset_px = offset_to_px(offset, container);

            if self.editing_index() == Some(idx) {
                self.show_edit_field(ui, idx, layout, box_rect, offset_px, &mut events);
                continue;
            }

            let galley = painter.layout_no_wrap(
                ann.translation.clone(),
                egui::FontId::proportional(font_size),
                egui::Color32::WHITE,
            );
            let label_size = galley.size() + LABEL_PADDING * 2.0;
            let pos = label_pos(layout, box_rect, label_size, offset_px);
            let label_rect = egui::Rect::from_min_size(pos, label_size);

            let dragging = self.dragging_index() == Some(idx);
            painter.rect_filled(label_rect, 4.0, egui::Color32::from_rgb(15, 23, 42));
            if dragging {
                painter.rect_stroke(
                    label_rect,
                    4.0,
                    egui::Stroke::new(2.0, egui::Color32::WHITE),
                    egui::StrokeKind::Outside,
                );
            }
            painter.galley(pos + LABEL_PADDING, galley, egui::Color32::WHITE);

            let label_response = ui
                .interact(
                    label_rect,
                    ui.id().with(("label", idx)),
                    egui::Sense::click_and_drag(),
                )
                .on_hover_text("Drag to move, double-click to edit");

            if label_response.double_clicked() {
                self.begin_edit(idx, &ann.translation);
            } else if label_response.drag_started_by(egui::PointerButton::Primary) {
                let press = label_response
                    .interact_pointer_pos()
                    .unwrap_or_else(|| label_rect.center());
                self.begin_drag(idx, press, offset);
            }
        }

        // Drag tracking reads the global pointer state rather than the
        // label's own hover, so a fast pointer that leaves the label's
        // bounds does not end the session; only releasing does.
        let (pointer, primary_down) = ui.input(|i| (i.pointer.latest_pos(), i.pointer.primary_down()));
        if let Some((idx, offset)) =
            self.drag_update(pointer, primary_down, inputs.annotations.len(), container)
        {
            events.push(OverlayEvent::OffsetChanged(idx, offset));
        }

        events
    }

    fn show_edit_field(
        &mut self,
        ui: &mut egui::Ui,
        idx: usize,
        layout: LabelLayout,
        box_rect: egui::Rect,
        offset_px: egui::Vec2,
        events: &mut Vec<OverlayEvent>,
    ) {
        let Some(edit) = self.edit.as_mut() else {
            return;
        };

        // Field auto-sizes to content, with a floor so an emptied field
        // stays clickable.
        let char_w = layout.font_size * 0.6;
        let field_w = (edit.buffer.chars().count() + 1).max(4) as f32 * char_w;
        let label_size = egui::vec2(field_w, layout.font_size * 1.4) + LABEL_PADDING * 2.0;
        let pos = label_pos(layout, box_rect, label_size, offset_px);
        let label_rect = egui::Rect::from_min_size(pos, label_size);

        let painter = ui.painter();
        painter.rect_filled(label_rect, 4.0, egui::Color32::from_rgb(15, 23, 42));
        painter.rect_stroke(
            label_rect,
            4.0,
            egui::Stroke::new(2.0, egui::Color32::from_rgb(96, 165, 250)),
            egui::StrokeKind::Outside,
        );

        let mut ended = false;
        egui::Area::new(egui::Id::new(("overlay_edit", idx)))
            .fixed_pos(pos + LABEL_PADDING)
            .order(egui::Order::Foreground)
            .show(ui.ctx(), |ui| {
                let field = ui.add(
                    egui::TextEdit::singleline(&mut edit.buffer)
                        .desired_width(field_w)
                        .font(egui::FontId::proportional(layout.font_size))
                        .text_color(egui::Color32::WHITE)
                        .frame(false),
                );
                if field.changed() {
                    events.push(OverlayEvent::TextChanged(idx, edit.buffer.clone()));
                }
                // Enter commits by dropping focus; focus loss ends the
                // session either way. Each keystroke is already forwarded,
                // so there is no separate save step.
                if field.lost_focus() {
                    ended = true;
                } else {
                    field.request_focus();
                }
            });

        if ended {
            self.end_edit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2, Rect};

    #[test]
    fn box_percent_maps_linearly() {
        let pct = box_percent([120, 80, 180, 400]);
        assert_eq!(pct.top, 12.0);
        assert_eq!(pct.left, 8.0);
        assert_eq!(pct.height, 6.0);
        assert_eq!(pct.width, 32.0);
    }

    #[test]
    fn valid_boxes_stay_inside_the_container() {
        let boxes = [
            [0, 0, 1000, 1000],
            [900, 50, 950, 200],
            [400, 920, 450, 980],
            [400, 400, 450, 600],
            [0, 0, 0, 0],
        ];
        for b in boxes {
            let pct = box_percent(b);
            assert!(pct.top + pct.height <= 100.0, "box {b:?}");
            assert!(pct.left + pct.width <= 100.0, "box {b:?}");
        }
    }

    #[test]
    fn malformed_box_renders_degenerate_not_panicking() {
        let pct = box_percent([500, 500, 400, 400]);
        assert!(pct.width < 0.0);
        assert!(pct.height < 0.0);
    }

    #[test]
    fn near_bottom_near_left_box_goes_above_left_aligned() {
        let layout = label_layout([900, 50, 950, 200], 800.0);
        assert_eq!(layout.vertical, VerticalPlacement::Above);
        assert_eq!(layout.horizontal, HorizontalAnchor::Left);
    }

    #[test]
    fn near_right_box_is_right_aligned_below() {
        let layout = label_layout([400, 920, 450, 980], 800.0);
        assert_eq!(layout.vertical, VerticalPlacement::Below);
        assert_eq!(layout.horizontal, HorizontalAnchor::Right);
    }

    #[test]
    fn centered_box_centers_the_label_below() {
        let layout = label_layout([400, 400, 450, 600], 800.0);
        assert_eq!(layout.vertical, VerticalPlacement::Below);
        assert_eq!(layout.horizontal, HorizontalAnchor::Center);
    }

    #[test]
    fn font_size_scales_with_width_and_clamps() {
        assert_eq!(label_font_size(400.0), 12.0);
        assert_eq!(label_font_size(700.0), 14.0);
        assert_eq!(label_font_size(800.0), 16.0);
        assert_eq!(label_font_size(3000.0), 16.0);
    }

    #[test]
    fn label_anchors_resolve_to_expected_positions() {
        let box_rect = Rect::from_min_size(pos2(100.0, 100.0), vec2(200.0, 50.0));
        let label = vec2(80.0, 20.0);
        let fs = 12.0;

        let left = label_pos(
            LabelLayout {
                vertical: VerticalPlacement::Below,
                horizontal: HorizontalAnchor::Left,
                font_size: fs,
            },
            box_rect,
            label,
            vec2(0.0, 0.0),
        );
        assert_eq!(left, pos2(100.0, 154.0));

        let right = label_pos(
            LabelLayout {
                vertical: VerticalPlacement::Below,
                horizontal: HorizontalAnchor::Right,
                font_size: fs,
            },
            box_rect,
            label,
            vec2(0.0, 0.0),
        );
        assert_eq!(right, pos2(220.0, 154.0));

        let above_centered = label_pos(
            LabelLayout {
                vertical: VerticalPlacement::Above,
                horizontal: HorizontalAnchor::Center,
                font_size: fs,
            },
            box_rect,
            label,
            vec2(0.0, 0.0),
        );
        assert_eq!(above_centered, pos2(160.0, 76.0));
    }

    #[test]
    fn user_offset_displaces_the_label() {
        let box_rect = Rect::from_min_size(pos2(0.0, 0.0), vec2(100.0, 100.0));
        let layout = LabelLayout {
            vertical: VerticalPlacement::Below,
            horizontal: HorizontalAnchor::Left,
            font_size: 12.0,
        };
        let pos = label_pos(layout, box_rect, vec2(40.0, 20.0), vec2(25.0, -10.0));
        assert_eq!(pos, pos2(25.0, 94.0));
    }

    #[test]
    fn drag_delta_converts_pixels_to_normalized_scale() {
        let off = drag_to_offset(Offset::default(), vec2(50.0, 30.0), vec2(500.0, 300.0));
        assert_eq!(off, Offset::new(100.0, 100.0));

        let off = drag_to_offset(Offset::new(10.0, -20.0), vec2(-100.0, 0.0), vec2(1000.0, 500.0));
        assert_eq!(off, Offset::new(-90.0, -20.0));
    }

    #[test]
    fn offset_round_trips_through_pixels() {
        let container = vec2(640.0, 480.0);
        let px = offset_to_px(Offset::new(250.0, -125.0), container);
        assert_eq!(px, vec2(160.0, -60.0));
    }

    #[test]
    fn drag_session_emits_on_move_and_ends_on_release() {
        let mut engine = AnnotationOverlay::new();
        let container = vec2(500.0, 300.0);
        engine.begin_drag(2, pos2(100.0, 100.0), Offset::default());

        let emitted = engine.drag_update(Some(pos2(150.0, 130.0)), true, 5, container);
        assert_eq!(emitted, Some((2, Offset::new(100.0, 100.0))));

        // No movement, no emission.
        assert_eq!(engine.drag_update(Some(pos2(150.0, 130.0)), true, 5, container), None);

        // Release ends the session; later pointer state is ignored.
        assert_eq!(engine.drag_update(Some(pos2(150.0, 130.0)), false, 5, container), None);
        assert_eq!(engine.drag_update(Some(pos2(400.0, 400.0)), true, 5, container), None);
    }

    #[test]
    fn last_press_wins_when_a_drag_is_already_active() {
        let mut engine = AnnotationOverlay::new();
        engine.begin_drag(0, pos2(10.0, 10.0), Offset::default());
        engine.begin_drag(3, pos2(50.0, 50.0), Offset::new(5.0, 5.0));
        assert_eq!(engine.dragging_index(), Some(3));
    }

    #[test]
    fn press_on_edited_label_does_not_start_a_drag() {
        let mut engine = AnnotationOverlay::new();
        engine.begin_edit(1, "hello");
        engine.begin_drag(1, pos2(0.0, 0.0), Offset::default());
        assert_eq!(engine.dragging_index(), None);

        // A different label can still be dragged.
        engine.begin_drag(2, pos2(0.0, 0.0), Offset::default());
        assert_eq!(engine.dragging_index(), Some(2));
    }

    #[test]
    fn entering_edit_replaces_the_previous_edit_session() {
        let mut engine = AnnotationOverlay::new();
        engine.begin_edit(4, "first");
        engine.begin_edit(7, "second");
        assert_eq!(engine.editing_index(), Some(7));
    }

    #[test]
    fn list_replacement_invalidates_active_sessions() {
        let mut engine = AnnotationOverlay::new();
        engine.sync_epoch(1);
        engine.begin_drag(0, pos2(0.0, 0.0), Offset::default());
        engine.begin_edit(1, "text");

        engine.sync_epoch(2);
        assert_eq!(engine.dragging_index(), None);
        assert_eq!(engine.editing_index(), None);

        // Same epoch keeps sessions alive.
        engine.begin_drag(0, pos2(0.0, 0.0), Offset::default());
        engine.sync_epoch(2);
        assert_eq!(engine.dragging_index(), Some(0));
    }

    #[test]
    fn drag_ends_when_the_index_falls_off_the_list() {
        let mut engine = AnnotationOverlay::new();
        engine.begin_drag(4, pos2(0.0, 0.0), Offset::default());
        let emitted = engine.drag_update(Some(pos2(10.0, 10.0)), true, 3, vec2(100.0, 100.0));
        assert_eq!(emitted, None);
        assert_eq!(engine.dragging_index(), None);
    }

    #[test]
    fn resize_mid_drag_uses_current_geometry() {
        let mut engine = AnnotationOverlay::new();
        engine.begin_drag(0, pos2(0.0, 0.0), Offset::default());

        let before = engine.drag_update(Some(pos2(50.0, 0.0)), true, 1, vec2(500.0, 500.0));
        assert_eq!(before, Some((0, Offset::new(100.0, 0.0))));

        // Container doubled; the same additional pixel travel now maps to
        // half the normalized distance.
        let after = engine.drag_update(Some(pos2(100.0, 0.0)), true, 1, vec2(1000.0, 1000.0));
        assert_eq!(after, Some((0, Offset::new(100.0, 0.0))));
    }
}

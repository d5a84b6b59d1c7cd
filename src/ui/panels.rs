use egui::{Color32, Context, Response, RichText, ScrollArea, TextEdit, Ui};

use crate::math::ColorScheme;
use crate::math::examples::FUNCTION_PRESETS;
use crate::math::params::{MAX_RESOLUTION, MIN_RESOLUTION};
use crate::ui::state::{SurfaceInfo, UiState};
use crate::ui::theme::*;

#[derive(Default)]
pub struct UiActions {
    /// The surface parameters changed; hand them to the engine.
    pub apply: bool,
    pub reset_camera: bool,
}

pub fn draw_side_panel(ctx: &Context, state: &mut UiState) -> UiActions {
    let mut actions = UiActions::default();

    egui::SidePanel::right("control_panel")
        .min_width(320.0)
        .max_width(420.0)
        .default_width(340.0)
        .frame(egui::Frame::default().fill(BG_PANEL).inner_margin(16.0))
        .show(ctx, |ui| {
            ScrollArea::vertical().show(ui, |ui| {
                ui.heading(RichText::new("Surface 3D").strong());
                ui.add_space(4.0);
                ui.label(
                    RichText::new("Plot z = f(x, y, t)")
                        .color(TEXT_MUTED)
                        .size(11.0),
                );
                ui.add_space(16.0);

                section_header(ui, "FUNCTION");
                actions.apply |= function_input(ui, state);
                if let Some(err) = &state.error {
                    ui.add_space(6.0);
                    error_frame(ui, err);
                }
                ui.add_space(12.0);

                section_header(ui, "PRESET");
                actions.apply |= preset_picker(ui, state);
                ui.add_space(12.0);

                section_header(ui, "DOMAIN");
                actions.apply |= domain_controls(ui, state);
                ui.add_space(12.0);

                section_header(ui, "COLORS");
                actions.apply |= scheme_picker(ui, &mut state.scheme);
                ui.add_space(12.0);

                section_header(ui, "ANIMATION");
                actions.apply |= animation_controls(ui, state);
                ui.add_space(12.0);

                section_header(ui, "VIEW");
                ui.horizontal(|ui| {
                    if ui.button("Reset camera").clicked() {
                        actions.reset_camera = true;
                    }
                    ui.checkbox(&mut state.vsync_enabled, "VSync");
                });
                ui.horizontal(|ui| {
                    ui.checkbox(&mut state.show_stats, "Stats");
                    ui.checkbox(&mut state.show_help, "Help");
                });

                if state.show_stats {
                    ui.add_space(12.0);
                    stats_panel(ui, state.surface.as_ref(), state.fps);
                }
            });
        });

    actions
}

fn section_header(ui: &mut Ui, text: &str) {
    ui.label(RichText::new(text).color(TEXT_MUTED).size(11.0).strong());
    ui.add_space(4.0);
}

/// Sliders hand over their value when released, not on every drag step.
fn committed(response: &Response) -> bool {
    response.drag_stopped() || (response.changed() && !response.dragged())
}

fn function_input(ui: &mut Ui, state: &mut UiState) -> bool {
    let mut submit = false;

    egui::Frame::default()
        .fill(BG_DEEP)
        .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
        .rounding(6.0)
        .inner_margin(8.0)
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.label(
                    RichText::new("z =")
                        .color(TEXT_MUTED)
                        .family(egui::FontFamily::Monospace),
                );
                let response = ui.add(
                    TextEdit::singleline(&mut state.expression_input)
                        .font(egui::FontId::new(13.0, egui::FontFamily::Monospace))
                        .hint_text("sin(x) * cos(y + t)")
                        .desired_width(f32::INFINITY)
                        .text_color(TEXT_BRIGHT),
                );
                if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    submit = true;
                }
            });
        });

    ui.add_space(4.0);
    ui.horizontal(|ui| {
        let visualize = egui::Button::new(RichText::new("Visualize").color(TEXT_BRIGHT))
            .fill(ACCENT_INDIGO);
        if ui.add(visualize).clicked() {
            submit = true;
        }
        ui.label(
            RichText::new("Variables: x, y, t")
                .color(TEXT_MUTED)
                .size(11.0),
        );
    });

    submit && state.submit_expression()
}

fn preset_picker(ui: &mut Ui, state: &mut UiState) -> bool {
    let selected_text = state
        .selected_preset
        .and_then(|i| FUNCTION_PRESETS.get(i))
        .map(|preset| preset.name)
        .unwrap_or("Custom");

    let mut picked = None;
    egui::ComboBox::from_id_salt("function_presets")
        .selected_text(selected_text)
        .width(ui.available_width())
        .show_ui(ui, |ui| {
            for (i, preset) in FUNCTION_PRESETS.iter().enumerate() {
                let response = ui
                    .selectable_label(state.selected_preset == Some(i), preset.name)
                    .on_hover_text(preset.description);
                if response.clicked() {
                    picked = Some(i);
                }
            }
        });

    picked.is_some_and(|i| state.select_preset(i))
}

fn domain_controls(ui: &mut Ui, state: &mut UiState) -> bool {
    let mut commit = false;

    egui::Grid::new("domain")
        .num_columns(2)
        .spacing([8.0, 6.0])
        .show(ui, |ui| {
            ui.label("Range:");
            let response = ui.add(
                egui::Slider::new(&mut state.range, 0.5..=25.0)
                    .step_by(0.5)
                    .prefix("±"),
            );
            commit |= committed(&response);
            ui.end_row();

            ui.label("Resolution:");
            let response = ui.add(egui::Slider::new(
                &mut state.resolution,
                MIN_RESOLUTION..=MAX_RESOLUTION,
            ));
            commit |= committed(&response);
            ui.end_row();
        });

    commit
}

fn scheme_picker(ui: &mut Ui, scheme: &mut ColorScheme) -> bool {
    let before = *scheme;
    ui.horizontal_wrapped(|ui| {
        for candidate in ColorScheme::ALL {
            let stops = candidate.stops();
            let swatch = stops
                .get(stops.len() / 2)
                .map(|stop| {
                    let [r, g, b] = stop.color.to_array();
                    Color32::from_rgb((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
                })
                .unwrap_or(TEXT_MUTED);
            let text = RichText::new(candidate.name()).color(if *scheme == candidate {
                swatch
            } else {
                TEXT_PRIMARY
            });
            if ui.selectable_label(*scheme == candidate, text).clicked() {
                *scheme = candidate;
            }
        }
    });
    *scheme != before
}

fn animation_controls(ui: &mut Ui, state: &mut UiState) -> bool {
    let mut changed = false;

    // Switching animation on catches the surface up to the slider.
    changed |= ui.checkbox(&mut state.animating, "Animate with t").changed() && state.animating;

    let window = state.time_window;
    ui.horizontal(|ui| {
        ui.label("t:");
        let slider = egui::Slider::new(&mut state.time, window.min..=window.max).step_by(0.01);
        changed |= ui.add(slider).changed();
    });

    ui.horizontal(|ui| {
        let mut min = window.min;
        let mut max = window.max;

        ui.label(RichText::new("Min").color(TEXT_MUTED).size(11.0));
        if ui
            .add(egui::DragValue::new(&mut min).speed(0.1).range(f64::MIN..=max))
            .changed()
        {
            changed |= state.set_time_min(min);
        }
        ui.label(RichText::new("Max").color(TEXT_MUTED).size(11.0));
        if ui
            .add(egui::DragValue::new(&mut max).speed(0.1).range(min..=f64::MAX))
            .changed()
        {
            changed |= state.set_time_max(max);
        }
    });

    changed
}

fn error_frame(ui: &mut Ui, err: &str) {
    egui::Frame::default()
        .fill(ERROR_FILL)
        .stroke(egui::Stroke::new(1.0, ACCENT_RED))
        .rounding(4.0)
        .inner_margin(8.0)
        .show(ui, |ui| {
            ui.label(RichText::new(err).color(ACCENT_RED).size(11.0));
        });
}

fn stats_panel(ui: &mut Ui, surface: Option<&SurfaceInfo>, fps: f32) {
    section_header(ui, "STATISTICS");
    egui::Frame::default()
        .fill(BG_WIDGET)
        .stroke(egui::Stroke::new(1.0, BORDER_SUBTLE))
        .rounding(6.0)
        .inner_margin(12.0)
        .show(ui, |ui| {
            ui.style_mut().override_font_id =
                Some(egui::FontId::new(11.0, egui::FontFamily::Monospace));

            let fps_color = if fps >= 60.0 {
                ACCENT_GREEN
            } else if fps >= 30.0 {
                ACCENT_AMBER
            } else {
                ACCENT_RED
            };

            egui::Grid::new("stats")
                .num_columns(2)
                .spacing([20.0, 4.0])
                .show(ui, |ui| {
                    ui.label(RichText::new("FPS").color(TEXT_MUTED));
                    ui.label(RichText::new(format!("{:.0}", fps)).color(fps_color));
                    ui.end_row();

                    let Some(surface) = surface else {
                        ui.label(RichText::new("Surface").color(TEXT_MUTED));
                        ui.label(RichText::new("none").color(TEXT_PRIMARY));
                        ui.end_row();
                        return;
                    };

                    ui.label(RichText::new("Vertices").color(TEXT_MUTED));
                    ui.label(RichText::new(fmt_num(surface.vertices)).color(ACCENT_SKY));
                    ui.end_row();

                    ui.label(RichText::new("Triangles").color(TEXT_MUTED));
                    ui.label(RichText::new(fmt_num(surface.triangles)).color(ACCENT_INDIGO));
                    ui.end_row();

                    ui.label(RichText::new("z range").color(TEXT_MUTED));
                    ui.label(
                        RichText::new(format!("{:.2} .. {:.2}", surface.z_min, surface.z_max))
                            .color(TEXT_PRIMARY),
                    );
                    ui.end_row();
                });
        });
}

/// Spinner shown while the worker rebuilds the surface.
pub fn draw_working_overlay(ctx: &Context) {
    egui::Area::new(egui::Id::new("working_overlay"))
        .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, 16.0))
        .show(ctx, |ui| {
            egui::Frame::default()
                .fill(Color32::from_black_alpha(180))
                .rounding(6.0)
                .inner_margin(10.0)
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label(RichText::new("Building surface...").color(TEXT_BRIGHT));
                    });
                });
        });
}

pub fn draw_help_overlay(ctx: &Context, distance: f32) {
    egui::Area::new(egui::Id::new("help_overlay"))
        .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(12.0, -12.0))
        .show(ctx, |ui| {
            egui::Frame::default()
                .fill(Color32::from_black_alpha(180))
                .rounding(6.0)
                .inner_margin(10.0)
                .show(ui, |ui| {
                    ui.style_mut().override_font_id =
                        Some(egui::FontId::new(11.0, egui::FontFamily::Monospace));
                    ui.label(
                        RichText::new("RMB+Drag - Orbit | Scroll - Zoom | R - Reset view")
                            .color(TEXT_MUTED),
                    );
                    ui.label(RichText::new(format!("Distance: {:.1}", distance)).color(TEXT_MUTED));
                });
        });
}

fn fmt_num(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn counts_are_abbreviated() {
        assert_eq!(fmt_num(999), "999");
        assert_eq!(fmt_num(6_561), "6.6K");
        assert_eq!(fmt_num(1_250_000), "1.25M");
    }

    #[test]
    fn untouched_panel_requests_nothing() {
        let ctx = Context::default();
        let mut state = UiState::default();
        let mut actions = UiActions::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            actions = draw_side_panel(ctx, &mut state);
        });
        assert!(!actions.apply);
        assert!(!actions.reset_camera);
        assert_eq!(state.parameters(), UiState::default().parameters());
    }
}

use egui::style::WidgetVisuals;
use egui::{Color32, FontFamily, FontId, Rounding, Stroke, Style, TextStyle, Visuals};

// Slate and indigo, matching the 3D scene background.
pub const BG_DEEP: Color32 = Color32::from_rgb(2, 6, 23);
pub const BG_PANEL: Color32 = Color32::from_rgb(15, 23, 42);
pub const BG_WIDGET: Color32 = Color32::from_rgb(30, 41, 59);
pub const BG_WIDGET_HOVER: Color32 = Color32::from_rgb(51, 65, 85);
pub const BG_WIDGET_ACTIVE: Color32 = Color32::from_rgb(71, 85, 105);

pub const TEXT_PRIMARY: Color32 = Color32::from_rgb(203, 213, 225);
pub const TEXT_MUTED: Color32 = Color32::from_rgb(148, 163, 184);
pub const TEXT_BRIGHT: Color32 = Color32::from_rgb(241, 245, 249);

pub const ACCENT_INDIGO: Color32 = Color32::from_rgb(99, 102, 241);
pub const ACCENT_SKY: Color32 = Color32::from_rgb(56, 189, 248);
pub const ACCENT_GREEN: Color32 = Color32::from_rgb(34, 197, 94);
pub const ACCENT_AMBER: Color32 = Color32::from_rgb(245, 158, 11);
pub const ACCENT_RED: Color32 = Color32::from_rgb(239, 68, 68);
pub const ERROR_FILL: Color32 = Color32::from_rgb(69, 10, 10);

pub const BORDER_SUBTLE: Color32 = Color32::from_rgb(51, 65, 85);

const ROUNDING: f32 = 6.0;

fn widget(bg_fill: Color32, border: Stroke, text: Color32, expansion: f32) -> WidgetVisuals {
    WidgetVisuals {
        bg_fill,
        weak_bg_fill: bg_fill,
        bg_stroke: border,
        rounding: Rounding::same(ROUNDING),
        fg_stroke: Stroke::new(1.0, text),
        expansion,
    }
}

fn shadow(offset_y: f32, blur: f32, alpha: u8) -> egui::epaint::Shadow {
    egui::epaint::Shadow {
        offset: egui::vec2(0.0, offset_y),
        blur,
        spread: 0.0,
        color: Color32::from_black_alpha(alpha),
    }
}

pub fn apply_theme(ctx: &egui::Context) {
    let mut style = Style::default();

    let subtle = Stroke::new(1.0, BORDER_SUBTLE);
    let mut noninteractive = widget(BG_WIDGET, subtle, TEXT_MUTED, 0.0);
    noninteractive.weak_bg_fill = BG_PANEL;

    style.visuals = Visuals {
        dark_mode: true,
        override_text_color: Some(TEXT_PRIMARY),

        widgets: egui::style::Widgets {
            noninteractive,
            inactive: widget(BG_WIDGET, subtle, TEXT_PRIMARY, 0.0),
            hovered: widget(
                BG_WIDGET_HOVER,
                Stroke::new(1.0, ACCENT_INDIGO),
                TEXT_BRIGHT,
                1.0,
            ),
            active: widget(
                BG_WIDGET_ACTIVE,
                Stroke::new(2.0, ACCENT_INDIGO),
                TEXT_BRIGHT,
                1.0,
            ),
            open: widget(
                BG_WIDGET_ACTIVE,
                Stroke::new(1.0, ACCENT_INDIGO),
                TEXT_BRIGHT,
                0.0,
            ),
        },

        selection: egui::style::Selection {
            bg_fill: ACCENT_INDIGO.gamma_multiply(0.45),
            stroke: Stroke::new(1.0, ACCENT_INDIGO),
        },

        hyperlink_color: ACCENT_SKY,
        faint_bg_color: BG_PANEL,
        extreme_bg_color: BG_DEEP,
        code_bg_color: BG_DEEP,
        warn_fg_color: ACCENT_AMBER,
        error_fg_color: ACCENT_RED,

        window_rounding: Rounding::same(8.0),
        window_shadow: shadow(4.0, 16.0, 128),
        window_fill: BG_PANEL,
        window_stroke: subtle,

        panel_fill: BG_PANEL,

        popup_shadow: shadow(2.0, 8.0, 100),

        resize_corner_size: 12.0,
        text_cursor: egui::style::TextCursorStyle {
            stroke: Stroke::new(2.0, ACCENT_INDIGO),
            ..Default::default()
        },
        clip_rect_margin: 3.0,
        button_frame: true,
        collapsing_header_frame: false,
        indent_has_left_vline: true,
        striped: false,
        slider_trailing_fill: true,
        handle_shape: egui::style::HandleShape::Circle,
        interact_cursor: None,
        image_loading_spinners: true,
        numeric_color_space: egui::style::NumericColorSpace::GammaByte,
        menu_rounding: Rounding::same(ROUNDING),
        window_highlight_topmost: true,
    };

    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.window_margin = egui::Margin::same(12.0);
    style.spacing.button_padding = egui::vec2(10.0, 5.0);
    style.spacing.indent = 16.0;
    style.spacing.slider_width = 210.0;

    style.text_styles = [
        (TextStyle::Small, FontId::new(11.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Button, FontId::new(14.0, FontFamily::Proportional)),
        (TextStyle::Heading, FontId::new(20.0, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(13.0, FontFamily::Monospace)),
    ]
    .into();

    ctx.set_style(style);
}

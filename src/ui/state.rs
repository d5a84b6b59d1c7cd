use crate::config::Config;
use crate::math::examples::FUNCTION_PRESETS;
use crate::math::{ColorScheme, MeshUpload, TimeWindow, VisualizationParameters};

/// What the stats box shows about the surface on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceInfo {
    pub vertices: usize,
    pub triangles: usize,
    pub z_min: f32,
    pub z_max: f32,
}

impl SurfaceInfo {
    pub fn from_upload(upload: &MeshUpload) -> Self {
        Self {
            vertices: upload.vertex_count,
            triangles: upload.index_count / 3,
            z_min: upload.z_min,
            z_max: upload.z_max,
        }
    }
}

pub struct UiState {
    /// What the text box holds; only becomes `expression` on submit.
    pub expression_input: String,
    pub expression: String,
    pub selected_preset: Option<usize>,

    pub range: f64,
    pub resolution: u32,
    pub scheme: ColorScheme,

    pub animating: bool,
    pub time: f64,
    pub time_window: TimeWindow,

    pub working: bool,
    pub error: Option<String>,
    pub surface: Option<SurfaceInfo>,

    pub vsync_enabled: bool,
    pub show_stats: bool,
    pub show_help: bool,
    pub fps: f32,
}

impl Default for UiState {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl UiState {
    pub fn from_config(config: &Config) -> Self {
        let params = config.initial_parameters();
        Self {
            expression_input: params.expression.clone(),
            selected_preset: FUNCTION_PRESETS
                .iter()
                .position(|preset| preset.expression == params.expression),
            expression: params.expression,

            range: params.range,
            resolution: params.resolution,
            scheme: params.scheme,

            animating: config.animation.enabled,
            time: params.time,
            time_window: config.animation.window(),

            working: false,
            error: None,
            surface: None,

            vsync_enabled: config.window.vsync,
            show_stats: true,
            show_help: true,
            fps: 0.0,
        }
    }

    pub fn parameters(&self) -> VisualizationParameters {
        VisualizationParameters::new(self.expression.clone(), self.range, self.resolution)
            .with_scheme(self.scheme)
            .with_time(self.time)
    }

    /// Commits the text box. Blank input is ignored.
    pub fn submit_expression(&mut self) -> bool {
        let trimmed = self.expression_input.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.expression = trimmed.to_string();
        self.selected_preset = FUNCTION_PRESETS
            .iter()
            .position(|preset| preset.expression == self.expression);
        true
    }

    pub fn select_preset(&mut self, index: usize) -> bool {
        let Some(preset) = FUNCTION_PRESETS.get(index) else {
            return false;
        };
        self.selected_preset = Some(index);
        self.expression_input = preset.expression.to_string();
        self.expression = preset.expression.to_string();
        self.range = preset.range;
        true
    }

    /// Returns true when the current time had to move into the new window.
    pub fn set_time_min(&mut self, min: f64) -> bool {
        self.apply_clamped(|window, time| window.set_min(min, time))
    }

    pub fn set_time_max(&mut self, max: f64) -> bool {
        self.apply_clamped(|window, time| window.set_max(max, time))
    }

    fn apply_clamped(&mut self, change: impl FnOnce(&mut TimeWindow, f64) -> Option<f64>) -> bool {
        match change(&mut self.time_window, self.time) {
            Some(time) => {
                self.time = time;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DEFAULT_EXPRESSION;
    use test_log::test;

    #[test]
    fn starts_from_the_config() {
        let state = UiState::default();
        assert_eq!(state.expression, DEFAULT_EXPRESSION);
        assert_eq!(state.selected_preset, Some(0));
        assert_eq!(state.parameters(), Config::default().initial_parameters());
        assert!(state.animating);
    }

    #[test]
    fn blank_submissions_are_ignored() {
        let mut state = UiState::default();
        state.expression_input = "   ".to_string();
        assert!(!state.submit_expression());
        assert_eq!(state.expression, DEFAULT_EXPRESSION);

        state.expression_input = "  x * y ".to_string();
        assert!(state.submit_expression());
        assert_eq!(state.expression, "x * y");
        assert_eq!(state.selected_preset, None);
    }

    #[test]
    fn presets_set_expression_and_domain() {
        let mut state = UiState::default();
        assert!(state.select_preset(3));
        assert_eq!(state.expression, FUNCTION_PRESETS[3].expression);
        assert_eq!(state.expression_input, FUNCTION_PRESETS[3].expression);
        assert_eq!(state.range, FUNCTION_PRESETS[3].range);
        assert!(!state.select_preset(FUNCTION_PRESETS.len()));
    }

    #[test]
    fn narrowing_the_window_moves_the_time() {
        let mut state = UiState::default();
        state.time = 4.0;
        assert!(state.set_time_max(3.0));
        assert_eq!(state.time, 3.0);
        assert!(!state.set_time_min(-1.0));
        assert_eq!(state.time, 3.0);
        assert!(state.set_time_min(3.5));
        assert_eq!(state.time, 3.5);
    }
}

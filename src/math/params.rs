use crate::math::color::ColorScheme;
use crate::math::sampler::grid_step;
use crate::math::surface::SurfaceError;

pub const MIN_RESOLUTION: u32 = 1;
/// Largest grid whose index buffer fits the surface buffers.
pub const MAX_RESOLUTION: u32 = 400;
/// Widest half-width accepted; grid coordinates stay well inside `f64`.
pub const MAX_RANGE: f64 = 1_000.0;

/// Everything one build or update pass reads. Passed by value into the
/// pipeline; nothing here is global.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationParameters {
    pub expression: String,
    pub range: f64,
    pub resolution: u32,
    pub time: f64,
    pub scheme: ColorScheme,
}

impl VisualizationParameters {
    pub fn new(expression: impl Into<String>, range: f64, resolution: u32) -> Self {
        Self {
            expression: expression.into(),
            range,
            resolution,
            time: 0.0,
            scheme: ColorScheme::default(),
        }
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub fn with_scheme(mut self, scheme: ColorScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn validate(&self) -> Result<(), SurfaceError> {
        if !(self.range > 0.0 && self.range <= MAX_RANGE) {
            return Err(SurfaceError::InvalidRange(self.range));
        }
        if self.resolution < MIN_RESOLUTION {
            return Err(SurfaceError::InvalidResolution(self.resolution));
        }
        if !self.time.is_finite() {
            return Err(SurfaceError::InvalidTime(self.time));
        }
        Ok(())
    }

    pub fn step(&self) -> f64 {
        grid_step(self.range, self.resolution)
    }

    pub fn vertex_count(&self) -> usize {
        (self.resolution as usize + 1).pow(2)
    }

    pub fn index_count(&self) -> usize {
        6 * (self.resolution as usize).pow(2)
    }

    /// True when `other` can be reached from `self` by a time change alone.
    pub fn same_structure(&self, other: &Self) -> bool {
        self.expression == other.expression
            && self.range == other.range
            && self.resolution == other.resolution
            && self.scheme == other.scheme
    }
}

/// Bounds for the animation time slider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub min: f64,
    pub max: f64,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self { min: -5.0, max: 5.0 }
    }
}

impl TimeWindow {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, time: f64) -> f64 {
        if self.min > self.max {
            return self.min;
        }
        time.clamp(self.min, self.max)
    }

    /// Moves the lower bound. Returns the re-clamped time when `time` no longer
    /// fits the window, `None` when it is unaffected.
    pub fn set_min(&mut self, min: f64, time: f64) -> Option<f64> {
        self.min = min;
        self.reclamp(time)
    }

    pub fn set_max(&mut self, max: f64, time: f64) -> Option<f64> {
        self.max = max;
        self.reclamp(time)
    }

    fn reclamp(&self, time: f64) -> Option<f64> {
        let clamped = self.clamp(time);
        (clamped != time).then_some(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn validation() {
        let params = VisualizationParameters::new("x", 5.0, 10);
        assert!(params.validate().is_ok());

        assert!(matches!(
            VisualizationParameters::new("x", 0.0, 10).validate(),
            Err(SurfaceError::InvalidRange(_))
        ));
        assert!(matches!(
            VisualizationParameters::new("x", f64::NAN, 10).validate(),
            Err(SurfaceError::InvalidRange(_))
        ));
        assert!(VisualizationParameters::new("x", MAX_RANGE, 10).validate().is_ok());
        assert!(matches!(
            VisualizationParameters::new("x", MAX_RANGE * 2.0, 10).validate(),
            Err(SurfaceError::InvalidRange(_))
        ));
        assert!(matches!(
            VisualizationParameters::new("x", 1.0, 0).validate(),
            Err(SurfaceError::InvalidResolution(0))
        ));
        assert!(matches!(
            params.clone().with_time(f64::INFINITY).validate(),
            Err(SurfaceError::InvalidTime(_))
        ));
    }

    #[test]
    fn derived_sizes() {
        let params = VisualizationParameters::new("x", 5.0, 10);
        assert_eq!(params.step(), 1.0);
        assert_eq!(params.vertex_count(), 121);
        assert_eq!(params.index_count(), 600);
    }

    #[test]
    fn time_is_not_structural() {
        let base = VisualizationParameters::new("sin(x - t)", 5.0, 40);
        assert!(base.same_structure(&base.clone().with_time(3.0)));
        assert!(!base.same_structure(&base.clone().with_scheme(ColorScheme::Forest)));

        let mut wider = base.clone();
        wider.range = 6.0;
        assert!(!base.same_structure(&wider));
    }

    #[test]
    fn window_clamps_time() {
        let window = TimeWindow::default();
        assert_eq!(window.clamp(7.0), 5.0);
        assert_eq!(window.clamp(-7.0), -5.0);
        assert_eq!(window.clamp(1.5), 1.5);
    }

    #[test]
    fn moving_a_bound_reports_a_changed_time() {
        let mut window = TimeWindow::default();
        assert_eq!(window.set_max(2.0, 4.0), Some(2.0));
        assert_eq!(window.set_max(3.0, 2.0), None);
        assert_eq!(window.set_min(2.5, 2.0), Some(2.5));
        assert_eq!(window.min, 2.5);
    }

    #[test]
    fn inverted_window_pins_to_min() {
        let mut window = TimeWindow::default();
        assert_eq!(window.set_min(8.0, 0.0), Some(8.0));
    }
}

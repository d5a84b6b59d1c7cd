//! Startup configuration: an optional JSON file, then command-line overrides.
//!
//! Every section falls back to its defaults field by field, so a config file
//! only needs to name what it changes.

use anyhow::{Context, bail};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::math::params::{MAX_RANGE, MAX_RESOLUTION, MIN_RESOLUTION};
use crate::math::{ColorScheme, DEFAULT_EXPRESSION, TimeWindow, VisualizationParameters};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub surface: SurfaceConfig,
    pub animation: AnimationConfig,
    pub window: WindowConfig,
}

/// The surface shown at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub expression: String,
    /// Half-width of the sampled square.
    pub range: f64,
    /// Grid cells per axis.
    pub resolution: u32,
    pub scheme: ColorScheme,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        SurfaceConfig {
            expression: DEFAULT_EXPRESSION.to_string(),
            range: 5.0,
            resolution: 80,
            scheme: ColorScheme::Ocean,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Time changes reshape the surface only while this is on.
    pub enabled: bool,
    pub time: f64,
    pub time_min: f64,
    pub time_max: f64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        AnimationConfig {
            enabled: true,
            time: 0.0,
            time_min: -5.0,
            time_max: 5.0,
        }
    }
}

impl AnimationConfig {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.time_min, self.time_max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 1600,
            height: 900,
            vsync: true,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(text).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let surface = &self.surface;
        if surface.expression.trim().is_empty() {
            bail!("surface.expression must not be empty");
        }
        if !(surface.range > 0.0 && surface.range <= MAX_RANGE) {
            bail!(
                "surface.range must be in (0, {}], got {}",
                MAX_RANGE,
                surface.range
            );
        }
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&surface.resolution) {
            bail!(
                "surface.resolution must be between {} and {}, got {}",
                MIN_RESOLUTION,
                MAX_RESOLUTION,
                surface.resolution
            );
        }

        let animation = &self.animation;
        if !(animation.time_min.is_finite() && animation.time_max.is_finite()) {
            bail!("animation.time_min and animation.time_max must be finite");
        }
        if animation.time_min > animation.time_max {
            bail!(
                "animation.time_min ({}) is greater than animation.time_max ({})",
                animation.time_min,
                animation.time_max
            );
        }
        if !animation.time.is_finite() {
            bail!("animation.time must be finite");
        }

        if self.window.width == 0 || self.window.height == 0 {
            bail!("window size must be non-zero");
        }
        Ok(())
    }

    /// Parameters for the first surface, with the start time clamped into the
    /// animation window.
    pub fn initial_parameters(&self) -> VisualizationParameters {
        VisualizationParameters::new(
            self.surface.expression.trim(),
            self.surface.range,
            self.surface.resolution,
        )
        .with_scheme(self.surface.scheme)
        .with_time(self.animation.window().clamp(self.animation.time))
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "surface3d", version, about = "Interactive 3D plots of z = f(x, y, t)")]
pub struct Cli {
    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Function of x, y and t to plot
    #[arg(short, long)]
    pub expression: Option<String>,

    /// Half-width of the plotted square
    #[arg(short, long)]
    pub range: Option<f64>,

    /// Grid cells per axis
    #[arg(long)]
    pub resolution: Option<u32>,

    /// Color scheme: rainbow, ocean, sunset or forest
    #[arg(short, long)]
    pub scheme: Option<ColorScheme>,
}

impl Cli {
    /// Loads the config file if one was given, applies the command-line
    /// overrides and validates the result.
    pub fn resolve(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        self.apply_overrides(&mut config);
        config.validate().context("Invalid command-line options")?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(expression) = &self.expression {
            config.surface.expression = expression.clone();
        }
        if let Some(range) = self.range {
            config.surface.range = range;
        }
        if let Some(resolution) = self.resolution {
            config.surface.resolution = resolution;
        }
        if let Some(scheme) = self.scheme {
            config.surface.scheme = scheme;
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    /// `t = 0` yields `self` and `t = 1` yields `other` exactly.
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let s = 1.0 - t;
        Rgb {
            r: self.r * s + other.r * t,
            g: self.g * s + other.g * t,
            b: self.b * s + other.b * t,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub stop: f64,
    pub color: Rgb,
}

const fn stop(stop: f64, hex: u32) -> ColorStop {
    ColorStop {
        stop,
        color: Rgb::from_hex(hex),
    }
}

const RAINBOW: &[ColorStop] = &[
    stop(0.0, 0x4c1d95), // purple
    stop(0.2, 0x3b82f6), // blue
    stop(0.4, 0x14b8a6), // teal
    stop(0.6, 0x10b981), // green
    stop(0.8, 0xf59e0b), // orange
    stop(1.0, 0xef4444), // red
];

const OCEAN: &[ColorStop] = &[
    stop(0.0, 0x1e3a8a),
    stop(0.3, 0x0ea5e9),
    stop(0.6, 0x06b6d4),
    stop(1.0, 0x67e8f9),
];

const SUNSET: &[ColorStop] = &[
    stop(0.0, 0x7c2d12),
    stop(0.3, 0xdc2626),
    stop(0.6, 0xf97316),
    stop(1.0, 0xfbbf24),
];

const FOREST: &[ColorStop] = &[
    stop(0.0, 0x064e3b),
    stop(0.4, 0x059669),
    stop(0.7, 0x34d399),
    stop(1.0, 0x86efac),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Rainbow,
    #[default]
    Ocean,
    Sunset,
    Forest,
}

impl ColorScheme {
    pub const ALL: [ColorScheme; 4] = [
        ColorScheme::Rainbow,
        ColorScheme::Ocean,
        ColorScheme::Sunset,
        ColorScheme::Forest,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ColorScheme::Rainbow => "rainbow",
            ColorScheme::Ocean => "ocean",
            ColorScheme::Sunset => "sunset",
            ColorScheme::Forest => "forest",
        }
    }

    pub fn stops(self) -> &'static [ColorStop] {
        match self {
            ColorScheme::Rainbow => RAINBOW,
            ColorScheme::Ocean => OCEAN,
            ColorScheme::Sunset => SUNSET,
            ColorScheme::Forest => FOREST,
        }
    }

    pub fn color_at(self, value: f64) -> Rgb {
        gradient_color(self.stops(), value)
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
#[error("unknown color scheme `{0}` (expected rainbow, ocean, sunset or forest)")]
pub struct UnknownScheme(String);

impl FromStr for ColorScheme {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorScheme::ALL
            .into_iter()
            .find(|scheme| scheme.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownScheme(s.to_string()))
    }
}

/// Maps a height into `[0, 1]` relative to the frame's extremes. A flat frame
/// maps every height to the gradient midpoint.
pub fn normalize(z: f64, min: f64, max: f64) -> f64 {
    if max != min {
        (z - min) / (max - min)
    } else {
        0.5
    }
}

/// Piecewise-linear lookup. The first stop pair bracketing `value` wins; a
/// value no pair brackets falls back to interpolating between the first and
/// last stops.
pub fn gradient_color(stops: &[ColorStop], value: f64) -> Rgb {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return Rgb::from_hex(0x000000);
    };

    let (lower, upper) = stops
        .windows(2)
        .find(|pair| value >= pair[0].stop && value <= pair[1].stop)
        .map(|pair| (pair[0], pair[1]))
        .unwrap_or((*first, *last));

    let span = upper.stop - lower.stop;
    let t = if span > 0.0 {
        (value - lower.stop) / span
    } else {
        0.0
    };

    lower.color.lerp(upper.color, t as f32)
}

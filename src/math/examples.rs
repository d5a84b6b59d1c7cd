pub struct FunctionPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub expression: &'static str,
    pub range: f64,
}

pub const DEFAULT_EXPRESSION: &str = "sin(sqrt(x*x + y*y) - t) / sqrt(x*x + y*y + 0.1)";

pub const FUNCTION_PRESETS: &[FunctionPreset] = &[
    FunctionPreset {
        name: "Ripple",
        description: "Damped radial wave travelling outward with t",
        expression: DEFAULT_EXPRESSION,
        range: 5.0,
    },
    FunctionPreset {
        name: "Saddle",
        description: "Hyperbolic paraboloid",
        expression: "(x^2 - y^2) / 4",
        range: 5.0,
    },
    FunctionPreset {
        name: "Paraboloid",
        description: "Bowl, clamped at the rim",
        expression: "(x^2 + y^2) / 4",
        range: 5.0,
    },
    FunctionPreset {
        name: "Egg Crate",
        description: "sin(x) · cos(y)",
        expression: "sin(x) * cos(y)",
        range: 6.28,
    },
    FunctionPreset {
        name: "Travelling Wave",
        description: "Plane wave moving along x",
        expression: "sin(x - t) + 0.5 * cos(2y + t)",
        range: 6.0,
    },
    FunctionPreset {
        name: "Peaks",
        description: "Two gaussian bumps and a pit",
        expression: "3(1-x)^2 exp(-x^2 - (y+1)^2) - 10(x/5 - x^3 - y^5) exp(-x^2 - y^2) - exp(-(x+1)^2 - y^2)/3",
        range: 3.0,
    },
    FunctionPreset {
        name: "Pulse",
        description: "Gaussian that breathes with t",
        expression: "4 * exp(-(x*x + y*y) / (2 + sin(t)))",
        range: 4.0,
    },
    FunctionPreset {
        name: "Interference",
        description: "Two point sources",
        expression: "sin(hypot(x - 2, y) * 3 - t) + sin(hypot(x + 2, y) * 3 - t)",
        range: 6.0,
    },
    FunctionPreset {
        name: "Terraces",
        description: "Stepped cone",
        expression: "floor(3 - sqrt(x^2 + y^2))",
        range: 4.0,
    },
];

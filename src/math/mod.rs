pub mod color;
pub mod engine;
pub mod examples;
pub mod expr;
pub mod mesh;
pub mod params;
pub mod sampler;
pub mod session;
pub mod surface;

pub use color::ColorScheme;
pub use engine::{MathEngine, MathResult, MeshUpload};
pub use examples::DEFAULT_EXPRESSION;
pub use params::{TimeWindow, VisualizationParameters};

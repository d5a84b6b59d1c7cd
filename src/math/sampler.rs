use crate::math::expr::{Bindings, Evaluator, FailureTally, evaluate_or_zero};

/// Sampled heights are clamped into `[-HEIGHT_LIMIT, HEIGHT_LIMIT]`.
pub const HEIGHT_LIMIT: f64 = 10.0;

/// Heights for a `(resolution + 1)²` vertex grid, stored row-major so that
/// `heights[i * (resolution + 1) + j]` sits at `(x_i, y_j)`.
#[derive(Debug, Clone)]
pub struct HeightGrid {
    resolution: u32,
    heights: Vec<f64>,
    min: f64,
    max: f64,
    failures: usize,
}

impl HeightGrid {
    /// Vertices per axis.
    pub fn side(&self) -> usize {
        self.resolution as usize + 1
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.heights[i * self.side() + j]
    }

    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Number of samples that fell back to zero.
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn normalized(&self, z: f64) -> f64 {
        crate::math::color::normalize(z, self.min, self.max)
    }
}

pub fn grid_step(range: f64, resolution: u32) -> f64 {
    2.0 * range / resolution as f64
}

pub fn grid_coordinate(range: f64, step: f64, index: usize) -> f64 {
    -range + index as f64 * step
}

/// Walks the square `[-range, range]²` and evaluates `expression` at every
/// vertex. Failed samples count as `0`; one summary warning is logged per pass.
pub fn sample<E: Evaluator + ?Sized>(
    evaluator: &E,
    expression: &str,
    range: f64,
    resolution: u32,
    time: f64,
) -> HeightGrid {
    let side = resolution as usize + 1;
    let step = grid_step(range, resolution);

    let mut heights = Vec::with_capacity(side * side);
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut failures = FailureTally::default();

    for i in 0..side {
        let x = grid_coordinate(range, step, i);
        for j in 0..side {
            let y = grid_coordinate(range, step, j);
            let bindings = Bindings::new(x, y, time);
            let z = evaluate_or_zero(evaluator, expression, &bindings, &mut failures)
                .clamp(-HEIGHT_LIMIT, HEIGHT_LIMIT);

            min = min.min(z);
            max = max.max(z);
            heights.push(z);
        }
    }

    if let Some(first) = failures.first() {
        log::warn!(
            target: "surface3d::sampler",
            "{} of {} samples of `{}` failed and were set to 0 (first: {})",
            failures.count(),
            heights.len(),
            expression,
            first
        );
    }

    log::trace!(
        target: "surface3d::sampler",
        "sampled {}x{} grid at t={}: z in [{}, {}]",
        side,
        side,
        time,
        min,
        max
    );

    HeightGrid {
        resolution,
        heights,
        min,
        max,
        failures: failures.count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::expr::{EvalError, ExprEvaluator};
    use test_log::test;

    #[test]
    fn yields_one_sample_per_vertex() {
        let evaluator = ExprEvaluator::new();
        for resolution in [1, 2, 7, 40] {
            let grid = sample(&evaluator, "x + y", 3.0, resolution, 0.0);
            let side = resolution as usize + 1;
            assert_eq!(grid.len(), side * side);
            assert_eq!(grid.side(), side);
        }
    }

    #[test]
    fn samples_are_clamped() {
        let evaluator = ExprEvaluator::new();
        let grid = sample(&evaluator, "100 * x", 5.0, 10, 0.0);
        assert!(grid.heights().iter().all(|z| (-10.0..=10.0).contains(z)));
        assert_eq!(grid.min(), -10.0);
        assert_eq!(grid.max(), 10.0);
    }

    #[test]
    fn walks_x_by_row_and_y_by_column() {
        let evaluator = ExprEvaluator::new();
        let grid = sample(&evaluator, "x - 2*y", 1.0, 2, 0.0);
        // (x, y) = (-1, 1)
        assert_eq!(grid.get(0, 2), -3.0);
        // (x, y) = (1, -1)
        assert_eq!(grid.get(2, 0), 3.0);
        assert_eq!(grid.get(1, 1), 0.0);
    }

    #[test]
    fn paraboloid_scenario() {
        let evaluator = ExprEvaluator::new();
        let grid = sample(&evaluator, "x*x+y*y", 1.0, 2, 0.0);
        assert_eq!(grid.len(), 9);
        assert_eq!(grid.get(0, 0), 2.0);
        assert_eq!(grid.get(1, 1), 0.0);
        assert_eq!(grid.min(), 0.0);
        assert_eq!(grid.max(), 2.0);
        assert_eq!(grid.normalized(grid.get(1, 1)), 0.0);
    }

    #[test]
    fn constant_surface_has_equal_bounds() {
        let evaluator = ExprEvaluator::new();
        let grid = sample(&evaluator, "3", 2.0, 4, 0.0);
        assert_eq!(grid.min(), grid.max());
        assert_eq!(grid.normalized(3.0), 0.5);
    }

    #[test]
    fn undefined_symbols_fall_back_to_zero() {
        let evaluator = ExprEvaluator::new();
        let grid = sample(&evaluator, "x + q", 2.0, 3, 0.0);
        assert!(grid.heights().iter().all(|&z| z == 0.0));
        assert_eq!(grid.failures(), 16);
    }

    #[test]
    fn only_failing_samples_are_zeroed() {
        let evaluator = ExprEvaluator::new();
        // log(x) is undefined for x <= 0.
        let grid = sample(&evaluator, "log(x)", 1.0, 2, 0.0);
        assert_eq!(grid.failures(), 6);
        assert_eq!(grid.get(2, 0), 0.0);
        assert_eq!(grid.get(0, 0), 0.0);
    }

    #[test]
    fn time_is_bound() {
        let evaluator = ExprEvaluator::new();
        let grid = sample(&evaluator, "t", 1.0, 1, 2.5);
        assert!(grid.heights().iter().all(|&z| z == 2.5));
    }

    #[test]
    fn accepts_any_evaluator() {
        let calls = std::cell::Cell::new(0);
        let counting = |_: &str, bindings: &Bindings| -> Result<f64, EvalError> {
            calls.set(calls.get() + 1);
            Ok(bindings.x * bindings.y)
        };
        let grid = sample(&counting, "ignored", 1.0, 4, 0.0);
        assert_eq!(calls.get(), 25);
        assert_eq!(grid.get(0, 0), 1.0);
    }
}

use thiserror::Error;

use crate::math::expr::Evaluator;
use crate::math::mesh::{DirtyBuffers, SurfaceMesh, TriangleMesh, grid_indices};
use crate::math::params::VisualizationParameters;
use crate::math::sampler::{HeightGrid, grid_coordinate, sample};

/// Capacity of the GPU vertex buffers, in vertices.
pub const MAX_SURFACE_VERTICES: usize = 500_000;
/// Capacity of the GPU index buffer, in indices.
pub const MAX_SURFACE_INDICES: usize = 1_000_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("range must be in (0, {max}], got {0}", max = crate::math::params::MAX_RANGE)]
    InvalidRange(f64),

    #[error("resolution must be at least 1, got {0}")]
    InvalidResolution(u32),

    #[error("time must be finite, got {0}")]
    InvalidTime(f64),

    #[error(
        "resolution {resolution} needs {vertices} vertices and {indices} indices, \
         more than the surface buffers hold"
    )]
    TooLarge {
        resolution: u32,
        vertices: usize,
        indices: usize,
    },

    #[error(
        "mesh was built at resolution {built_resolution} over ±{built_range}, \
         cannot update it in place to resolution {resolution} over ±{range}"
    )]
    TopologyMismatch {
        built_resolution: u32,
        built_range: f64,
        resolution: u32,
        range: f64,
    },
}

fn check_capacity(params: &VisualizationParameters) -> Result<(), SurfaceError> {
    params.validate()?;
    let vertices = params.vertex_count();
    let indices = params.index_count();
    if vertices > MAX_SURFACE_VERTICES || indices > MAX_SURFACE_INDICES {
        return Err(SurfaceError::TooLarge {
            resolution: params.resolution,
            vertices,
            indices,
        });
    }
    Ok(())
}

/// Full rebuild: samples the grid, colors every vertex against this pass's
/// height bounds, triangulates and computes normals. The returned mesh has
/// every buffer marked dirty.
pub fn build<E: Evaluator + ?Sized>(
    evaluator: &E,
    params: &VisualizationParameters,
) -> Result<SurfaceMesh, SurfaceError> {
    check_capacity(params)?;

    let grid = sample(
        evaluator,
        &params.expression,
        params.range,
        params.resolution,
        params.time,
    );

    let count = grid.len();
    let step = params.step();
    let mut mesh = TriangleMesh {
        vertices: Vec::with_capacity(count * 3),
        normals: Vec::with_capacity(count * 3),
        colors: Vec::with_capacity(count * 3),
        indices: grid_indices(params.resolution),
    };

    for i in 0..grid.side() {
        let x = grid_coordinate(params.range, step, i) as f32;
        for j in 0..grid.side() {
            let y = grid_coordinate(params.range, step, j) as f32;
            let z = grid.get(i, j);
            mesh.vertices.extend_from_slice(&[x, z as f32, y]);
            mesh.colors
                .extend_from_slice(&params.scheme.color_at(grid.normalized(z)).to_array());
        }
    }
    mesh.compute_vertex_normals();

    log::trace!(
        target: "surface3d::surface",
        "built {} vertices / {} indices for `{}`",
        mesh.vertex_count(),
        mesh.indices.len(),
        params.expression
    );

    Ok(SurfaceMesh::new(
        mesh,
        grid.min() as f32,
        grid.max() as f32,
        params.resolution,
        params.range,
        params.scheme,
    ))
}

/// Fast path for animation frames: rewrites heights, colors and normals of an
/// existing mesh without touching its topology.
pub fn update<E: Evaluator + ?Sized>(
    surface: &mut SurfaceMesh,
    evaluator: &E,
    params: &VisualizationParameters,
) -> Result<(), SurfaceError> {
    params.validate()?;
    if surface.resolution() != params.resolution || surface.range() != params.range {
        return Err(SurfaceError::TopologyMismatch {
            built_resolution: surface.resolution(),
            built_range: surface.range(),
            resolution: params.resolution,
            range: params.range,
        });
    }

    let grid = sample(
        evaluator,
        &params.expression,
        params.range,
        params.resolution,
        params.time,
    );
    rewrite_vertex_data(surface, &grid);
    surface.mesh.compute_vertex_normals();
    surface.mark_dirty(DirtyBuffers::VERTEX_DATA);

    log::trace!(
        target: "surface3d::surface",
        "updated {} vertices at t={}",
        grid.len(),
        params.time
    );

    Ok(())
}

fn rewrite_vertex_data(surface: &mut SurfaceMesh, grid: &HeightGrid) {
    let scheme = surface.scheme();
    let mesh = &mut surface.mesh;

    for ((&z, position), color) in grid
        .heights()
        .iter()
        .zip(mesh.vertices.chunks_exact_mut(3))
        .zip(mesh.colors.chunks_exact_mut(3))
    {
        position[1] = z as f32;
        color.copy_from_slice(&scheme.color_at(grid.normalized(z)).to_array());
    }

    surface.z_min = grid.min() as f32;
    surface.z_max = grid.max() as f32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::color::ColorScheme;
    use crate::math::expr::ExprEvaluator;
    use crate::math::params::MAX_RANGE;
    use test_log::test;

    fn params(expression: &str, range: f64, resolution: u32) -> VisualizationParameters {
        VisualizationParameters::new(expression, range, resolution)
    }

    #[test]
    fn paraboloid_scenario() {
        let evaluator = ExprEvaluator::new();
        let surface = build(&evaluator, &params("x*x+y*y", 1.0, 2)).unwrap();
        let mesh = &surface.mesh;

        assert_eq!(mesh.vertex_count(), 9);
        assert_eq!(&mesh.vertices[0..3], &[-1.0, 2.0, -1.0]);
        // center vertex (i = 1, j = 1)
        assert_eq!(&mesh.vertices[12..15], &[0.0, 0.0, 0.0]);
        assert_eq!(surface.z_min, 0.0);
        assert_eq!(surface.z_max, 2.0);

        let first = ColorScheme::Ocean.stops()[0].color.to_array();
        assert_eq!(&mesh.colors[12..15], &first);
    }

    #[test]
    fn buffers_are_parallel() {
        let evaluator = ExprEvaluator::new();
        let surface = build(&evaluator, &params("sin(x) * cos(y)", 3.0, 12)).unwrap();
        let mesh = &surface.mesh;
        assert_eq!(mesh.vertices.len(), 13 * 13 * 3);
        assert_eq!(mesh.colors.len(), mesh.vertices.len());
        assert_eq!(mesh.normals.len(), mesh.vertices.len());
        assert_eq!(mesh.indices.len(), 6 * 12 * 12);
        assert!(mesh.colors.iter().all(|c| (0.0..=1.0).contains(c)));
    }

    #[test]
    fn build_is_deterministic() {
        let evaluator = ExprEvaluator::new();
        let p = params("sin(x*y) + t", 2.0, 9).with_time(0.7);
        let a = build(&evaluator, &p).unwrap();
        let b = build(&evaluator, &p).unwrap();
        assert_eq!(a.mesh, b.mesh);
    }

    #[test]
    fn constant_surface_uses_the_midpoint_color() {
        let evaluator = ExprEvaluator::new();
        for scheme in ColorScheme::ALL {
            let surface = build(&evaluator, &params("4", 1.0, 3).with_scheme(scheme)).unwrap();
            let mid = scheme.color_at(0.5).to_array();
            assert!(surface.mesh.colors.chunks_exact(3).all(|c| c == mid));
        }
    }

    #[test]
    fn undefined_symbol_builds_a_flat_surface() {
        let evaluator = ExprEvaluator::new();
        let surface = build(&evaluator, &params("x + unknown", 1.0, 4)).unwrap();
        assert!(surface.mesh.vertices.chunks_exact(3).all(|p| p[1] == 0.0));
    }

    #[test]
    fn update_matches_a_fresh_build() {
        let evaluator = ExprEvaluator::new();
        let start = params("sin(sqrt(x*x + y*y) - t)", 4.0, 16).with_scheme(ColorScheme::Sunset);
        let next = start.clone().with_time(1.25);

        let mut live = build(&evaluator, &start).unwrap();
        let indices = live.mesh.indices.clone();
        live.take_dirty();

        update(&mut live, &evaluator, &next).unwrap();
        let fresh = build(&evaluator, &next).unwrap();

        assert_eq!(live.mesh.vertices, fresh.mesh.vertices);
        assert_eq!(live.mesh.colors, fresh.mesh.colors);
        assert_eq!(live.mesh.normals, fresh.mesh.normals);
        assert_eq!(live.mesh.indices, indices);
        assert_eq!(live.z_min, fresh.z_min);
        assert_eq!(live.z_max, fresh.z_max);
        assert_eq!(live.take_dirty(), DirtyBuffers::VERTEX_DATA);
    }

    #[test]
    fn update_rejects_a_different_topology() {
        let evaluator = ExprEvaluator::new();
        let mut live = build(&evaluator, &params("x", 1.0, 4)).unwrap();

        let err = update(&mut live, &evaluator, &params("x", 1.0, 5)).unwrap_err();
        assert!(matches!(err, SurfaceError::TopologyMismatch { .. }));

        let err = update(&mut live, &evaluator, &params("x", 2.0, 4)).unwrap_err();
        assert!(matches!(err, SurfaceError::TopologyMismatch { .. }));
    }

    #[test]
    fn oversized_grids_are_rejected() {
        let evaluator = ExprEvaluator::new();
        let err = build(&evaluator, &params("x", 1.0, 1_000)).unwrap_err();
        assert!(matches!(err, SurfaceError::TooLarge { resolution: 1_000, .. }));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let evaluator = ExprEvaluator::new();
        assert!(build(&evaluator, &params("x", -1.0, 4)).is_err());
        assert!(build(&evaluator, &params("x", 1.0, 0)).is_err());
    }

    #[test]
    fn huge_ranges_never_reach_the_vertex_buffer() {
        let evaluator = ExprEvaluator::new();
        let err = build(&evaluator, &params("x*0", 1e308, 2)).unwrap_err();
        assert_eq!(err, SurfaceError::InvalidRange(1e308));

        let widest = build(&evaluator, &params("x*0", MAX_RANGE, 2)).unwrap();
        assert!(widest.mesh.vertices.iter().all(|v| v.is_finite()));
    }
}

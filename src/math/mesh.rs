use bitflags::bitflags;
use glam::Vec3;

use crate::math::color::ColorScheme;

bitflags! {
    /// Vertex buffers that changed since the host last synced the GPU copy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirtyBuffers: u8 {
        const POSITIONS = 1 << 0;
        const COLORS    = 1 << 1;
        const NORMALS   = 1 << 2;
        const INDICES   = 1 << 3;
    }
}

impl DirtyBuffers {
    /// What a time-only update rewrites.
    pub const VERTEX_DATA: Self = Self::POSITIONS.union(Self::COLORS).union(Self::NORMALS);
}

/// Flat `xyz`/`rgb` triples, one per vertex, plus a triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
    pub colors: Vec<f32>,
    pub indices: Vec<u32>,
}

impl TriangleMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn position(&self, vertex: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[vertex * 3..vertex * 3 + 3])
    }

    /// Area-weighted smooth normals: every face normal is added to its three
    /// corners, then each sum is normalized. Vertices with no usable face keep
    /// a zero normal.
    pub fn compute_vertex_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertex_count()];

        for tri in self.indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            let (pa, pb, pc) = (self.position(a), self.position(b), self.position(c));
            let face = (pc - pb).cross(pa - pb);
            accum[a] += face;
            accum[b] += face;
            accum[c] += face;
        }

        self.normals.clear();
        self.normals.reserve(accum.len() * 3);
        for n in accum {
            self.normals.extend_from_slice(&n.normalize_or_zero().to_array());
        }
    }
}

/// Two triangles per cell, `(a, b, d)` and `(a, d, c)`, where `a` is the
/// cell's `(i, j)` corner, `b` its `j + 1` neighbour and `c`/`d` the same pair
/// one row down.
pub fn grid_indices(resolution: u32) -> Vec<u32> {
    let side = resolution + 1;
    let mut indices = Vec::with_capacity(6 * (resolution as usize).pow(2));

    for i in 0..resolution {
        for j in 0..resolution {
            let a = i * side + j;
            let b = a + 1;
            let c = a + side;
            let d = c + 1;
            indices.extend_from_slice(&[a, b, d, a, d, c]);
        }
    }

    indices
}

/// The live height-field mesh together with what it was built from.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    pub mesh: TriangleMesh,
    pub z_min: f32,
    pub z_max: f32,
    resolution: u32,
    range: f64,
    scheme: ColorScheme,
    dirty: DirtyBuffers,
}

impl SurfaceMesh {
    pub(crate) fn new(
        mesh: TriangleMesh,
        z_min: f32,
        z_max: f32,
        resolution: u32,
        range: f64,
        scheme: ColorScheme,
    ) -> Self {
        Self {
            mesh,
            z_min,
            z_max,
            resolution,
            range,
            scheme,
            dirty: DirtyBuffers::all(),
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn scheme(&self) -> ColorScheme {
        self.scheme
    }

    #[cfg(test)]
    pub fn dirty(&self) -> DirtyBuffers {
        self.dirty
    }

    pub fn mark_dirty(&mut self, buffers: DirtyBuffers) {
        self.dirty |= buffers;
    }

    /// Returns and clears the pending dirty set.
    pub fn take_dirty(&mut self) -> DirtyBuffers {
        std::mem::replace(&mut self.dirty, DirtyBuffers::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn index_count_and_bounds() {
        for resolution in [1u32, 2, 5, 16] {
            let indices = grid_indices(resolution);
            assert_eq!(indices.len(), 6 * (resolution * resolution) as usize);
            let last = (resolution + 1).pow(2) - 1;
            assert!(indices.iter().all(|&index| index <= last));
        }
    }

    #[test]
    fn single_cell_triangulation() {
        assert_eq!(grid_indices(1), vec![0, 1, 3, 0, 3, 2]);
    }

    #[test]
    fn second_row_offsets() {
        let indices = grid_indices(2);
        // cell (1, 0): a = 3, b = 4, c = 6, d = 7
        assert_eq!(&indices[12..18], &[3, 4, 7, 3, 7, 6]);
    }

    #[test]
    fn flat_grid_normals_point_up() {
        // vertex order matches the sampler: x by row, z by column
        let mut mesh = TriangleMesh {
            vertices: vec![
                -1.0, 0.0, -1.0, //
                -1.0, 0.0, 1.0, //
                1.0, 0.0, -1.0, //
                1.0, 0.0, 1.0,
            ],
            indices: grid_indices(1),
            ..Default::default()
        };
        mesh.compute_vertex_normals();
        assert_eq!(mesh.normals.len(), 12);
        for n in mesh.normals.chunks_exact(3) {
            assert_eq!(n, &[0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn unreferenced_vertices_get_zero_normals() {
        let mut mesh = TriangleMesh {
            vertices: vec![0.0; 9],
            ..Default::default()
        };
        mesh.compute_vertex_normals();
        assert!(mesh.normals.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn dirty_flags_accumulate_and_clear() {
        let mut surface = SurfaceMesh::new(
            TriangleMesh::default(),
            0.0,
            0.0,
            1,
            1.0,
            ColorScheme::Ocean,
        );
        assert_eq!(surface.take_dirty(), DirtyBuffers::all());
        assert!(surface.dirty().is_empty());

        surface.mark_dirty(DirtyBuffers::COLORS);
        surface.mark_dirty(DirtyBuffers::NORMALS);
        assert_eq!(surface.take_dirty(), DirtyBuffers::COLORS | DirtyBuffers::NORMALS);
        assert!(!DirtyBuffers::VERTEX_DATA.contains(DirtyBuffers::INDICES));
    }
}

//! Indexed triangle geometry handed to renderers.
//!
//! World space: `x` follows grid columns, `z` follows grid rows, `y` is up.
//! Triangles wind clockwise when viewed from above with `z` pointing down the screen.

use serde::{Deserialize, Serialize};

use crate::heightfield::HeightField;

pub const UP: [f32; 3] = [0.0, 1.0, 0.0];

/// Placement of grid cells in world space
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshParams {
    /// World distance between adjacent cell centers
    pub tile_size: f32,
    /// World units per height unit
    pub height_scale: f32,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self { tile_size: 1.0, height_scale: 0.25 }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleList {
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl TriangleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertices: usize, triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            normals: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(triangles * 3),
        }
    }

    /// Append a vertex and return its index.
    pub fn add_vertex(&mut self, position: [f32; 3], normal: [f32; 3]) -> u32 {
        let idx = self.vertices.len() as u32;
        self.vertices.push(position);
        self.normals.push(normal);
        idx
    }

    pub fn add_triangle(&mut self, p0: u32, p1: u32, p2: u32) {
        self.indices.extend_from_slice(&[p0, p1, p2]);
    }

    /// Two triangles: (p0, p1, p2) and (p0, p2, p3).
    pub fn add_quad(&mut self, p0: u32, p1: u32, p2: u32, p3: u32) {
        self.add_triangle(p0, p1, p2);
        self.add_triangle(p0, p2, p3);
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.normals.clear();
        self.indices.clear();
    }

    /// Append another list, rebasing its indices.
    pub fn append(&mut self, other: &TriangleList) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.normals.extend_from_slice(&other.normals);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    /// Area of the triangles projected onto the horizontal plane.
    pub fn projected_area(&self) -> f32 {
        self.indices
            .chunks_exact(3)
            .map(|t| {
                let a = self.vertices[t[0] as usize];
                let b = self.vertices[t[1] as usize];
                let c = self.vertices[t[2] as usize];
                ((b[0] - a[0]) * (c[2] - a[2]) - (c[0] - a[0]) * (b[2] - a[2])).abs() / 2.0
            })
            .sum()
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 0.0 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        UP
    }
}

/// Ground surface: one vertex per cell, two triangles per 2x2 block.
///
/// Each vertex first gets the un-normalized cross product of the edges to its
/// two "forward" neighbours (right and below; the last column looks left, the
/// last row looks up). The final normal is the sum of that raw normal and the
/// raw normals of the same two neighbours, normalized.
pub fn terrain_mesh(field: &HeightField, params: &MeshParams) -> TriangleList {
    let size = field.size();
    let tile = params.tile_size;
    let mut mesh = TriangleList::with_capacity(size * size, 2 * size.saturating_sub(1).pow(2));

    let position = |x: usize, z: usize| -> [f32; 3] {
        [x as f32 * tile, *field.height_map().get(x, z) * params.height_scale, z as f32 * tile]
    };

    if size == 1 {
        mesh.add_vertex(position(0, 0), UP);
        return mesh;
    }

    let forward = |x: usize, z: usize| -> (usize, usize, usize, usize) {
        let nx = if x + 1 < size { x + 1 } else { x - 1 };
        let nz = if z + 1 < size { z + 1 } else { z - 1 };
        (nx, z, x, nz)
    };

    let mut raw = Vec::with_capacity(size * size);
    for z in 0..size {
        for x in 0..size {
            let center = position(x, z);
            let (hx, hz, vx, vz) = forward(x, z);
            let horizontal = sub(position(hx, hz), center);
            let vertical = sub(position(vx, vz), center);
            // Pick the operand order that keeps the normal pointing up.
            let last_col = x + 1 == size;
            let last_row = z + 1 == size;
            raw.push(match (last_col, last_row) {
                (false, false) => cross(vertical, horizontal),
                (true, false) => cross(horizontal, vertical),
                (false, true) => cross(horizontal, vertical),
                (true, true) => cross(vertical, horizontal),
            });
        }
    }

    for z in 0..size {
        for x in 0..size {
            let (hx, hz, vx, vz) = forward(x, z);
            let a = raw[z * size + x];
            let b = raw[hz * size + hx];
            let c = raw[vz * size + vx];
            let normal = normalize([a[0] + b[0] + c[0], a[1] + b[1] + c[1], a[2] + b[2] + c[2]]);
            mesh.add_vertex(position(x, z), normal);
        }
    }

    for z in 0..size - 1 {
        for x in 0..size - 1 {
            let p0 = (z * size + x) as u32;
            let p1 = p0 + 1;
            let p2 = p0 + size as u32 + 1;
            let p3 = p0 + size as u32;
            mesh.add_triangle(p0, p1, p2);
            mesh.add_triangle(p0, p2, p3);
        }
    }

    mesh
}

//! Water body detection and surface meshing
//!
//! Splits the wet cells of a field into connected bodies of roughly level water
//! and builds a flat surface mesh for each. Together the bodies partition the
//! wet cells: every cell with water belongs to exactly one body.

use serde::{Deserialize, Serialize};

use crate::heightfield::HeightField;
use crate::marching_squares;
use crate::mesh::{MeshParams, TriangleList};
use crate::tilemap::Tilemap;

/// Flood fill settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionParams {
    /// Neighbours join a body when their level is within this distance of the seed cell's level
    pub level_tolerance: f32,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self { level_tolerance: 2.0 }
    }
}

/// Water body identifier (0 = dry, 1+ = body index + 1)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaterBodyId(pub u32);

impl WaterBodyId {
    pub const NONE: WaterBodyId = WaterBodyId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Information about a water body
#[derive(Clone, Debug)]
pub struct WaterBody {
    pub id: WaterBodyId,
    /// Mean `height + water` over the body; the mesh sits at this level
    pub surface_level: f32,
    pub min_level: f32,
    pub max_level: f32,
    /// Total water depth summed over the body
    pub volume: f64,
    pub cells: Vec<(usize, usize)>,
    /// Cells with a 4-neighbour outside the body or on the grid edge
    pub outline: Vec<(usize, usize)>,
    /// Bounding box (min_x, min_y, max_x, max_y)
    pub bounds: (usize, usize, usize, usize),
    /// Empty for single-cell bodies
    pub mesh: TriangleList,
}

impl WaterBody {
    fn new(id: WaterBodyId) -> Self {
        Self {
            id,
            surface_level: 0.0,
            min_level: f32::MAX,
            max_level: f32::MIN,
            volume: 0.0,
            cells: Vec::new(),
            outline: Vec::new(),
            bounds: (usize::MAX, usize::MAX, 0, 0),
            mesh: TriangleList::new(),
        }
    }

    fn add_cell(&mut self, x: usize, y: usize, level: f32, water: f32) {
        self.cells.push((x, y));
        self.min_level = self.min_level.min(level);
        self.max_level = self.max_level.max(level);
        self.volume += water as f64;

        // Running average
        let n = self.cells.len() as f32;
        self.surface_level = self.surface_level * (n - 1.0) / n + level / n;

        self.bounds.0 = self.bounds.0.min(x);
        self.bounds.1 = self.bounds.1.min(y);
        self.bounds.2 = self.bounds.2.max(x);
        self.bounds.3 = self.bounds.3.max(y);
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn width(&self) -> usize {
        if self.bounds.2 >= self.bounds.0 {
            self.bounds.2 - self.bounds.0 + 1
        } else {
            0
        }
    }

    pub fn height(&self) -> usize {
        if self.bounds.3 >= self.bounds.1 {
            self.bounds.3 - self.bounds.1 + 1
        } else {
            0
        }
    }
}

/// Result of one extraction pass.
#[derive(Clone, Debug)]
pub struct WaterBodies {
    /// Body id per cell, `WaterBodyId::NONE` for dry cells
    pub labels: Tilemap<WaterBodyId>,
    pub bodies: Vec<WaterBody>,
}

impl WaterBodies {
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn get(&self, id: WaterBodyId) -> Option<&WaterBody> {
        if id.is_none() {
            return None;
        }
        self.bodies.get(id.0 as usize - 1)
    }

    /// Boolean mask of the cells in `id`.
    pub fn region_mask(&self, id: WaterBodyId) -> Tilemap<bool> {
        let mut mask = Tilemap::new_with(self.labels.width, self.labels.height, false);
        if let Some(body) = self.get(id) {
            for &(x, y) in &body.cells {
                mask.set(x, y, true);
            }
        }
        mask
    }

    pub fn outline_mask(&self, id: WaterBodyId) -> Tilemap<bool> {
        let mut mask = Tilemap::new_with(self.labels.width, self.labels.height, false);
        if let Some(body) = self.get(id) {
            for &(x, y) in &body.outline {
                mask.set(x, y, true);
            }
        }
        mask
    }

    /// All body meshes in one list.
    pub fn combined_mesh(&self) -> TriangleList {
        let mut mesh = TriangleList::new();
        for body in &self.bodies {
            mesh.append(&body.mesh);
        }
        mesh
    }

    pub fn stats(&self) -> WaterBodyStats {
        WaterBodyStats {
            body_count: self.bodies.len(),
            wet_cells: self.bodies.iter().map(|b| b.cell_count()).sum(),
            largest_body: self.bodies.iter().map(|b| b.cell_count()).max().unwrap_or(0),
            single_cell_bodies: self.bodies.iter().filter(|b| b.cell_count() == 1).count(),
            triangles: self.bodies.iter().map(|b| b.mesh.triangle_count()).sum(),
        }
    }
}

/// Statistics about extracted water bodies
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterBodyStats {
    pub body_count: usize,
    pub wet_cells: usize,
    pub largest_body: usize,
    pub single_cell_bodies: usize,
    pub triangles: usize,
}

/// Reusable extraction state. The flood-fill stack and visited mask are kept
/// between passes so repeated extraction on a same-sized grid does not allocate them again.
pub struct WaterBodyExtractor {
    params: ExtractionParams,
    mesh: MeshParams,
    stack: Vec<(usize, usize)>,
    visited: Vec<bool>,
}

impl WaterBodyExtractor {
    pub fn new(params: ExtractionParams, mesh: MeshParams) -> Self {
        Self {
            params,
            mesh,
            stack: Vec::new(),
            visited: Vec::new(),
        }
    }

    pub fn extract(&mut self, field: &HeightField) -> WaterBodies {
        let size = field.size();
        let water = field.water();

        self.visited.clear();
        self.visited.resize(size * size, false);
        let mut labels = Tilemap::new_with(size, size, WaterBodyId::NONE);
        let mut bodies = Vec::new();

        for y in 0..size {
            for x in 0..size {
                let idx = y * size + x;
                if self.visited[idx] || water[idx] <= 0.0 {
                    continue;
                }
                let id = WaterBodyId(bodies.len() as u32 + 1);
                let mut body = self.flood_fill(field, x, y, id, &mut labels);
                mark_outline(&mut body, &labels);
                if body.cell_count() > 1 {
                    body.mesh = self.surface_mesh(&body, &labels);
                }
                bodies.push(body);
            }
        }

        log::debug!(
            "Extracted {} water bodies from {} wet cells",
            bodies.len(),
            bodies.iter().map(|b: &WaterBody| b.cell_count()).sum::<usize>()
        );

        WaterBodies { labels, bodies }
    }

    /// Depth-first fill over wet 8-neighbours whose level is within tolerance of the seed.
    fn flood_fill(
        &mut self,
        field: &HeightField,
        seed_x: usize,
        seed_y: usize,
        id: WaterBodyId,
        labels: &mut Tilemap<WaterBodyId>,
    ) -> WaterBody {
        let size = field.size();
        let water = field.water();
        let seed_level = field.level(seed_x, seed_y);
        let tolerance = self.params.level_tolerance;
        let mut body = WaterBody::new(id);

        self.stack.clear();
        self.stack.push((seed_x, seed_y));
        self.visited[seed_y * size + seed_x] = true;

        while let Some((x, y)) = self.stack.pop() {
            let level = field.level(x, y);
            body.add_cell(x, y, level, water[y * size + x]);
            labels.set(x, y, id);

            for (nx, ny) in labels.neighbors_8(x, y) {
                let nidx = ny * size + nx;
                if self.visited[nidx] || water[nidx] <= 0.0 {
                    continue;
                }
                if (field.level(nx, ny) - seed_level).abs() > tolerance {
                    continue;
                }
                self.visited[nidx] = true;
                self.stack.push((nx, ny));
            }
        }

        body
    }

    /// Flat surface at the body's mean level, covering the blocks it touches.
    fn surface_mesh(&self, body: &WaterBody, labels: &Tilemap<WaterBodyId>) -> TriangleList {
        let size = labels.width;
        let (min_x, min_y, max_x, max_y) = body.bounds;
        // blocks are addressed by their top-left cell and span two cells
        let xs = min_x.saturating_sub(1)..max_x.min(size - 2) + 1;
        let zs = min_y.saturating_sub(1)..max_y.min(size - 2) + 1;
        let mut mesh = TriangleList::new();
        marching_squares::march(
            |x, z| *labels.get(x, z) == body.id,
            xs,
            zs,
            self.mesh.tile_size,
            body.surface_level * self.mesh.height_scale,
            &mut mesh,
        );
        mesh
    }
}

fn mark_outline(body: &mut WaterBody, labels: &Tilemap<WaterBodyId>) {
    let (w, h) = (labels.width, labels.height);
    let inside = |x: usize, y: usize| *labels.get(x, y) == body.id;
    let outline = body
        .cells
        .iter()
        .copied()
        .filter(|&(x, y)| {
            x == 0
                || y == 0
                || x + 1 == w
                || y + 1 == h
                || !inside(x - 1, y)
                || !inside(x + 1, y)
                || !inside(x, y - 1)
                || !inside(x, y + 1)
        })
        .collect();
    body.outline = outline;
}

/// Extract with default settings.
pub fn extract(field: &HeightField, params: &ExtractionParams, mesh: &MeshParams) -> WaterBodies {
    WaterBodyExtractor::new(params.clone(), mesh.clone()).extract(field)
}

//! The simulation grid: ground height and water depth over a square of cells.
//!
//! Two access styles exist on purpose. The signed accessors (`get_height`,
//! `set_water`, ...) fold coordinates onto the grid so generation code can
//! address virtual neighbours past the edge. The `*_at` / `increment_*` edit
//! API used by external callers validates coordinates and rejects anything
//! outside the grid.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::tilemap::Tilemap;

/// Water below this depth is treated as exactly zero.
pub const EPSILON: f32 = 1e-4;

/// Largest side length whose cell count still fits the persisted `i32` length prefix.
pub const MAX_SIZE: usize = 46_340;

/// Clamp a water value onto the legal range: negative, sub-epsilon and NaN become 0.
#[inline]
pub fn clamp_water(value: f32) -> f32 {
    if value >= EPSILON {
        value
    } else {
        0.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeightField {
    size: usize,
    height: Tilemap<f32>,
    water: Tilemap<f32>,
    dirty: bool,
}

impl HeightField {
    /// Create a flat, dry field of `size x size` cells.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(TerrainError::InvalidSize { size, reason: "grid must have at least one cell" });
        }
        if size > MAX_SIZE {
            return Err(TerrainError::InvalidSize { size, reason: "grid too large for the persisted format" });
        }
        Ok(Self {
            size,
            height: Tilemap::new_with(size, size, 0.0),
            water: Tilemap::new_with(size, size, 0.0),
            dirty: true,
        })
    }

    /// Create a field of side `2^exponent + 1`, the shape terrain generation needs.
    pub fn with_exponent(exponent: u32) -> Result<Self> {
        if exponent == 0 || exponent > 15 {
            return Err(TerrainError::InvalidParameter {
                name: "size_exponent",
                reason: format!("{} is outside 1..=15", exponent),
            });
        }
        Self::new((1usize << exponent) + 1)
    }

    /// Build a field from raw row-major grids. Water is clamped on the way in.
    pub fn from_grids(size: usize, height: Vec<f32>, mut water: Vec<f32>) -> Result<Self> {
        let mut field = Self::new(size)?;
        let cells = size * size;
        if height.len() != cells || water.len() != cells {
            return Err(TerrainError::CorruptData(format!(
                "expected {} cells, got {} heights and {} water values",
                cells,
                height.len(),
                water.len()
            )));
        }
        for w in water.iter_mut() {
            *w = clamp_water(*w);
        }
        field.height = Tilemap::from_vec(size, size, height);
        field.water = Tilemap::from_vec(size, size, water);
        Ok(field)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cell_count(&self) -> usize {
        self.size * self.size
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.size + x
    }

    pub fn height_map(&self) -> &Tilemap<f32> {
        &self.height
    }

    pub fn water_map(&self) -> &Tilemap<f32> {
        &self.water
    }

    pub fn heights(&self) -> &[f32] {
        self.height.as_slice()
    }

    pub fn water(&self) -> &[f32] {
        self.water.as_slice()
    }

    /// Borrow the height grid immutably and the water grid mutably at once.
    /// Used by flow backends; callers are responsible for keeping water legal.
    pub(crate) fn grids_mut(&mut self) -> (&[f32], &mut [f32]) {
        self.dirty = true;
        (self.height.as_slice(), self.water.as_mut_slice())
    }

    pub(crate) fn heights_mut(&mut self) -> &mut Tilemap<f32> {
        self.dirty = true;
        &mut self.height
    }

    // ---------------------------------------------------------------------
    // Toroidal accessors
    // ---------------------------------------------------------------------

    pub fn get_height(&self, x: i64, y: i64) -> f32 {
        *self.height.get_wrapped(x, y)
    }

    pub fn set_height(&mut self, x: i64, y: i64, value: f32) {
        self.height.set_wrapped(x, y, value);
        self.dirty = true;
    }

    pub fn get_water(&self, x: i64, y: i64) -> f32 {
        *self.water.get_wrapped(x, y)
    }

    pub fn set_water(&mut self, x: i64, y: i64, value: f32) {
        self.water.set_wrapped(x, y, clamp_water(value));
        self.dirty = true;
    }

    /// Surface level (`height + water`) of an in-range cell.
    #[inline]
    pub fn level(&self, x: usize, y: usize) -> f32 {
        *self.height.get(x, y) + *self.water.get(x, y)
    }

    // ---------------------------------------------------------------------
    // Validated edit API
    // ---------------------------------------------------------------------

    fn check(&self, x: usize, y: usize) -> Result<()> {
        if x < self.size && y < self.size {
            Ok(())
        } else {
            Err(TerrainError::OutOfBounds { x, y, size: self.size })
        }
    }

    pub fn height_at(&self, x: usize, y: usize) -> Result<f32> {
        self.check(x, y)?;
        Ok(*self.height.get(x, y))
    }

    pub fn water_at(&self, x: usize, y: usize) -> Result<f32> {
        self.check(x, y)?;
        Ok(*self.water.get(x, y))
    }

    pub fn set_height_at(&mut self, x: usize, y: usize, value: f32) -> Result<()> {
        self.check(x, y)?;
        self.height.set(x, y, value);
        self.dirty = true;
        Ok(())
    }

    pub fn set_water_at(&mut self, x: usize, y: usize, value: f32) -> Result<()> {
        self.check(x, y)?;
        self.water.set(x, y, clamp_water(value));
        self.dirty = true;
        Ok(())
    }

    /// Raise (or lower, with a negative delta) the ground. Returns the new height.
    pub fn increment_height(&mut self, x: usize, y: usize, delta: f32) -> Result<f32> {
        let value = self.height_at(x, y)? + delta;
        self.set_height_at(x, y, value)?;
        Ok(value)
    }

    /// Add (or remove) water. Returns the clamped new depth.
    pub fn increment_water(&mut self, x: usize, y: usize, delta: f32) -> Result<f32> {
        let value = clamp_water(self.water_at(x, y)? + delta);
        self.set_water_at(x, y, value)?;
        Ok(value)
    }

    // ---------------------------------------------------------------------
    // Bulk operations
    // ---------------------------------------------------------------------

    /// Zero both grids.
    pub fn clear(&mut self) {
        self.height.fill(0.0);
        self.water.fill(0.0);
        self.dirty = true;
    }

    pub fn clear_water(&mut self) {
        self.water.fill(0.0);
        self.dirty = true;
    }

    /// Rain `amount` onto every cell whose ground is above `min_height`.
    /// Cells at or below the threshold are dried out.
    pub fn init_water(&mut self, min_height: f32, amount: f32) {
        let heights = self.height.as_slice();
        for (w, &h) in self.water.as_mut_slice().iter_mut().zip(heights) {
            *w = if h > min_height { clamp_water(*w + amount) } else { 0.0 };
        }
        self.dirty = true;
    }

    /// Replace every interior height with the mean of its 8 neighbours.
    pub fn smooth(&mut self) {
        if self.size < 3 {
            return;
        }
        let source = self.height.clone();
        for y in 1..self.size - 1 {
            for x in 1..self.size - 1 {
                let sum: f32 = source.neighbors_8(x, y).map(|(nx, ny)| *source.get(nx, ny)).sum();
                self.height.set(x, y, sum / 8.0);
            }
        }
        self.dirty = true;
    }

    /// Total water volume, accumulated in f64.
    pub fn water_sum(&self) -> f64 {
        self.water.as_slice().iter().map(|&w| w as f64).sum()
    }

    pub fn stats(&self) -> FieldStats {
        let (min_height, max_height) = self.height.min_max().unwrap_or((0.0, 0.0));
        let mut wet_cells = 0;
        let mut max_water = 0.0f32;
        for &w in self.water.as_slice() {
            if w > 0.0 {
                wet_cells += 1;
                max_water = max_water.max(w);
            }
        }
        FieldStats {
            size: self.size,
            min_height,
            max_height,
            wet_cells,
            total_water: self.water_sum(),
            max_water,
        }
    }

    // ---------------------------------------------------------------------
    // Change notification
    // ---------------------------------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Return the dirty flag and reset it. Renderers call this once per frame.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

/// Summary numbers for reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub size: usize,
    pub min_height: f32,
    pub max_height: f32,
    pub wet_cells: usize,
    pub total_water: f64,
    pub max_water: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_grid() {
        assert!(matches!(HeightField::new(0), Err(TerrainError::InvalidSize { .. })));
        assert_eq!(HeightField::with_exponent(3).unwrap().size(), 9);
    }

    #[test]
    fn test_toroidal_accessors_wrap() {
        let mut field = HeightField::new(5).unwrap();
        field.set_height(-1, -1, 7.0);
        assert_eq!(field.height_at(4, 4).unwrap(), 7.0);
        assert_eq!(field.get_height(9, 9), 7.0);

        field.set_water(5, 0, 3.0);
        assert_eq!(field.get_water(0, 0), 3.0);
    }

    #[test]
    fn test_set_water_clamps_negative_and_tiny_values() {
        let mut field = HeightField::new(3).unwrap();
        field.set_water(1, 1, -2.0);
        assert_eq!(field.get_water(1, 1), 0.0);
        field.set_water(1, 1, EPSILON / 2.0);
        assert_eq!(field.get_water(1, 1), 0.0);
        field.set_water(1, 1, 0.5);
        assert_eq!(field.get_water(1, 1), 0.5);
    }

    #[test]
    fn test_edit_api_rejects_out_of_range() {
        let mut field = HeightField::new(4).unwrap();
        assert!(matches!(
            field.set_height_at(4, 0, 1.0),
            Err(TerrainError::OutOfBounds { x: 4, y: 0, size: 4 })
        ));
        assert!(field.increment_water(0, 9, 1.0).is_err());
        // nothing was wrapped onto a neighbouring cell
        assert!(field.heights().iter().all(|&h| h == 0.0));
    }

    #[test]
    fn test_increment_water_never_goes_negative() {
        let mut field = HeightField::new(4).unwrap();
        assert_eq!(field.increment_water(1, 2, 2.5).unwrap(), 2.5);
        assert_eq!(field.increment_water(1, 2, -10.0).unwrap(), 0.0);
        assert_eq!(field.increment_height(1, 2, -3.0).unwrap(), -3.0);
    }

    #[test]
    fn test_init_water_uses_height_threshold() {
        let mut field = HeightField::new(3).unwrap();
        field.set_height_at(0, 0, 5.0).unwrap();
        field.set_height_at(1, 0, 1.0).unwrap();
        field.set_water_at(2, 2, 4.0).unwrap();
        field.init_water(1.0, 10.0);

        assert_eq!(field.water_at(0, 0).unwrap(), 10.0);
        assert_eq!(field.water_at(1, 0).unwrap(), 0.0);
        assert_eq!(field.water_at(2, 2).unwrap(), 0.0);
        assert!((field.water_sum() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_clear_and_dirty_flag() {
        let mut field = HeightField::new(3).unwrap();
        assert!(field.take_dirty());
        assert!(!field.is_dirty());

        field.set_height_at(1, 1, 2.0).unwrap();
        assert!(field.take_dirty());

        field.set_water_at(1, 1, 2.0).unwrap();
        field.clear_water();
        assert_eq!(field.water_sum(), 0.0);
        assert_eq!(field.height_at(1, 1).unwrap(), 2.0);

        field.clear();
        assert!(field.heights().iter().all(|&h| h == 0.0));
        assert!(field.is_dirty());
    }

    #[test]
    fn test_smooth_averages_interior_only() {
        let mut field = HeightField::new(3).unwrap();
        for y in 0..3 {
            for x in 0..3 {
                field.set_height_at(x, y, 8.0).unwrap();
            }
        }
        field.set_height_at(1, 1, 100.0).unwrap();
        field.smooth();
        assert_eq!(field.height_at(1, 1).unwrap(), 8.0);
        assert_eq!(field.height_at(0, 0).unwrap(), 8.0);
    }

    #[test]
    fn test_from_grids_validates_length() {
        assert!(HeightField::from_grids(2, vec![0.0; 4], vec![0.0; 3]).is_err());
        let field = HeightField::from_grids(2, vec![1.0; 4], vec![-1.0, 2.0, 0.0, 0.0]).unwrap();
        assert_eq!(field.water(), &[0.0, 2.0, 0.0, 0.0]);
        assert_eq!(field.stats().wet_cells, 1);
    }
}

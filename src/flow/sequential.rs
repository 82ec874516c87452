//! Single-threaded flow backend. The reference every other backend is checked against.

use crate::error::Result;
use crate::heightfield::HeightField;

use super::kernel::{absorb_rows, emit_rows, fill_levels};
use super::{FlowBackend, TickStats};

pub struct SequentialBackend {
    size: usize,
    levels: Vec<f32>,
    shares: Vec<f32>,
}

impl SequentialBackend {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            levels: vec![0.0; size * size],
            shares: vec![0.0; size * size],
        }
    }
}

impl FlowBackend for SequentialBackend {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn size(&self) -> usize {
        self.size
    }

    fn tick(&mut self, field: &mut HeightField) -> Result<TickStats> {
        self.check_size(field);
        let size = self.size;
        let rows = 0..size;
        let (heights, water) = field.grids_mut();

        fill_levels(size, heights, water, &mut self.levels, rows.clone());
        let emitted = emit_rows(size, &self.levels, water, &mut self.shares, rows.clone());
        let absorbed = absorb_rows(size, &self.levels, &self.shares, water, rows);

        Ok(TickStats::from_rows(emitted.merge(absorbed)))
    }
}

//! Multi-threaded flow backend.
//!
//! Rows are cut into horizontal strips. Each phase runs strips in parallel on a
//! dedicated rayon pool; a strip writes only its own rows and reads the frozen
//! level and share grids, and the phase boundary acts as the barrier. Results
//! are bit-identical to the sequential backend.

use rayon::prelude::*;

use crate::error::{Result, TerrainError};
use crate::heightfield::HeightField;

use super::kernel::{absorb_rows, emit_rows, fill_levels, RowStats};
use super::{FlowBackend, TickStats};

pub struct ParallelBackend {
    size: usize,
    strip_rows: usize,
    pool: rayon::ThreadPool,
    levels: Vec<f32>,
    shares: Vec<f32>,
}

impl ParallelBackend {
    /// `threads == 0` uses one worker per core; `strips == 0` uses four strips per worker.
    pub fn new(size: usize, threads: usize, strips: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("flow-worker-{}", i))
            .build()
            .map_err(|e| TerrainError::InvalidParameter { name: "threads", reason: e.to_string() })?;

        let strips = if strips == 0 { pool.current_num_threads() * 4 } else { strips };
        let strip_rows = size.div_ceil(strips.max(1)).max(1);

        log::debug!(
            "Parallel flow: {} workers, {} rows per strip on a {}x{} grid",
            pool.current_num_threads(),
            strip_rows,
            size,
            size
        );

        Ok(Self {
            size,
            strip_rows,
            pool,
            levels: vec![0.0; size * size],
            shares: vec![0.0; size * size],
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn strip_rows(&self) -> usize {
        self.strip_rows
    }
}

impl FlowBackend for ParallelBackend {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn size(&self) -> usize {
        self.size
    }

    fn tick(&mut self, field: &mut HeightField) -> Result<TickStats> {
        self.check_size(field);
        let size = self.size;
        let chunk = self.strip_rows * size;
        let strip_rows = self.strip_rows;
        let (heights, water) = field.grids_mut();
        let levels = &mut self.levels;
        let shares = &mut self.shares;

        let rows = move |strip: usize| {
            let start = strip * strip_rows;
            start..(start + strip_rows).min(size)
        };

        let stats = self.pool.install(|| {
            levels
                .par_chunks_mut(chunk)
                .zip(water.par_chunks(chunk))
                .enumerate()
                .for_each(|(strip, (level_rows, water_rows))| {
                    fill_levels(size, heights, water_rows, level_rows, rows(strip));
                });

            let levels: &[f32] = levels;
            let emitted = water
                .par_chunks_mut(chunk)
                .zip(shares.par_chunks_mut(chunk))
                .enumerate()
                .map(|(strip, (water_rows, share_rows))| emit_rows(size, levels, water_rows, share_rows, rows(strip)))
                .reduce(RowStats::default, RowStats::merge);

            let shares: &[f32] = shares;
            let absorbed = water
                .par_chunks_mut(chunk)
                .enumerate()
                .map(|(strip, water_rows)| absorb_rows(size, levels, shares, water_rows, rows(strip)))
                .reduce(RowStats::default, RowStats::merge);

            emitted.merge(absorbed)
        });

        Ok(TickStats::from_rows(stats))
    }
}

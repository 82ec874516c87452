//! Cellular water flow.
//!
//! Water moves from each wet cell toward strictly lower neighbours in its
//! clipped 8-neighbourhood. Every tick reads a frozen snapshot of the surface
//! levels, so the outcome is independent of evaluation order and identical on
//! every backend (up to float rounding on the GPU).
//!
//! Backends:
//! - `sequential`: one thread, the reference
//! - `parallel`: row strips on a rayon pool
//! - `gpu`: wgpu compute shaders, grid kept on the device across `tick_n`

pub mod gpu;
mod kernel;
pub mod parallel;
pub mod params;
pub mod sequential;

use std::time::Instant;

pub use gpu::{is_gpu_available, GpuBackend};
pub use parallel::ParallelBackend;
pub use params::{FlowBackendKind, FlowParams, WaterSeedParams};
pub use sequential::SequentialBackend;

use crate::error::{Result, TerrainError};
use crate::heightfield::HeightField;

/// Counters for one or more ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickStats {
    pub ticks: usize,
    /// Cell-ticks in which a cell released water
    pub moving_cells: usize,
    /// Cell-ticks in which a sub-epsilon result was zeroed
    pub clamped_cells: usize,
    /// Water removed by clamping
    pub clamped_mass: f64,
}

impl TickStats {
    fn from_rows(rows: kernel::RowStats) -> Self {
        Self {
            ticks: 1,
            moving_cells: rows.moving_cells,
            clamped_cells: rows.clamped_cells,
            clamped_mass: rows.clamped_mass,
        }
    }

    pub fn accumulate(&mut self, other: TickStats) {
        self.ticks += other.ticks;
        self.moving_cells += other.moving_cells;
        self.clamped_cells += other.clamped_cells;
        self.clamped_mass += other.clamped_mass;
    }

    /// True when the last tick moved nothing.
    pub fn is_settled(&self) -> bool {
        self.moving_cells == 0 && self.clamped_cells == 0
    }
}

/// One implementation of the flow rule.
///
/// A backend is built for one grid size and keeps its scratch buffers between
/// ticks. Passing a field of another size is a programmer error and panics.
pub trait FlowBackend: Send {
    fn name(&self) -> &'static str;

    /// Side length this backend was built for.
    fn size(&self) -> usize;

    /// Advance `field.water` by one tick.
    fn tick(&mut self, field: &mut HeightField) -> Result<TickStats>;

    /// Exactly equivalent to calling [`tick`](Self::tick) `count` times.
    fn tick_n(&mut self, field: &mut HeightField, count: usize) -> Result<TickStats> {
        let mut total = TickStats::default();
        for _ in 0..count {
            total.accumulate(self.tick(field)?);
        }
        Ok(total)
    }

    fn check_size(&self, field: &HeightField) {
        assert_eq!(
            field.size(),
            self.size(),
            "{} flow backend built for a {}x{} grid was given a {}x{} field",
            self.name(),
            self.size(),
            self.size(),
            field.size(),
            field.size()
        );
    }
}

/// Build the backend `params` asks for. `Auto` falls back to the parallel backend
/// when no GPU adapter can be opened.
pub fn create_backend(size: usize, params: &FlowParams) -> Result<Box<dyn FlowBackend>> {
    let backend: Box<dyn FlowBackend> = match params.backend {
        FlowBackendKind::Sequential => Box::new(SequentialBackend::new(size)),
        FlowBackendKind::Parallel => Box::new(ParallelBackend::new(size, params.threads, params.strips)?),
        FlowBackendKind::Gpu => Box::new(GpuBackend::new(size, params.gpu_batch).ok_or(TerrainError::GpuUnavailable)?),
        FlowBackendKind::Auto => match GpuBackend::new(size, params.gpu_batch) {
            Some(gpu) => Box::new(gpu),
            None => {
                log::warn!("GPU not available, using parallel CPU flow");
                Box::new(ParallelBackend::new(size, params.threads, params.strips)?)
            }
        },
    };
    log::info!("Flow backend: {}", backend.name());
    Ok(backend)
}

/// Drives a backend and keeps running totals.
pub struct FlowSimulator {
    backend: Box<dyn FlowBackend>,
    totals: TickStats,
}

impl FlowSimulator {
    pub fn new(size: usize, params: &FlowParams) -> Result<Self> {
        Ok(Self::with_backend(create_backend(size, params)?))
    }

    pub fn with_backend(backend: Box<dyn FlowBackend>) -> Self {
        Self { backend, totals: TickStats::default() }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Totals since construction.
    pub fn totals(&self) -> &TickStats {
        &self.totals
    }

    pub fn tick(&mut self, field: &mut HeightField) -> Result<TickStats> {
        let stats = self.backend.tick(field)?;
        self.totals.accumulate(stats);
        Ok(stats)
    }

    pub fn tick_n(&mut self, field: &mut HeightField, count: usize) -> Result<TickStats> {
        let start = Instant::now();
        let stats = self.backend.tick_n(field, count)?;
        self.totals.accumulate(stats);
        log::debug!(
            "{} ticks on {} in {:.2?}: {} moves, {} clamps ({:.6} water)",
            count,
            self.backend.name(),
            start.elapsed(),
            stats.moving_cells,
            stats.clamped_cells,
            stats.clamped_mass
        );
        Ok(stats)
    }

    /// Tick until a tick moves nothing or `max_ticks` is reached.
    pub fn run_to_equilibrium(&mut self, field: &mut HeightField, max_ticks: usize) -> Result<TickStats> {
        let mut total = TickStats::default();
        while total.ticks < max_ticks {
            let stats = self.tick(field)?;
            total.accumulate(stats);
            if stats.is_settled() {
                break;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::EPSILON;
    use crate::heightmap::{generate, GenerationParams};

    fn cpu_backends(size: usize) -> Vec<Box<dyn FlowBackend>> {
        vec![
            Box::new(SequentialBackend::new(size)),
            Box::new(ParallelBackend::new(size, 3, 2).unwrap()),
        ]
    }

    fn wet_terrain(size: usize) -> HeightField {
        let mut field = HeightField::new(size).unwrap();
        generate(&mut field, &GenerationParams::default()).unwrap();
        field.init_water(100.0, 1.0);
        field
    }

    #[test]
    fn test_single_column_spreads_evenly_over_flat_ground() {
        for mut backend in cpu_backends(5) {
            let mut field = HeightField::new(5).unwrap();
            field.set_water_at(2, 2, 10.0).unwrap();
            backend.tick(&mut field).unwrap();

            let expected = 10.0 / 9.0;
            for y in 0..5 {
                for x in 0..5 {
                    let w = field.water_at(x, y).unwrap();
                    if (1..=3).contains(&x) && (1..=3).contains(&y) {
                        assert!((w - expected).abs() < 1e-5, "{} at ({}, {}) = {}", backend.name(), x, y, w);
                    } else {
                        assert_eq!(w, 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_mass_is_conserved_up_to_clamping() {
        for mut backend in cpu_backends(33) {
            let mut field = wet_terrain(33);
            let before = field.water_sum();
            assert!(before > 0.0);

            let stats = backend.tick_n(&mut field, 100).unwrap();
            let after = field.water_sum();
            let lost = before - after;
            assert!(
                (lost - stats.clamped_mass).abs() < before * 1e-4,
                "{}: lost {} but clamped {}",
                backend.name(),
                lost,
                stats.clamped_mass
            );
        }
    }

    #[test]
    fn test_water_never_negative_or_sub_epsilon() {
        let mut field = wet_terrain(33);
        let mut backend = SequentialBackend::new(33);
        for _ in 0..40 {
            backend.tick(&mut field).unwrap();
            assert!(field.water().iter().all(|&w| w == 0.0 || w >= EPSILON));
        }
    }

    /// 5x5 cone with its lowest cell in the middle and one unit of water in a corner.
    fn cone() -> HeightField {
        let mut field = HeightField::new(5).unwrap();
        for y in 0..5usize {
            for x in 0..5usize {
                let ring = x.abs_diff(2).max(y.abs_diff(2));
                field.set_height_at(x, y, 10.0 * ring as f32).unwrap();
            }
        }
        field.set_water_at(0, 0, 1.0).unwrap();
        field
    }

    #[test]
    fn test_cone_drains_into_center_and_settles() {
        let mut field = cone();
        let mut sim = FlowSimulator::with_backend(Box::new(SequentialBackend::new(5)));
        sim.tick_n(&mut field, 2000).unwrap();
        assert!(field.water_at(2, 2).unwrap() > 0.9);

        let settled = field.water().to_vec();
        let stats = sim.tick(&mut field).unwrap();
        assert!(stats.is_settled());
        assert_eq!(field.water(), settled.as_slice());
        assert_eq!(sim.totals().ticks, 2001);
    }

    #[test]
    fn test_parallel_matches_sequential_exactly() {
        let mut a = wet_terrain(33);
        let mut b = a.clone();

        SequentialBackend::new(33).tick_n(&mut a, 50).unwrap();
        ParallelBackend::new(33, 3, 5).unwrap().tick_n(&mut b, 50).unwrap();

        assert_eq!(a.water(), b.water());
        assert_eq!(a.heights(), b.heights());
    }

    #[test]
    fn test_tick_n_equals_repeated_tick() {
        let mut a = wet_terrain(17);
        let mut b = a.clone();
        let mut backend = SequentialBackend::new(17);

        let batched = backend.tick_n(&mut a, 7).unwrap();
        let mut single = TickStats::default();
        for _ in 0..7 {
            single.accumulate(backend.tick(&mut b).unwrap());
        }
        assert_eq!(a.water(), b.water());
        assert_eq!(batched, single);
    }

    #[test]
    fn test_run_to_equilibrium_stops_early() {
        let mut field = cone();
        let mut sim = FlowSimulator::new(5, &FlowParams::with_backend(FlowBackendKind::Sequential)).unwrap();
        let stats = sim.run_to_equilibrium(&mut field, 10_000).unwrap();
        assert!(stats.ticks < 100);
        assert!(field.water_at(2, 2).unwrap() > 0.99);
    }

    #[test]
    fn test_slope_reaches_fixed_point() {
        for backend in cpu_backends(9) {
            // ground rises 10 per column, one unit of water at the top edge
            let mut field = HeightField::new(9).unwrap();
            for y in 0..9 {
                for x in 0..9 {
                    field.set_height_at(x, y, 10.0 * x as f32).unwrap();
                }
            }
            field.set_water_at(8, 4, 1.0).unwrap();

            let mut sim = FlowSimulator::with_backend(backend);
            let stats = sim.run_to_equilibrium(&mut field, 10_000).unwrap();
            assert!(stats.ticks < 1_000, "{} took {} ticks", sim.backend_name(), stats.ticks);

            let settled = field.water().to_vec();
            assert!(sim.tick(&mut field).unwrap().is_settled());
            assert_eq!(field.water(), settled.as_slice());

            // everything pooled in the lowest column, where no neighbour has lower ground
            for y in 0..9 {
                for x in 1..9 {
                    assert_eq!(field.water_at(x, y).unwrap(), 0.0, "water left at ({}, {})", x, y);
                }
            }
            assert!(field.water_sum() > 0.99);
        }
    }

    #[test]
    #[should_panic(expected = "flow backend built for a 5x5 grid")]
    fn test_size_mismatch_panics() {
        let mut field = HeightField::new(9).unwrap();
        let _ = SequentialBackend::new(5).tick(&mut field);
    }

    #[test]
    #[ignore = "needs a GPU adapter"]
    fn test_gpu_matches_sequential() {
        let mut a = wet_terrain(33);
        let mut b = a.clone();
        SequentialBackend::new(33).tick_n(&mut a, 20).unwrap();
        let mut gpu = GpuBackend::new(33, 8).expect("GPU adapter");
        gpu.tick_n(&mut b, 20).unwrap();

        for (x, y) in a.water().iter().zip(b.water()) {
            assert!((x - y).abs() < 1e-3);
        }
    }
}

//! The per-cell water rule shared by the CPU backends.
//!
//! A tick runs in three phases over frozen inputs, so the result does not depend
//! on visiting order or on how rows are split between workers:
//!
//! 1. `levels[i] = height[i] + water[i]` for every cell.
//! 2. Emit: a wet cell with `n` strictly lower neighbours (clipped 8-neighbourhood)
//!    computes `excess = min(water, level - mean(neighbour levels))`, publishes
//!    `share = excess / (n + 1)` and keeps `water - n * share`. An excess below
//!    `EPSILON`, or one too small to change the cell's water, moves nothing, so
//!    pooled water reaches an exact fixed point.
//! 3. Absorb: every cell adds the shares of neighbours it is downhill from, then
//!    sub-epsilon results are clamped to zero.
//!
//! The GPU shader in `gpu.rs` mirrors these functions line for line.

use std::ops::Range;

use crate::heightfield::EPSILON;
use crate::tilemap::DIR_OFFSETS;

/// Accumulated over the rows a worker handled.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct RowStats {
    pub moving_cells: usize,
    pub clamped_cells: usize,
    pub clamped_mass: f64,
}

impl RowStats {
    pub fn merge(self, other: Self) -> Self {
        Self {
            moving_cells: self.moving_cells + other.moving_cells,
            clamped_cells: self.clamped_cells + other.clamped_cells,
            clamped_mass: self.clamped_mass + other.clamped_mass,
        }
    }
}

#[inline]
fn neighbour(size: usize, x: usize, y: usize, (dx, dy): (i32, i32)) -> Option<usize> {
    let nx = x as i64 + dx as i64;
    let ny = y as i64 + dy as i64;
    if nx < 0 || ny < 0 || nx >= size as i64 || ny >= size as i64 {
        None
    } else {
        Some(ny as usize * size + nx as usize)
    }
}

/// Phase 1 over `rows`. `levels_rows` and the grid slices start at `rows.start`.
pub(crate) fn fill_levels(size: usize, heights: &[f32], water_rows: &[f32], levels_rows: &mut [f32], rows: Range<usize>) {
    let offset = rows.start * size;
    for (i, level) in levels_rows.iter_mut().enumerate() {
        *level = heights[offset + i] + water_rows[i];
    }
}

/// Outgoing share of one cell. Returns `(share, target_count)`, `(0, 0)` when nothing moves.
/// A non-zero result always changes the cell's water.
#[inline]
pub(crate) fn cell_share(size: usize, levels: &[f32], x: usize, y: usize, water: f32) -> (f32, usize) {
    if water <= 0.0 {
        return (0.0, 0);
    }
    let level = levels[y * size + x];
    let mut n = 0usize;
    let mut sum = 0.0f32;
    for &dir in DIR_OFFSETS.iter() {
        if let Some(j) = neighbour(size, x, y, dir) {
            if levels[j] < level {
                n += 1;
                sum += levels[j];
            }
        }
    }
    if n == 0 {
        return (0.0, 0);
    }
    let avg = sum / n as f32;
    let excess = water.min(level - avg);
    if excess < EPSILON {
        return (0.0, 0);
    }
    let share = excess / (n + 1) as f32;
    if water - share * n as f32 == water {
        return (0.0, 0);
    }
    (share, n)
}

/// Water arriving at one cell from uphill neighbours.
#[inline]
pub(crate) fn cell_inflow(size: usize, levels: &[f32], shares: &[f32], x: usize, y: usize) -> f32 {
    let level = levels[y * size + x];
    let mut inflow = 0.0f32;
    for &dir in DIR_OFFSETS.iter() {
        if let Some(j) = neighbour(size, x, y, dir) {
            if shares[j] > 0.0 && level < levels[j] {
                inflow += shares[j];
            }
        }
    }
    inflow
}

/// Phase 2 over `rows`. `water_rows` and `share_rows` start at `rows.start`;
/// `levels` is the whole frozen grid.
pub(crate) fn emit_rows(
    size: usize,
    levels: &[f32],
    water_rows: &mut [f32],
    share_rows: &mut [f32],
    rows: Range<usize>,
) -> RowStats {
    let mut stats = RowStats::default();
    for y in rows.clone() {
        let local_row = (y - rows.start) * size;
        for x in 0..size {
            let i = local_row + x;
            let (share, n) = cell_share(size, levels, x, y, water_rows[i]);
            share_rows[i] = share;
            if n > 0 {
                water_rows[i] -= share * n as f32;
                stats.moving_cells += 1;
            }
        }
    }
    stats
}

/// Phase 3 over `rows`. `shares` is the whole grid as left by phase 2.
pub(crate) fn absorb_rows(
    size: usize,
    levels: &[f32],
    shares: &[f32],
    water_rows: &mut [f32],
    rows: Range<usize>,
) -> RowStats {
    let mut stats = RowStats::default();
    for y in rows.clone() {
        let local_row = (y - rows.start) * size;
        for x in 0..size {
            let i = local_row + x;
            let value = water_rows[i] + cell_inflow(size, levels, shares, x, y);
            water_rows[i] = if value < EPSILON {
                if value != 0.0 {
                    stats.clamped_cells += 1;
                    stats.clamped_mass += value as f64;
                }
                0.0
            } else {
                value
            };
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_cell_sees_three_neighbours() {
        // 3x3, only (0,0) is high and wet
        let levels = [5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let (share, n) = cell_share(3, &levels, 0, 0, 4.0);
        assert_eq!(n, 3);
        assert_eq!(share, 1.0);
    }

    #[test]
    fn test_excess_limited_by_available_water() {
        // drop is 9 but only 2 units of water are present
        let levels = [10.0, 1.0, 1.0, 1.0];
        let (share, n) = cell_share(2, &levels, 0, 0, 2.0);
        assert_eq!(n, 3);
        assert_eq!(share, 0.5);
    }

    #[test]
    fn test_equal_levels_do_not_flow() {
        let levels = [3.0; 9];
        assert_eq!(cell_share(3, &levels, 1, 1, 3.0), (0.0, 0));
        assert_eq!(cell_share(3, &levels, 1, 1, 0.0), (0.0, 0));
    }

    #[test]
    fn test_inflow_only_from_higher_emitters() {
        let levels = [4.0, 2.0, 0.0, 9.0];
        let shares = [1.0, 0.5, 0.0, 0.25];
        // (0,1) has level 0: everyone with a share and a higher level counts
        assert_eq!(cell_inflow(2, &levels, &shares, 0, 1), 1.75);
        // (1,0) has level 2: only (0,0) and (1,1) are higher
        assert_eq!(cell_inflow(2, &levels, &shares, 1, 0), 1.25);
    }

    #[test]
    fn test_sub_epsilon_excess_stays_put() {
        // a rounding-sized difference between pooled cells
        let levels = [1.0, 1.0 - 1e-6, 1.0, 1.0];
        assert_eq!(cell_share(2, &levels, 0, 0, 0.5), (0.0, 0));
        // just above the threshold the cell still releases water
        let levels = [1.0, 1.0 - 2.0 * EPSILON, 1.0, 1.0];
        let (share, n) = cell_share(2, &levels, 0, 0, 0.5);
        assert_eq!(n, 1);
        assert!(share > 0.0);
    }

    #[test]
    fn test_share_lost_to_rounding_stays_put() {
        // the share is about 2e-4, under half the f32 spacing near 1e4
        let levels = [1.0, 1.0 - 4.0 * EPSILON, 1.0, 1.0];
        assert_eq!(cell_share(2, &levels, 0, 0, 10_000.0), (0.0, 0));
        assert_eq!(cell_share(2, &levels, 0, 0, 1.0).1, 1);
    }

    #[test]
    fn test_emit_counts_only_changed_cells() {
        let levels = [1.0, 1.0 - 1e-6, 5.0, 1.0];
        let mut water = [0.5, 0.5, 2.0, 0.5];
        let mut shares = [0.0; 4];
        let stats = emit_rows(2, &levels, &mut water, &mut shares, 0..2);
        // only (0,1) moves; (0,0) sees a sub-epsilon drop
        assert_eq!(stats.moving_cells, 1);
        assert_eq!(water[0], 0.5);
        assert_eq!(water[2], 0.5);
        assert_eq!(shares[2], 0.5);
        assert_eq!(shares[0], 0.0);
    }

    #[test]
    fn test_absorb_clamps_tiny_results() {
        let levels = [0.0; 4];
        let shares = [0.0; 4];
        let mut water = [EPSILON / 4.0, 1.0, 0.0, -0.0];
        let stats = absorb_rows(2, &levels, &shares, &mut water, 0..2);
        assert_eq!(water, [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(stats.clamped_cells, 1);
        assert!((stats.clamped_mass - (EPSILON / 4.0) as f64).abs() < 1e-12);
    }
}

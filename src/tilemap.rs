/// A row-major 2D grid. Plain accessors require in-range coordinates; the
/// `*_wrapped` accessors fold any coordinate onto the grid (toroidal addressing).
#[derive(Clone, Debug, PartialEq)]
pub struct Tilemap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Tilemap<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }
}

impl<T: Clone> Tilemap<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap existing row-major data. Panics if the length does not match.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "tilemap data length does not match {}x{}",
            width,
            height
        );
        Self { width, height, data }
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    #[inline]
    pub fn in_bounds(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    /// Fold signed coordinates into range on both axes.
    #[inline]
    pub fn wrap(&self, x: i64, y: i64) -> (usize, usize) {
        (
            x.rem_euclid(self.width as i64) as usize,
            y.rem_euclid(self.height as i64) as usize,
        )
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = self.index(x, y);
        &mut self.data[idx]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    pub fn get_wrapped(&self, x: i64, y: i64) -> &T {
        let (x, y) = self.wrap(x, y);
        self.get(x, y)
    }

    pub fn set_wrapped(&mut self, x: i64, y: i64, value: T) {
        let (x, y) = self.wrap(x, y);
        self.set(x, y, value);
    }

    /// Fill the entire map with a value.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// In-bounds 8-connected neighbours, no wrapping. Corners yield 3, edges 5.
    pub fn neighbors_8(&self, x: usize, y: usize) -> impl Iterator<Item = (usize, usize)> {
        let (width, height) = (self.width as i64, self.height as i64);
        DIR_OFFSETS.iter().filter_map(move |&(dx, dy)| {
            let nx = x as i64 + dx as i64;
            let ny = y as i64 + dy as i64;
            (nx >= 0 && ny >= 0 && nx < width && ny < height).then_some((nx as usize, ny as usize))
        })
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.data.iter().enumerate().map(move |(idx, val)| (idx % width, idx / width, val))
    }

    /// Iterate mutably over all cells with their coordinates.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut T)> {
        let width = self.width;
        self.data.iter_mut().enumerate().map(move |(idx, val)| (idx % width, idx / width, val))
    }
}

impl Tilemap<f32> {
    /// (min, max) over all cells, `None` for an empty map.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        if self.data.is_empty() {
            return None;
        }
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for &v in &self.data {
            min = min.min(v);
            max = max.max(v);
        }
        Some((min, max))
    }
}

/// Direction offsets for 8-neighbour analysis (dx, dy).
/// Order: N, NE, E, SE, S, SW, W, NW
pub const DIR_OFFSETS: [(i32, i32); 8] = [
    (0, -1),  // N
    (1, -1),  // NE
    (1, 0),   // E
    (1, 1),   // SE
    (0, 1),   // S
    (-1, 1),  // SW
    (-1, 0),  // W
    (-1, -1), // NW
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_folds_both_axes() {
        let map = Tilemap::new_with(5, 5, 0u8);
        assert_eq!(map.wrap(-1, -1), (4, 4));
        assert_eq!(map.wrap(5, 7), (0, 2));
        assert_eq!(map.wrap(-11, 12), (4, 2));
    }

    #[test]
    fn test_wrapped_set_lands_on_folded_cell() {
        let mut map = Tilemap::new_with(4, 4, 0i32);
        map.set_wrapped(-1, 4, 9);
        assert_eq!(*map.get(3, 0), 9);
        assert_eq!(*map.get_wrapped(7, -4), 9);
    }

    #[test]
    fn test_neighbor_counts_are_clipped() {
        let map = Tilemap::new_with(5, 5, 0u8);
        assert_eq!(map.neighbors_8(0, 0).count(), 3);
        assert_eq!(map.neighbors_8(2, 0).count(), 5);
        assert_eq!(map.neighbors_8(4, 2).count(), 5);
        assert_eq!(map.neighbors_8(2, 2).count(), 8);
        assert!(map.neighbors_8(0, 4).all(|(x, y)| x <= 1 && y >= 3));
    }

    #[test]
    fn test_iter_yields_row_major_coordinates() {
        let map = Tilemap::from_vec(3, 2, vec![0, 1, 2, 3, 4, 5]);
        let cells: Vec<_> = map.iter().map(|(x, y, &v)| (x, y, v)).collect();
        assert_eq!(cells[4], (1, 1, 4));
        assert_eq!(map.index(2, 1), 5);
    }
}

//! Fractal terrain generation using midpoint displacement (diamond-square).

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::heightfield::HeightField;

/// Highest height a displaced cell may take during generation.
pub const MAX_HEIGHT: f32 = 255.0;

/// Terrain roughness preset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GenerationPreset {
    /// Rolling hills
    Gentle,
    #[default]
    Normal,
    /// Jagged peaks and deep basins
    Rugged,
}

impl GenerationPreset {
    pub fn all() -> &'static [Self] {
        &[Self::Gentle, Self::Normal, Self::Rugged]
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Gentle => "Low amplitude, fast decay",
            Self::Normal => "Balanced relief",
            Self::Rugged => "High amplitude, slow decay",
        }
    }
}

impl std::fmt::Display for GenerationPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gentle => write!(f, "gentle"),
            Self::Normal => write!(f, "normal"),
            Self::Rugged => write!(f, "rugged"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub seed: u64,
    /// Corner values are drawn from `[0, amplitude)`; also the first displacement range.
    pub amplitude: f32,
    /// Multiplier applied to the displacement range after every step. Must be in (0, 1).
    pub amplitude_decay: f32,
    /// Rescale the result linearly onto `[0, 255]`.
    pub normalize: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            seed: 42,
            amplitude: 100.0,
            amplitude_decay: 0.5,
            normalize: true,
        }
    }
}

impl GenerationParams {
    pub fn from_preset(preset: GenerationPreset, seed: u64) -> Self {
        let base = Self { seed, ..Self::default() };
        match preset {
            GenerationPreset::Gentle => Self { amplitude: 40.0, amplitude_decay: 0.4, ..base },
            GenerationPreset::Normal => base,
            GenerationPreset::Rugged => Self { amplitude: 180.0, amplitude_decay: 0.65, ..base },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.amplitude.is_finite() && self.amplitude > 0.0) {
            return Err(TerrainError::InvalidParameter {
                name: "amplitude",
                reason: format!("{} must be a positive number", self.amplitude),
            });
        }
        if !(self.amplitude_decay > 0.0 && self.amplitude_decay < 1.0) {
            return Err(TerrainError::InvalidParameter {
                name: "amplitude_decay",
                reason: format!("{} is outside (0, 1)", self.amplitude_decay),
            });
        }
        Ok(())
    }
}

/// What a generation run produced, before normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationStats {
    /// Corner seeds: top-left, top-right, bottom-left, bottom-right.
    pub corners: [f32; 4],
    pub min: f32,
    pub max: f32,
}

/// Fills a field's height grid. Reproducible for a given seed and size.
pub struct TerrainGenerator {
    params: GenerationParams,
}

impl TerrainGenerator {
    pub fn new(params: GenerationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Overwrite `field`'s heights. The field side must be `2^k + 1`.
    pub fn generate(&self, field: &mut HeightField) -> Result<GenerationStats> {
        let size = field.size();
        if size < 3 || !(size - 1).is_power_of_two() {
            return Err(TerrainError::InvalidSize { size, reason: "terrain generation needs 2^k + 1 cells per side" });
        }

        let params = &self.params;
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let last = (size - 1) as i64;

        field.heights_mut().fill(0.0);

        let corners = [
            rng.gen_range(0.0..params.amplitude),
            rng.gen_range(0.0..params.amplitude),
            rng.gen_range(0.0..params.amplitude),
            rng.gen_range(0.0..params.amplitude),
        ];
        field.set_height(0, 0, corners[0]);
        field.set_height(last, 0, corners[1]);
        field.set_height(0, last, corners[2]);
        field.set_height(last, last, corners[3]);

        let mut range = params.amplitude;
        let mut step = size - 1;
        while step >= 2 {
            diamond_pass(field, step as i64, range, &mut rng);
            square_pass(field, step as i64, range, &mut rng);
            range *= params.amplitude_decay;
            step >>= 1;
        }

        let (min, max) = field.height_map().min_max().unwrap_or((0.0, 0.0));
        if params.normalize {
            normalize(field, min, max);
        }

        log::info!(
            "Generated {}x{} terrain (seed {}), raw range {:.2}..{:.2}",
            size,
            size,
            params.seed,
            min,
            max
        );

        Ok(GenerationStats { corners, min, max })
    }
}

/// Convenience wrapper around [`TerrainGenerator`].
pub fn generate(field: &mut HeightField, params: &GenerationParams) -> Result<GenerationStats> {
    TerrainGenerator::new(params.clone())?.generate(field)
}

#[inline]
fn displace(rng: &mut ChaCha8Rng, average: f32, range: f32) -> f32 {
    (average + rng.gen_range(-range..=range)).clamp(0.0, MAX_HEIGHT)
}

/// Set every square's center from its four corners.
fn diamond_pass(field: &mut HeightField, step: i64, range: f32, rng: &mut ChaCha8Rng) {
    let last = field.size() as i64 - 1;
    let half = step / 2;
    for y in (0..last).step_by(step as usize) {
        for x in (0..last).step_by(step as usize) {
            let avg = (field.get_height(x, y)
                + field.get_height(x + step, y)
                + field.get_height(x, y + step)
                + field.get_height(x + step, y + step))
                / 4.0;
            let value = displace(rng, avg, range);
            field.set_height(x + half, y + half, value);
        }
    }
}

/// Set every edge midpoint from its two corners, this square's center and the
/// center across the edge. Shared edges are computed once.
fn square_pass(field: &mut HeightField, step: i64, range: f32, rng: &mut ChaCha8Rng) {
    let last = field.size() as i64 - 1;
    let half = step / 2;
    for y in (0..last).step_by(step as usize) {
        for x in (0..last).step_by(step as usize) {
            let center = field.get_height(x + half, y + half);
            let tl = field.get_height(x, y);
            let tr = field.get_height(x + step, y);
            let bl = field.get_height(x, y + step);
            let br = field.get_height(x + step, y + step);

            let above = field.get_height(x + half, y - half);
            let value = displace(rng, (tl + tr + center + above) / 4.0, range);
            field.set_height(x + half, y, value);

            let left = field.get_height(x - half, y + half);
            let value = displace(rng, (tl + bl + center + left) / 4.0, range);
            field.set_height(x, y + half, value);

            if y + step == last {
                let below = field.get_height(x + half, y + step + half);
                let value = displace(rng, (bl + br + center + below) / 4.0, range);
                field.set_height(x + half, y + step, value);
            }
            if x + step == last {
                let right = field.get_height(x + step + half, y + half);
                let value = displace(rng, (tr + br + center + right) / 4.0, range);
                field.set_height(x + step, y + half, value);
            }
        }
    }
}

/// Linear rescale onto `[0, 255]`. A flat field is left untouched.
fn normalize(field: &mut HeightField, min: f32, max: f32) {
    if max <= min {
        return;
    }
    let scale = MAX_HEIGHT / (max - min);
    for h in field.heights_mut().as_mut_slice() {
        *h = ((*h - min) * scale).clamp(0.0, MAX_HEIGHT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_params() -> GenerationParams {
        GenerationParams { seed: 42, amplitude: 100.0, amplitude_decay: 0.5, normalize: false }
    }

    #[test]
    fn test_same_seed_same_terrain() {
        let mut a = HeightField::new(33).unwrap();
        let mut b = HeightField::new(33).unwrap();
        generate(&mut a, &raw_params()).unwrap();
        generate(&mut b, &raw_params()).unwrap();
        assert_eq!(a.heights(), b.heights());

        let mut c = HeightField::new(33).unwrap();
        generate(&mut c, &GenerationParams { seed: 43, ..raw_params() }).unwrap();
        assert_ne!(a.heights(), c.heights());
    }

    #[test]
    fn test_corners_are_preserved_and_within_amplitude() {
        let mut field = HeightField::new(17).unwrap();
        let stats = generate(&mut field, &raw_params()).unwrap();

        assert_eq!(field.height_at(0, 0).unwrap(), stats.corners[0]);
        assert_eq!(field.height_at(16, 0).unwrap(), stats.corners[1]);
        assert_eq!(field.height_at(0, 16).unwrap(), stats.corners[2]);
        assert_eq!(field.height_at(16, 16).unwrap(), stats.corners[3]);
        assert!(stats.corners.iter().all(|&c| (0.0..100.0).contains(&c)));
    }

    #[test]
    fn test_heights_stay_within_clamp_range() {
        let mut field = HeightField::new(9).unwrap();
        generate(&mut field, &GenerationParams { amplitude: 250.0, ..raw_params() }).unwrap();
        assert!(field.heights().iter().all(|&h| (0.0..=MAX_HEIGHT).contains(&h)));
    }

    #[test]
    fn test_normalization_is_monotonic_and_spans_full_range() {
        let mut raw = HeightField::new(33).unwrap();
        generate(&mut raw, &raw_params()).unwrap();
        let mut norm = HeightField::new(33).unwrap();
        generate(&mut norm, &GenerationParams { normalize: true, ..raw_params() }).unwrap();

        let (min, max) = norm.height_map().min_max().unwrap();
        assert!(min.abs() < 1e-3);
        assert!((max - 255.0).abs() < 1e-3);

        let r = raw.heights();
        let n = norm.heights();
        for i in 0..r.len() {
            for j in (i + 1)..r.len().min(i + 40) {
                if r[i] < r[j] {
                    assert!(n[i] <= n[j]);
                }
            }
        }
    }

    #[test]
    fn test_rejects_bad_size_and_params() {
        let mut field = HeightField::new(16).unwrap();
        assert!(matches!(
            generate(&mut field, &raw_params()),
            Err(TerrainError::InvalidSize { size: 16, .. })
        ));

        let mut field = HeightField::new(5).unwrap();
        for decay in [0.0, 1.0, 1.5] {
            let params = GenerationParams { amplitude_decay: decay, ..raw_params() };
            assert!(matches!(generate(&mut field, &params), Err(TerrainError::InvalidParameter { .. })));
        }
        let params = GenerationParams { amplitude: 0.0, ..raw_params() };
        assert!(generate(&mut field, &params).is_err());
    }

    #[test]
    fn test_preset_names_parse_from_command_line() {
        use clap::ValueEnum;

        for preset in GenerationPreset::all() {
            let name = preset.to_string();
            assert_eq!(GenerationPreset::from_str(&name, false), Ok(*preset));
            assert_eq!(GenerationPreset::from_str(&name.to_uppercase(), true), Ok(*preset));
        }
        assert!(GenerationPreset::from_str("spiky", false).is_err());
    }

    #[test]
    fn test_presets_validate() {
        for preset in GenerationPreset::all() {
            assert!(GenerationParams::from_preset(*preset, 7).validate().is_ok(), "{}", preset);
        }
    }
}

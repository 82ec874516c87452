//! Run configuration loaded from JSON.
//!
//! Every section is optional in the file; missing fields take their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::flow::{FlowParams, WaterSeedParams};
use crate::heightmap::GenerationParams;
use crate::mesh::MeshParams;
use crate::water_bodies::ExtractionParams;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Grid side is `2^size_exponent + 1`
    pub size_exponent: u32,
    pub generation: GenerationParams,
    pub water: WaterSeedParams,
    pub flow: FlowParams,
    pub extraction: ExtractionParams,
    pub mesh: MeshParams,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            size_exponent: 8,
            generation: GenerationParams::default(),
            water: WaterSeedParams::default(),
            flow: FlowParams::default(),
            extraction: ExtractionParams::default(),
            mesh: MeshParams::default(),
        }
    }
}

impl SimulationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn grid_size(&self) -> usize {
        (1usize << self.size_exponent.min(15)) + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.size_exponent == 0 || self.size_exponent > 15 {
            return Err(TerrainError::InvalidParameter {
                name: "size_exponent",
                reason: format!("{} is outside 1..=15", self.size_exponent),
            });
        }
        self.generation.validate()?;
        if !(self.extraction.level_tolerance >= 0.0) {
            return Err(TerrainError::InvalidParameter {
                name: "level_tolerance",
                reason: format!("{} must be non-negative", self.extraction.level_tolerance),
            });
        }
        if !(self.mesh.tile_size > 0.0) {
            return Err(TerrainError::InvalidParameter {
                name: "tile_size",
                reason: format!("{} must be positive", self.mesh.tile_size),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowBackendKind;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, r#"{ "size_exponent": 5, "flow": { "backend": "gpu" }, "generation": { "seed": 7 } }"#)
            .unwrap();

        let config = SimulationConfig::load(&path).unwrap();
        assert_eq!(config.grid_size(), 33);
        assert_eq!(config.flow.backend, FlowBackendKind::Gpu);
        assert_eq!(config.generation.seed, 7);
        assert_eq!(config.generation.amplitude_decay, 0.5);
        assert_eq!(config.extraction.level_tolerance, 2.0);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut config = SimulationConfig::default();
        config.water.amount = 3.5;
        config.save(&path).unwrap();
        assert_eq!(SimulationConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "generation": { "amplitude_decay": 1.5 } }"#).unwrap();
        assert!(matches!(SimulationConfig::load(&path), Err(TerrainError::InvalidParameter { .. })));

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SimulationConfig::load(&path), Err(TerrainError::Config(_))));
    }
}

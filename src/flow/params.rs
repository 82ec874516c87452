//! Flow simulation parameters and backend selection

use serde::{Deserialize, Serialize};

/// Which implementation advances the water grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FlowBackendKind {
    /// Single thread, reference behaviour
    Sequential,
    /// Horizontal strips on a rayon pool
    #[default]
    Parallel,
    /// wgpu compute shaders
    Gpu,
    /// GPU when an adapter exists, otherwise parallel
    Auto,
}

impl FlowBackendKind {
    pub fn all() -> &'static [Self] {
        &[Self::Sequential, Self::Parallel, Self::Gpu, Self::Auto]
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Sequential => "Single-threaded reference",
            Self::Parallel => "Multi-threaded row strips",
            Self::Gpu => "GPU compute shader",
            Self::Auto => "GPU if available, else multi-threaded",
        }
    }
}

impl std::fmt::Display for FlowBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Gpu => write!(f, "gpu"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowParams {
    pub backend: FlowBackendKind,

    /// Worker threads for the parallel backend (0 = one per core)
    pub threads: usize,

    /// Number of row strips per tick (0 = four per worker)
    pub strips: usize,

    /// Ticks encoded per GPU submission
    pub gpu_batch: usize,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            backend: FlowBackendKind::default(),
            threads: 0,
            strips: 0,
            gpu_batch: 64,
        }
    }
}

impl FlowParams {
    pub fn with_backend(backend: FlowBackendKind) -> Self {
        Self { backend, ..Self::default() }
    }
}

/// Water seeding before a run (see `HeightField::init_water`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterSeedParams {
    /// Only cells strictly above this height receive water
    pub min_height: f32,
    pub amount: f32,
}

impl Default for WaterSeedParams {
    fn default() -> Self {
        Self { min_height: 128.0, amount: 1.0 }
    }
}

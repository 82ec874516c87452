//! Terrain heightfield generation, cellular water flow and water body extraction.

pub mod config;
pub mod error;
pub mod export;
pub mod flow;
pub mod heightfield;
pub mod heightmap;
pub mod marching_squares;
pub mod mesh;
pub mod persistence;
pub mod tilemap;
pub mod water_bodies;

pub use config::SimulationConfig;
pub use error::{Result, TerrainError};
pub use flow::{FlowBackend, FlowBackendKind, FlowParams, FlowSimulator, TickStats};
pub use heightfield::{FieldStats, HeightField, EPSILON};
pub use heightmap::{GenerationParams, TerrainGenerator};
pub use mesh::{MeshParams, TriangleList};
pub use water_bodies::{ExtractionParams, WaterBodies, WaterBody, WaterBodyExtractor};

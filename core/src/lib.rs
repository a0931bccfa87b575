//! # Ironframe Core
//!
//! CPU-side building blocks shared by the renderer:
//! - [`handle`] - Generation-checked typed handles and slot storage
//! - [`mesh`] / [`material`] - Decoded mesh and material data
//! - [`asset`] - Startup asset queue with a parallel decode step
//! - [`profiling`] - Optional Tracy instrumentation macros

pub mod asset;
pub mod error;
pub mod handle;
pub mod material;
pub mod mesh;
pub mod profiling;

pub use asset::{AssetDecoder, AssetQueue, LoaderConfig, ModelData};
pub use error::AssetError;
pub use handle::{Handle, HandleMap};
pub use material::{MaterialChannels, MaterialData, TextureData};
pub use mesh::{MaterialId, MeshData, MeshId, Model, Vertex};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

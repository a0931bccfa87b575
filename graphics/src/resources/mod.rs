//! GPU resources and their registries.
//!
//! - [`ResourceRegistry`] - generation-checked handles plus a unique name index
//! - [`Buffer`], [`Texture`] - backend objects with their descriptors
//! - [`ResourceManager`] - owns the buffer and texture registries and maps
//!   logical mesh and material IDs to the handles created by bulk upload

mod buffer;
mod manager;
mod registry;
mod texture;

pub use buffer::Buffer;
pub use manager::{MaterialEntry, MeshEntry, ResourceManager};
pub use registry::ResourceRegistry;
pub use texture::Texture;

//! # Ironframe Graphics
//!
//! Frame-graph renderer core: schedules render nodes, tracks GPU resources
//! and keeps several frames in flight.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`FrameGraph`] - passes and nodes ordered by declared dependencies
//! - [`ResourceManager`] - named buffer/texture registries and model uploads
//! - [`FrameSynchronizer`] - per-slot semaphores, fences and command buffers
//! - [`Renderer`] - the owner tying the above to one [`GpuBackend`]
//! - Multiple backend support: Vulkan and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use ironframe_graphics::{PassType, Renderer, RendererConfig};
//!
//! let mut renderer = Renderer::<World>::new(RendererConfig::default(), Some(&window))?;
//! renderer.graph_mut().add_pass("geometry", PassType::Render)?;
//! renderer.graph_mut().add_node(MeshNode::default(), "meshes", "geometry")?;
//! renderer.setup()?;
//! renderer.add_models(&models)?;
//!
//! loop {
//!     renderer.render(&world)?;
//! }
//! ```

pub mod backend;
pub mod command;
pub mod compiler;
pub mod config;
pub mod error;
pub mod graph;
pub mod renderer;
pub mod resources;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use backend::{BackendKind, DummyBackend, GpuBackend, WindowHandles, create_backend};
pub use command::CommandList;
pub use config::{PresentMode, RendererConfig};
pub use error::{GraphicsError, ResourceError};
pub use graph::{
    FrameGraph, GraphError, GraphState, NodeContext, PassType, RecordContext, RenderNode,
};
pub use renderer::Renderer;
pub use resources::{Buffer, MaterialEntry, MeshEntry, ResourceManager, ResourceRegistry, Texture};
pub use sync::{FrameInfo, FrameStatus, FrameSynchronizer};
pub use types::{
    BufferDescriptor, BufferUsage, ClearColor, Extent2d, MemoryLocation, SamplerDescriptor,
    TextureDescriptor, TextureFormat, TextureLayout, TextureUsage,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_frame_graph_creation() {
        let graph: FrameGraph = FrameGraph::new();
        assert_eq!(graph.state(), GraphState::Empty);
        assert_eq!(graph.pass_count(), 0);
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy");
    }
}

//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, layouts and descriptor
//! structs used throughout the graphics system.

mod barrier;
mod buffer;
mod common;
mod sampler;
mod texture;

pub use barrier::{LayoutTransition, PipelineStages, TextureLayout};
pub use buffer::{BufferDescriptor, BufferUsage, MemoryLocation};
pub use common::{ClearColor, Extent2d};
pub use sampler::{AddressMode, FilterMode, SamplerDescriptor};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};

//! Render node trait and the contexts passed to its stages.

use crate::backend::{GpuBackend, GpuCommandBuffer};
use crate::command::CommandList;
use crate::error::GraphicsError;
use crate::resources::ResourceManager;
use crate::types::Extent2d;

/// A unit of per-frame work in a [`FrameGraph`](super::FrameGraph).
///
/// Every stage has a no-op default, so a node implements only the stages it
/// needs. The graph drives the stages for all nodes in execution order:
///
/// 1. [`declare_resources`](Self::declare_resources) - create or look up
///    buffers and textures by name
/// 2. [`setup`](Self::setup) - one-time creation work after every node
///    declared its resources
/// 3. [`ready_resources`](Self::ready_resources) - resolve shared resources
///    declared by other nodes
/// 4. [`update_resources`](Self::update_resources) - per-frame data from the world
/// 5. [`record`](Self::record) - append commands for the current frame
/// 6. [`draw_ui`](Self::draw_ui) - immediate-mode UI
///
/// `W` is the application world handed to the per-frame stages.
pub trait RenderNode<W> {
    fn declare_resources(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        let _ = ctx;
        Ok(())
    }

    fn setup(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        let _ = ctx;
        Ok(())
    }

    fn ready_resources(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        let _ = ctx;
        Ok(())
    }

    fn update_resources(&mut self, ctx: &mut NodeContext<'_>, world: &W) -> Result<(), GraphicsError> {
        let _ = (ctx, world);
        Ok(())
    }

    fn record(&mut self, ctx: &mut RecordContext<'_>, world: &W) -> Result<(), GraphicsError> {
        let _ = (ctx, world);
        Ok(())
    }

    fn draw_ui(&mut self, ui: &egui::Context, world: &W) {
        let _ = (ui, world);
    }
}

/// Backend and resource access for the non-recording stages.
pub struct NodeContext<'a> {
    backend: &'a dyn GpuBackend,
    resources: &'a mut ResourceManager,
}

impl<'a> NodeContext<'a> {
    pub fn new(backend: &'a dyn GpuBackend, resources: &'a mut ResourceManager) -> Self {
        Self { backend, resources }
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend
    }

    pub fn resources(&self) -> &ResourceManager {
        self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        self.resources
    }

    /// Backend and resources at once, for calls that need both.
    pub fn split(&mut self) -> (&dyn GpuBackend, &mut ResourceManager) {
        (self.backend, self.resources)
    }
}

/// Everything a node needs to append commands for the current frame.
pub struct RecordContext<'a> {
    backend: &'a dyn GpuBackend,
    commands: &'a CommandList,
    resources: &'a mut ResourceManager,
    image_index: u32,
    extent: Extent2d,
    slot: usize,
}

impl<'a> RecordContext<'a> {
    pub fn new(
        backend: &'a dyn GpuBackend,
        commands: &'a CommandList,
        resources: &'a mut ResourceManager,
        image_index: u32,
        extent: Extent2d,
        slot: usize,
    ) -> Self {
        Self {
            backend,
            commands,
            resources,
            image_index,
            extent,
            slot,
        }
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend
    }

    /// The frame slot's command buffer, in recording state.
    pub fn commands(&self) -> &GpuCommandBuffer {
        self.commands.raw()
    }

    pub fn resources(&self) -> &ResourceManager {
        self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        self.resources
    }

    /// Index of the acquired presentable image.
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    pub fn surface_extent(&self) -> Extent2d {
        self.extent
    }

    /// Frame slot being recorded, in `0..frames_in_flight`.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Debug label in the command stream.
    pub fn marker(&self, label: &str) {
        self.backend.cmd_marker(self.commands.raw(), label);
    }
}

//! Top-level renderer.
//!
//! [`Renderer`] owns the backend and lends it as `&dyn GpuBackend` to the
//! resource manager, the frame graph and the frame synchronizer.
//!
//! # Example
//!
//! ```
//! use ironframe_graphics::backend::BackendKind;
//! use ironframe_graphics::graph::{PassType, RecordContext, RenderNode};
//! use ironframe_graphics::{FrameStatus, GraphicsError, Renderer, RendererConfig};
//!
//! struct Clear;
//! impl RenderNode<()> for Clear {
//!     fn record(&mut self, ctx: &mut RecordContext<'_>, _: &()) -> Result<(), GraphicsError> {
//!         ctx.marker("clear");
//!         Ok(())
//!     }
//! }
//!
//! let config = RendererConfig::default().with_backend(BackendKind::Dummy);
//! let mut renderer = Renderer::<()>::new(config, None)?;
//! renderer.graph_mut().add_pass("main", PassType::Render)?;
//! renderer.graph_mut().add_node(Clear, "clear", "main")?;
//! renderer.setup()?;
//!
//! assert!(matches!(renderer.render(&())?, FrameStatus::Presented { .. }));
//! renderer.shutdown()?;
//! # Ok::<(), GraphicsError>(())
//! ```

use ironframe_core::asset::ModelData;

use crate::backend::{GpuBackend, WindowHandles, create_backend};
use crate::config::RendererConfig;
use crate::error::GraphicsError;
use crate::graph::{FrameGraph, GraphError, NodeContext, RecordContext};
use crate::resources::ResourceManager;
use crate::sync::{FrameStatus, FrameSynchronizer};

/// Owner of the backend, resources, frame graph and frames in flight.
///
/// Usage: register passes and nodes through [`graph_mut`](Self::graph_mut),
/// call [`setup`](Self::setup), upload assets with
/// [`add_models`](Self::add_models), then call [`render`](Self::render) once
/// per frame.
pub struct Renderer<W = ()> {
    config: RendererConfig,
    resources: ResourceManager,
    graph: FrameGraph<W>,
    sync: Option<FrameSynchronizer>,
    /// Set once every node finished its setup stage.
    ready: bool,
    // Declared last so it outlives every object created from it.
    backend: Box<dyn GpuBackend>,
}

impl<W> Renderer<W> {
    /// Create the backend selected by `config.backend` and the frame slots.
    pub fn new(config: RendererConfig, window: Option<&dyn WindowHandles>) -> Result<Self, GraphicsError> {
        let backend = create_backend(config.backend, &config, window)?;
        Self::with_backend(backend, config)
    }

    /// Wrap an existing backend.
    pub fn with_backend(backend: Box<dyn GpuBackend>, config: RendererConfig) -> Result<Self, GraphicsError> {
        let sync = FrameSynchronizer::new(backend.as_ref(), &config)?;
        log::info!(
            "Renderer: '{}' on {} backend, {} frames in flight",
            config.app_name,
            backend.name(),
            sync.frames_in_flight()
        );
        Ok(Self {
            config,
            resources: ResourceManager::new(),
            graph: FrameGraph::new(),
            sync: Some(sync),
            ready: false,
            backend,
        })
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    pub fn graph(&self) -> &FrameGraph<W> {
        &self.graph
    }

    /// Frame graph for registering passes, nodes and edges.
    pub fn graph_mut(&mut self) -> &mut FrameGraph<W> {
        &mut self.graph
    }

    /// `None` after [`shutdown`](Self::shutdown).
    pub fn synchronizer(&self) -> Option<&FrameSynchronizer> {
        self.sync.as_ref()
    }

    /// Build the frame graph, let every node declare its resources, then run
    /// the one-time node setup stage.
    ///
    /// If a node stage fails the renderer refuses to render. Calling `setup`
    /// again keeps the built graph and reruns the node stages.
    pub fn setup(&mut self) -> Result<(), GraphicsError> {
        if self.ready {
            return Err(GraphError::AlreadyBuilt.into());
        }
        if !self.graph.is_built() {
            self.graph.setup()?;
        }
        let mut ctx = NodeContext::new(self.backend.as_ref(), &mut self.resources);
        self.graph.setup_node_resources(&mut ctx)?;
        self.graph.setup_nodes(&mut ctx)?;
        self.ready = true;
        log::info!("Renderer: {} nodes set up", self.graph.node_count());
        Ok(())
    }

    /// Whether [`setup`](Self::setup) completed and frames can be rendered.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Tear down the frame graph so it can be registered again.
    ///
    /// Resources created by the old nodes stay registered.
    pub fn clear_graph(&mut self) -> Result<(), GraphicsError> {
        if let Some(sync) = &self.sync {
            sync.wait_idle(self.backend.as_ref())?;
        }
        self.graph.clear();
        self.ready = false;
        Ok(())
    }

    /// Upload decoded models. Blocks until the GPU copies completed.
    pub fn add_models(&mut self, batch: &[ModelData]) -> Result<(), GraphicsError> {
        self.resources
            .upload_models(self.backend.as_ref(), batch, self.config.upload_timeout)
    }

    /// Render one frame of `world`.
    ///
    /// Inside the frame every node runs declare, ready, update and record in
    /// graph order. Returns [`FrameStatus::Skipped`] when the surface had to
    /// be rebuilt.
    ///
    /// The UI stage is not part of the frame: call [`draw_ui`](Self::draw_ui)
    /// after `render` with the application's `egui::Context`.
    pub fn render(&mut self, world: &W) -> Result<FrameStatus, GraphicsError> {
        ironframe_core::profile_function!();

        if !self.ready {
            return Err(GraphError::NotBuilt.into());
        }
        let Self {
            backend,
            resources,
            graph,
            sync,
            ..
        } = self;
        let sync = sync
            .as_mut()
            .ok_or_else(|| GraphicsError::InvalidParameter("renderer was shut down".into()))?;
        let backend = backend.as_ref();

        sync.render_frame(backend, |commands, frame| {
            let mut ctx = NodeContext::new(backend, resources);
            graph.setup_node_resources(&mut ctx)?;
            graph.ready_node_resources(&mut ctx)?;
            graph.update_node_resources(&mut ctx, world)?;

            let mut ctx = RecordContext::new(
                backend,
                commands,
                resources,
                frame.image_index,
                frame.extent,
                frame.slot,
            );
            graph.record(&mut ctx, world)
        })
    }

    /// Run every node's UI stage. Call once per frame, after
    /// [`render`](Self::render).
    pub fn draw_ui(&mut self, ui: &egui::Context, world: &W) {
        self.graph.draw_ui(ui, world);
    }

    /// Record new window dimensions; the surface follows on the next rebuild.
    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(sync) = &mut self.sync {
            sync.notify_resize(width, height);
        }
    }

    /// Wait for the GPU, then destroy frame slots, nodes and every registered
    /// resource. Called by `Drop` if not called explicitly.
    pub fn shutdown(&mut self) -> Result<(), GraphicsError> {
        let Some(sync) = self.sync.take() else {
            return Ok(());
        };
        log::info!("Renderer: shutting down");

        let backend = self.backend.as_ref();
        let idle = sync.wait_idle(backend).and_then(|()| backend.wait_idle());
        if let Err(err) = &idle {
            log::error!("Renderer: GPU did not go idle during shutdown: {err}");
        }

        sync.destroy(backend);
        self.graph.clear();
        self.ready = false;
        self.resources.destroy_all(backend);
        idle
    }
}

impl<W> Drop for Renderer<W> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("Renderer: shutdown on drop failed: {err}");
        }
    }
}

impl<W> std::fmt::Debug for Renderer<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("backend", &self.backend.name())
            .field("graph", &self.graph)
            .field("resources", &self.resources)
            .field("sync", &self.sync)
            .field("ready", &self.ready)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, DummyBackend};
    use crate::graph::PassType;

    fn dummy_renderer() -> Renderer<u32> {
        let config = RendererConfig::default().with_backend(BackendKind::Dummy);
        Renderer::new(config, None).unwrap()
    }

    #[test]
    fn render_requires_setup() {
        let mut renderer = dummy_renderer();
        assert!(matches!(
            renderer.render(&0),
            Err(GraphicsError::Graph(GraphError::NotBuilt))
        ));
    }

    #[test]
    fn empty_graph_renders() {
        let mut renderer = dummy_renderer();
        renderer.setup().unwrap();
        for _ in 0..3 {
            assert!(matches!(
                renderer.render(&1).unwrap(),
                FrameStatus::Presented { .. }
            ));
        }
        assert_eq!(renderer.synchronizer().unwrap().frame_count(), 3);
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut renderer = dummy_renderer();
        renderer.graph_mut().add_pass("main", PassType::Render).unwrap();
        renderer.setup().unwrap();
        renderer.render(&0).unwrap();

        renderer.shutdown().unwrap();
        let dummy = renderer
            .backend()
            .as_any()
            .downcast_ref::<DummyBackend>()
            .unwrap();
        assert_eq!(dummy.live_objects(), 0);
        assert!(renderer.synchronizer().is_none());
        assert!(renderer.render(&0).is_err());
        // Second call is a no-op.
        renderer.shutdown().unwrap();
    }

    #[test]
    fn clear_graph_allows_rebuild() {
        let mut renderer = dummy_renderer();
        renderer.graph_mut().add_pass("main", PassType::Render).unwrap();
        renderer.setup().unwrap();
        renderer.clear_graph().unwrap();

        renderer.graph_mut().add_pass("main", PassType::Compute).unwrap();
        renderer.setup().unwrap();
        assert_eq!(
            renderer.graph().passes().next().map(|pass| pass.pass_type()),
            Some(PassType::Compute)
        );
    }
}

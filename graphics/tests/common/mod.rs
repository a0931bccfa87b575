//! Shared fixtures for the renderer integration tests.
//!
//! Every test runs on the dummy backend; [`dummy`] recovers it from a
//! renderer so the recorded events can be inspected.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use ironframe_core::asset::ModelData;
use ironframe_core::material::{MaterialChannels, MaterialData, TextureData};
use ironframe_core::mesh::{MaterialId, MeshData, MeshId, Model, Vertex};
use ironframe_graphics::backend::{BackendEvent, DummyConfig};
use ironframe_graphics::{
    BufferDescriptor, BufferUsage, DummyBackend, GraphicsError, NodeContext, RecordContext,
    RenderNode, Renderer, RendererConfig,
};

/// Application state handed to the per-frame node stages.
#[derive(Debug, Default)]
pub struct World {
    pub frame: u32,
}

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn renderer(frames_in_flight: usize) -> Renderer<World> {
    renderer_with(frames_in_flight, DummyConfig::default())
}

pub fn renderer_with(frames_in_flight: usize, dummy: DummyConfig) -> Renderer<World> {
    init_logger();
    let config = RendererConfig::default()
        .with_frames_in_flight(frames_in_flight)
        .with_surface_extent(dummy.surface_extent.width, dummy.surface_extent.height);
    Renderer::with_backend(Box::new(DummyBackend::with_config(dummy)), config)
        .expect("dummy renderer")
}

pub fn dummy(renderer: &Renderer<World>) -> &DummyBackend {
    renderer
        .backend()
        .as_any()
        .downcast_ref::<DummyBackend>()
        .expect("renderer runs on the dummy backend")
}

/// Labels of every marker recorded since the last call.
pub fn take_markers(backend: &DummyBackend) -> Vec<String> {
    backend
        .take_events()
        .into_iter()
        .filter_map(|event| match event {
            BackendEvent::Marker { label, .. } => Some(label),
            _ => None,
        })
        .collect()
}

/// Node that logs each stage it runs as `name:stage`.
pub struct StageLogger {
    name: String,
    log: CallLog,
}

impl StageLogger {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
        }
    }

    fn push(&self, stage: &str) {
        self.log.lock().push(format!("{}:{stage}", self.name));
    }
}

impl RenderNode<World> for StageLogger {
    fn declare_resources(&mut self, _: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        self.push("declare");
        Ok(())
    }

    fn setup(&mut self, _: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        self.push("setup");
        Ok(())
    }

    fn ready_resources(&mut self, _: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        self.push("ready");
        Ok(())
    }

    fn update_resources(&mut self, _: &mut NodeContext<'_>, _: &World) -> Result<(), GraphicsError> {
        self.push("update");
        Ok(())
    }

    fn record(&mut self, ctx: &mut RecordContext<'_>, _: &World) -> Result<(), GraphicsError> {
        self.push("record");
        ctx.marker(&self.name);
        Ok(())
    }

    fn draw_ui(&mut self, _: &egui::Context, _: &World) {
        self.push("ui");
    }
}

/// Node that owns a named uniform buffer and writes the frame number into it.
pub struct CameraNode;

pub const CAMERA_BUFFER: &str = "camera";

impl RenderNode<World> for CameraNode {
    fn declare_resources(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        let (backend, resources) = ctx.split();
        resources.ensure_buffer(
            backend,
            CAMERA_BUFFER,
            BufferDescriptor::new(16, BufferUsage::UNIFORM)
                .with_location(ironframe_graphics::MemoryLocation::CpuToGpu),
        )?;
        Ok(())
    }

    fn update_resources(&mut self, ctx: &mut NodeContext<'_>, world: &World) -> Result<(), GraphicsError> {
        let handle = ctx
            .resources()
            .buffer_id(CAMERA_BUFFER)
            .ok_or_else(|| GraphicsError::InvalidParameter("camera buffer missing".into()))?;
        ctx.resources()
            .write_buffer(ctx.backend(), handle, 0, &world.frame.to_le_bytes())
    }
}

/// Node that reads the camera buffer declared by [`CameraNode`] and emits
/// one marker per uploaded mesh.
#[derive(Default)]
pub struct MeshNode {
    camera_resolved: bool,
}

impl RenderNode<World> for MeshNode {
    fn ready_resources(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphicsError> {
        self.camera_resolved = ctx.resources().buffer_id(CAMERA_BUFFER).is_some();
        Ok(())
    }

    fn record(&mut self, ctx: &mut RecordContext<'_>, _: &World) -> Result<(), GraphicsError> {
        if !self.camera_resolved {
            return Err(GraphicsError::InvalidParameter("camera not declared".into()));
        }
        let mut ids: Vec<u32> = ctx.resources().meshes().map(|(id, _)| id.0).collect();
        ids.sort_unstable();
        for id in ids {
            ctx.marker(&format!("draw mesh {id}"));
        }
        Ok(())
    }
}

pub fn triangle(id: u32) -> ModelData {
    let vertices = vec![
        Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
        Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
        Vertex::new([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
    ];
    ModelData {
        model: Model::new(MeshId(id), MaterialId(id)),
        mesh: MeshData::new(vertices, vec![0, 1, 2]),
        material: MaterialData::new().with_channel(
            MaterialChannels::ALBEDO,
            TextureData::solid_rgba(2, 2, [255, 0, 0, 255]),
        ),
    }
}

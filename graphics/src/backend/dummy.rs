//! Dummy GPU backend for testing and development.
//!
//! No GPU work happens, but the backend keeps enough state to behave like a
//! device: buffers and textures hold bytes, copies move them, textures track
//! their layout, fences are signaled according to [`FenceMode`] and a virtual
//! surface hands out image indices. Every call is appended to an event log
//! that tests inspect through [`DummyBackend::events`].
//!
//! Misuse that a Vulkan validation layer would report (recording into a
//! command buffer that is still in flight, copying into a texture in the
//! wrong layout, ...) is logged with `log::error!` and recorded as
//! [`BackendEvent::ValidationError`].

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, ClearColor, Extent2d, LayoutTransition, SamplerDescriptor,
    TextureDescriptor, TextureLayout,
};

use super::{
    AcquireResult, GpuBackend, GpuBuffer, GpuCommandBuffer, GpuFence, GpuSampler, GpuSemaphore,
    GpuTexture, PresentResult,
};

/// When submitted fences become signaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FenceMode {
    /// Signaled as part of `submit`.
    #[default]
    Immediate,
    /// Signaled when the CPU first waits on them, as if the GPU finished
    /// while the CPU was blocked.
    OnWait,
    /// Signaled only by [`DummyBackend::complete_all`] or `wait_idle`.
    Manual,
}

/// Dummy backend configuration.
#[derive(Debug, Clone)]
pub struct DummyConfig {
    pub surface_extent: Extent2d,
    pub image_count: u32,
    pub fence_mode: FenceMode,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            surface_extent: Extent2d::new(1280, 720),
            image_count: 3,
            fence_mode: FenceMode::Immediate,
        }
    }
}

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    CreateBuffer { id: u64, size: u64 },
    DestroyBuffer { id: u64 },
    WriteBuffer { id: u64, offset: u64, len: usize },
    CreateTexture { id: u64, extent: Extent2d },
    DestroyTexture { id: u64 },
    CreateSampler { id: u64 },
    DestroySampler { id: u64 },
    BeginCommands { cmd: u64 },
    EndCommands { cmd: u64 },
    CopyBuffer { cmd: u64, src: u64, dst: u64, size: u64 },
    CopyBufferToTexture { cmd: u64, src: u64, dst: u64 },
    TextureBarrier { cmd: u64, texture: u64, transition: LayoutTransition },
    SurfaceBarrier { cmd: u64, image_index: u32, transition: LayoutTransition },
    ClearSurface { cmd: u64, image_index: u32 },
    Marker { cmd: u64, label: String },
    Submit { cmd: u64, fence: Option<u64> },
    WaitFence { fence: u64, signaled: bool },
    ResetFence { fence: u64 },
    Acquire { result: AcquireResult },
    Present { image_index: u32, result: PresentResult },
    ResizeSurface { extent: Extent2d },
    WaitIdle,
    ValidationError(String),
}

struct DummyBuffer {
    data: Vec<u8>,
    host_visible: bool,
}

struct DummyTexture {
    layout: TextureLayout,
    data: Vec<u8>,
}

#[derive(Default)]
struct DummyCommandBuffer {
    recording: bool,
    /// Fence passed with the latest submission of this buffer.
    last_fence: Option<u64>,
}

struct DummyState {
    next_id: u64,
    events: Vec<BackendEvent>,
    buffers: HashMap<u64, DummyBuffer>,
    textures: HashMap<u64, DummyTexture>,
    samplers: HashSet<u64>,
    semaphores: HashSet<u64>,
    fences: HashMap<u64, bool>,
    pending_fences: Vec<u64>,
    command_buffers: HashMap<u64, DummyCommandBuffer>,
    acquire_script: VecDeque<AcquireResult>,
    present_script: VecDeque<PresentResult>,
    surface_extent: Extent2d,
    surface_layouts: Vec<TextureLayout>,
    next_image: u32,
    device_lost: bool,
    fail_next_begin: bool,
}

impl DummyState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn validation(&mut self, message: String) {
        log::error!("DummyBackend validation: {}", message);
        self.events.push(BackendEvent::ValidationError(message));
    }

    fn check_recording(&mut self, cmd: u64) -> bool {
        let recording = self.command_buffers.get(&cmd).map(|state| state.recording);
        match recording {
            Some(true) => true,
            Some(false) => {
                self.validation(format!("command buffer {cmd} is not recording"));
                false
            }
            None => {
                self.validation(format!("unknown command buffer {cmd}"));
                false
            }
        }
    }

    fn signal_pending(&mut self) {
        for fence in std::mem::take(&mut self.pending_fences) {
            if let Some(signaled) = self.fences.get_mut(&fence) {
                *signaled = true;
            }
        }
    }
}

/// Dummy GPU backend.
pub struct DummyBackend {
    config: DummyConfig,
    state: Mutex<DummyState>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::with_config(DummyConfig::default())
    }

    pub fn with_config(config: DummyConfig) -> Self {
        let image_count = config.image_count.max(1);
        let state = DummyState {
            next_id: 0,
            events: Vec::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashSet::new(),
            semaphores: HashSet::new(),
            fences: HashMap::new(),
            pending_fences: Vec::new(),
            command_buffers: HashMap::new(),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            surface_extent: config.surface_extent,
            surface_layouts: vec![TextureLayout::Undefined; image_count as usize],
            next_image: 0,
            device_lost: false,
            fail_next_begin: false,
        };
        Self {
            config: DummyConfig {
                image_count,
                ..config
            },
            state: Mutex::new(state),
        }
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().events.clone()
    }

    /// Returns and clears the recorded events.
    pub fn take_events(&self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    /// Recorded validation errors.
    pub fn validation_errors(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                BackendEvent::ValidationError(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Queue results returned by the next `acquire_next_image` calls.
    pub fn script_acquire(&self, results: impl IntoIterator<Item = AcquireResult>) {
        self.state.lock().acquire_script.extend(results);
    }

    /// Queue results returned by the next `present` calls.
    pub fn script_present(&self, results: impl IntoIterator<Item = PresentResult>) {
        self.state.lock().present_script.extend(results);
    }

    /// Signal every submitted fence.
    pub fn complete_all(&self) {
        self.state.lock().signal_pending();
    }

    /// Simulate a lost device; fence waits fail from now on.
    pub fn lose_device(&self) {
        self.state.lock().device_lost = true;
    }

    /// Make the next `begin_commands` call fail.
    pub fn fail_next_begin(&self) {
        self.state.lock().fail_next_begin = true;
    }

    /// Number of backend objects that were created and not yet destroyed.
    pub fn live_objects(&self) -> usize {
        let state = self.state.lock();
        state.buffers.len()
            + state.textures.len()
            + state.samplers.len()
            + state.semaphores.len()
            + state.fences.len()
            + state.command_buffers.len()
    }

    /// Contents of a dummy buffer.
    pub fn buffer_data(&self, buffer: &GpuBuffer) -> Option<Vec<u8>> {
        let id = buffer_id(buffer)?;
        self.state.lock().buffers.get(&id).map(|b| b.data.clone())
    }

    /// Contents of a dummy texture.
    pub fn texture_data(&self, texture: &GpuTexture) -> Option<Vec<u8>> {
        let id = texture_id(texture)?;
        self.state.lock().textures.get(&id).map(|t| t.data.clone())
    }

    /// Current layout of a dummy texture.
    pub fn texture_layout(&self, texture: &GpuTexture) -> Option<TextureLayout> {
        let id = texture_id(texture)?;
        self.state.lock().textures.get(&id).map(|t| t.layout)
    }

    pub fn fence_mode(&self) -> FenceMode {
        self.config.fence_mode
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn buffer_id(buffer: &GpuBuffer) -> Option<u64> {
    match buffer {
        GpuBuffer::Dummy { id, .. } => Some(*id),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn texture_id(texture: &GpuTexture) -> Option<u64> {
    match texture {
        GpuTexture::Dummy { id, .. } => Some(*id),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn sampler_id(sampler: &GpuSampler) -> Option<u64> {
    match sampler {
        GpuSampler::Dummy { id } => Some(*id),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn fence_id(fence: &GpuFence) -> Option<u64> {
    match fence {
        GpuFence::Dummy { id } => Some(*id),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn semaphore_id(semaphore: &GpuSemaphore) -> Option<u64> {
    match semaphore {
        GpuSemaphore::Dummy { id } => Some(*id),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn command_id(cmd: &GpuCommandBuffer) -> Option<u64> {
    match cmd {
        GpuCommandBuffer::Dummy { id } => Some(*id),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn foreign(kind: &str) -> GraphicsError {
    GraphicsError::InvalidParameter(format!("{kind} does not belong to the dummy backend"))
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size must be greater than zero".into(),
            ));
        }
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.buffers.insert(
            id,
            DummyBuffer {
                data: vec![0; descriptor.size as usize],
                host_visible: descriptor.is_host_visible(),
            },
        );
        state.events.push(BackendEvent::CreateBuffer {
            id,
            size: descriptor.size,
        });
        Ok(GpuBuffer::Dummy {
            id,
            size: descriptor.size,
        })
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        let Some(id) = buffer_id(&buffer) else {
            return;
        };
        let mut state = self.state.lock();
        if state.buffers.remove(&id).is_none() {
            state.validation(format!("double destroy of buffer {id}"));
            return;
        }
        state.events.push(BackendEvent::DestroyBuffer { id });
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        let id = buffer_id(buffer).ok_or_else(|| foreign("buffer"))?;
        let mut state = self.state.lock();
        let target = state
            .buffers
            .get_mut(&id)
            .ok_or_else(|| GraphicsError::InvalidParameter(format!("unknown buffer {id}")))?;
        if !target.host_visible {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {id} is not host visible"
            )));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > target.data.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at offset {offset} exceeds buffer {id} size {}",
                data.len(),
                target.data.len()
            )));
        }
        target.data[start..end].copy_from_slice(data);
        state.events.push(BackendEvent::WriteBuffer {
            id,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );
        if descriptor.size.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "texture extent must be non-zero".into(),
            ));
        }
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.textures.insert(
            id,
            DummyTexture {
                layout: TextureLayout::Undefined,
                data: vec![0; descriptor.byte_size() as usize],
            },
        );
        state.events.push(BackendEvent::CreateTexture {
            id,
            extent: descriptor.size,
        });
        Ok(GpuTexture::Dummy {
            id,
            extent: descriptor.size,
        })
    }

    fn destroy_texture(&self, texture: GpuTexture) {
        let Some(id) = texture_id(&texture) else {
            return;
        };
        let mut state = self.state.lock();
        if state.textures.remove(&id).is_none() {
            state.validation(format!("double destroy of texture {id}"));
            return;
        }
        state.events.push(BackendEvent::DestroyTexture { id });
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        log::trace!("DummyBackend: creating sampler {:?}", descriptor.label);
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.samplers.insert(id);
        state.events.push(BackendEvent::CreateSampler { id });
        Ok(GpuSampler::Dummy { id })
    }

    fn destroy_sampler(&self, sampler: GpuSampler) {
        let Some(id) = sampler_id(&sampler) else {
            return;
        };
        let mut state = self.state.lock();
        if state.samplers.remove(&id) {
            state.events.push(BackendEvent::DestroySampler { id });
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError> {
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.fences.insert(id, signaled);
        Ok(GpuFence::Dummy { id })
    }

    fn destroy_fence(&self, fence: GpuFence) {
        let Some(id) = fence_id(&fence) else {
            return;
        };
        let mut state = self.state.lock();
        if state.pending_fences.contains(&id) {
            state.validation(format!("fence {id} destroyed while in use"));
            state.pending_fences.retain(|pending| *pending != id);
        }
        state.fences.remove(&id);
    }

    fn wait_fence(&self, fence: &GpuFence, timeout: Duration) -> Result<bool, GraphicsError> {
        let id = fence_id(fence).ok_or_else(|| foreign("fence"))?;
        let mut state = self.state.lock();
        if state.device_lost {
            return Err(GraphicsError::DeviceLost);
        }

        let mut signaled = state.fences.get(&id).copied().unwrap_or(false);
        if !signaled
            && self.config.fence_mode == FenceMode::OnWait
            && state.pending_fences.contains(&id)
        {
            state.pending_fences.retain(|pending| *pending != id);
            state.fences.insert(id, true);
            signaled = true;
        }

        log::trace!(
            "DummyBackend: wait fence {} (timeout {:?}) -> {}",
            id,
            timeout,
            signaled
        );
        state.events.push(BackendEvent::WaitFence { fence: id, signaled });
        Ok(signaled)
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> Result<bool, GraphicsError> {
        let id = fence_id(fence).ok_or_else(|| foreign("fence"))?;
        let state = self.state.lock();
        if state.device_lost {
            return Err(GraphicsError::DeviceLost);
        }
        Ok(state.fences.get(&id).copied().unwrap_or(false))
    }

    fn reset_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let id = fence_id(fence).ok_or_else(|| foreign("fence"))?;
        let mut state = self.state.lock();
        if state.pending_fences.contains(&id) {
            state.validation(format!("fence {id} reset while its submission is pending"));
        }
        state.fences.insert(id, false);
        state.events.push(BackendEvent::ResetFence { fence: id });
        Ok(())
    }

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError> {
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.semaphores.insert(id);
        Ok(GpuSemaphore::Dummy { id })
    }

    fn destroy_semaphore(&self, semaphore: GpuSemaphore) {
        if let Some(id) = semaphore_id(&semaphore) {
            self.state.lock().semaphores.remove(&id);
        }
    }

    fn allocate_command_buffer(&self) -> Result<GpuCommandBuffer, GraphicsError> {
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.command_buffers.insert(id, DummyCommandBuffer::default());
        Ok(GpuCommandBuffer::Dummy { id })
    }

    fn free_command_buffer(&self, buffer: GpuCommandBuffer) {
        if let Some(id) = command_id(&buffer) {
            self.state.lock().command_buffers.remove(&id);
        }
    }

    fn begin_commands(&self, buffer: &GpuCommandBuffer) -> Result<(), GraphicsError> {
        let id = command_id(buffer).ok_or_else(|| foreign("command buffer"))?;
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_begin) {
            return Err(GraphicsError::Internal(format!("command buffer {id} could not begin")));
        }

        let last_fence = match state.command_buffers.get(&id) {
            Some(cmd) => cmd.last_fence,
            None => return Err(GraphicsError::InvalidParameter(format!("unknown command buffer {id}"))),
        };
        if let Some(fence) = last_fence {
            if !state.fences.get(&fence).copied().unwrap_or(true) {
                let message = format!("command buffer {id} reset while fence {fence} is pending");
                state.validation(message.clone());
                return Err(GraphicsError::Internal(message));
            }
        }

        if let Some(cmd) = state.command_buffers.get_mut(&id) {
            cmd.recording = true;
        }
        state.events.push(BackendEvent::BeginCommands { cmd: id });
        Ok(())
    }

    fn end_commands(&self, buffer: &GpuCommandBuffer) -> Result<(), GraphicsError> {
        let id = command_id(buffer).ok_or_else(|| foreign("command buffer"))?;
        let mut state = self.state.lock();
        if !state.check_recording(id) {
            return Err(GraphicsError::InvalidParameter(format!(
                "command buffer {id} is not recording"
            )));
        }
        if let Some(cmd) = state.command_buffers.get_mut(&id) {
            cmd.recording = false;
        }
        state.events.push(BackendEvent::EndCommands { cmd: id });
        Ok(())
    }

    fn cmd_copy_buffer(&self, cmd: &GpuCommandBuffer, src: &GpuBuffer, dst: &GpuBuffer, size: u64) {
        let (Some(cmd), Some(src), Some(dst)) = (command_id(cmd), buffer_id(src), buffer_id(dst))
        else {
            return;
        };
        let mut state = self.state.lock();
        if !state.check_recording(cmd) {
            return;
        }

        let size_bytes = size as usize;
        let bytes = state
            .buffers
            .get(&src)
            .filter(|b| b.data.len() >= size_bytes)
            .map(|b| b.data[..size_bytes].to_vec());
        let copied = match (bytes, state.buffers.get_mut(&dst)) {
            (Some(bytes), Some(target)) if target.data.len() >= size_bytes => {
                target.data[..size_bytes].copy_from_slice(&bytes);
                true
            }
            _ => false,
        };
        if !copied {
            state.validation(format!("invalid copy of {size} bytes from buffer {src} to {dst}"));
            return;
        }
        state.events.push(BackendEvent::CopyBuffer {
            cmd,
            src,
            dst,
            size,
        });
    }

    fn cmd_copy_buffer_to_texture(&self, cmd: &GpuCommandBuffer, src: &GpuBuffer, dst: &GpuTexture) {
        let (Some(cmd), Some(src), Some(dst)) = (command_id(cmd), buffer_id(src), texture_id(dst))
        else {
            return;
        };
        let mut state = self.state.lock();
        if !state.check_recording(cmd) {
            return;
        }

        let layout = state.textures.get(&dst).map(|t| t.layout);
        if layout != Some(TextureLayout::TransferDst) {
            state.validation(format!(
                "copy into texture {dst} in layout {layout:?}, expected TransferDst"
            ));
            return;
        }
        let bytes = state.buffers.get(&src).map(|b| b.data.clone()).unwrap_or_default();
        if let Some(texture) = state.textures.get_mut(&dst) {
            let len = texture.data.len().min(bytes.len());
            texture.data[..len].copy_from_slice(&bytes[..len]);
        }
        state
            .events
            .push(BackendEvent::CopyBufferToTexture { cmd, src, dst });
    }

    fn cmd_texture_barrier(
        &self,
        cmd: &GpuCommandBuffer,
        texture: &GpuTexture,
        transition: LayoutTransition,
    ) {
        let (Some(cmd), Some(id)) = (command_id(cmd), texture_id(texture)) else {
            return;
        };
        let mut state = self.state.lock();
        if !state.check_recording(cmd) {
            return;
        }
        let current = state.textures.get(&id).map(|t| t.layout);
        match current {
            Some(layout) if transition.old == TextureLayout::Undefined || layout == transition.old => {
                if let Some(t) = state.textures.get_mut(&id) {
                    t.layout = transition.new;
                }
            }
            other => {
                state.validation(format!(
                    "texture {id} barrier expects {:?} but texture is in {other:?}",
                    transition.old
                ));
                return;
            }
        }
        state.events.push(BackendEvent::TextureBarrier {
            cmd,
            texture: id,
            transition,
        });
    }

    fn cmd_surface_barrier(
        &self,
        cmd: &GpuCommandBuffer,
        image_index: u32,
        transition: LayoutTransition,
    ) {
        let Some(cmd) = command_id(cmd) else {
            return;
        };
        let mut state = self.state.lock();
        if !state.check_recording(cmd) {
            return;
        }
        let Some(layout) = state.surface_layouts.get(image_index as usize).copied() else {
            state.validation(format!("surface image {image_index} out of range"));
            return;
        };
        if transition.old != TextureLayout::Undefined && layout != transition.old {
            state.validation(format!(
                "surface image {image_index} barrier expects {:?} but image is in {layout:?}",
                transition.old
            ));
            return;
        }
        state.surface_layouts[image_index as usize] = transition.new;
        state.events.push(BackendEvent::SurfaceBarrier {
            cmd,
            image_index,
            transition,
        });
    }

    fn cmd_clear_surface(&self, cmd: &GpuCommandBuffer, image_index: u32, _color: ClearColor) {
        let Some(cmd) = command_id(cmd) else {
            return;
        };
        let mut state = self.state.lock();
        if !state.check_recording(cmd) {
            return;
        }
        if state.surface_layouts.get(image_index as usize) != Some(&TextureLayout::ColorAttachment) {
            state.validation(format!(
                "clear of surface image {image_index} outside ColorAttachment layout"
            ));
            return;
        }
        state.events.push(BackendEvent::ClearSurface { cmd, image_index });
    }

    fn cmd_marker(&self, cmd: &GpuCommandBuffer, label: &str) {
        let Some(cmd) = command_id(cmd) else {
            return;
        };
        let mut state = self.state.lock();
        if !state.check_recording(cmd) {
            return;
        }
        state.events.push(BackendEvent::Marker {
            cmd,
            label: label.to_string(),
        });
    }

    fn submit(
        &self,
        cmd: &GpuCommandBuffer,
        _wait: Option<&GpuSemaphore>,
        _signal: Option<&GpuSemaphore>,
        fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError> {
        let id = command_id(cmd).ok_or_else(|| foreign("command buffer"))?;
        let fence = match fence {
            Some(fence) => Some(fence_id(fence).ok_or_else(|| foreign("fence"))?),
            None => None,
        };

        let mut state = self.state.lock();
        if state.device_lost {
            return Err(GraphicsError::DeviceLost);
        }
        match state.command_buffers.get(&id) {
            Some(buffer) if !buffer.recording => {}
            _ => {
                let message = format!("submit of command buffer {id} that is not executable");
                state.validation(message.clone());
                return Err(GraphicsError::InvalidParameter(message));
            }
        }
        if let Some(fence) = fence {
            if state.fences.get(&fence).copied().unwrap_or(false) {
                state.validation(format!("submit with already signaled fence {fence}"));
            }
            if self.config.fence_mode == FenceMode::Immediate {
                state.fences.insert(fence, true);
            } else {
                state.fences.insert(fence, false);
                state.pending_fences.push(fence);
            }
        }
        if let Some(buffer) = state.command_buffers.get_mut(&id) {
            buffer.last_fence = fence;
        }
        state.events.push(BackendEvent::Submit { cmd: id, fence });
        Ok(())
    }

    fn acquire_next_image(
        &self,
        signal: &GpuSemaphore,
        timeout: Duration,
    ) -> Result<AcquireResult, GraphicsError> {
        semaphore_id(signal).ok_or_else(|| foreign("semaphore"))?;
        let mut state = self.state.lock();
        if state.device_lost {
            return Err(GraphicsError::DeviceLost);
        }
        let result = match state.acquire_script.pop_front() {
            Some(result) => result,
            None => {
                let image_index = state.next_image;
                state.next_image = (state.next_image + 1) % self.config.image_count;
                AcquireResult::Acquired {
                    image_index,
                    suboptimal: false,
                }
            }
        };
        log::trace!("DummyBackend: acquire (timeout {:?}) -> {:?}", timeout, result);
        state.events.push(BackendEvent::Acquire { result });
        Ok(result)
    }

    fn present(&self, image_index: u32, wait: &GpuSemaphore) -> Result<PresentResult, GraphicsError> {
        semaphore_id(wait).ok_or_else(|| foreign("semaphore"))?;
        let mut state = self.state.lock();
        if state.device_lost {
            return Err(GraphicsError::DeviceLost);
        }
        if state.surface_layouts.get(image_index as usize) != Some(&TextureLayout::PresentSrc) {
            state.validation(format!("present of image {image_index} outside PresentSrc layout"));
        }
        let result = state
            .present_script
            .pop_front()
            .unwrap_or(PresentResult::Presented);
        state.events.push(BackendEvent::Present {
            image_index,
            result,
        });
        Ok(result)
    }

    fn resize_surface(&self, extent: Extent2d) -> Result<(), GraphicsError> {
        log::debug!("DummyBackend: resizing surface to {}x{}", extent.width, extent.height);
        let mut state = self.state.lock();
        state.surface_extent = extent;
        state.next_image = 0;
        for layout in state.surface_layouts.iter_mut() {
            *layout = TextureLayout::Undefined;
        }
        state.events.push(BackendEvent::ResizeSurface { extent });
        Ok(())
    }

    fn surface_extent(&self) -> Extent2d {
        self.state.lock().surface_extent
    }

    fn surface_image_count(&self) -> u32 {
        self.config.image_count
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        if state.device_lost {
            return Err(GraphicsError::DeviceLost);
        }
        state.signal_pending();
        state.events.push(BackendEvent::WaitIdle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    const TIMEOUT: Duration = Duration::from_millis(10);

    #[test]
    fn test_dummy_backend_creation() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
        assert_eq!(backend.surface_image_count(), 3);
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn write_requires_host_visible() {
        let backend = DummyBackend::new();
        let device_local = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();
        assert!(backend.write_buffer(&device_local, 0, &[1, 2, 3]).is_err());

        let staging = backend.create_buffer(&BufferDescriptor::staging(4)).unwrap();
        backend.write_buffer(&staging, 0, &[1, 2, 3, 4]).unwrap();
        assert!(backend.write_buffer(&staging, 2, &[0; 4]).is_err());
        assert_eq!(backend.buffer_data(&staging).unwrap(), vec![1, 2, 3, 4]);

        backend.destroy_buffer(device_local);
        backend.destroy_buffer(staging);
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn copy_moves_bytes() {
        let backend = DummyBackend::new();
        let src = backend.create_buffer(&BufferDescriptor::staging(4)).unwrap();
        let dst = backend
            .create_buffer(&BufferDescriptor::new(4, BufferUsage::COPY_DST))
            .unwrap();
        backend.write_buffer(&src, 0, &[9, 8, 7, 6]).unwrap();

        let cmd = backend.allocate_command_buffer().unwrap();
        backend.begin_commands(&cmd).unwrap();
        backend.cmd_copy_buffer(&cmd, &src, &dst, 4);
        backend.end_commands(&cmd).unwrap();
        backend.submit(&cmd, None, None, None).unwrap();

        assert_eq!(backend.buffer_data(&dst).unwrap(), vec![9, 8, 7, 6]);
        assert!(backend.validation_errors().is_empty());
    }

    #[test]
    fn texture_copy_requires_transfer_layout() {
        let backend = DummyBackend::new();
        let staging = backend.create_buffer(&BufferDescriptor::staging(4)).unwrap();
        let texture = backend
            .create_texture(&TextureDescriptor::new_2d(
                1,
                1,
                TextureFormat::Rgba8Unorm,
                TextureUsage::COPY_DST | TextureUsage::SAMPLED,
            ))
            .unwrap();
        let cmd = backend.allocate_command_buffer().unwrap();
        backend.begin_commands(&cmd).unwrap();
        backend.cmd_copy_buffer_to_texture(&cmd, &staging, &texture);
        assert_eq!(backend.validation_errors().len(), 1);

        backend.cmd_texture_barrier(
            &cmd,
            &texture,
            LayoutTransition::new(TextureLayout::Undefined, TextureLayout::TransferDst),
        );
        backend.cmd_copy_buffer_to_texture(&cmd, &staging, &texture);
        assert_eq!(backend.validation_errors().len(), 1);
        assert_eq!(backend.texture_layout(&texture), Some(TextureLayout::TransferDst));
    }

    #[test]
    fn manual_fence_blocks_command_reuse() {
        let backend = DummyBackend::with_config(DummyConfig {
            fence_mode: FenceMode::Manual,
            ..Default::default()
        });
        let fence = backend.create_fence(false).unwrap();
        let cmd = backend.allocate_command_buffer().unwrap();
        backend.begin_commands(&cmd).unwrap();
        backend.end_commands(&cmd).unwrap();
        backend.submit(&cmd, None, None, Some(&fence)).unwrap();

        assert!(!backend.wait_fence(&fence, TIMEOUT).unwrap());
        assert!(backend.begin_commands(&cmd).is_err());

        backend.complete_all();
        assert!(backend.wait_fence(&fence, TIMEOUT).unwrap());
        assert!(backend.begin_commands(&cmd).is_ok());
    }

    #[test]
    fn on_wait_fence_signals_when_waited() {
        let backend = DummyBackend::with_config(DummyConfig {
            fence_mode: FenceMode::OnWait,
            ..Default::default()
        });
        let fence = backend.create_fence(false).unwrap();
        let cmd = backend.allocate_command_buffer().unwrap();
        backend.begin_commands(&cmd).unwrap();
        backend.end_commands(&cmd).unwrap();
        backend.submit(&cmd, None, None, Some(&fence)).unwrap();

        assert!(!backend.is_fence_signaled(&fence).unwrap());
        assert!(backend.wait_fence(&fence, TIMEOUT).unwrap());
        assert!(backend.is_fence_signaled(&fence).unwrap());
    }

    #[test]
    fn lost_device_fails_waits() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(true).unwrap();
        backend.lose_device();
        assert_eq!(
            backend.wait_fence(&fence, TIMEOUT),
            Err(GraphicsError::DeviceLost)
        );
    }

    #[test]
    fn acquire_cycles_images_and_follows_script() {
        let backend = DummyBackend::new();
        let semaphore = backend.create_semaphore().unwrap();
        backend.script_acquire([AcquireResult::OutOfDate]);

        assert_eq!(
            backend.acquire_next_image(&semaphore, TIMEOUT).unwrap(),
            AcquireResult::OutOfDate
        );
        let indices: Vec<_> = (0..4)
            .map(|_| match backend.acquire_next_image(&semaphore, TIMEOUT).unwrap() {
                AcquireResult::Acquired { image_index, .. } => image_index,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
    }
}

//! GPU backend abstraction layer.
//!
//! Everything above this module talks to the device through [`GpuBackend`].
//! The [`Renderer`](crate::Renderer) owns the single backend instance and
//! lends `&dyn GpuBackend` to the registry, the frame graph and the frame
//! synchronizer for the duration of each call.
//!
//! # Available Backends
//!
//! - `dummy` (default): No GPU. Records every call for inspection in tests
//! - `vulkan-backend` (default): Native Vulkan backend using ash
//!
//! # Resource ownership
//!
//! Backend objects ([`GpuBuffer`], [`GpuTexture`], ...) are plain values. They
//! are released by handing them back to the matching `destroy_*` method; the
//! resource registry does this on `remove` and on shutdown.

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub mod dummy;

use std::any::Any;
use std::time::Duration;

#[cfg(feature = "vulkan-backend")]
use ash::vk;
#[cfg(feature = "vulkan-backend")]
use gpu_allocator::vulkan::Allocation;

use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, ClearColor, Extent2d, LayoutTransition, SamplerDescriptor,
    TextureDescriptor,
};

pub use dummy::{BackendEvent, DummyBackend, DummyConfig, FenceMode};

/// Backend buffer object.
#[allow(clippy::large_enum_variant)]
pub enum GpuBuffer {
    Dummy {
        id: u64,
        size: u64,
    },
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        buffer: vk::Buffer,
        allocation: Allocation,
        size: u64,
    },
}

impl GpuBuffer {
    /// Size in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Dummy { size, .. } => *size,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { size, .. } => *size,
        }
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id, size } => f
                .debug_struct("GpuBuffer::Dummy")
                .field("id", id)
                .field("size", size)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { buffer, size, .. } => f
                .debug_struct("GpuBuffer::Vulkan")
                .field("buffer", buffer)
                .field("size", size)
                .finish_non_exhaustive(),
        }
    }
}

/// Backend image together with its default view.
#[allow(clippy::large_enum_variant)]
pub enum GpuTexture {
    Dummy {
        id: u64,
        extent: Extent2d,
    },
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        image: vk::Image,
        view: vk::ImageView,
        allocation: Allocation,
        format: vk::Format,
        extent: vk::Extent2D,
    },
}

impl GpuTexture {
    pub fn extent(&self) -> Extent2d {
        match self {
            Self::Dummy { extent, .. } => *extent,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { extent, .. } => Extent2d::new(extent.width, extent.height),
        }
    }
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id, extent } => f
                .debug_struct("GpuTexture::Dummy")
                .field("id", id)
                .field("extent", extent)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan {
                image,
                view,
                format,
                extent,
                ..
            } => f
                .debug_struct("GpuTexture::Vulkan")
                .field("image", image)
                .field("view", view)
                .field("format", format)
                .field("extent", extent)
                .finish_non_exhaustive(),
        }
    }
}

/// Backend sampler object.
#[derive(Debug)]
pub enum GpuSampler {
    Dummy { id: u64 },
    #[cfg(feature = "vulkan-backend")]
    Vulkan { sampler: vk::Sampler },
}

/// CPU-GPU completion guard.
#[derive(Debug)]
pub enum GpuFence {
    Dummy { id: u64 },
    #[cfg(feature = "vulkan-backend")]
    Vulkan { fence: vk::Fence },
}

/// GPU-GPU ordering signal.
#[derive(Debug)]
pub enum GpuSemaphore {
    Dummy { id: u64 },
    #[cfg(feature = "vulkan-backend")]
    Vulkan { semaphore: vk::Semaphore },
}

/// Primary command buffer allocated from the backend's pool.
///
/// The Vulkan variant exposes the raw handle so that frame graph nodes can
/// record draw and dispatch commands directly.
#[derive(Debug)]
pub enum GpuCommandBuffer {
    Dummy { id: u64 },
    #[cfg(feature = "vulkan-backend")]
    Vulkan { buffer: vk::CommandBuffer },
}

/// Outcome of acquiring the next presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image was acquired; the semaphore will be signaled.
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface no longer matches the window and must be rebuilt.
    OutOfDate,
    /// No image became available within the timeout.
    Timeout,
}

/// Outcome of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// GPU backend trait for abstracting different GPU APIs.
///
/// `cmd_*` methods append to a command buffer between
/// [`begin_commands`](Self::begin_commands) and
/// [`end_commands`](Self::end_commands).
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Downcast support for nodes that need backend-specific access.
    fn as_any(&self) -> &dyn Any;

    // -- Resources --

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    fn destroy_buffer(&self, buffer: GpuBuffer);

    /// Write `data` into a host-visible buffer at `offset`.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> Result<(), GraphicsError>;

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError>;

    fn destroy_texture(&self, texture: GpuTexture);

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError>;

    fn destroy_sampler(&self, sampler: GpuSampler);

    // -- Synchronization --

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError>;

    fn destroy_fence(&self, fence: GpuFence);

    /// Wait up to `timeout` for the fence.
    ///
    /// Returns `Ok(true)` once signaled, `Ok(false)` on timeout and
    /// [`GraphicsError::DeviceLost`] if the device stopped responding.
    fn wait_fence(&self, fence: &GpuFence, timeout: Duration) -> Result<bool, GraphicsError>;

    /// Non-blocking fence query.
    fn is_fence_signaled(&self, fence: &GpuFence) -> Result<bool, GraphicsError>;

    fn reset_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError>;

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError>;

    fn destroy_semaphore(&self, semaphore: GpuSemaphore);

    // -- Commands --

    fn allocate_command_buffer(&self) -> Result<GpuCommandBuffer, GraphicsError>;

    fn free_command_buffer(&self, buffer: GpuCommandBuffer);

    /// Reset the command buffer and start recording.
    fn begin_commands(&self, buffer: &GpuCommandBuffer) -> Result<(), GraphicsError>;

    fn end_commands(&self, buffer: &GpuCommandBuffer) -> Result<(), GraphicsError>;

    fn cmd_copy_buffer(&self, cmd: &GpuCommandBuffer, src: &GpuBuffer, dst: &GpuBuffer, size: u64);

    /// Copy tightly packed pixels from `src` into the whole of `dst`.
    ///
    /// `dst` must be in [`TransferDst`](crate::types::TextureLayout::TransferDst).
    fn cmd_copy_buffer_to_texture(&self, cmd: &GpuCommandBuffer, src: &GpuBuffer, dst: &GpuTexture);

    fn cmd_texture_barrier(
        &self,
        cmd: &GpuCommandBuffer,
        texture: &GpuTexture,
        transition: LayoutTransition,
    );

    /// Layout transition on a presentable image.
    fn cmd_surface_barrier(
        &self,
        cmd: &GpuCommandBuffer,
        image_index: u32,
        transition: LayoutTransition,
    );

    /// Clear a presentable image in `ColorAttachment` layout.
    fn cmd_clear_surface(&self, cmd: &GpuCommandBuffer, image_index: u32, color: ClearColor);

    /// Debug label visible in capture tools.
    fn cmd_marker(&self, cmd: &GpuCommandBuffer, label: &str);

    /// Submit one command buffer to the graphics queue.
    ///
    /// `wait` is waited on at the color-attachment-output stage.
    fn submit(
        &self,
        cmd: &GpuCommandBuffer,
        wait: Option<&GpuSemaphore>,
        signal: Option<&GpuSemaphore>,
        fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError>;

    // -- Presentation --

    /// Acquire the next presentable image, signaling `signal` when it is ready.
    fn acquire_next_image(
        &self,
        signal: &GpuSemaphore,
        timeout: Duration,
    ) -> Result<AcquireResult, GraphicsError>;

    fn present(&self, image_index: u32, wait: &GpuSemaphore) -> Result<PresentResult, GraphicsError>;

    /// Rebuild the presentation surface at `extent`.
    fn resize_surface(&self, extent: Extent2d) -> Result<(), GraphicsError>;

    fn surface_extent(&self) -> Extent2d;

    /// Number of presentable images.
    fn surface_image_count(&self) -> u32;

    /// Block until all submitted work completed.
    fn wait_idle(&self) -> Result<(), GraphicsError>;
}

/// Which backend [`create_backend`] should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Vulkan when available, otherwise the dummy backend.
    #[default]
    Auto,
    Dummy,
    #[cfg(feature = "vulkan-backend")]
    Vulkan,
}

/// Creates a backend of the requested kind.
///
/// `window` is required for Vulkan; the dummy backend ignores it.
pub fn create_backend(
    kind: BackendKind,
    config: &crate::config::RendererConfig,
    window: Option<&dyn WindowHandles>,
) -> Result<Box<dyn GpuBackend>, GraphicsError> {
    match kind {
        BackendKind::Dummy => Ok(Box::new(DummyBackend::with_config(dummy_config(config)))),
        #[cfg(feature = "vulkan-backend")]
        BackendKind::Vulkan => {
            let window = window.ok_or_else(|| {
                GraphicsError::InvalidParameter("Vulkan backend requires a window".into())
            })?;
            Ok(Box::new(vulkan::VulkanBackend::new(config, window)?))
        }
        BackendKind::Auto => {
            #[cfg(feature = "vulkan-backend")]
            {
                if let Some(window) = window {
                    match vulkan::VulkanBackend::new(config, window) {
                        Ok(backend) => {
                            log::info!("Using Vulkan backend (ash)");
                            return Ok(Box::new(backend));
                        }
                        Err(e) => {
                            log::warn!("Failed to create Vulkan backend: {}", e);
                        }
                    }
                }
            }
            #[cfg(not(feature = "vulkan-backend"))]
            let _ = window;

            log::info!("Using dummy backend");
            Ok(Box::new(DummyBackend::with_config(dummy_config(config))))
        }
    }
}

fn dummy_config(config: &crate::config::RendererConfig) -> DummyConfig {
    DummyConfig {
        surface_extent: config.surface_extent,
        ..DummyConfig::default()
    }
}

/// Raw window and display handles for surface creation.
pub trait WindowHandles {
    fn window_handle(&self) -> Result<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError>;
    fn display_handle(
        &self,
    ) -> Result<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError>;
}

impl<T> WindowHandles for T
where
    T: raw_window_handle::HasWindowHandle + raw_window_handle::HasDisplayHandle,
{
    fn window_handle(&self) -> Result<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError> {
        raw_window_handle::HasWindowHandle::window_handle(self)
    }

    fn display_handle(
        &self,
    ) -> Result<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError> {
        raw_window_handle::HasDisplayHandle::display_handle(self)
    }
}

static_assertions::assert_impl_all!(GpuBuffer: Send, Sync);
static_assertions::assert_impl_all!(GpuTexture: Send, Sync);

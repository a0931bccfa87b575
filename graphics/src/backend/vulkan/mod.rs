//! Native Vulkan backend implementation using ash.
//!
//! One device, one graphics queue that also presents, one swapchain. Memory
//! comes from gpu-allocator; the surface is cleared with dynamic rendering so
//! no render pass objects exist. Validation output and command labels use
//! `VK_EXT_debug_utils` when [`RendererConfig::validation`] is set and the
//! layer is installed.
//!
//! The command pool is shared by every command buffer, so allocation, reset
//! and recording are serialized through one lock.

mod allocator;
mod command;
pub(crate) mod conversion;
mod debug;
mod device;
mod instance;
mod swapchain;

use std::any::Any;
use std::mem::ManuallyDrop;
use std::time::Duration;

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use parking_lot::Mutex;

use crate::config::{PresentMode, RendererConfig};
use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, ClearColor, Extent2d, LayoutTransition, SamplerDescriptor,
    TextureDescriptor,
};

use super::{
    AcquireResult, GpuBackend, GpuBuffer, GpuCommandBuffer, GpuFence, GpuSampler, GpuSemaphore,
    GpuTexture, PresentResult, WindowHandles,
};

use self::conversion::{
    aspect_mask, convert_address_mode, convert_buffer_usage, convert_filter_mode,
    convert_memory_location, convert_mipmap_filter_mode, convert_result, convert_texture_format,
    convert_texture_usage,
};
use self::swapchain::{SurfaceContext, VulkanSwapchain};

/// Vulkan-based GPU backend using ash.
pub struct VulkanBackend {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    /// Command labels; `None` without validation.
    debug_labels: Option<ash::ext::debug_utils::Device>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    queue_family: u32,
    /// Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    command_pool: Mutex<vk::CommandPool>,
    dynamic_rendering: ash::khr::dynamic_rendering::Device,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    swapchain: Mutex<VulkanSwapchain>,
    present_mode: PresentMode,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("queue_family", &self.queue_family)
            .field("validation", &self.debug_labels.is_some())
            .field("present_mode", &self.present_mode)
            .finish_non_exhaustive()
    }
}

impl VulkanBackend {
    /// Create the instance, device and swapchain for `window`.
    pub fn new(config: &RendererConfig, window: &dyn WindowHandles) -> Result<Self, GraphicsError> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan: {}", e))
        })?;

        let display = window
            .display_handle()
            .map_err(|e| GraphicsError::InitializationFailed(format!("No display handle: {}", e)))?
            .as_raw();

        let parts =
            instance::create_instance(&entry, &config.app_name, config.validation, display)?;
        let instance = parts.instance;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        // Everything below is torn down by `Drop` once `Self` exists. Until
        // then failures unwind by hand.
        let destroy_instance = |surface: Option<vk::SurfaceKHR>| unsafe {
            if let Some(surface) = surface {
                surface_loader.destroy_surface(surface, None);
            }
            if let (Some(utils), Some(messenger)) = (&parts.debug_utils, parts.debug_messenger) {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            instance.destroy_instance(None);
        };

        let surface = match instance::create_surface(&entry, &instance, window) {
            Ok(surface) => surface,
            Err(e) => {
                destroy_instance(None);
                return Err(e);
            }
        };

        let (physical_device, queue_family) =
            match device::select_physical_device(&instance, &surface_loader, surface) {
                Ok(selected) => selected,
                Err(e) => {
                    destroy_instance(Some(surface));
                    return Err(e);
                }
            };

        let device = match device::create_logical_device(&instance, physical_device, queue_family)
        {
            Ok(device) => device,
            Err(e) => {
                destroy_instance(Some(surface));
                return Err(e);
            }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
        let setup = (|| -> Result<(Allocator, vk::CommandPool, VulkanSwapchain), GraphicsError> {
            let allocator = allocator::create_allocator(&instance, physical_device, device.clone())?;
            let command_pool = device::create_command_pool(&device, queue_family)?;
            let ctx = SurfaceContext {
                physical_device,
                device: &device,
                surface_loader: &surface_loader,
                swapchain_loader: &swapchain_loader,
                surface,
            };
            match VulkanSwapchain::new(
                &ctx,
                config.surface_extent,
                config.present_mode,
                vk::SwapchainKHR::null(),
            ) {
                Ok(swapchain) => Ok((allocator, command_pool, swapchain)),
                Err(e) => {
                    unsafe { device.destroy_command_pool(command_pool, None) };
                    Err(e)
                }
            }
        })();

        let (allocator, command_pool, swapchain) = match setup {
            Ok(created) => created,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                destroy_instance(Some(surface));
                return Err(e);
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let dynamic_rendering = ash::khr::dynamic_rendering::Device::new(&instance, &device);
        let debug_labels = parts
            .debug_utils
            .as_ref()
            .map(|_| ash::ext::debug_utils::Device::new(&instance, &device));

        log::info!(
            "Vulkan backend initialized (validation: {})",
            debug_labels.is_some()
        );

        Ok(Self {
            entry,
            instance,
            debug_utils: parts.debug_utils,
            debug_messenger: parts.debug_messenger,
            debug_labels,
            physical_device,
            device,
            queue,
            queue_family,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            command_pool: Mutex::new(command_pool),
            dynamic_rendering,
            surface_loader,
            swapchain_loader,
            surface,
            swapchain: Mutex::new(swapchain),
            present_mode: config.present_mode,
        })
    }

    /// Get the Vulkan device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Queue used for graphics, transfers and presentation.
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Format of the presentable images.
    pub fn surface_format(&self) -> vk::Format {
        self.swapchain.lock().format
    }

    fn surface_context(&self) -> SurfaceContext<'_> {
        SurfaceContext {
            physical_device: self.physical_device,
            device: &self.device,
            surface_loader: &self.surface_loader,
            swapchain_loader: &self.swapchain_loader,
            surface: self.surface,
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            self.swapchain
                .get_mut()
                .destroy(&self.device, &self.swapchain_loader);
            self.device
                .destroy_command_pool(*self.command_pool.get_mut(), None);

            // Outstanding allocations are reported as leaks by gpu-allocator.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

fn timeout_ns(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

fn foreign(what: &str) -> GraphicsError {
    GraphicsError::InvalidParameter(format!("{what} was not created by the Vulkan backend"))
}

fn vk_cmd(cmd: &GpuCommandBuffer) -> Option<vk::CommandBuffer> {
    match cmd {
        GpuCommandBuffer::Vulkan { buffer } => Some(*buffer),
        GpuCommandBuffer::Dummy { .. } => {
            log::error!("Vulkan: dummy command buffer passed to the Vulkan backend");
            None
        }
    }
}

fn vk_fence(fence: &GpuFence) -> Result<vk::Fence, GraphicsError> {
    match fence {
        GpuFence::Vulkan { fence } => Ok(*fence),
        GpuFence::Dummy { .. } => Err(foreign("fence")),
    }
}

fn vk_semaphore(semaphore: &GpuSemaphore) -> Result<vk::Semaphore, GraphicsError> {
    match semaphore {
        GpuSemaphore::Vulkan { semaphore } => Ok(*semaphore),
        GpuSemaphore::Dummy { .. } => Err(foreign("semaphore")),
    }
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size must be non-zero".into(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create buffer: {:?}", e))
        })?;

        let allocation = allocator::allocate_buffer(
            &self.allocator,
            &self.device,
            buffer,
            descriptor.label.as_deref().unwrap_or("buffer"),
            convert_memory_location(descriptor.location),
        )
        .inspect_err(|_| unsafe { self.device.destroy_buffer(buffer, None) })?;

        Ok(GpuBuffer::Vulkan {
            buffer,
            allocation,
            size: descriptor.size,
        })
    }

    fn destroy_buffer(&self, buffer: GpuBuffer) {
        match buffer {
            GpuBuffer::Vulkan {
                buffer, allocation, ..
            } => {
                allocator::free(&self.allocator, allocation);
                unsafe { self.device.destroy_buffer(buffer, None) };
            }
            GpuBuffer::Dummy { .. } => log::error!("Vulkan: cannot destroy a dummy buffer"),
        }
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        let GpuBuffer::Vulkan {
            allocation, size, ..
        } = buffer
        else {
            return Err(foreign("buffer"));
        };

        let end = offset.checked_add(data.len() as u64);
        if end.is_none_or(|end| end > *size) {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                size
            )));
        }

        let mapped = allocation.mapped_ptr().ok_or_else(|| {
            GraphicsError::InvalidParameter("buffer is not host visible".into())
        })?;

        // SAFETY: the range was checked against the buffer size and the
        // allocation stays mapped for its whole lifetime.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                mapped.as_ptr().cast::<u8>().add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        if descriptor.size.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "texture extent must be non-zero".into(),
            ));
        }

        let format = convert_texture_format(descriptor.format);
        let extent = vk::Extent2D {
            width: descriptor.size.width,
            height: descriptor.size.height,
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(descriptor.usage, descriptor.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create image: {:?}", e))
        })?;

        let allocation = allocator::allocate_image(
            &self.allocator,
            &self.device,
            image,
            descriptor.label.as_deref().unwrap_or("texture"),
        )
        .inspect_err(|_| unsafe { self.device.destroy_image(image, None) })?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(command::full_range(aspect_mask(descriptor.format)));

        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                allocator::free(&self.allocator, allocation);
                unsafe { self.device.destroy_image(image, None) };
                return Err(GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create image view: {:?}",
                    e
                )));
            }
        };

        Ok(GpuTexture::Vulkan {
            image,
            view,
            allocation,
            format,
            extent,
        })
    }

    fn destroy_texture(&self, texture: GpuTexture) {
        match texture {
            GpuTexture::Vulkan {
                image,
                view,
                allocation,
                ..
            } => {
                unsafe { self.device.destroy_image_view(view, None) };
                allocator::free(&self.allocator, allocation);
                unsafe { self.device.destroy_image(image, None) };
            }
            GpuTexture::Dummy { .. } => log::error!("Vulkan: cannot destroy a dummy texture"),
        }
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        let address_mode = convert_address_mode(descriptor.address_mode);
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter_mode(descriptor.mag_filter))
            .min_filter(convert_filter_mode(descriptor.min_filter))
            .mipmap_mode(convert_mipmap_filter_mode(descriptor.min_filter))
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false);

        if descriptor.anisotropy_clamp > 1 {
            log::debug!(
                "Vulkan: anisotropy {} requested for sampler {:?}, feature not enabled",
                descriptor.anisotropy_clamp,
                descriptor.label
            );
        }

        let sampler = unsafe { self.device.create_sampler(&sampler_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create sampler: {:?}", e))
        })?;

        Ok(GpuSampler::Vulkan { sampler })
    }

    fn destroy_sampler(&self, sampler: GpuSampler) {
        match sampler {
            GpuSampler::Vulkan { sampler } => unsafe { self.device.destroy_sampler(sampler, None) },
            GpuSampler::Dummy { .. } => log::error!("Vulkan: cannot destroy a dummy sampler"),
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { self.device.create_fence(&fence_info, None) }
            .map_err(|e| convert_result("create fence", e))?;
        Ok(GpuFence::Vulkan { fence })
    }

    fn destroy_fence(&self, fence: GpuFence) {
        match fence {
            GpuFence::Vulkan { fence } => unsafe { self.device.destroy_fence(fence, None) },
            GpuFence::Dummy { .. } => log::error!("Vulkan: cannot destroy a dummy fence"),
        }
    }

    fn wait_fence(&self, fence: &GpuFence, timeout: Duration) -> Result<bool, GraphicsError> {
        let fence = vk_fence(fence)?;
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns(timeout)) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(convert_result("wait for fence", e)),
        }
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> Result<bool, GraphicsError> {
        let fence = vk_fence(fence)?;
        unsafe { self.device.get_fence_status(fence) }
            .map_err(|e| convert_result("query fence", e))
    }

    fn reset_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let fence = vk_fence(fence)?;
        unsafe { self.device.reset_fences(&[fence]) }.map_err(|e| convert_result("reset fence", e))
    }

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError> {
        let semaphore = unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
        .map_err(|e| convert_result("create semaphore", e))?;
        Ok(GpuSemaphore::Vulkan { semaphore })
    }

    fn destroy_semaphore(&self, semaphore: GpuSemaphore) {
        match semaphore {
            GpuSemaphore::Vulkan { semaphore } => unsafe {
                self.device.destroy_semaphore(semaphore, None)
            },
            GpuSemaphore::Dummy { .. } => log::error!("Vulkan: cannot destroy a dummy semaphore"),
        }
    }

    fn allocate_command_buffer(&self) -> Result<GpuCommandBuffer, GraphicsError> {
        let pool = self.command_pool.lock();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| convert_result("allocate command buffer", e))?;
        let buffer = buffers.into_iter().next().ok_or_else(|| {
            GraphicsError::Internal("driver returned no command buffer".into())
        })?;
        Ok(GpuCommandBuffer::Vulkan { buffer })
    }

    fn free_command_buffer(&self, buffer: GpuCommandBuffer) {
        if let Some(buffer) = vk_cmd(&buffer) {
            let pool = self.command_pool.lock();
            unsafe { self.device.free_command_buffers(*pool, &[buffer]) };
        }
    }

    fn begin_commands(&self, buffer: &GpuCommandBuffer) -> Result<(), GraphicsError> {
        let buffer = vk_cmd(buffer).ok_or_else(|| foreign("command buffer"))?;
        let _pool = self.command_pool.lock();
        unsafe {
            self.device
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| convert_result("reset command buffer", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(buffer, &begin_info)
                .map_err(|e| convert_result("begin command buffer", e))
        }
    }

    fn end_commands(&self, buffer: &GpuCommandBuffer) -> Result<(), GraphicsError> {
        let buffer = vk_cmd(buffer).ok_or_else(|| foreign("command buffer"))?;
        let _pool = self.command_pool.lock();
        unsafe { self.device.end_command_buffer(buffer) }
            .map_err(|e| convert_result("end command buffer", e))
    }

    fn cmd_copy_buffer(&self, cmd: &GpuCommandBuffer, src: &GpuBuffer, dst: &GpuBuffer, size: u64) {
        let (Some(cmd), GpuBuffer::Vulkan { buffer: src, .. }, GpuBuffer::Vulkan { buffer: dst, .. }) =
            (vk_cmd(cmd), src, dst)
        else {
            log::error!("Vulkan: copy between foreign buffers ignored");
            return;
        };

        let region = vk::BufferCopy::default().size(size);
        unsafe { self.device.cmd_copy_buffer(cmd, *src, *dst, &[region]) };
    }

    fn cmd_copy_buffer_to_texture(&self, cmd: &GpuCommandBuffer, src: &GpuBuffer, dst: &GpuTexture) {
        let (
            Some(cmd),
            GpuBuffer::Vulkan { buffer, .. },
            GpuTexture::Vulkan {
                image,
                format,
                extent,
                ..
            },
        ) = (vk_cmd(cmd), src, dst)
        else {
            log::error!("Vulkan: copy into a foreign texture ignored");
            return;
        };

        let aspect = if *format == vk::Format::D32_SFLOAT {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                cmd,
                *buffer,
                *image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn cmd_texture_barrier(
        &self,
        cmd: &GpuCommandBuffer,
        texture: &GpuTexture,
        transition: LayoutTransition,
    ) {
        let (Some(cmd), GpuTexture::Vulkan { image, format, .. }) = (vk_cmd(cmd), texture) else {
            log::error!("Vulkan: barrier on a foreign texture ignored");
            return;
        };
        let aspect = if *format == vk::Format::D32_SFLOAT {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        command::image_barrier(&self.device, cmd, *image, aspect, transition);
    }

    fn cmd_surface_barrier(
        &self,
        cmd: &GpuCommandBuffer,
        image_index: u32,
        transition: LayoutTransition,
    ) {
        let Some(cmd) = vk_cmd(cmd) else {
            return;
        };
        let swapchain = self.swapchain.lock();
        let Some(&image) = swapchain.images.get(image_index as usize) else {
            log::error!("Vulkan: surface image {} does not exist", image_index);
            return;
        };
        command::image_barrier(
            &self.device,
            cmd,
            image,
            vk::ImageAspectFlags::COLOR,
            transition,
        );
    }

    fn cmd_clear_surface(&self, cmd: &GpuCommandBuffer, image_index: u32, color: ClearColor) {
        let Some(cmd) = vk_cmd(cmd) else {
            return;
        };
        let swapchain = self.swapchain.lock();
        let Some(&view) = swapchain.image_views.get(image_index as usize) else {
            log::error!("Vulkan: surface image {} does not exist", image_index);
            return;
        };
        command::clear_color_attachment(&self.dynamic_rendering, cmd, view, swapchain.extent, color);
    }

    fn cmd_marker(&self, cmd: &GpuCommandBuffer, label: &str) {
        if let Some(cmd) = vk_cmd(cmd) {
            debug::insert_label(self.debug_labels.as_ref(), cmd, label);
        }
    }

    fn submit(
        &self,
        cmd: &GpuCommandBuffer,
        wait: Option<&GpuSemaphore>,
        signal: Option<&GpuSemaphore>,
        fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError> {
        let command_buffers = [vk_cmd(cmd).ok_or_else(|| foreign("command buffer"))?];
        let wait_semaphores: Vec<vk::Semaphore> = wait.map(vk_semaphore).transpose()?.into_iter().collect();
        let signal_semaphores: Vec<vk::Semaphore> =
            signal.map(vk_semaphore).transpose()?.into_iter().collect();
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let fence = fence.map(vk_fence).transpose()?.unwrap_or(vk::Fence::null());

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages[..wait_semaphores.len()])
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let _pool = self.command_pool.lock();
        unsafe { self.device.queue_submit(self.queue, &[submit_info], fence) }
            .map_err(|e| convert_result("queue submit", e))
    }

    fn acquire_next_image(
        &self,
        signal: &GpuSemaphore,
        timeout: Duration,
    ) -> Result<AcquireResult, GraphicsError> {
        let semaphore = vk_semaphore(signal)?;
        let swapchain = self.swapchain.lock();

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain.swapchain,
                timeout_ns(timeout),
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireResult::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(AcquireResult::Timeout),
            Err(e) => Err(convert_result("acquire swapchain image", e)),
        }
    }

    fn present(&self, image_index: u32, wait: &GpuSemaphore) -> Result<PresentResult, GraphicsError> {
        let wait_semaphores = [vk_semaphore(wait)?];
        let swapchain = self.swapchain.lock();
        let swapchains = [swapchain.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let _pool = self.command_pool.lock();
        match unsafe { self.swapchain_loader.queue_present(self.queue, &present_info) } {
            Ok(false) => Ok(PresentResult::Presented),
            Ok(true) => Ok(PresentResult::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
            Err(e) => Err(convert_result("present", e)),
        }
    }

    fn resize_surface(&self, extent: Extent2d) -> Result<(), GraphicsError> {
        self.wait_idle()?;

        let mut swapchain = self.swapchain.lock();
        let ctx = self.surface_context();
        let replacement = VulkanSwapchain::new(&ctx, extent, self.present_mode, swapchain.swapchain)?;
        let mut old = std::mem::replace(&mut *swapchain, replacement);
        old.destroy(&self.device, &self.swapchain_loader);
        Ok(())
    }

    fn surface_extent(&self) -> Extent2d {
        self.swapchain.lock().extent()
    }

    fn surface_image_count(&self) -> u32 {
        self.swapchain.lock().images.len() as u32
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        let _pool = self.command_pool.lock();
        unsafe { self.device.device_wait_idle() }.map_err(|e| convert_result("wait idle", e))
    }
}

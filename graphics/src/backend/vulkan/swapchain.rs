//! Vulkan swapchain creation and teardown.

use ash::vk;

use crate::config::PresentMode;
use crate::error::GraphicsError;
use crate::types::Extent2d;

use super::command::full_range;
use super::conversion::convert_present_mode;

/// Everything needed to (re)create a swapchain for one surface.
pub struct SurfaceContext<'a> {
    pub physical_device: vk::PhysicalDevice,
    pub device: &'a ash::Device,
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub swapchain_loader: &'a ash::khr::swapchain::Device,
    pub surface: vk::SurfaceKHR,
}

/// Swapchain with one view per image.
pub struct VulkanSwapchain {
    pub(crate) swapchain: vk::SwapchainKHR,
    pub(crate) images: Vec<vk::Image>,
    pub(crate) image_views: Vec<vk::ImageView>,
    pub(crate) format: vk::Format,
    pub(crate) extent: vk::Extent2D,
}

impl VulkanSwapchain {
    /// Create a swapchain, retiring `old` if given.
    pub fn new(
        ctx: &SurfaceContext<'_>,
        requested: Extent2d,
        present_mode: PresentMode,
        old: vk::SwapchainKHR,
    ) -> Result<Self, GraphicsError> {
        let capabilities = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, ctx.surface)
        }
        .map_err(|e| surface_query_error("capabilities", e))?;

        let formats = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, ctx.surface)
        }
        .map_err(|e| surface_query_error("formats", e))?;

        let surface_format = formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| formats.first())
            .copied()
            .ok_or_else(|| {
                GraphicsError::ResourceCreationFailed("Surface reports no formats".into())
            })?;

        let present_modes = unsafe {
            ctx.surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, ctx.surface)
        }
        .map_err(|e| surface_query_error("present modes", e))?;
        let wanted = convert_present_mode(present_mode);
        let present_mode = if present_modes.contains(&wanted) {
            wanted
        } else {
            vk::PresentModeKHR::FIFO
        };

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: requested.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: requested.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };

        let max_images = if capabilities.max_image_count > 0 {
            capabilities.max_image_count
        } else {
            u32::MAX
        };
        let image_count = (capabilities.min_image_count + 1).min(max_images);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(ctx.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);

        let swapchain = unsafe { ctx.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("Failed to create swapchain: {:?}", e))
            })?;

        let mut this = Self {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
        };

        if let Err(e) = this.create_views(ctx) {
            this.destroy(ctx.device, ctx.swapchain_loader);
            return Err(e);
        }

        log::info!(
            "Created Vulkan swapchain: {}x{} with {} images ({:?})",
            extent.width,
            extent.height,
            this.images.len(),
            present_mode
        );
        Ok(this)
    }

    fn create_views(&mut self, ctx: &SurfaceContext<'_>) -> Result<(), GraphicsError> {
        self.images = unsafe { ctx.swapchain_loader.get_swapchain_images(self.swapchain) }
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to get swapchain images: {:?}",
                    e
                ))
            })?;

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(full_range(vk::ImageAspectFlags::COLOR));

            let view = unsafe { ctx.device.create_image_view(&view_info, None) }.map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create swapchain image view: {:?}",
                    e
                ))
            })?;
            self.image_views.push(view);
        }
        Ok(())
    }

    pub fn extent(&self) -> Extent2d {
        Extent2d::new(self.extent.width, self.extent.height)
    }

    /// Destroy the views and the swapchain. The device must be idle.
    pub fn destroy(&mut self, device: &ash::Device, loader: &ash::khr::swapchain::Device) {
        if self.swapchain == vk::SwapchainKHR::null() {
            return;
        }
        unsafe {
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            loader.destroy_swapchain(self.swapchain, None);
        }
        self.images.clear();
        self.swapchain = vk::SwapchainKHR::null();
    }
}

fn surface_query_error(what: &str, e: vk::Result) -> GraphicsError {
    GraphicsError::ResourceCreationFailed(format!("Failed to query surface {}: {:?}", what, e))
}

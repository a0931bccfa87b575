//! Command recording helpers shared by resource and surface commands.

use ash::vk;

use crate::types::{ClearColor, LayoutTransition};

use super::conversion::{convert_layout, convert_pipeline_stages};

/// Record an image layout transition covering the whole image.
pub fn image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    transition: LayoutTransition,
) {
    let (old_layout, src_access) = convert_layout(transition.old);
    let (new_layout, dst_access) = convert_layout(transition.new);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(full_range(aspect_mask))
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            convert_pipeline_stages(transition.src_stages),
            convert_pipeline_stages(transition.dst_stages),
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Clear `view` through an empty dynamic rendering scope.
///
/// The image must be in `COLOR_ATTACHMENT_OPTIMAL`.
pub fn clear_color_attachment(
    dynamic_rendering: &ash::khr::dynamic_rendering::Device,
    cmd: vk::CommandBuffer,
    view: vk::ImageView,
    extent: vk::Extent2D,
    color: ClearColor,
) {
    let clear_value = vk::ClearValue {
        color: vk::ClearColorValue { float32: color.0 },
    };
    let attachments = [vk::RenderingAttachmentInfo::default()
        .image_view(view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(clear_value)];

    let rendering_info = vk::RenderingInfo::default()
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .layer_count(1)
        .color_attachments(&attachments);

    unsafe {
        dynamic_rendering.cmd_begin_rendering(cmd, &rendering_info);
        dynamic_rendering.cmd_end_rendering(cmd);
    }
}

/// Single mip level, single layer.
pub fn full_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

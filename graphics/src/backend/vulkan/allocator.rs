//! GPU memory allocator integration using gpu-allocator.

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;

use crate::error::GraphicsError;

/// Create a memory allocator for the Vulkan device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<Allocator, GraphicsError> {
    Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
    })
}

/// Allocate and bind memory for `buffer`.
pub fn allocate_buffer(
    allocator: &Mutex<Allocator>,
    device: &ash::Device,
    buffer: vk::Buffer,
    name: &str,
    location: gpu_allocator::MemoryLocation,
) -> Result<Allocation, GraphicsError> {
    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let allocation = allocate(allocator, name, requirements, location, true)?;

    if let Err(e) = unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) } {
        free(allocator, allocation);
        return Err(GraphicsError::ResourceCreationFailed(format!(
            "Failed to bind buffer memory: {:?}",
            e
        )));
    }
    Ok(allocation)
}

/// Allocate and bind device-local memory for `image`.
pub fn allocate_image(
    allocator: &Mutex<Allocator>,
    device: &ash::Device,
    image: vk::Image,
    name: &str,
) -> Result<Allocation, GraphicsError> {
    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let allocation = allocate(
        allocator,
        name,
        requirements,
        gpu_allocator::MemoryLocation::GpuOnly,
        false,
    )?;

    if let Err(e) = unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) } {
        free(allocator, allocation);
        return Err(GraphicsError::ResourceCreationFailed(format!(
            "Failed to bind image memory: {:?}",
            e
        )));
    }
    Ok(allocation)
}

pub fn free(allocator: &Mutex<Allocator>, allocation: Allocation) {
    if let Err(e) = allocator.lock().free(allocation) {
        log::error!("Failed to free GPU allocation: {}", e);
    }
}

fn allocate(
    allocator: &Mutex<Allocator>,
    name: &str,
    requirements: vk::MemoryRequirements,
    location: gpu_allocator::MemoryLocation,
    linear: bool,
) -> Result<Allocation, GraphicsError> {
    allocator
        .lock()
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| match e {
            gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
            other => GraphicsError::ResourceCreationFailed(format!(
                "Failed to allocate memory for '{}': {}",
                name, other
            )),
        })
}

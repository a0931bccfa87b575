//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        /// Source of a transfer (staging buffers).
        const COPY_SRC = 1 << 4;
        /// Destination of a transfer.
        const COPY_DST = 1 << 5;
    }
}

/// Where a buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    /// Device-local, not CPU visible.
    #[default]
    GpuOnly,
    /// Host-visible and coherent, written by the CPU.
    CpuToGpu,
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    pub usage: BufferUsage,
    pub location: MemoryLocation,
}

impl BufferDescriptor {
    /// Create a device-local buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            location: MemoryLocation::GpuOnly,
        }
    }

    /// Host-visible scratch buffer used as the source of a staging copy.
    pub fn staging(size: u64) -> Self {
        Self::new(size, BufferUsage::COPY_SRC).with_location(MemoryLocation::CpuToGpu)
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_location(mut self, location: MemoryLocation) -> Self {
        self.location = location;
        self
    }

    /// Returns `true` if the CPU can write this buffer directly.
    pub fn is_host_visible(&self) -> bool {
        self.location == MemoryLocation::CpuToGpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_is_host_visible_copy_source() {
        let desc = BufferDescriptor::staging(256);
        assert!(desc.is_host_visible());
        assert_eq!(desc.usage, BufferUsage::COPY_SRC);
        assert_eq!(desc.size, 256);
    }

    #[test]
    fn default_location_is_device_local() {
        let desc = BufferDescriptor::new(64, BufferUsage::VERTEX | BufferUsage::COPY_DST)
            .with_label("vertices");
        assert!(!desc.is_host_visible());
        assert_eq!(desc.label.as_deref(), Some("vertices"));
    }
}

//! Registered GPU buffer.

use crate::backend::GpuBuffer;
use crate::types::BufferDescriptor;

/// A backend buffer together with the descriptor it was created from.
///
/// Buffers are owned by the [`ResourceManager`](super::ResourceManager) and
/// released through it; dropping one without going through the manager leaks
/// the backend object.
pub struct Buffer {
    gpu: GpuBuffer,
    descriptor: BufferDescriptor,
}

impl Buffer {
    pub(crate) fn new(gpu: GpuBuffer, descriptor: BufferDescriptor) -> Self {
        Self { gpu, descriptor }
    }

    /// Backend object, for `GpuBackend::cmd_*` calls.
    pub fn gpu(&self) -> &GpuBuffer {
        &self.gpu
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    pub(crate) fn into_gpu(self) -> GpuBuffer {
        self.gpu
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("location", &self.descriptor.location)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);

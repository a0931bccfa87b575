//! Registered GPU texture.

use crate::backend::{GpuSampler, GpuTexture};
use crate::types::{Extent2d, TextureDescriptor, TextureFormat, TextureLayout};

/// A sampled backend image with its sampler.
pub struct Texture {
    gpu: GpuTexture,
    sampler: GpuSampler,
    descriptor: TextureDescriptor,
    layout: TextureLayout,
}

impl Texture {
    pub(crate) fn new(gpu: GpuTexture, sampler: GpuSampler, descriptor: TextureDescriptor) -> Self {
        Self {
            gpu,
            sampler,
            descriptor,
            layout: TextureLayout::Undefined,
        }
    }

    pub fn gpu(&self) -> &GpuTexture {
        &self.gpu
    }

    pub fn sampler(&self) -> &GpuSampler {
        &self.sampler
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn size(&self) -> Extent2d {
        self.descriptor.size
    }

    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Layout after the last recorded transition.
    pub fn layout(&self) -> TextureLayout {
        self.layout
    }

    pub(crate) fn set_layout(&mut self, layout: TextureLayout) {
        self.layout = layout;
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    pub(crate) fn into_parts(self) -> (GpuTexture, GpuSampler) {
        (self.gpu, self.sampler)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("layout", &self.layout)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);

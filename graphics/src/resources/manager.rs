//! Buffer and texture ownership plus the mesh/material registry.
//!
//! [`ResourceManager::upload_models`] turns a batch of decoded models into
//! device-local buffers and sampled textures. Every resource goes through a
//! host-visible staging buffer copied on one command list; textures are
//! transitioned `Undefined -> TransferDst -> ShaderReadOnly` around their
//! copy. The batch is either registered completely or not at all.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};

use ironframe_core::asset::ModelData;
use ironframe_core::handle::Handle;
use ironframe_core::material::{MaterialChannels, TextureData};
use ironframe_core::mesh::{MaterialId, MeshId, Model};

use super::{Buffer, ResourceRegistry, Texture};
use crate::backend::{GpuBackend, GpuBuffer, GpuCommandBuffer};
use crate::command::CommandList;
use crate::error::{GraphicsError, ResourceError};
use crate::types::{
    BufferDescriptor, BufferUsage, LayoutTransition, SamplerDescriptor, TextureDescriptor,
    TextureFormat, TextureLayout, TextureUsage,
};

const SAMPLER_ANISOTROPY: u16 = 8;

/// GPU buffers backing one uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshEntry {
    pub vertex_buffer: Handle<Buffer>,
    pub index_buffer: Handle<Buffer>,
    pub vertex_count: u32,
    pub index_count: u32,
}

/// Textures backing one uploaded material, one per present channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterialEntry {
    pub albedo: Option<Handle<Texture>>,
    pub normal: Option<Handle<Texture>>,
    pub metallic_roughness: Option<Handle<Texture>>,
    pub emissive: Option<Handle<Texture>>,
}

impl MaterialEntry {
    /// Channels with a texture.
    pub fn channels(&self) -> MaterialChannels {
        let mut channels = MaterialChannels::empty();
        for channel in MaterialChannels::all().iter() {
            if self.texture(channel).is_some() {
                channels |= channel;
            }
        }
        channels
    }

    /// Texture for a single channel flag.
    pub fn texture(&self, channel: MaterialChannels) -> Option<Handle<Texture>> {
        self.slot(channel).copied().flatten()
    }

    fn set(&mut self, channel: MaterialChannels, handle: Handle<Texture>) {
        if let Some(slot) = self.slot_mut(channel) {
            *slot = Some(handle);
        }
    }

    fn slot(&self, channel: MaterialChannels) -> Option<&Option<Handle<Texture>>> {
        if channel == MaterialChannels::ALBEDO {
            Some(&self.albedo)
        } else if channel == MaterialChannels::NORMAL {
            Some(&self.normal)
        } else if channel == MaterialChannels::METALLIC_ROUGHNESS {
            Some(&self.metallic_roughness)
        } else if channel == MaterialChannels::EMISSIVE {
            Some(&self.emissive)
        } else {
            None
        }
    }

    fn slot_mut(&mut self, channel: MaterialChannels) -> Option<&mut Option<Handle<Texture>>> {
        if channel == MaterialChannels::ALBEDO {
            Some(&mut self.albedo)
        } else if channel == MaterialChannels::NORMAL {
            Some(&mut self.normal)
        } else if channel == MaterialChannels::METALLIC_ROUGHNESS {
            Some(&mut self.metallic_roughness)
        } else if channel == MaterialChannels::EMISSIVE {
            Some(&mut self.emissive)
        } else {
            None
        }
    }
}

/// Owns every registered buffer and texture.
///
/// Backend objects are released explicitly through
/// [`remove_buffer`](Self::remove_buffer), [`remove_texture`](Self::remove_texture)
/// or [`destroy_all`](Self::destroy_all).
pub struct ResourceManager {
    buffers: ResourceRegistry<Buffer>,
    textures: ResourceRegistry<Texture>,
    meshes: HashMap<MeshId, MeshEntry>,
    materials: HashMap<MaterialId, MaterialEntry>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            buffers: ResourceRegistry::new("buffer"),
            textures: ResourceRegistry::new("texture"),
            meshes: HashMap::new(),
            materials: HashMap::new(),
        }
    }

    // -- Buffers --

    /// Create a buffer and register it under `name`.
    pub fn create_buffer(
        &mut self,
        backend: &dyn GpuBackend,
        descriptor: BufferDescriptor,
        name: Option<&str>,
    ) -> Result<Handle<Buffer>, GraphicsError> {
        self.buffers.check_name(name)?;
        let gpu = backend.create_buffer(&descriptor)?;
        let handle = self.buffers.add(Buffer::new(gpu, descriptor), name)?;
        log::trace!("ResourceManager: created buffer {handle} ({name:?})");
        Ok(handle)
    }

    /// Return the buffer named `name`, creating it from `descriptor` if absent.
    pub fn ensure_buffer(
        &mut self,
        backend: &dyn GpuBackend,
        name: &str,
        descriptor: BufferDescriptor,
    ) -> Result<Handle<Buffer>, GraphicsError> {
        match self.buffers.get_id(name) {
            Some(handle) => Ok(handle),
            None => self.create_buffer(backend, descriptor, Some(name)),
        }
    }

    /// Write into a host-visible buffer.
    pub fn write_buffer(
        &self,
        backend: &dyn GpuBackend,
        handle: Handle<Buffer>,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let buffer = self.buffers.get(handle).ok_or_else(|| ResourceError::NotFound {
            kind: "buffer",
            id: handle.to_string(),
        })?;
        backend.write_buffer(buffer.gpu(), offset, data)
    }

    /// Unregister a buffer and destroy its backend object.
    pub fn remove_buffer(
        &mut self,
        backend: &dyn GpuBackend,
        handle: Handle<Buffer>,
    ) -> Result<(), ResourceError> {
        let buffer = self.buffers.remove(handle)?;
        backend.destroy_buffer(buffer.into_gpu());
        Ok(())
    }

    pub fn buffer(&self, handle: Handle<Buffer>) -> Option<&Buffer> {
        self.buffers.get(handle)
    }

    pub fn buffer_by_name(&self, name: &str) -> Option<&Buffer> {
        self.buffers.get_by_name(name)
    }

    pub fn buffer_id(&self, name: &str) -> Option<Handle<Buffer>> {
        self.buffers.get_id(name)
    }

    pub fn buffers(&self) -> &ResourceRegistry<Buffer> {
        &self.buffers
    }

    // -- Textures --

    /// Create a texture with its sampler and register it under `name`.
    pub fn create_texture(
        &mut self,
        backend: &dyn GpuBackend,
        descriptor: TextureDescriptor,
        sampler: &SamplerDescriptor,
        name: Option<&str>,
    ) -> Result<Handle<Texture>, GraphicsError> {
        self.textures.check_name(name)?;
        let texture = create_texture_object(backend, descriptor, sampler)?;
        let handle = self.textures.add(texture, name)?;
        log::trace!("ResourceManager: created texture {handle} ({name:?})");
        Ok(handle)
    }

    /// Return the texture named `name`, creating it if absent.
    pub fn ensure_texture(
        &mut self,
        backend: &dyn GpuBackend,
        name: &str,
        descriptor: TextureDescriptor,
        sampler: &SamplerDescriptor,
    ) -> Result<Handle<Texture>, GraphicsError> {
        match self.textures.get_id(name) {
            Some(handle) => Ok(handle),
            None => self.create_texture(backend, descriptor, sampler, Some(name)),
        }
    }

    pub fn remove_texture(
        &mut self,
        backend: &dyn GpuBackend,
        handle: Handle<Texture>,
    ) -> Result<(), ResourceError> {
        let texture = self.textures.remove(handle)?;
        release_texture(backend, texture);
        Ok(())
    }

    pub fn texture(&self, handle: Handle<Texture>) -> Option<&Texture> {
        self.textures.get(handle)
    }

    /// Mutable access, for nodes recording their own layout transitions.
    pub fn texture_mut(&mut self, handle: Handle<Texture>) -> Option<&mut Texture> {
        self.textures.get_mut(handle)
    }

    pub fn texture_by_name(&self, name: &str) -> Option<&Texture> {
        self.textures.get_by_name(name)
    }

    pub fn texture_id(&self, name: &str) -> Option<Handle<Texture>> {
        self.textures.get_id(name)
    }

    pub fn textures(&self) -> &ResourceRegistry<Texture> {
        &self.textures
    }

    // -- Meshes and materials --

    pub fn mesh(&self, id: MeshId) -> Option<&MeshEntry> {
        self.meshes.get(&id)
    }

    pub fn material(&self, id: MaterialId) -> Option<&MaterialEntry> {
        self.materials.get(&id)
    }

    /// Mesh and material entries for `model`, if both were uploaded.
    pub fn model(&self, model: Model) -> Option<(&MeshEntry, &MaterialEntry)> {
        Some((self.mesh(model.mesh)?, self.material(model.material)?))
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &MeshEntry)> {
        self.meshes.iter().map(|(id, entry)| (*id, entry))
    }

    /// Upload a batch of decoded models and register their GPU resources.
    ///
    /// Blocks until the device finished the copies. On any error nothing from
    /// the batch is registered and every object it created is released.
    pub fn upload_models(
        &mut self,
        backend: &dyn GpuBackend,
        batch: &[ModelData],
        timeout: Duration,
    ) -> Result<(), GraphicsError> {
        ironframe_core::profile_function!();

        if batch.is_empty() {
            return Ok(());
        }
        self.validate_batch(batch)?;

        let start = Instant::now();
        let mut pending = PendingUpload::default();
        let mut list = CommandList::new(backend, "upload_models")?;

        let result = record_batch(backend, &mut list, batch, &mut pending)
            .and_then(|()| list.flush(backend, timeout))
            .and_then(|()| backend.wait_idle());

        if result.is_err() {
            // Staging memory may still be read by in-flight copies.
            if let Err(err) = backend.wait_idle() {
                log::warn!("ResourceManager: wait_idle after failed upload: {err}");
            }
        }
        list.destroy(backend);
        for staging in pending.staging.drain(..) {
            backend.destroy_buffer(staging);
        }
        if let Err(err) = result {
            log::error!("ResourceManager: upload of {} models failed: {err}", batch.len());
            pending.release(backend);
            return Err(err);
        }

        let buffer_count = pending.buffers.len();
        let texture_count = pending.textures.len();
        self.register(pending)?;

        log::info!(
            "ResourceManager: uploaded {} models ({} buffers, {} textures) in {:.2?}",
            batch.len(),
            buffer_count,
            texture_count,
            start.elapsed()
        );
        Ok(())
    }

    /// Destroy every registered object and forget all meshes and materials.
    pub fn destroy_all(&mut self, backend: &dyn GpuBackend) {
        let buffers = self.buffers.drain();
        let textures = self.textures.drain();
        log::debug!(
            "ResourceManager: destroying {} buffers and {} textures",
            buffers.len(),
            textures.len()
        );
        for buffer in buffers {
            backend.destroy_buffer(buffer.into_gpu());
        }
        for texture in textures {
            release_texture(backend, texture);
        }
        self.meshes.clear();
        self.materials.clear();
    }

    fn validate_batch(&self, batch: &[ModelData]) -> Result<(), GraphicsError> {
        let mut mesh_ids = Vec::with_capacity(batch.len());
        let mut material_ids = Vec::with_capacity(batch.len());

        for data in batch {
            let Model { mesh, material } = data.model;
            if self.meshes.contains_key(&mesh) || mesh_ids.contains(&mesh) {
                return Err(ResourceError::AlreadyExists {
                    kind: "mesh",
                    name: mesh.to_string(),
                }
                .into());
            }
            if self.materials.contains_key(&material) || material_ids.contains(&material) {
                return Err(ResourceError::AlreadyExists {
                    kind: "material",
                    name: material.to_string(),
                }
                .into());
            }
            mesh_ids.push(mesh);
            material_ids.push(material);

            if data.mesh.vertices.is_empty() || data.mesh.indices.is_empty() {
                return Err(GraphicsError::InvalidParameter(format!("{mesh} is empty")));
            }
            if let Some(index) = data.mesh.find_out_of_range_index() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "{mesh} index {index} out of range for {} vertices",
                    data.mesh.vertex_count()
                )));
            }
            for (channel, image) in data.material.present_channels() {
                if !image.is_consistent() || !(1..=4).contains(&image.channels) {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "{material} {} image is {}x{}x{} with {} bytes",
                        channel.label(),
                        image.width,
                        image.height,
                        image.channels,
                        image.data.len()
                    )));
                }
            }
        }
        Ok(())
    }

    fn register(&mut self, pending: PendingUpload) -> Result<(), GraphicsError> {
        let PendingUpload {
            buffers,
            textures,
            models,
            ..
        } = pending;

        let buffer_handles = buffers
            .into_iter()
            .map(|buffer| self.buffers.add(buffer, None))
            .collect::<Result<Vec<_>, _>>()?;
        let texture_handles = textures
            .into_iter()
            .map(|texture| self.textures.add(texture, None))
            .collect::<Result<Vec<_>, _>>()?;

        for model in models {
            self.meshes.insert(
                model.model.mesh,
                MeshEntry {
                    vertex_buffer: buffer_handles[model.vertex],
                    index_buffer: buffer_handles[model.index],
                    vertex_count: model.vertex_count,
                    index_count: model.index_count,
                },
            );
            let mut material = MaterialEntry::default();
            for (channel, slot) in model.textures {
                material.set(channel, texture_handles[slot]);
            }
            match self.materials.entry(model.model.material) {
                Entry::Vacant(entry) => {
                    entry.insert(material);
                }
                Entry::Occupied(_) => {
                    return Err(GraphicsError::Internal(format!(
                        "{} registered twice",
                        model.model.material
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        if !self.buffers.is_empty() || !self.textures.is_empty() {
            log::warn!(
                "ResourceManager dropped with {} buffers and {} textures still registered",
                self.buffers.len(),
                self.textures.len()
            );
        }
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("buffers", &self.buffers.len())
            .field("textures", &self.textures.len())
            .field("meshes", &self.meshes.len())
            .field("materials", &self.materials.len())
            .finish()
    }
}

/// Objects created for a batch that is not registered yet.
#[derive(Default)]
struct PendingUpload {
    staging: Vec<GpuBuffer>,
    buffers: Vec<Buffer>,
    textures: Vec<Texture>,
    models: Vec<PendingModel>,
}

impl PendingUpload {
    fn release(self, backend: &dyn GpuBackend) {
        for staging in self.staging {
            backend.destroy_buffer(staging);
        }
        for buffer in self.buffers {
            backend.destroy_buffer(buffer.into_gpu());
        }
        for texture in self.textures {
            release_texture(backend, texture);
        }
    }
}

/// Indices into [`PendingUpload`] for one model.
struct PendingModel {
    model: Model,
    vertex: usize,
    index: usize,
    vertex_count: u32,
    index_count: u32,
    textures: Vec<(MaterialChannels, usize)>,
}

fn record_batch(
    backend: &dyn GpuBackend,
    list: &mut CommandList,
    batch: &[ModelData],
    pending: &mut PendingUpload,
) -> Result<(), GraphicsError> {
    list.begin(backend)?;
    let cmd = list.raw();

    for data in batch {
        let mesh = data.model.mesh;
        list.marker(backend, &format!("upload {mesh}"));

        let vertex = stage_buffer(
            backend,
            cmd,
            pending,
            data.mesh.vertex_bytes(),
            BufferUsage::VERTEX,
            format!("{mesh} vertices"),
        )?;
        let index = stage_buffer(
            backend,
            cmd,
            pending,
            data.mesh.index_bytes(),
            BufferUsage::INDEX,
            format!("{mesh} indices"),
        )?;

        let mut textures = Vec::new();
        for (channel, image) in data.material.present_channels() {
            let label = format!("{} {}", data.model.material, channel.label());
            textures.push((channel, stage_texture(backend, cmd, pending, channel, image, label)?));
        }

        pending.models.push(PendingModel {
            model: data.model,
            vertex,
            index,
            vertex_count: data.mesh.vertex_count() as u32,
            index_count: data.mesh.index_count() as u32,
            textures,
        });
    }
    Ok(())
}

/// Create a staging buffer holding `bytes`, returning its index in `pending.staging`.
fn create_staging(
    backend: &dyn GpuBackend,
    pending: &mut PendingUpload,
    bytes: &[u8],
    label: &str,
) -> Result<usize, GraphicsError> {
    let descriptor =
        BufferDescriptor::staging(bytes.len() as u64).with_label(format!("{label} staging"));
    let staging = backend.create_buffer(&descriptor)?;
    pending.staging.push(staging);
    let slot = pending.staging.len() - 1;
    backend.write_buffer(&pending.staging[slot], 0, bytes)?;
    Ok(slot)
}

fn stage_buffer(
    backend: &dyn GpuBackend,
    cmd: &GpuCommandBuffer,
    pending: &mut PendingUpload,
    bytes: &[u8],
    usage: BufferUsage,
    label: String,
) -> Result<usize, GraphicsError> {
    let staging = create_staging(backend, pending, bytes, &label)?;

    let size = bytes.len() as u64;
    let descriptor = BufferDescriptor::new(size, usage | BufferUsage::COPY_DST).with_label(label);
    let gpu = backend.create_buffer(&descriptor)?;
    pending.buffers.push(Buffer::new(gpu, descriptor));
    let slot = pending.buffers.len() - 1;

    backend.cmd_copy_buffer(cmd, &pending.staging[staging], pending.buffers[slot].gpu(), size);
    Ok(slot)
}

fn stage_texture(
    backend: &dyn GpuBackend,
    cmd: &GpuCommandBuffer,
    pending: &mut PendingUpload,
    channel: MaterialChannels,
    image: &TextureData,
    label: String,
) -> Result<usize, GraphicsError> {
    let pixels = expand_to_rgba(image);
    let staging = create_staging(backend, pending, &pixels, &label)?;

    let format = if channel.is_srgb() {
        TextureFormat::Rgba8UnormSrgb
    } else {
        TextureFormat::Rgba8Unorm
    };
    let descriptor = TextureDescriptor::new_2d(
        image.width,
        image.height,
        format,
        TextureUsage::COPY_DST | TextureUsage::SAMPLED,
    )
    .with_label(label);
    let sampler = SamplerDescriptor::linear().with_anisotropy(SAMPLER_ANISOTROPY);
    let mut texture = create_texture_object(backend, descriptor, &sampler)?;

    backend.cmd_texture_barrier(
        cmd,
        texture.gpu(),
        LayoutTransition::new(TextureLayout::Undefined, TextureLayout::TransferDst),
    );
    backend.cmd_copy_buffer_to_texture(cmd, &pending.staging[staging], texture.gpu());
    backend.cmd_texture_barrier(
        cmd,
        texture.gpu(),
        LayoutTransition::new(TextureLayout::TransferDst, TextureLayout::ShaderReadOnly),
    );
    texture.set_layout(TextureLayout::ShaderReadOnly);

    pending.textures.push(texture);
    Ok(pending.textures.len() - 1)
}

fn create_texture_object(
    backend: &dyn GpuBackend,
    descriptor: TextureDescriptor,
    sampler: &SamplerDescriptor,
) -> Result<Texture, GraphicsError> {
    let gpu = backend.create_texture(&descriptor)?;
    match backend.create_sampler(sampler) {
        Ok(sampler) => Ok(Texture::new(gpu, sampler, descriptor)),
        Err(err) => {
            backend.destroy_texture(gpu);
            Err(err)
        }
    }
}

fn release_texture(backend: &dyn GpuBackend, texture: Texture) {
    let (gpu, sampler) = texture.into_parts();
    backend.destroy_sampler(sampler);
    backend.destroy_texture(gpu);
}

/// Widen 1-, 2- or 3-channel 8-bit pixels to RGBA8.
fn expand_to_rgba(image: &TextureData) -> Vec<u8> {
    match image.channels {
        4 => image.data.clone(),
        3 => image
            .data
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], u8::MAX])
            .collect(),
        2 => image
            .data
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[1], 0, u8::MAX])
            .collect(),
        _ => image
            .data
            .iter()
            .flat_map(|&v| [v, v, v, u8::MAX])
            .collect(),
    }
}

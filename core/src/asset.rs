//! Startup asset queue.
//!
//! Assets are enqueued by path during startup. Each distinct path receives
//! a [`Model`] whose mesh and material IDs equal its position in the queue;
//! enqueueing the same path twice returns the existing model. A single
//! [`AssetQueue::load_all`] call then decodes every queued asset on a scoped
//! worker pool and closes the queue. The returned batch is what the GPU
//! registry uploads.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use ironframe_core::asset::{AssetQueue, LoaderConfig};
//! use ironframe_core::mesh::{MeshData, Vertex};
//! use ironframe_core::material::MaterialData;
//!
//! let mut queue = AssetQueue::new(LoaderConfig::default());
//! let crate_model = queue.enqueue("assets/crate.glb").unwrap();
//! let again = queue.enqueue("assets/crate.glb").unwrap();
//! assert_eq!(crate_model, again);
//!
//! let batch = queue
//!     .load_all(&|_: &Path| -> Result<_, ironframe_core::AssetError> {
//!         let mesh = MeshData::new(vec![Vertex::default(); 3], vec![0, 1, 2]);
//!         Ok((mesh, MaterialData::new()))
//!     })
//!     .unwrap();
//! assert_eq!(batch.len(), 1);
//! assert!(queue.enqueue("assets/late.glb").is_err());
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::AssetError;
use crate::material::MaterialData;
use crate::mesh::{MaterialId, MeshData, MeshId, Model};

/// Worker pool configuration for [`AssetQueue::load_all`].
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of worker threads. `None` uses
    /// [`std::thread::available_parallelism`]. Default: `None`.
    pub num_threads: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { num_threads: None }
    }
}

impl LoaderConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    fn effective_threads(&self) -> usize {
        self.num_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}

/// Turns an asset path into CPU-side mesh and material data.
///
/// Implemented for any `Fn(&Path) -> Result<(MeshData, MaterialData), AssetError>`.
pub trait AssetDecoder: Sync {
    fn decode(&self, path: &Path) -> Result<(MeshData, MaterialData), AssetError>;
}

impl<F> AssetDecoder for F
where
    F: Fn(&Path) -> Result<(MeshData, MaterialData), AssetError> + Sync,
{
    fn decode(&self, path: &Path) -> Result<(MeshData, MaterialData), AssetError> {
        self(path)
    }
}

/// One decoded asset, ready for GPU upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelData {
    pub model: Model,
    pub mesh: MeshData,
    pub material: MaterialData,
}

/// Collects asset paths during startup and decodes them in one batch.
#[derive(Debug)]
pub struct AssetQueue {
    config: LoaderConfig,
    by_path: HashMap<PathBuf, Model>,
    pending: Vec<(PathBuf, Model)>,
    open: bool,
}

impl AssetQueue {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            by_path: HashMap::new(),
            pending: Vec::new(),
            open: true,
        }
    }

    /// Queues `path` for loading and returns its model.
    ///
    /// Returns the existing model if the path was already queued, and
    /// [`AssetError::LoadingClosed`] once [`load_all`](Self::load_all) ran.
    pub fn enqueue(&mut self, path: impl AsRef<Path>) -> Result<Model, AssetError> {
        let path = path.as_ref();
        if !self.open {
            return Err(AssetError::LoadingClosed(path.to_path_buf()));
        }
        if let Some(model) = self.by_path.get(path) {
            log::trace!("AssetQueue: '{}' already queued", path.display());
            return Ok(*model);
        }

        let id = self.by_path.len() as u32;
        let model = Model::new(MeshId(id), MaterialId(id));
        self.by_path.insert(path.to_path_buf(), model);
        self.pending.push((path.to_path_buf(), model));
        log::debug!("AssetQueue: queued '{}' as {}", path.display(), model.mesh);
        Ok(model)
    }

    /// Returns `true` while assets can still be enqueued.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Number of distinct queued assets.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Looks up the model assigned to `path`.
    pub fn model(&self, path: impl AsRef<Path>) -> Option<Model> {
        self.by_path.get(path.as_ref()).copied()
    }

    /// Decodes every queued asset and closes the queue.
    ///
    /// Decoding runs on up to [`LoaderConfig::num_threads`] scoped workers.
    /// Results are returned sorted by mesh ID. The first decode error aborts
    /// the batch.
    pub fn load_all<D: AssetDecoder>(&mut self, decoder: &D) -> Result<Vec<ModelData>, AssetError> {
        crate::profile_function!();

        self.open = false;
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let threads = self.config.effective_threads().min(pending.len());
        let chunk_size = pending.len().div_ceil(threads);

        let results: Mutex<Vec<ModelData>> = Mutex::new(Vec::with_capacity(pending.len()));
        let first_error: Mutex<Option<AssetError>> = Mutex::new(None);

        let decode_one = |path: &Path, model: Model| {
            if first_error.lock().is_some() {
                return;
            }
            match decode_checked(decoder, path) {
                Ok((mesh, material)) => results.lock().push(ModelData {
                    model,
                    mesh,
                    material,
                }),
                Err(err) => {
                    let mut slot = first_error.lock();
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                }
            }
        };

        if threads == 1 {
            for (path, model) in &pending {
                decode_one(path, *model);
            }
        } else {
            let panicked = std::thread::scope(|scope| {
                let handles: Vec<_> = pending
                    .chunks(chunk_size)
                    .map(|chunk| {
                        let decode_one = &decode_one;
                        scope.spawn(move || {
                            crate::set_thread_name!("asset-worker");
                            for (path, model) in chunk {
                                decode_one(path, *model);
                            }
                        })
                    })
                    .collect();
                let joined: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
                joined.iter().any(|result| result.is_err())
            });
            if panicked {
                return Err(AssetError::WorkerPanicked);
            }
        }

        if let Some(err) = first_error.into_inner() {
            return Err(err);
        }

        let mut loaded = results.into_inner();
        loaded.sort_by_key(|data| data.model.mesh);
        log::info!(
            "AssetQueue: decoded {} assets on {} threads in {:.2?}",
            loaded.len(),
            threads,
            start.elapsed()
        );
        Ok(loaded)
    }
}

impl Default for AssetQueue {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

fn decode_checked<D: AssetDecoder>(
    decoder: &D,
    path: &Path,
) -> Result<(MeshData, MaterialData), AssetError> {
    let (mesh, material) = decoder.decode(path)?;
    if let Some(index) = mesh.find_out_of_range_index() {
        return Err(AssetError::IndexOutOfRange {
            path: path.to_path_buf(),
            index,
            vertex_count: mesh.vertex_count(),
        });
    }
    Ok((mesh, material))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{MaterialChannels, TextureData};
    use crate::mesh::Vertex;

    fn quad(_: &Path) -> Result<(MeshData, MaterialData), AssetError> {
        let mesh = MeshData::new(vec![Vertex::default(); 4], vec![0, 1, 2, 2, 3, 0]);
        let material = MaterialData::new().with_channel(
            MaterialChannels::ALBEDO,
            TextureData::solid_rgba(1, 1, [255; 4]),
        );
        Ok((mesh, material))
    }

    #[test]
    fn loader_config_default() {
        let config = LoaderConfig::default();
        assert!(config.num_threads.is_none());
        assert!(config.effective_threads() >= 1);
        assert_eq!(LoaderConfig::default().with_threads(0).effective_threads(), 1);
    }

    #[test]
    fn sequential_ids() {
        let mut queue = AssetQueue::default();
        let a = queue.enqueue("a.glb").unwrap();
        let b = queue.enqueue("b.glb").unwrap();
        assert_eq!(a, Model::new(MeshId(0), MaterialId(0)));
        assert_eq!(b, Model::new(MeshId(1), MaterialId(1)));
        assert_eq!(queue.model("b.glb"), Some(b));
    }

    #[test]
    fn duplicate_path_is_deduplicated() {
        let mut queue = AssetQueue::default();
        let first = queue.enqueue("tree.glb").unwrap();
        let second = queue.enqueue("tree.glb").unwrap();
        assert_eq!(first, second);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn enqueue_after_load_is_rejected() {
        let mut queue = AssetQueue::default();
        queue.enqueue("a.glb").unwrap();
        queue.load_all(&quad).unwrap();
        assert!(!queue.is_open());
        assert!(matches!(
            queue.enqueue("b.glb"),
            Err(AssetError::LoadingClosed(_))
        ));
    }

    #[test]
    fn parallel_load_returns_sorted_batch() {
        let mut queue = AssetQueue::new(LoaderConfig::default().with_threads(4));
        for i in 0..17 {
            queue.enqueue(format!("model_{i}.glb")).unwrap();
        }
        let batch = queue.load_all(&quad).unwrap();
        assert_eq!(batch.len(), 17);
        for (i, data) in batch.iter().enumerate() {
            assert_eq!(data.model.mesh, MeshId(i as u32));
            assert_eq!(data.mesh.index_count(), 6);
        }
    }

    #[test]
    fn decode_error_aborts_batch() {
        let mut queue = AssetQueue::new(LoaderConfig::default().with_threads(2));
        queue.enqueue("good.glb").unwrap();
        queue.enqueue("bad.glb").unwrap();
        let result = queue.load_all(&|path: &Path| {
            if path.ends_with("bad.glb") {
                Err(AssetError::decode(path, "truncated buffer"))
            } else {
                quad(path)
            }
        });
        assert!(matches!(result, Err(AssetError::Decode { .. })));
    }

    #[test]
    fn out_of_range_indices_rejected() {
        let mut queue = AssetQueue::new(LoaderConfig::default().with_threads(1));
        queue.enqueue("broken.glb").unwrap();
        let result = queue.load_all(&|_: &Path| -> Result<_, AssetError> {
            Ok((
                MeshData::new(vec![Vertex::default(); 3], vec![0, 1, 9]),
                MaterialData::new(),
            ))
        });
        assert!(matches!(
            result,
            Err(AssetError::IndexOutOfRange {
                index: 9,
                vertex_count: 3,
                ..
            })
        ));
    }

    #[test]
    fn empty_queue_loads_nothing() {
        let mut queue = AssetQueue::default();
        assert!(queue.load_all(&quad).unwrap().is_empty());
        assert!(!queue.is_open());
    }
}

use std::path::Path;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ironframe_core::asset::{AssetQueue, LoaderConfig};
use ironframe_core::handle::HandleMap;
use ironframe_core::material::{MaterialChannels, MaterialData, TextureData};
use ironframe_core::mesh::{MeshData, Vertex};
use ironframe_core::AssetError;

// ---------------------------------------------------------------------------
// Handle storage
// ---------------------------------------------------------------------------

fn bench_handle_insert_remove(c: &mut Criterion) {
    c.bench_function("handle_map_insert_remove_1000", |b| {
        b.iter(|| {
            let mut map = HandleMap::new();
            let handles: Vec<_> = (0..1000u32).map(|i| map.insert(i)).collect();
            for handle in handles.iter().step_by(2) {
                map.remove(*handle);
            }
            for i in 0..500u32 {
                black_box(map.insert(i));
            }
            black_box(map.len())
        });
    });
}

fn bench_handle_lookup(c: &mut Criterion) {
    let mut map = HandleMap::new();
    let handles: Vec<_> = (0..10_000u32).map(|i| map.insert(i)).collect();
    c.bench_function("handle_map_lookup_10000", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for handle in &handles {
                if let Some(v) = map.get(black_box(*handle)) {
                    sum += *v as u64;
                }
            }
            black_box(sum)
        });
    });
}

// ---------------------------------------------------------------------------
// Asset queue
// ---------------------------------------------------------------------------

fn decode_grid(_: &Path) -> Result<(MeshData, MaterialData), AssetError> {
    let vertices = vec![Vertex::default(); 1024];
    let indices = (0..1024u32).collect();
    let material = MaterialData::new().with_channel(
        MaterialChannels::ALBEDO,
        TextureData::solid_rgba(64, 64, [200, 200, 200, 255]),
    );
    Ok((MeshData::new(vertices, indices), material))
}

fn bench_asset_queue_load(c: &mut Criterion) {
    c.bench_function("asset_queue_load_64", |b| {
        b.iter(|| {
            let mut queue = AssetQueue::new(LoaderConfig::default());
            for i in 0..64 {
                queue.enqueue(format!("asset_{i}.glb")).ok();
            }
            black_box(queue.load_all(&decode_grid).map(|batch| batch.len()))
        });
    });
}

criterion_group!(
    benches,
    bench_handle_insert_remove,
    bench_handle_lookup,
    bench_asset_queue_load,
);
criterion_main!(benches);

// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use penumbra_core::math::{Aabb, Mat4, Vec3, FRAC_PI_2};
use penumbra_core::renderer::{BufferId, IndexFormat};
use penumbra_data::{
    Camera, Material, Mesh, PointLight, Scene, SceneAssets, SubMesh, VertexBuffers,
};
use penumbra_lanes::visibility_lane::{FrameBatches, FrustumCuller};
use std::hint::black_box;

fn cube_mesh() -> Mesh {
    Mesh {
        label: "cube".to_string(),
        vertex_buffers: VertexBuffers {
            positions: BufferId(1),
            normals: Some(BufferId(2)),
            texcoords: Some(BufferId(3)),
            tangents: None,
        },
        index_buffer: BufferId(4),
        index_format: IndexFormat::Uint16,
        bounds: Aabb::from_min_max(Vec3::splat(-0.5), Vec3::splat(0.5)),
        sub_meshes: vec![SubMesh {
            base_vertex: 0,
            start_index: 0,
            index_count: 36,
            vertex_count: 24,
        }],
    }
}

/// A 100 x 100 grid of cubes around the camera, with a handful of point lights.
fn grid_world() -> (Scene, SceneAssets) {
    let camera = Camera::look_at(
        Vec3::new(0.0, 20.0, 60.0),
        Vec3::ZERO,
        Vec3::Y,
        FRAC_PI_2,
        16.0 / 9.0,
        0.1,
        500.0,
    )
    .unwrap_or_default();
    let mut scene = Scene::new(camera);
    let mut assets = SceneAssets::new();
    let mesh = assets.meshes.insert(cube_mesh());
    let materials: Vec<_> = (0..8)
        .map(|i| assets.materials.insert(Material::new(format!("material {i}"))))
        .collect();

    for x in 0..100 {
        for z in 0..100 {
            let position = Vec3::new(x as f32 - 50.0, 0.0, z as f32 - 50.0);
            let material = materials[(x + z) % materials.len()];
            scene
                .add_drawable(
                    &assets.meshes,
                    mesh,
                    vec![material],
                    Mat4::from_translation(position),
                )
                .expect("bench drawable");
        }
    }
    for i in 0..4 {
        let position = Vec3::new(i as f32 * 10.0 - 15.0, 3.0, 0.0);
        scene.add_point_light(PointLight::new(position, Vec3::ONE, 10.0).with_shadows());
    }
    (scene, assets)
}

fn bench_culling(c: &mut Criterion) {
    let (scene, assets) = grid_world();
    let mut group = c.benchmark_group("Visibility");

    for partitions in [1usize, 4] {
        let culler = FrustumCuller::new(partitions);
        group.bench_with_input(
            BenchmarkId::new("cull 10k drawables", partitions),
            &culler,
            |b, culler| {
                b.iter(|| black_box(culler.cull(&scene, &assets.materials, true)));
            },
        );
    }

    let sets = FrustumCuller::new(1).cull(&scene, &assets.materials, true);
    group.bench_function("build batches", |b| {
        b.iter(|| black_box(FrameBatches::build(&sets, &scene, &assets.meshes)));
    });

    group.finish();
}

criterion_group!(benches, bench_culling);
criterion_main!(benches);

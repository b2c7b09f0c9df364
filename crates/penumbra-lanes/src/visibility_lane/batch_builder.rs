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

//! Groups visible sub-meshes by material.

use super::VisibilitySets;
use ahash::AHashMap;
use penumbra_data::light::POINT_LIGHT_FACE_COUNT;
use penumbra_data::{
    AssetHandle, AssetTable, DrawableHandle, Material, Mesh, PointLightHandle, Scene,
};
use rayon::prelude::*;

/// One sub-mesh draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveRef {
    /// The drawable the sub-mesh belongs to.
    pub drawable: DrawableHandle,
    /// Index of the sub-mesh in its mesh.
    pub sub_mesh: u32,
    /// Copied from the sub-mesh.
    pub base_vertex: i32,
    /// Copied from the sub-mesh.
    pub start_index: u32,
    /// Copied from the sub-mesh.
    pub index_count: u32,
    /// Copied from the sub-mesh.
    pub vertex_count: u32,
}

/// All primitives of a view that share one material.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshBatch {
    /// The shared material.
    pub material: AssetHandle<Material>,
    /// Primitives in discovery order.
    pub primitives: Vec<PrimitiveRef>,
}

/// Builds the batches of one visibility set.
///
/// Batches appear in the order their material was first seen, and primitives keep
/// the order of `visible`. Stale drawables and drawables whose mesh no longer resolves
/// are skipped.
pub fn build_batches(
    visible: &[DrawableHandle],
    scene: &Scene,
    meshes: &AssetTable<Mesh>,
) -> Vec<MeshBatch> {
    let mut batches: Vec<MeshBatch> = Vec::new();
    let mut batch_index: AHashMap<AssetHandle<Material>, usize> = AHashMap::new();

    for &handle in visible {
        let Some(drawable) = scene.drawable(handle) else {
            log::warn!("BatchBuilder: skipping stale drawable {handle:?}");
            continue;
        };
        let Some(mesh) = meshes.get(drawable.mesh()) else {
            log::warn!(
                "BatchBuilder: mesh {:?} of drawable {handle:?} is gone, skipping",
                drawable.mesh()
            );
            continue;
        };

        for (index, (sub_mesh, &material)) in mesh
            .sub_meshes
            .iter()
            .zip(drawable.materials().iter())
            .enumerate()
        {
            let slot = *batch_index.entry(material).or_insert_with(|| {
                batches.push(MeshBatch {
                    material,
                    primitives: Vec::new(),
                });
                batches.len() - 1
            });
            batches[slot].primitives.push(PrimitiveRef {
                drawable: handle,
                sub_mesh: index as u32,
                base_vertex: sub_mesh.base_vertex,
                start_index: sub_mesh.start_index,
                index_count: sub_mesh.index_count,
                vertex_count: sub_mesh.vertex_count,
            });
        }
    }

    batches
}

/// Total number of primitives across `batches`.
pub fn primitive_count(batches: &[MeshBatch]) -> usize {
    batches.iter().map(|b| b.primitives.len()).sum()
}

/// The batches of every point-light view.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLightBatches {
    /// The light.
    pub light: PointLightHandle,
    /// One list per cube face.
    pub per_face: [Vec<MeshBatch>; POINT_LIGHT_FACE_COUNT],
    /// Everything visible in any face.
    pub single_pass: Vec<MeshBatch>,
    /// Faces 0-2 and faces 3-5.
    pub two_pass: [Vec<MeshBatch>; 2],
}

/// Every batch list of a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameBatches {
    /// Camera, deferred path.
    pub deferred: Vec<MeshBatch>,
    /// Camera, forward path.
    pub forward: Vec<MeshBatch>,
    /// Drawn into every sun cascade.
    pub directional: Vec<MeshBatch>,
    /// One entry per point light, in scene order.
    pub point_lights: Vec<PointLightBatches>,
}

impl FrameBatches {
    /// Rebuilds every batch list from `sets`.
    ///
    /// The camera, sun and point-light lists are built on the rayon pool. Each list
    /// is built by one task and the results keep the order of `sets`, so the output
    /// matches a sequential build.
    pub fn build(sets: &VisibilitySets, scene: &Scene, meshes: &AssetTable<Mesh>) -> Self {
        let ((deferred, forward), (directional, point_lights)) = rayon::join(
            || {
                rayon::join(
                    || build_batches(&sets.camera.deferred, scene, meshes),
                    || build_batches(&sets.camera.forward, scene, meshes),
                )
            },
            || {
                rayon::join(
                    || build_batches(&sets.directional, scene, meshes),
                    || {
                        sets.point_lights
                            .par_iter()
                            .map(|light| PointLightBatches {
                                light: light.light,
                                per_face: std::array::from_fn(|face| {
                                    build_batches(&light.per_face[face], scene, meshes)
                                }),
                                single_pass: build_batches(&light.single_pass, scene, meshes),
                                two_pass: std::array::from_fn(|group| {
                                    build_batches(&light.two_pass[group], scene, meshes)
                                }),
                            })
                            .collect::<Vec<_>>()
                    },
                )
            },
        );

        Self {
            deferred,
            forward,
            directional,
            point_lights,
        }
    }

    /// The batches of one point light.
    pub fn point_light(&self, light: PointLightHandle) -> Option<&PointLightBatches> {
        self.point_lights.iter().find(|batches| batches.light == light)
    }

    /// Number of camera batches, deferred and forward.
    pub fn camera_batch_count(&self) -> usize {
        self.deferred.len() + self.forward.len()
    }
}

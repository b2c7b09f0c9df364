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

//! Small scenes shared by the unit tests.

use penumbra_core::math::{Aabb, Mat4, Vec3, FRAC_PI_2};
use penumbra_core::renderer::{BufferId, IndexFormat};
use penumbra_data::{
    AssetHandle, Camera, DrawableHandle, Material, Mesh, Scene, SceneAssets, SubMesh,
    VertexBuffers,
};

pub(crate) struct TestWorld {
    pub scene: Scene,
    pub assets: SceneAssets,
    pub cube: AssetHandle<Mesh>,
    pub two_part: AssetHandle<Mesh>,
}

fn unit_cube(label: &str, sub_meshes: u32) -> Mesh {
    let per_part = 36 / sub_meshes;
    Mesh {
        label: label.to_string(),
        vertex_buffers: VertexBuffers {
            positions: BufferId(1000),
            normals: Some(BufferId(1001)),
            texcoords: Some(BufferId(1002)),
            tangents: None,
        },
        index_buffer: BufferId(1003),
        index_format: IndexFormat::Uint16,
        bounds: Aabb::from_min_max(Vec3::splat(-1.0), Vec3::ONE),
        sub_meshes: (0..sub_meshes)
            .map(|part| SubMesh {
                base_vertex: 0,
                start_index: part * per_part,
                index_count: per_part,
                vertex_count: 24,
            })
            .collect(),
    }
}

impl TestWorld {
    /// A camera at `(0, 0, 10)` looking at the origin with a 90 degree square frustum.
    pub fn new() -> Self {
        let camera = Camera::look_at(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::ZERO,
            Vec3::Y,
            FRAC_PI_2,
            1.0,
            0.1,
            100.0,
        )
        .expect("valid camera");
        let mut assets = SceneAssets::new();
        let cube = assets.meshes.insert(unit_cube("cube", 1));
        let two_part = assets.meshes.insert(unit_cube("two_part", 2));
        Self {
            scene: Scene::new(camera),
            assets,
            cube,
            two_part,
        }
    }

    pub fn material(&mut self, material: Material) -> AssetHandle<Material> {
        self.assets.materials.insert(material)
    }

    pub fn spawn(&mut self, position: Vec3, material: AssetHandle<Material>) -> DrawableHandle {
        self.scene
            .add_drawable(
                &self.assets.meshes,
                self.cube,
                vec![material],
                Mat4::from_translation(position),
            )
            .expect("valid drawable")
    }

    pub fn spawn_multi(
        &mut self,
        position: Vec3,
        materials: Vec<AssetHandle<Material>>,
    ) -> DrawableHandle {
        self.scene
            .add_drawable(
                &self.assets.meshes,
                self.two_part,
                materials,
                Mat4::from_translation(position),
            )
            .expect("valid drawable")
    }
}

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

//! A small lit scene shared by the agent tests.

#![allow(dead_code)]

use penumbra_agents::{RenderAgent, RenderAgentConfig};
use penumbra_core::math::{Aabb, Mat4, Vec3, FRAC_PI_2};
use penumbra_core::renderer::{BufferId, IndexFormat, RenderError, RendererSettings};
use penumbra_data::{
    Camera, DirectionalLight, Material, Mesh, PointLight, Scene, SceneAssets, SubMesh,
    VertexBuffers,
};
use penumbra_infra::HeadlessDevice;
use std::sync::Arc;

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 180;

pub struct World {
    pub scene: Scene,
    pub assets: SceneAssets,
}

// Mesh streams are not owned by the device; the ids only need to be stable.
pub fn cube() -> Mesh {
    Mesh {
        label: "cube".to_string(),
        vertex_buffers: VertexBuffers {
            positions: BufferId(900_000),
            normals: Some(BufferId(900_001)),
            texcoords: Some(BufferId(900_002)),
            tangents: None,
        },
        index_buffer: BufferId(900_003),
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

/// A 5 x 5 grid of cubes with two opaque materials and one forward-shaded one, three
/// point lights (two casting shadows) and a sun.
pub fn lit_grid() -> World {
    let camera = Camera::look_at(
        Vec3::new(0.0, 6.0, 12.0),
        Vec3::ZERO,
        Vec3::Y,
        FRAC_PI_2,
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
    )
    .expect("valid camera");
    let mut scene = Scene::new(camera);
    let mut assets = SceneAssets::new();
    let mesh = assets.meshes.insert(cube());
    let stone = assets.materials.insert(Material::new("stone"));
    let metal = assets.materials.insert(Material::new("metal"));
    let glass = assets
        .materials
        .insert(Material::new("glass").with_forward_shading());

    for x in -2..=2i32 {
        for z in -2..=2i32 {
            let material = match (x + z).rem_euclid(5) {
                0 => glass,
                1 | 3 => metal,
                _ => stone,
            };
            scene
                .add_drawable(
                    &assets.meshes,
                    mesh,
                    vec![material],
                    Mat4::from_translation(Vec3::new(x as f32 * 2.0, 0.0, z as f32 * 2.0)),
                )
                .expect("valid drawable");
        }
    }

    scene.add_point_light(
        PointLight::new(Vec3::new(-3.0, 2.0, 0.0), Vec3::ONE, 8.0).with_shadows(),
    );
    scene.add_point_light(
        PointLight::new(Vec3::new(3.0, 2.0, 1.0), Vec3::new(1.0, 0.6, 0.3), 6.0).with_shadows(),
    );
    scene.add_point_light(PointLight::new(
        Vec3::new(0.0, 1.0, 4.0),
        Vec3::new(0.3, 0.5, 1.0),
        4.0,
    ));
    scene.set_directional_light(Some(DirectionalLight::default()));

    World { scene, assets }
}

pub fn config(settings: RendererSettings) -> RenderAgentConfig {
    RenderAgentConfig {
        width: WIDTH,
        height: HEIGHT,
        settings,
        ..Default::default()
    }
}

pub fn agent(
    device: &HeadlessDevice,
    settings: RendererSettings,
) -> Result<RenderAgent, RenderError> {
    RenderAgent::new(Arc::new(device.clone()), config(settings))
}

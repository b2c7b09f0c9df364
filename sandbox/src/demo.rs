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

//! The demo world: a grid of cubes, orbiting point lights and a sun.

use anyhow::Result;
use penumbra_core::math::{Aabb, Mat4, Vec3, FRAC_PI_2};
use penumbra_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, GraphicsDevice, IndexFormat, ResourceState,
};
use penumbra_data::{
    Camera, DirectionalLight, Material, MaterialConstants, Mesh, PointLight, PointLightHandle,
    Scene, SceneAssets, SubMesh, VertexBuffers,
};
use std::borrow::Cow;
use std::f32::consts::TAU;

const CUBE_VERTICES: u64 = 24;
const CUBE_INDICES: u32 = 36;
const SPACING: f32 = 2.5;
const POINT_LIGHTS: usize = 8;
// Radians per frame.
const ORBIT_SPEED: f32 = TAU / 600.0;

pub struct DemoScene {
    pub scene: Scene,
    pub assets: SceneAssets,
    lights: Vec<PointLightHandle>,
    buffers: Vec<BufferId>,
    radius: f32,
}

fn create_stream(
    device: &dyn GraphicsDevice,
    label: &'static str,
    size: u64,
    usage: BufferUsage,
) -> Result<BufferId> {
    Ok(device.create_buffer(&BufferDescriptor {
        label: Some(Cow::Borrowed(label)),
        size,
        stride: 0,
        usage,
        initial_state: ResourceState::Common,
    })?)
}

impl DemoScene {
    /// Builds a `grid` x `grid` field of cubes and uploads the cube mesh streams.
    pub fn build(device: &dyn GraphicsDevice, grid: u32, aspect_ratio: f32) -> Result<Self> {
        let vertex = BufferUsage::VERTEX;
        let positions = create_stream(device, "Cube positions", CUBE_VERTICES * 12, vertex)?;
        let normals = create_stream(device, "Cube normals", CUBE_VERTICES * 12, vertex)?;
        let texcoords = create_stream(device, "Cube texcoords", CUBE_VERTICES * 8, vertex)?;
        let index_bytes = CUBE_INDICES as u64 * 2;
        let indices = create_stream(device, "Cube indices", index_bytes, BufferUsage::INDEX)?;

        let mut assets = SceneAssets::new();
        let cube = assets.meshes.insert(Mesh {
            label: "cube".to_string(),
            vertex_buffers: VertexBuffers {
                positions,
                normals: Some(normals),
                texcoords: Some(texcoords),
                tangents: None,
            },
            index_buffer: indices,
            index_format: IndexFormat::Uint16,
            bounds: Aabb::from_min_max(Vec3::splat(-0.5), Vec3::splat(0.5)),
            sub_meshes: vec![SubMesh {
                base_vertex: 0,
                start_index: 0,
                index_count: CUBE_INDICES,
                vertex_count: CUBE_VERTICES as u32,
            }],
        });
        let materials = [
            assets.materials.insert(Material::new("stone")),
            assets.materials.insert(Material::new("brushed metal").with_constants(
                MaterialConstants {
                    base_color: [0.8, 0.8, 0.85, 1.0],
                    roughness: 0.3,
                    metalness: 1.0,
                    ..Default::default()
                },
            )),
            assets.materials.insert(
                Material::new("glass")
                    .with_constants(MaterialConstants {
                        base_color: [0.6, 0.8, 1.0, 0.4],
                        roughness: 0.05,
                        ..Default::default()
                    })
                    .with_forward_shading(),
            ),
        ];

        let half = grid as f32 * SPACING * 0.5;
        let radius = half.max(4.0) * 1.5;
        let camera = Camera::look_at(
            Vec3::new(radius, radius * 0.5, 0.0),
            Vec3::ZERO,
            Vec3::Y,
            FRAC_PI_2 * 0.75,
            aspect_ratio,
            0.1,
            radius * 4.0,
        )
        .ok_or_else(|| anyhow::anyhow!("degenerate demo camera"))?;
        let mut scene = Scene::new(camera);

        for x in 0..grid {
            for z in 0..grid {
                let position = Vec3::new(
                    x as f32 * SPACING - half,
                    ((x * 7 + z * 3) % 4) as f32 * 0.25,
                    z as f32 * SPACING - half,
                );
                let material = materials[((x + 2 * z) % 3) as usize];
                scene.add_drawable(
                    &assets.meshes,
                    cube,
                    vec![material],
                    Mat4::from_translation(position),
                )?;
            }
        }

        let lights = (0..POINT_LIGHTS)
            .map(|i| {
                let hue = i as f32 / POINT_LIGHTS as f32;
                let color = Vec3::new(1.0 - hue, 0.5 + hue * 0.5, hue);
                let light = PointLight::new(Vec3::new(0.0, 2.0, 0.0), color, 6.0);
                // Every other light casts shadows.
                let light = if i % 2 == 0 { light.with_shadows() } else { light };
                scene.add_point_light(light)
            })
            .collect();
        scene.set_directional_light(Some(DirectionalLight::default()));

        let mut demo = Self {
            scene,
            assets,
            lights,
            buffers: vec![positions, normals, texcoords, indices],
            radius,
        };
        demo.animate(0);
        Ok(demo)
    }

    /// Moves the camera and the point lights to their positions at `frame`.
    pub fn animate(&mut self, frame: u64) {
        let angle = frame as f32 * ORBIT_SPEED;
        let eye = Vec3::new(
            angle.cos() * self.radius,
            self.radius * 0.5,
            angle.sin() * self.radius,
        );
        self.scene.camera_mut().set_look_at(eye, Vec3::ZERO, Vec3::Y);

        let count = self.lights.len() as f32;
        for (i, &handle) in self.lights.iter().enumerate() {
            let phase = -2.0 * angle + i as f32 / count * TAU;
            let orbit = self.radius * 0.4;
            if let Some(light) = self.scene.point_light_mut(handle) {
                light.set_position(Vec3::new(phase.cos() * orbit, 2.0, phase.sin() * orbit));
            }
        }
    }

    /// Destroys the mesh streams.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for buffer in self.buffers.drain(..) {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("Sandbox: failed to destroy mesh buffer: {e}");
            }
        }
    }
}

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

//! Turns the scene's lights into GPU records once per frame.
//!
//! Everything here runs on the CPU before encoding starts. Buffers that must grow
//! are recreated here; the bytes are recorded later by the light-buffer pass.

use super::{
    fit_cascades, CascadeSet, GpuCascadeInputs, GpuDirectionalLight, GpuPointLightData,
    GpuPointLightPosRad, GpuShadowPointLightData, GrowableBuffer,
};
use crate::render_lane::{FrameResource, FrameResources, ResourceStateTracker};
use penumbra_core::renderer::{GraphicsDevice, RenderError, RendererSettings};
use penumbra_data::{PointLight, PointLightHandle, Scene};
use std::mem::size_of;

/// Initial record capacity of the non-shadow-casting light buffers.
pub const POINT_LIGHT_INITIAL_RECORDS: u64 = 256;
/// Initial record capacity of the shadow-casting light buffers.
pub const SHADOW_POINT_LIGHT_INITIAL_RECORDS: u64 = 8;

/// A full-buffer write recorded by the light-buffer pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferUpload {
    /// Destination buffer.
    pub resource: FrameResource,
    /// New content, written at offset zero.
    pub bytes: Vec<u8>,
}

/// The light data of one frame.
#[derive(Debug, Clone, Default)]
pub struct LightFrame {
    /// Records in the non-shadow-casting buffers.
    pub point_light_count: u32,
    /// Shadow-casting lights in upload order. Light `i` renders into cube `i`.
    pub shadow_casters: Vec<PointLightHandle>,
    /// Shadow casters beyond the per-frame limit, uploaded without shadows.
    pub demoted_casters: u32,
    /// A sun exists.
    pub sun_present: bool,
    /// Cascades rendered this frame, zero when the sun casts no shadow.
    pub cascade_count: u32,
    /// CPU-fitted cascades, uploaded when the GPU cascade pass does not run.
    pub cpu_cascades: CascadeSet,
    /// Pending buffer writes.
    pub uploads: Vec<BufferUpload>,
}

impl LightFrame {
    /// Number of shadow-casting point lights.
    pub fn shadow_point_light_count(&self) -> u32 {
        self.shadow_casters.len() as u32
    }
}

fn point_light_record(light: &PointLight) -> (GpuPointLightData, GpuPointLightPosRad) {
    (
        GpuPointLightData {
            color: light.radiance().to_array(),
            _padding: 0.0,
        },
        GpuPointLightPosRad {
            position: light.position().to_array(),
            radius: light.radius(),
        },
    )
}

fn shadow_point_light_record(light: &PointLight) -> GpuShadowPointLightData {
    GpuShadowPointLightData {
        color: light.radiance().to_array(),
        far_plane: light.shadow_far_plane(),
        shadow_bias: light.shadow_bias,
        max_shadow_bias: light.max_shadow_bias,
        _padding: [0.0; 2],
        view_projections: std::array::from_fn(|face| {
            light.faces()[face].view_projection.to_cols_array_2d()
        }),
    }
}

/// Owns the light buffers and remembers what was last uploaded.
#[derive(Debug)]
pub struct LightSetup {
    point_lights: GrowableBuffer,
    point_lights_pos_rad: GrowableBuffer,
    shadow_point_lights: GrowableBuffer,
    shadow_point_lights_pos_rad: GrowableBuffer,
    last_directional: Option<GpuDirectionalLight>,
    last_cascade_inputs: Option<GpuCascadeInputs>,
}

impl LightSetup {
    /// Creates the four point-light buffers at their initial capacities.
    pub fn create(
        device: &dyn GraphicsDevice,
        resources: &mut FrameResources,
    ) -> Result<Self, RenderError> {
        log::info!("LightSetup: Initializing GPU resources...");
        let record = size_of::<GpuPointLightData>() as u32;
        let pos_rad = size_of::<GpuPointLightPosRad>() as u32;
        let shadow = size_of::<GpuShadowPointLightData>() as u32;
        Ok(Self {
            point_lights: GrowableBuffer::create(
                device,
                resources,
                FrameResource::PointLights,
                record,
                POINT_LIGHT_INITIAL_RECORDS,
            )?,
            point_lights_pos_rad: GrowableBuffer::create(
                device,
                resources,
                FrameResource::PointLightsPosRad,
                pos_rad,
                POINT_LIGHT_INITIAL_RECORDS,
            )?,
            shadow_point_lights: GrowableBuffer::create(
                device,
                resources,
                FrameResource::ShadowPointLights,
                shadow,
                SHADOW_POINT_LIGHT_INITIAL_RECORDS,
            )?,
            shadow_point_lights_pos_rad: GrowableBuffer::create(
                device,
                resources,
                FrameResource::ShadowPointLightsPosRad,
                pos_rad,
                SHADOW_POINT_LIGHT_INITIAL_RECORDS,
            )?,
            last_directional: None,
            last_cascade_inputs: None,
        })
    }

    /// The buffer of `resource`, for inspection.
    pub fn buffer(&self, resource: FrameResource) -> Option<&GrowableBuffer> {
        [
            &self.point_lights,
            &self.point_lights_pos_rad,
            &self.shadow_point_lights,
            &self.shadow_point_lights_pos_rad,
        ]
        .into_iter()
        .find(|b| b.resource() == resource)
    }

    /// Builds this frame's light records, growing buffers as needed.
    ///
    /// # Arguments
    ///
    /// * `states` - Grown buffers have their tracked state reset to home.
    ///
    /// # Returns
    ///
    /// The frame's light data, including the uploads the light-buffer pass records.
    pub fn prepare(
        &mut self,
        device: &dyn GraphicsDevice,
        scene: &Scene,
        settings: &RendererSettings,
        resources: &mut FrameResources,
        states: &mut ResourceStateTracker,
    ) -> Result<LightFrame, RenderError> {
        let mut frame = LightFrame::default();
        let max_casters = settings.max_point_light_shadows as usize;

        // 1. Partition point lights
        let mut colors = Vec::new();
        let mut pos_rad = Vec::new();
        let mut shadow_records = Vec::new();
        let mut shadow_pos_rad = Vec::new();
        for (handle, light) in scene.point_lights() {
            if light.is_shadow_caster() && frame.shadow_casters.len() < max_casters {
                frame.shadow_casters.push(handle);
                shadow_records.push(shadow_point_light_record(light));
                shadow_pos_rad.push(point_light_record(light).1);
            } else {
                if light.is_shadow_caster() {
                    frame.demoted_casters += 1;
                }
                let (color, position) = point_light_record(light);
                colors.push(color);
                pos_rad.push(position);
            }
        }
        if frame.demoted_casters > 0 {
            log::debug!(
                "LightSetup: {} shadow-casting point lights over the limit of {} \
                 render without shadows",
                frame.demoted_casters,
                max_casters
            );
        }
        frame.point_light_count = colors.len() as u32;

        // 2. Grow and queue uploads
        let uploads: [(&mut GrowableBuffer, &[u8]); 4] = [
            (&mut self.point_lights, bytemuck::cast_slice(&colors)),
            (&mut self.point_lights_pos_rad, bytemuck::cast_slice(&pos_rad)),
            (&mut self.shadow_point_lights, bytemuck::cast_slice(&shadow_records)),
            (&mut self.shadow_point_lights_pos_rad, bytemuck::cast_slice(&shadow_pos_rad)),
        ];
        for (buffer, bytes) in uploads {
            if bytes.is_empty() {
                continue;
            }
            buffer.reserve(device, resources, states, bytes.len() as u64)?;
            frame.uploads.push(BufferUpload {
                resource: buffer.resource(),
                bytes: bytes.to_vec(),
            });
        }

        // 3. Directional light
        let sun = scene.directional_light();
        frame.sun_present = sun.is_some();
        let directional = match sun {
            Some(sun) => GpuDirectionalLight {
                direction: sun.normalized_direction().to_array(),
                shadow_bias: sun.shadow_bias,
                color: sun.radiance().to_array(),
                cascade_split_lambda: sun.cascade_split_lambda,
                up: sun.up().to_array(),
                enabled: 1,
            },
            None => bytemuck::Zeroable::zeroed(),
        };
        if self.last_directional != Some(directional) {
            frame.uploads.push(BufferUpload {
                resource: FrameResource::DirectionalLightBuffer,
                bytes: bytemuck::bytes_of(&directional).to_vec(),
            });
            self.last_directional = Some(directional);
        }

        // 4. Cascades
        let Some(sun) = sun.filter(|sun| sun.casts_shadows && settings.sun_shadows_active()) else {
            return Ok(frame);
        };
        let camera = scene.camera();
        frame.cascade_count = settings.clamped_cascade_count();
        if settings.gpu_cascades {
            let inputs = GpuCascadeInputs {
                projection: camera.projection.to_cols_array_2d(),
                light_direction: sun.normalized_direction().to_array(),
                max_cascade_index: frame.cascade_count - 1,
                use_reduced_depth: settings.depth_reduction as u32,
                near: camera.near,
                far: camera.far,
                shadow_map_size: settings.clamped_cascade_size() as f32,
            };
            if self.last_cascade_inputs != Some(inputs) {
                frame.uploads.push(BufferUpload {
                    resource: FrameResource::CascadeInputBuffer,
                    bytes: bytemuck::bytes_of(&inputs).to_vec(),
                });
                self.last_cascade_inputs = Some(inputs);
            }
        } else {
            frame.cpu_cascades = fit_cascades(
                camera,
                sun,
                frame.cascade_count,
                settings.clamped_cascade_size(),
            );
        }

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_core::math::Vec3;
    use penumbra_data::{Camera, DirectionalLight};
    use penumbra_infra::HeadlessDevice;

    struct Fixture {
        device: HeadlessDevice,
        resources: FrameResources,
        states: ResourceStateTracker,
        setup: LightSetup,
        scene: Scene,
        settings: RendererSettings,
    }

    impl Fixture {
        fn new() -> Self {
            let device = HeadlessDevice::new(64, 64);
            let settings = RendererSettings::default();
            let mut resources =
                FrameResources::create(&device, 64, 64, &settings, false).expect("resources");
            let setup = LightSetup::create(&device, &mut resources).expect("light setup");
            let mut states = ResourceStateTracker::new();
            states.sync(&resources);
            Self {
                device,
                resources,
                states,
                setup,
                scene: Scene::new(Camera::default()),
                settings,
            }
        }

        fn prepare(&mut self) -> LightFrame {
            self.setup
                .prepare(
                    &self.device,
                    &self.scene,
                    &self.settings,
                    &mut self.resources,
                    &mut self.states,
                )
                .expect("prepare")
        }
    }

    fn upload_of(frame: &LightFrame, resource: FrameResource) -> Option<&BufferUpload> {
        frame.uploads.iter().find(|u| u.resource == resource)
    }

    #[test]
    fn test_no_lights_is_valid() {
        let mut fx = Fixture::new();
        let frame = fx.prepare();
        assert_eq!(frame.point_light_count, 0);
        assert!(frame.shadow_casters.is_empty());
        assert!(!frame.sun_present);
        // The disabled sun record is still uploaded once.
        assert_eq!(frame.uploads.len(), 1);
        assert!(fx.prepare().uploads.is_empty());
    }

    #[test]
    fn test_lights_are_partitioned_by_shadow_casting() {
        let mut fx = Fixture::new();
        fx.scene
            .add_point_light(PointLight::new(Vec3::ZERO, Vec3::ONE, 0.125));
        let caster = fx
            .scene
            .add_point_light(PointLight::new(Vec3::X, Vec3::ONE, 0.125).with_shadows());
        let frame = fx.prepare();

        assert_eq!(frame.point_light_count, 1);
        assert_eq!(frame.shadow_casters, vec![caster]);
        let pos_rad = upload_of(&frame, FrameResource::PointLightsPosRad).expect("uploaded");
        let record: GpuPointLightPosRad =
            bytemuck::pod_read_unaligned(&pos_rad.bytes[..size_of::<GpuPointLightPosRad>()]);
        assert!((record.radius - 5.0).abs() < 1e-3);
        let shadow = upload_of(&frame, FrameResource::ShadowPointLights).expect("uploaded");
        assert_eq!(shadow.bytes.len(), size_of::<GpuShadowPointLightData>());
    }

    #[test]
    fn test_casters_over_the_limit_are_demoted() {
        let mut fx = Fixture::new();
        fx.settings.max_point_light_shadows = 2;
        let handles: Vec<_> = (0..4)
            .map(|i| {
                fx.scene.add_point_light(
                    PointLight::new(Vec3::new(i as f32, 0.0, 0.0), Vec3::ONE, 1.0).with_shadows(),
                )
            })
            .collect();
        let frame = fx.prepare();
        assert_eq!(frame.shadow_casters, handles[..2].to_vec());
        assert_eq!(frame.demoted_casters, 2);
        assert_eq!(frame.point_light_count, 2);
    }

    #[test]
    fn test_buffers_grow_past_initial_capacity() {
        let mut fx = Fixture::new();
        for i in 0..300 {
            fx.scene
                .add_point_light(PointLight::new(Vec3::new(i as f32, 0.0, 0.0), Vec3::ONE, 1.0));
        }
        let before = fx
            .resources
            .buffer(FrameResource::PointLights)
            .expect("registered");
        let frame = fx.prepare();
        assert_eq!(frame.point_light_count, 300);

        let buffer = fx.setup.buffer(FrameResource::PointLights).expect("buffer");
        assert_eq!(buffer.reallocations(), 1);
        assert!(buffer.capacity() >= 300 * 16);
        assert_ne!(fx.resources.buffer(FrameResource::PointLights).ok(), Some(before));

        fx.prepare();
        assert_eq!(
            fx.setup
                .buffer(FrameResource::PointLights)
                .map(|b| b.reallocations()),
            Some(1)
        );
    }

    #[test]
    fn test_directional_uploads_only_when_changed() {
        let mut fx = Fixture::new();
        fx.scene.set_directional_light(Some(DirectionalLight::default()));
        let first = fx.prepare();
        assert!(upload_of(&first, FrameResource::DirectionalLightBuffer).is_some());
        assert!(upload_of(&first, FrameResource::CascadeInputBuffer).is_some());

        let second = fx.prepare();
        assert!(upload_of(&second, FrameResource::DirectionalLightBuffer).is_none());
        assert!(upload_of(&second, FrameResource::CascadeInputBuffer).is_none());

        fx.scene.set_directional_light(Some(DirectionalLight {
            intensity: 10.0,
            ..Default::default()
        }));
        let third = fx.prepare();
        assert!(upload_of(&third, FrameResource::DirectionalLightBuffer).is_some());
    }

    #[test]
    fn test_cpu_cascades_without_gpu_pass() {
        let mut fx = Fixture::new();
        fx.settings.gpu_cascades = false;
        fx.settings.cascade_count = 3;
        fx.scene.set_directional_light(Some(DirectionalLight::default()));
        let frame = fx.prepare();
        assert_eq!(frame.cascade_count, 3);
        assert_eq!(frame.cpu_cascades.cascades.len(), 3);
        assert!(upload_of(&frame, FrameResource::CascadeInputBuffer).is_none());

        fx.settings.sun_shadows = false;
        let frame = fx.prepare();
        assert_eq!(frame.cascade_count, 0);
        assert!(frame.cpu_cascades.cascades.is_empty());
    }
}

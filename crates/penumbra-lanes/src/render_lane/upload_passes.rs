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

//! Passes that only write per-frame constant and structured buffers.
//!
//! Every write follows the same dance: home state to `CopyDest`, write, back home.
//! A buffer is never written while still bound for shader reads.

use super::{FramePass, FrameResource, FrameResources, PassContext, PassDeclaration, PrepareContext};
use ahash::AHashMap;
use penumbra_core::math::{Mat4, Vec2};
use penumbra_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, GraphicsDevice, RenderError, ResourceState,
};
use penumbra_data::{AssetHandle, Camera, MaterialConstants};
use std::borrow::Cow;

/// Camera constants of one frame.
///
/// # Memory Layout
///
/// 368 bytes. Matrices are column-major.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCameraData {
    /// World to view.
    pub view: [[f32; 4]; 4],
    /// View to clip, jittered when temporal AA is on.
    pub projection: [[f32; 4]; 4],
    /// `projection * view`.
    pub view_projection: [[f32; 4]; 4],
    /// Inverse of `view_projection`.
    pub inverse_view_projection: [[f32; 4]; 4],
    /// Unjittered view-projection of the previous frame, for motion vectors.
    pub previous_view_projection: [[f32; 4]; 4],
    /// World-space eye position.
    pub position: [f32; 3],
    /// Near plane distance.
    pub near: f32,
    /// Sub-pixel jitter in pixels.
    pub jitter: [f32; 2],
    /// Output size in pixels.
    pub screen_size: [f32; 2],
    /// Far plane distance.
    pub far: f32,
    /// Frame counter, wrapping.
    pub frame_index: u32,
    /// Padding to 16-byte alignment.
    pub _padding: [u32; 2],
}

impl GpuCameraData {
    /// Builds the constants of `camera` for a `width` x `height` output.
    ///
    /// # Arguments
    ///
    /// * `jitter` - Sub-pixel projection offset, zero without temporal AA.
    /// * `previous_view_projection` - Last frame's unjittered view-projection. The
    ///   current one is used on the first frame.
    pub fn new(
        camera: &Camera,
        jitter: Vec2,
        previous_view_projection: Option<Mat4>,
        width: u32,
        height: u32,
        frame_index: u64,
    ) -> Self {
        let projection = camera.jittered_projection(jitter, width, height);
        let view_projection = projection * camera.view;
        let previous = previous_view_projection.unwrap_or_else(|| camera.view_projection());
        Self {
            view: camera.view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            view_projection: view_projection.to_cols_array_2d(),
            inverse_view_projection: view_projection
                .inverse()
                .unwrap_or(Mat4::IDENTITY)
                .to_cols_array_2d(),
            previous_view_projection: previous.to_cols_array_2d(),
            position: camera.position.to_array(),
            near: camera.near,
            jitter: [jitter.x, jitter.y],
            screen_size: [width as f32, height as f32],
            far: camera.far,
            frame_index: frame_index as u32,
            _padding: [0; 2],
        }
    }
}

fn write_buffer(
    ctx: &mut PassContext<'_>,
    resource: FrameResource,
    bytes: &[u8],
) -> Result<(), RenderError> {
    let buffer = ctx.buffer(resource)?;
    let home = resource.home_state();
    ctx.transition(resource, home, ResourceState::CopyDest)?;
    ctx.encoder.update_buffer(buffer, 0, bytes);
    ctx.transition(resource, ResourceState::CopyDest, home)
}

/// Records the light uploads queued by the light setup.
#[derive(Debug, Default)]
pub struct LightBuffersPass;

impl LightBuffersPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self
    }
}

impl FramePass for LightBuffersPass {
    fn name(&self) -> &'static str {
        "LightBuffers"
    }

    fn declaration(&self) -> PassDeclaration {
        use FrameResource::*;
        [
            PointLights,
            PointLightsPosRad,
            ShadowPointLights,
            ShadowPointLightsPosRad,
            DirectionalLightBuffer,
            CascadeInputBuffer,
        ]
        .into_iter()
        .fold(PassDeclaration::new(), |declaration, resource| {
            declaration.uses(resource, resource.home_state())
        })
    }

    fn on_initialize(
        &mut self,
        _device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let lights = ctx.inputs.lights;
        for upload in &lights.uploads {
            if !upload.bytes.is_empty() {
                write_buffer(ctx, upload.resource, &upload.bytes)?;
            }
        }
        Ok(())
    }
}

/// Uploads the camera constants.
#[derive(Debug, Default)]
pub struct CameraBufferPass;

impl CameraBufferPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self
    }
}

impl FramePass for CameraBufferPass {
    fn name(&self) -> &'static str {
        "CameraBuffer"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new().uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn on_initialize(
        &mut self,
        _device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let camera = ctx.inputs.camera;
        write_buffer(ctx, FrameResource::CameraBuffer, bytemuck::bytes_of(camera))
    }
}

#[derive(Debug, Clone, Copy)]
struct MaterialBuffer {
    buffer: BufferId,
    uploaded_revision: Option<u64>,
}

/// Keeps one constant buffer per material and re-uploads the ones whose revision
/// changed.
///
/// Buffers are registered in the frame resources as
/// [`FrameResource::MaterialConstants`], which also own their destruction.
#[derive(Debug, Default)]
pub struct MaterialBuffersPass {
    buffers: AHashMap<u32, MaterialBuffer>,
    dirty: Vec<u32>,
}

impl MaterialBuffersPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of material buffers alive.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

impl FramePass for MaterialBuffersPass {
    fn name(&self) -> &'static str {
        "MaterialBuffers"
    }

    // Material buffers come and go with the assets, so they are not part of the
    // static schedule. Every write returns them home.
    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
    }

    fn on_initialize(
        &mut self,
        _device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), RenderError> {
        let materials = &ctx.inputs.assets.materials;

        // 1. Retire buffers of removed materials
        let removed: Vec<u32> = self
            .buffers
            .keys()
            .copied()
            .filter(|id| !materials.contains(AssetHandle::from_raw(*id)))
            .collect();
        for id in removed {
            let resource = FrameResource::MaterialConstants(id);
            if let Some(entry) = self.buffers.remove(&id) {
                ctx.resources.remove_buffer(resource);
                ctx.states.unregister(resource);
                if let Err(e) = ctx.device.destroy_buffer(entry.buffer) {
                    log::warn!("MaterialBuffers: failed to destroy buffer of material {id}: {e}");
                }
            }
        }

        // 2. Create buffers for new materials and collect stale ones
        self.dirty.clear();
        for (handle, material) in materials.iter() {
            let id = handle.id();
            let entry = match self.buffers.get(&id) {
                Some(entry) => *entry,
                None => {
                    let resource = FrameResource::MaterialConstants(id);
                    let buffer = ctx.device.create_buffer(&BufferDescriptor {
                        label: Some(Cow::Owned(format!("{resource:?}"))),
                        size: std::mem::size_of::<MaterialConstants>() as u64,
                        stride: 0,
                        usage: BufferUsage::CONSTANT | BufferUsage::COPY_DST,
                        initial_state: resource.home_state(),
                    })?;
                    ctx.resources.replace_buffer(resource, buffer);
                    ctx.states.register(resource);
                    let entry = MaterialBuffer {
                        buffer,
                        uploaded_revision: None,
                    };
                    self.buffers.insert(id, entry);
                    entry
                }
            };
            if entry.uploaded_revision != Some(material.revision()) {
                self.dirty.push(id);
            }
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let materials = &ctx.inputs.assets.materials;
        for id in std::mem::take(&mut self.dirty) {
            let Some(material) = materials.get(AssetHandle::from_raw(id)) else {
                continue;
            };
            write_buffer(
                ctx,
                FrameResource::MaterialConstants(id),
                bytemuck::bytes_of(material.constants()),
            )?;
            if let Some(entry) = self.buffers.get_mut(&id) {
                entry.uploaded_revision = Some(material.revision());
            }
        }
        Ok(())
    }

    fn on_shutdown(&mut self, _device: &dyn GraphicsDevice) {
        self.buffers.clear();
        self.dirty.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use penumbra_core::math::{Vec3, FRAC_PI_2};

    #[test]
    fn test_camera_data_layout() {
        assert_eq!(std::mem::size_of::<GpuCameraData>(), 368);
    }

    #[test]
    fn test_camera_data_without_jitter() {
        let camera = Camera::look_at(
            Vec3::new(0.0, 2.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            FRAC_PI_2,
            16.0 / 9.0,
            0.1,
            100.0,
        )
        .expect("valid camera");
        let data = GpuCameraData::new(&camera, Vec2::ZERO, None, 1920, 1080, 0);
        assert_eq!(data.view_projection, camera.view_projection().to_cols_array_2d());
        assert_eq!(data.previous_view_projection, data.view_projection);
        assert_eq!(data.screen_size, [1920.0, 1080.0]);
        assert_relative_eq!(data.position[1], 2.0);
    }

    #[test]
    fn test_jitter_only_moves_projection() {
        let camera = Camera::default();
        let jitter = Vec2::new(0.25, -0.25);
        let data = GpuCameraData::new(&camera, jitter, None, 100, 100, 7);
        assert_eq!(data.view, camera.view.to_cols_array_2d());
        assert_relative_eq!(data.projection[2][0], camera.projection.cols[2].x + 0.005);
        assert_relative_eq!(data.projection[2][1], camera.projection.cols[2].y - 0.005);
        assert_eq!(data.frame_index, 7);
    }
}

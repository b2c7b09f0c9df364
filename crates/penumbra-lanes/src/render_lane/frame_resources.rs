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

//! Every GPU resource a frame touches, keyed by its role.
//!
//! Size-dependent targets are recreated together on resize. Shadow maps follow the
//! clamped shadow settings. Buffers owned by other components (light records,
//! material constants) are registered here so the state tracker and the schedule see
//! them like any other resource.

use ahash::AHashMap;
use penumbra_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, GraphicsDevice, RenderError, RendererSettings,
    ResourceError, ResourceState, TextureDescriptor, TextureDimension, TextureFormat, TextureId,
    TextureUsage,
};
use penumbra_data::light::POINT_LIGHT_FACE_COUNT;
use std::borrow::Cow;

/// Tile edge of every depth-reduction step.
pub const DEPTH_REDUCTION_TILE: u32 = 16;
/// Pixels covered by one texel of the shading-rate image.
pub const SHADING_RATE_TILE: u32 = 16;

/// The role of a frame resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameResource {
    /// GBuffer base color.
    GBufferAlbedo,
    /// GBuffer packed normals.
    GBufferNormal,
    /// GBuffer roughness, metalness and flags.
    GBufferMaterial,
    /// GBuffer screen-space motion.
    GBufferVelocity,
    /// Scene depth.
    GBufferDepth,
    /// Depth-reduction ping-pong target 0.
    ReducedDepth0,
    /// Depth-reduction ping-pong target 1.
    ReducedDepth1,
    /// SSAO output.
    AmbientOcclusion,
    /// Cube array of point-light shadow maps.
    PointLightShadowMaps,
    /// Array of sun cascade shadow maps.
    CascadeShadowMaps,
    /// Screen-space sun visibility.
    ShadowMask,
    /// Screen-space cascade selection.
    CascadeIndex,
    /// HDR scene color.
    FinalTarget,
    /// Previous resolved frame, for temporal AA.
    TemporalHistory,
    /// Variable-rate-shading image. Only exists when the device supports it.
    ShadingRateImage,
    /// The swapchain image being rendered.
    BackBuffer,
    /// Per-frame camera constants.
    CameraBuffer,
    /// Sun constants.
    DirectionalLightBuffer,
    /// Inputs of the cascade-matrix pass.
    CascadeInputBuffer,
    /// Colors of the non-shadow-casting point lights.
    PointLights,
    /// Positions and radii of the non-shadow-casting point lights.
    PointLightsPosRad,
    /// Records of the shadow-casting point lights.
    ShadowPointLights,
    /// Positions and radii of the shadow-casting point lights.
    ShadowPointLightsPosRad,
    /// One view-projection per cascade.
    CascadeMatrixBuffer,
    /// Far split distance of every cascade.
    CascadeSplitsBuffer,
    /// Constants of the material with the given asset id.
    MaterialConstants(u32),
}

impl FrameResource {
    /// Targets recreated when the output size changes.
    pub const SIZE_DEPENDENT: [FrameResource; 13] = [
        FrameResource::GBufferAlbedo,
        FrameResource::GBufferNormal,
        FrameResource::GBufferMaterial,
        FrameResource::GBufferVelocity,
        FrameResource::GBufferDepth,
        FrameResource::ReducedDepth0,
        FrameResource::ReducedDepth1,
        FrameResource::AmbientOcclusion,
        FrameResource::ShadowMask,
        FrameResource::CascadeIndex,
        FrameResource::FinalTarget,
        FrameResource::TemporalHistory,
        FrameResource::ShadingRateImage,
    ];

    /// The GBuffer color targets, in binding order.
    pub const GBUFFER_COLORS: [FrameResource; 4] = [
        FrameResource::GBufferAlbedo,
        FrameResource::GBufferNormal,
        FrameResource::GBufferMaterial,
        FrameResource::GBufferVelocity,
    ];

    /// The state the resource rests in between frames.
    pub const fn home_state(&self) -> ResourceState {
        use FrameResource::*;
        match self {
            GBufferAlbedo | GBufferNormal | GBufferMaterial | GBufferVelocity => {
                ResourceState::NonPixelShaderResource
            }
            GBufferDepth | PointLightShadowMaps | FinalTarget => {
                ResourceState::PixelShaderResource
            }
            ReducedDepth0 | ReducedDepth1 | AmbientOcclusion | CascadeShadowMaps | ShadowMask
            | CascadeIndex | TemporalHistory => ResourceState::NonPixelShaderResource,
            ShadingRateImage => ResourceState::ShadingRateSource,
            BackBuffer => ResourceState::Present,
            CameraBuffer | DirectionalLightBuffer | CascadeInputBuffer | MaterialConstants(_) => {
                ResourceState::ConstantBuffer
            }
            PointLights | PointLightsPosRad | ShadowPointLights | ShadowPointLightsPosRad
            | CascadeMatrixBuffer | CascadeSplitsBuffer => ResourceState::NonPixelShaderResource,
        }
    }

    /// Returns `true` for textures, `false` for buffers.
    pub const fn is_texture(&self) -> bool {
        use FrameResource::*;
        !matches!(
            self,
            CameraBuffer
                | DirectionalLightBuffer
                | CascadeInputBuffer
                | PointLights
                | PointLightsPosRad
                | ShadowPointLights
                | ShadowPointLightsPosRad
                | CascadeMatrixBuffer
                | CascadeSplitsBuffer
                | MaterialConstants(_)
        )
    }
}

/// Sizes of the depth-reduction chain for a `width` x `height` depth buffer.
///
/// Each step divides by [`DEPTH_REDUCTION_TILE`], rounding up, until a single texel
/// remains.
pub fn reduction_chain(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut chain = Vec::new();
    let (mut w, mut h) = (width.max(1), height.max(1));
    loop {
        w = w.div_ceil(DEPTH_REDUCTION_TILE);
        h = h.div_ceil(DEPTH_REDUCTION_TILE);
        chain.push((w, h));
        if w == 1 && h == 1 {
            return chain;
        }
    }
}

/// Shadow-map dimensions derived from the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMapLayout {
    /// Edge of each cascade layer.
    pub cascade_size: u32,
    /// Number of cascade layers.
    pub cascade_count: u32,
    /// Edge of each point-light cube face.
    pub point_light_size: u32,
    /// Cube maps in the point-light array.
    pub point_light_capacity: u32,
}

impl ShadowMapLayout {
    /// The layout requested by `settings`, after clamping.
    pub fn from_settings(settings: &RendererSettings) -> Self {
        Self {
            cascade_size: settings.clamped_cascade_size(),
            cascade_count: settings.clamped_cascade_count(),
            point_light_size: settings.clamped_point_light_shadow_size(),
            point_light_capacity: settings.max_point_light_shadows.max(1),
        }
    }
}

fn texture_descriptor(
    resource: FrameResource,
    width: u32,
    height: u32,
    shadows: Option<&ShadowMapLayout>,
) -> Option<TextureDescriptor<'static>> {
    use FrameResource::*;
    let sampled = TextureUsage::SHADER_RESOURCE;
    let (w, h, layers, format, dimension, usage) = match resource {
        GBufferAlbedo | GBufferMaterial => (
            width,
            height,
            1,
            TextureFormat::Rgba8Unorm,
            TextureDimension::D2,
            sampled | TextureUsage::RENDER_TARGET,
        ),
        GBufferNormal => (
            width,
            height,
            1,
            TextureFormat::Rgb10A2Unorm,
            TextureDimension::D2,
            sampled | TextureUsage::RENDER_TARGET,
        ),
        GBufferVelocity => (
            width,
            height,
            1,
            TextureFormat::Rg16Float,
            TextureDimension::D2,
            sampled | TextureUsage::RENDER_TARGET,
        ),
        GBufferDepth => (
            width,
            height,
            1,
            TextureFormat::Depth32Float,
            TextureDimension::D2,
            sampled | TextureUsage::DEPTH_STENCIL,
        ),
        ReducedDepth0 | ReducedDepth1 => {
            let (w, h) = reduction_chain(width, height)[0];
            (
                w,
                h,
                1,
                TextureFormat::Rg32Float,
                TextureDimension::D2,
                sampled | TextureUsage::UNORDERED_ACCESS,
            )
        }
        AmbientOcclusion | ShadowMask => (
            width,
            height,
            1,
            TextureFormat::R8Unorm,
            TextureDimension::D2,
            sampled | TextureUsage::UNORDERED_ACCESS,
        ),
        CascadeIndex => (
            width,
            height,
            1,
            TextureFormat::R8Uint,
            TextureDimension::D2,
            sampled | TextureUsage::UNORDERED_ACCESS,
        ),
        FinalTarget => (
            width,
            height,
            1,
            TextureFormat::Rgba16Float,
            TextureDimension::D2,
            sampled
                | TextureUsage::UNORDERED_ACCESS
                | TextureUsage::RENDER_TARGET
                | TextureUsage::COPY,
        ),
        TemporalHistory => (
            width,
            height,
            1,
            TextureFormat::Rgba16Float,
            TextureDimension::D2,
            sampled | TextureUsage::COPY,
        ),
        ShadingRateImage => (
            width.div_ceil(SHADING_RATE_TILE),
            height.div_ceil(SHADING_RATE_TILE),
            1,
            TextureFormat::R8Uint,
            TextureDimension::D2,
            TextureUsage::SHADING_RATE | TextureUsage::UNORDERED_ACCESS,
        ),
        PointLightShadowMaps => {
            let shadows = shadows?;
            (
                shadows.point_light_size,
                shadows.point_light_size,
                shadows.point_light_capacity * POINT_LIGHT_FACE_COUNT as u32,
                TextureFormat::Depth32Float,
                TextureDimension::CubeArray,
                sampled | TextureUsage::DEPTH_STENCIL,
            )
        }
        CascadeShadowMaps => {
            let shadows = shadows?;
            (
                shadows.cascade_size,
                shadows.cascade_size,
                shadows.cascade_count,
                TextureFormat::Depth32Float,
                TextureDimension::D2,
                sampled | TextureUsage::DEPTH_STENCIL,
            )
        }
        _ => return None,
    };

    Some(TextureDescriptor {
        label: Some(Cow::Owned(format!("{resource:?}"))),
        width: w,
        height: h,
        array_layers: layers,
        mip_levels: 1,
        format,
        dimension,
        usage,
        initial_state: resource.home_state(),
    })
}

/// Per-frame constant buffers with a fixed size, created with the frame resources.
fn fixed_buffer_descriptor(resource: FrameResource) -> Option<BufferDescriptor<'static>> {
    use crate::light_lane::{
        GpuCascadeInputs, GpuCascadeMatrices, GpuCascadeSplits, GpuDirectionalLight,
    };
    use crate::render_lane::GpuCameraData;
    use FrameResource::*;

    let constant = BufferUsage::CONSTANT | BufferUsage::COPY_DST;
    let (size, stride, usage) = match resource {
        CameraBuffer => (std::mem::size_of::<GpuCameraData>(), 0, constant),
        DirectionalLightBuffer => (std::mem::size_of::<GpuDirectionalLight>(), 0, constant),
        CascadeInputBuffer => (std::mem::size_of::<GpuCascadeInputs>(), 0, constant),
        CascadeMatrixBuffer => (
            std::mem::size_of::<GpuCascadeMatrices>(),
            64,
            BufferUsage::STRUCTURED | BufferUsage::UNORDERED_ACCESS | BufferUsage::COPY_DST,
        ),
        CascadeSplitsBuffer => (
            std::mem::size_of::<GpuCascadeSplits>(),
            4,
            BufferUsage::STRUCTURED | BufferUsage::UNORDERED_ACCESS | BufferUsage::COPY_DST,
        ),
        _ => return None,
    };

    Some(BufferDescriptor {
        label: Some(Cow::Owned(format!("{resource:?}"))),
        size: size as u64,
        stride,
        usage,
        initial_state: resource.home_state(),
    })
}

/// Destroys every texture in `textures`, logging failures.
fn destroy_textures(
    device: &dyn GraphicsDevice,
    textures: impl IntoIterator<Item = (FrameResource, TextureId)>,
) {
    for (resource, id) in textures {
        if let Err(e) = device.destroy_texture(id) {
            log::warn!("FrameResources: failed to destroy {resource:?}: {e}");
        }
    }
}

/// The resources of the frame.
#[derive(Debug, Default)]
pub struct FrameResources {
    textures: AHashMap<FrameResource, TextureId>,
    buffers: AHashMap<FrameResource, BufferId>,
    width: u32,
    height: u32,
    shadow_layout: Option<ShadowMapLayout>,
    shading_rate_image: bool,
}

impl FrameResources {
    /// Creates every size-dependent target, the shadow maps and the fixed constant
    /// buffers.
    ///
    /// # Arguments
    ///
    /// * `shading_rate_image` - Whether to allocate the variable-rate-shading image.
    ///
    /// # Returns
    ///
    /// [`RenderError::InitializationFailed`] if any creation fails. Nothing is leaked.
    pub fn create(
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
        settings: &RendererSettings,
        shading_rate_image: bool,
    ) -> Result<Self, RenderError> {
        log::info!("FrameResources: Creating {width}x{height} frame resources...");
        let mut resources = Self {
            shading_rate_image,
            ..Default::default()
        };
        match resources.populate(device, width, height, settings) {
            Ok(()) => Ok(resources),
            Err(e) => {
                resources.destroy_all(device);
                Err(RenderError::InitializationFailed(format!("FrameResources: {e}")))
            }
        }
    }

    fn populate(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
        settings: &RendererSettings,
    ) -> Result<(), RenderError> {
        self.textures
            .insert(FrameResource::BackBuffer, device.current_back_buffer());
        let created = self.create_sized(device, width, height)?;
        self.textures.extend(created);
        self.width = width;
        self.height = height;
        self.ensure_shadow_maps(device, settings)?;
        self.create_fixed_buffers(device)
    }

    fn create_sized(
        &self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<Vec<(FrameResource, TextureId)>, ResourceError> {
        let mut created = Vec::with_capacity(FrameResource::SIZE_DEPENDENT.len());
        for resource in FrameResource::SIZE_DEPENDENT {
            if resource == FrameResource::ShadingRateImage && !self.shading_rate_image {
                continue;
            }
            let Some(descriptor) = texture_descriptor(resource, width, height, None) else {
                continue;
            };
            match device.create_texture(&descriptor) {
                Ok(id) => created.push((resource, id)),
                Err(e) => {
                    destroy_textures(device, created);
                    return Err(e);
                }
            }
        }
        Ok(created)
    }

    fn create_fixed_buffers(&mut self, device: &dyn GraphicsDevice) -> Result<(), RenderError> {
        use FrameResource::*;
        for resource in [
            CameraBuffer,
            DirectionalLightBuffer,
            CascadeInputBuffer,
            CascadeMatrixBuffer,
            CascadeSplitsBuffer,
        ] {
            if let Some(descriptor) = fixed_buffer_descriptor(resource) {
                let id = device.create_buffer(&descriptor)?;
                self.buffers.insert(resource, id);
            }
        }
        Ok(())
    }

    /// Recreates every size-dependent target at `width` x `height`.
    ///
    /// The new targets are created first. If any creation fails they are destroyed,
    /// the current ones are kept and [`RenderError::ResizeFailed`] is returned.
    pub fn resize(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        let staged = self
            .create_sized(device, width, height)
            .map_err(|e| RenderError::ResizeFailed {
                width,
                height,
                reason: e.to_string(),
            })?;

        let retired: Vec<_> = staged
            .iter()
            .filter_map(|(resource, _)| self.textures.get(resource).map(|id| (*resource, *id)))
            .collect();
        destroy_textures(device, retired);
        self.textures.extend(staged);
        self.width = width;
        self.height = height;
        log::debug!("FrameResources: resized to {width}x{height}");
        Ok(())
    }

    /// Recreates the shadow maps when the clamped sizes or layer counts requested by
    /// `settings` differ from the allocated ones.
    ///
    /// Like [`FrameResources::resize`], the new maps are created first and only swapped
    /// in once every creation succeeded. On failure the current maps and layout stay.
    ///
    /// # Returns
    ///
    /// The resources that were recreated. They are at their home state.
    pub fn ensure_shadow_maps(
        &mut self,
        device: &dyn GraphicsDevice,
        settings: &RendererSettings,
    ) -> Result<Vec<FrameResource>, RenderError> {
        let wanted = ShadowMapLayout::from_settings(settings);
        let current = self.shadow_layout;

        let cascade_changed = current.map_or(true, |c| {
            c.cascade_size != wanted.cascade_size || c.cascade_count != wanted.cascade_count
        });
        let point_changed = current.map_or(true, |c| {
            c.point_light_size != wanted.point_light_size
                || c.point_light_capacity != wanted.point_light_capacity
        });

        let mut staged: Vec<(FrameResource, TextureId)> = Vec::new();
        for (resource, changed) in [
            (FrameResource::CascadeShadowMaps, cascade_changed),
            (FrameResource::PointLightShadowMaps, point_changed),
        ] {
            if !changed {
                continue;
            }
            let Some(descriptor) =
                texture_descriptor(resource, self.width, self.height, Some(&wanted))
            else {
                continue;
            };
            match device.create_texture(&descriptor) {
                Ok(id) => {
                    log::debug!(
                        "FrameResources: {resource:?} is now {}x{} with {} layers",
                        descriptor.width,
                        descriptor.height,
                        descriptor.array_layers
                    );
                    staged.push((resource, id));
                }
                Err(e) => {
                    log::error!("FrameResources: failed to recreate {resource:?}: {e}");
                    destroy_textures(device, staged);
                    return Err(e.into());
                }
            }
        }

        let mut recreated = Vec::with_capacity(staged.len());
        for (resource, id) in staged {
            if let Some(old) = self.textures.insert(resource, id) {
                destroy_textures(device, [(resource, old)]);
            }
            recreated.push(resource);
        }
        self.shadow_layout = Some(wanted);
        Ok(recreated)
    }

    /// Registers or replaces a buffer owned by another component.
    ///
    /// # Returns
    ///
    /// The previous buffer, which the caller must destroy.
    pub fn replace_buffer(
        &mut self,
        resource: FrameResource,
        buffer: BufferId,
    ) -> Option<BufferId> {
        self.buffers.insert(resource, buffer)
    }

    /// Unregisters a buffer owned by another component and returns it.
    pub fn remove_buffer(&mut self, resource: FrameResource) -> Option<BufferId> {
        self.buffers.remove(&resource)
    }

    /// Points [`FrameResource::BackBuffer`] at the swapchain's current image.
    pub fn set_back_buffer(&mut self, texture: TextureId) {
        self.textures.insert(FrameResource::BackBuffer, texture);
    }

    /// Returns `true` if `resource` currently exists.
    pub fn contains(&self, resource: FrameResource) -> bool {
        if resource.is_texture() {
            self.textures.contains_key(&resource)
        } else {
            self.buffers.contains_key(&resource)
        }
    }

    /// The texture bound to `resource`.
    pub fn texture(&self, resource: FrameResource) -> Result<TextureId, RenderError> {
        self.textures.get(&resource).copied().ok_or_else(|| {
            RenderError::InternalInvariantViolation(format!(
                "frame texture {resource:?} does not exist"
            ))
        })
    }

    /// The buffer bound to `resource`.
    pub fn buffer(&self, resource: FrameResource) -> Result<BufferId, RenderError> {
        self.buffers.get(&resource).copied().ok_or_else(|| {
            RenderError::InternalInvariantViolation(format!(
                "frame buffer {resource:?} does not exist"
            ))
        })
    }

    /// Every resource that currently exists, in a stable order.
    pub fn live(&self) -> Vec<FrameResource> {
        let mut live: Vec<_> = self.textures.keys().chain(self.buffers.keys()).copied().collect();
        live.sort_unstable();
        live
    }

    /// Output width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The allocated shadow-map layout.
    pub fn shadow_layout(&self) -> Option<ShadowMapLayout> {
        self.shadow_layout
    }

    /// Sizes of the depth-reduction steps at the current output size.
    pub fn reduction_chain(&self) -> Vec<(u32, u32)> {
        reduction_chain(self.width, self.height)
    }

    /// Destroys every owned texture and buffer. The back buffer belongs to the
    /// swapchain and is only forgotten.
    pub fn destroy_all(&mut self, device: &dyn GraphicsDevice) {
        self.textures.remove(&FrameResource::BackBuffer);
        destroy_textures(device, self.textures.drain());
        for (resource, id) in self.buffers.drain() {
            if let Err(e) = device.destroy_buffer(id) {
                log::warn!("FrameResources: failed to destroy {resource:?}: {e}");
            }
        }
        self.shadow_layout = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_infra::HeadlessDevice;

    #[test]
    fn test_reduction_chain_1080p() {
        assert_eq!(reduction_chain(1920, 1080), vec![(120, 68), (8, 5), (1, 1)]);
        assert_eq!(reduction_chain(16, 16), vec![(1, 1)]);
        assert_eq!(reduction_chain(1, 1), vec![(1, 1)]);
    }

    #[test]
    fn test_home_states() {
        assert_eq!(
            FrameResource::GBufferAlbedo.home_state(),
            ResourceState::NonPixelShaderResource
        );
        assert_eq!(FrameResource::GBufferDepth.home_state(), ResourceState::PixelShaderResource);
        assert_eq!(FrameResource::BackBuffer.home_state(), ResourceState::Present);
        assert_eq!(
            FrameResource::MaterialConstants(3).home_state(),
            ResourceState::ConstantBuffer
        );
        assert!(!FrameResource::PointLights.is_texture());
        assert!(FrameResource::ShadingRateImage.is_texture());
    }

    #[test]
    fn test_create_allocates_everything() {
        let device = HeadlessDevice::new(320, 200);
        let settings = RendererSettings::default();
        let resources = FrameResources::create(&device, 320, 200, &settings, false)
            .expect("frame resources");
        assert!(resources.contains(FrameResource::GBufferDepth));
        assert!(resources.contains(FrameResource::CascadeShadowMaps));
        assert!(resources.contains(FrameResource::CameraBuffer));
        assert!(!resources.contains(FrameResource::ShadingRateImage));
        assert!(resources.texture(FrameResource::ShadingRateImage).is_err());
        assert_eq!(
            resources.shadow_layout().map(|l| l.cascade_size),
            Some(settings.clamped_cascade_size())
        );
    }

    #[test]
    fn test_failed_resize_keeps_previous_targets() {
        let device = HeadlessDevice::new(320, 200);
        let mut resources =
            FrameResources::create(&device, 320, 200, &RendererSettings::default(), false)
                .expect("frame resources");
        let depth = resources.texture(FrameResource::GBufferDepth).expect("depth");
        let live_before = device.live_texture_count();

        device.set_max_texture_dimension(1024);
        let err = resources.resize(&device, 4096, 200).expect_err("too large");
        assert!(matches!(err, RenderError::ResizeFailed { width: 4096, .. }));
        assert_eq!(resources.width(), 320);
        assert_eq!(resources.texture(FrameResource::GBufferDepth).ok(), Some(depth));
        assert_eq!(device.live_texture_count(), live_before);

        resources.resize(&device, 640, 400).expect("resize");
        assert_eq!(resources.width(), 640);
        assert_ne!(resources.texture(FrameResource::GBufferDepth).ok(), Some(depth));
        assert_eq!(device.live_texture_count(), live_before);
    }

    #[test]
    fn test_shadow_maps_follow_settings() {
        let device = HeadlessDevice::new(64, 64);
        let mut settings = RendererSettings::default();
        let mut resources =
            FrameResources::create(&device, 64, 64, &settings, false).expect("frame resources");

        assert!(resources.ensure_shadow_maps(&device, &settings).expect("ensure").is_empty());

        settings.cascade_size = 1000;
        let recreated = resources.ensure_shadow_maps(&device, &settings).expect("ensure");
        assert_eq!(recreated, vec![FrameResource::CascadeShadowMaps]);
        assert_eq!(resources.shadow_layout().map(|l| l.cascade_size), Some(1024));
    }

    #[test]
    fn test_failed_shadow_map_change_keeps_both_maps() {
        let device = HeadlessDevice::new(64, 64);
        let mut settings = RendererSettings::default();
        let mut resources =
            FrameResources::create(&device, 64, 64, &settings, false).expect("frame resources");
        let layout = resources.shadow_layout();
        let cascades = resources.texture(FrameResource::CascadeShadowMaps).expect("cascades");
        let points = resources.texture(FrameResource::PointLightShadowMaps).expect("points");
        let live_before = device.live_texture_count();

        // The cascade map still fits, the point-light map does not.
        device.set_max_texture_dimension(1024);
        settings.cascade_size = 512;
        settings.point_light_shadow_size = 2048;
        assert!(resources.ensure_shadow_maps(&device, &settings).is_err());
        assert_eq!(resources.shadow_layout(), layout);
        assert_eq!(resources.texture(FrameResource::CascadeShadowMaps).ok(), Some(cascades));
        assert_eq!(resources.texture(FrameResource::PointLightShadowMaps).ok(), Some(points));
        assert_eq!(device.live_texture_count(), live_before);

        settings.point_light_shadow_size = 1024;
        let recreated = resources.ensure_shadow_maps(&device, &settings).expect("ensure");
        assert_eq!(
            recreated,
            vec![FrameResource::CascadeShadowMaps, FrameResource::PointLightShadowMaps]
        );
        assert_eq!(device.live_texture_count(), live_before);
    }

    #[test]
    fn test_destroy_all_releases_everything() {
        let device = HeadlessDevice::new(64, 64);
        let mut resources =
            FrameResources::create(&device, 64, 64, &RendererSettings::default(), true)
                .expect("frame resources");
        resources.destroy_all(&device);
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_buffer_count(), 0);
        assert!(resources.live().is_empty());
    }
}

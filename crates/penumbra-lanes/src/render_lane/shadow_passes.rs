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

//! Point-light cube shadows, sun cascades and the screen-space shadow mask.

use super::draw::{
    compute_pipeline, depth_only_descriptor, destroy_compute_pipeline, destroy_graphics_pipeline,
    draw_batches, initialized, prepare_material_pipelines, BatchDraw,
};
use super::{
    FramePass, FrameResource, FrameResources, PassContext, PassDeclaration, PipelineCache,
    PipelineKey, PrepareContext,
};
use crate::visibility_lane::{MeshBatch, PointLightBatches};
use penumbra_data::light::POINT_LIGHT_FACE_COUNT;
use penumbra_core::renderer::{
    ComputePassDescriptor, ComputePipelineId, DepthAttachment, GraphicsDevice, GraphicsPipelineId,
    LoadOp, PointLightShadowMode, RenderError, RenderPassDescriptor, RendererSettings,
    ResourceBinding, ResourceState, ShaderProgram, TextureId, TileSize,
};
use std::borrow::Cow;

/// Binding slot of the per-view matrices read by the shadow vertex shaders.
pub const SHADOW_VIEWS_SLOT: u32 = 0;

const CUBE_GROUP_FACES: u32 = 3;

fn mode_index(mode: PointLightShadowMode) -> usize {
    match mode {
        PointLightShadowMode::SinglePass => 0,
        PointLightShadowMode::TwoPass => 1,
        PointLightShadowMode::MultiPass => 2,
    }
}

fn mode_defines(mode: PointLightShadowMode) -> &'static [&'static str] {
    match mode {
        PointLightShadowMode::SinglePass => &["SINGLE_PASS"],
        PointLightShadowMode::TwoPass => &["TWO_PASS"],
        PointLightShadowMode::MultiPass => &[],
    }
}

/// One render pass of the point-light shadow pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeShadowView<'b> {
    /// First array layer written.
    pub layer: u32,
    /// Instances per draw, one per face covered.
    pub instances: u32,
    /// Value passed as the view index.
    pub view_index: u32,
    /// What to draw.
    pub batches: &'b [MeshBatch],
}

/// Splits the shadow cube of light `light_index` into render passes for `mode`.
pub fn cube_shadow_views(
    mode: PointLightShadowMode,
    light_index: u32,
    batches: &PointLightBatches,
) -> Vec<CubeShadowView<'_>> {
    let first_layer = light_index * POINT_LIGHT_FACE_COUNT as u32;
    match mode {
        PointLightShadowMode::SinglePass => vec![CubeShadowView {
            layer: first_layer,
            instances: POINT_LIGHT_FACE_COUNT as u32,
            view_index: light_index,
            batches: &batches.single_pass,
        }],
        PointLightShadowMode::TwoPass => (0..2u32)
            .map(|group| CubeShadowView {
                layer: first_layer + group * CUBE_GROUP_FACES,
                instances: CUBE_GROUP_FACES,
                view_index: light_index * 2 + group,
                batches: &batches.two_pass[group as usize],
            })
            .collect(),
        PointLightShadowMode::MultiPass => (0..POINT_LIGHT_FACE_COUNT as u32)
            .map(|face| CubeShadowView {
                layer: first_layer + face,
                instances: 1,
                view_index: first_layer + face,
                batches: &batches.per_face[face as usize],
            })
            .collect(),
    }
}

/// Renders one shadow cube per shadow-casting point light.
#[derive(Debug)]
pub struct PointLightShadowPass {
    pipelines: [PipelineCache<PipelineKey, GraphicsPipelineId>; 3],
}

impl Default for PointLightShadowPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PointLightShadowPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self {
            pipelines: [
                PipelineCache::new("PointLightShadows single-pass"),
                PipelineCache::new("PointLightShadows two-pass"),
                PipelineCache::new("PointLightShadows multi-pass"),
            ],
        }
    }
}

impl FramePass for PointLightShadowPass {
    fn name(&self) -> &'static str {
        "PointLightShadows"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::PointLightShadowMaps, ResourceState::DepthWrite)
            .uses(
                FrameResource::ShadowPointLights,
                ResourceState::NonPixelShaderResource,
            )
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.point_light_shadows_active()
    }

    fn on_initialize(
        &mut self,
        _device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("PointLightShadowPass: Initializing GPU resources...");
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), RenderError> {
        let inputs = ctx.inputs;
        let mode = inputs.settings.point_light_shadow_mode;
        let cache = &mut self.pipelines[mode_index(mode)];

        for (index, handle) in inputs.lights.shadow_casters.iter().enumerate() {
            let Some(batches) = inputs.batches.point_light(*handle) else {
                continue;
            };
            let views = cube_shadow_views(mode, index as u32, batches);
            prepare_material_pipelines(
                ctx.device,
                cache,
                inputs,
                views.iter().flat_map(|view| view.batches),
                |key| {
                    depth_only_descriptor(
                        "PointLightShadows",
                        "PointLightShadow.vs",
                        key,
                        mode_defines(mode),
                    )
                },
            )?;
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let maps = ctx.texture(FrameResource::PointLightShadowMaps)?;
        let records = ctx.buffer(FrameResource::ShadowPointLights)?;
        let inputs = ctx.inputs;
        let mode = inputs.settings.point_light_shadow_mode;
        let pipelines = &self.pipelines[mode_index(mode)];

        for (index, handle) in inputs.lights.shadow_casters.iter().enumerate() {
            let Some(batches) = inputs.batches.point_light(*handle) else {
                log::warn!("PointLightShadowPass: no batches for {handle:?}");
                continue;
            };
            for view in cube_shadow_views(mode, index as u32, batches) {
                let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                    label: Some(Cow::Owned(format!(
                        "PointLightShadow {index} layer {}",
                        view.layer
                    ))),
                    color_attachments: &[],
                    depth_attachment: Some(DepthAttachment {
                        texture: maps,
                        layer: view.layer,
                        load: LoadOp::Clear(1.0),
                        read_only: false,
                    }),
                });
                pass.set_binding(SHADOW_VIEWS_SLOT, ResourceBinding::Buffer(records));

                let draw = BatchDraw {
                    instances: 0..view.instances,
                    ..BatchDraw::single(view.view_index)
                };
                let draws = draw_batches(
                    pass.as_mut(),
                    ctx.resources,
                    inputs,
                    view.batches,
                    &draw,
                    |material| {
                        let key = PipelineKey::from_flags(material.flags());
                        Ok(Some((pipelines.get(key)?, key.depth_only_streams())))
                    },
                )?;
                drop(pass);
                ctx.products.draw_calls += draws;
            }
        }
        Ok(())
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let maps = ctx.texture(FrameResource::PointLightShadowMaps)?;
        ctx.encoder.clear_depth(maps, 1.0);
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        for cache in &mut self.pipelines {
            for pipeline in cache.drain() {
                destroy_graphics_pipeline(device, "PointLightShadowPass", pipeline);
            }
        }
    }
}

/// Fits the sun cascades on the GPU from the reduced depth range.
///
/// When the pass is disabled, or no cascade is rendered, the CPU-fitted cascades of
/// the light frame are uploaded instead so the consumers always find valid data.
#[derive(Debug, Default)]
pub struct CascadeMatricesPass {
    pipeline: Option<ComputePipelineId>,
}

const CASCADE_OUTPUTS: [FrameResource; 2] = [
    FrameResource::CascadeMatrixBuffer,
    FrameResource::CascadeSplitsBuffer,
];

impl CascadeMatricesPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }

    fn upload_cpu_cascades(ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let cascades = &ctx.inputs.lights.cpu_cascades;
        let matrices = cascades.gpu_matrices();
        let splits = cascades.gpu_splits();
        let uploads: [(FrameResource, &[u8]); 2] = [
            (CASCADE_OUTPUTS[0], bytemuck::bytes_of(&matrices)),
            (CASCADE_OUTPUTS[1], bytemuck::bytes_of(&splits)),
        ];
        for (resource, bytes) in uploads {
            let buffer = ctx.buffer(resource)?;
            ctx.transition(
                resource,
                ResourceState::UnorderedAccess,
                ResourceState::CopyDest,
            )?;
            ctx.encoder.update_buffer(buffer, 0, bytes);
            ctx.transition(
                resource,
                ResourceState::CopyDest,
                ResourceState::NonPixelShaderResource,
            )?;
        }
        Ok(())
    }
}

impl FramePass for CascadeMatricesPass {
    fn name(&self) -> &'static str {
        "CascadeMatrices"
    }

    fn declaration(&self) -> PassDeclaration {
        let mut declaration = PassDeclaration::new();
        for resource in CASCADE_OUTPUTS {
            declaration = declaration.access(
                resource,
                ResourceState::UnorderedAccess,
                ResourceState::NonPixelShaderResource,
            );
        }
        declaration
            .uses_all(
                [FrameResource::ReducedDepth0, FrameResource::ReducedDepth1],
                ResourceState::NonPixelShaderResource,
            )
            .uses(FrameResource::CascadeInputBuffer, ResourceState::ConstantBuffer)
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.sun_shadows_active() && settings.gpu_cascades
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("CascadeMatricesPass: Initializing GPU resources...");
        self.pipeline = Some(compute_pipeline(
            device,
            "CascadeMatrices",
            ShaderProgram::new("CascadeMatrices.cs"),
        )?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        if ctx.inputs.lights.cascade_count == 0 {
            return Self::upload_cpu_cascades(ctx);
        }
        let pipeline = initialized(&self.pipeline, self.name())?;
        let inputs = ctx.buffer(FrameResource::CascadeInputBuffer)?;
        let reduced = ctx.texture(if ctx.products.reduced_depth_index == 0 {
            FrameResource::ReducedDepth0
        } else {
            FrameResource::ReducedDepth1
        })?;
        let matrices = ctx.buffer(CASCADE_OUTPUTS[0])?;
        let splits = ctx.buffer(CASCADE_OUTPUTS[1])?;

        {
            let mut pass = ctx.encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some(Cow::Borrowed("CascadeMatrices")),
            });
            pass.set_pipeline(pipeline);
            pass.set_binding(0, ResourceBinding::ConstantBuffer(inputs));
            pass.set_binding(1, ResourceBinding::Texture(reduced));
            pass.set_binding(2, ResourceBinding::StorageBuffer(matrices));
            pass.set_binding(3, ResourceBinding::StorageBuffer(splits));
            pass.dispatch_workgroups(1, 1, 1);
        }
        ctx.products.dispatches += 1;

        for resource in CASCADE_OUTPUTS {
            ctx.transition(
                resource,
                ResourceState::UnorderedAccess,
                ResourceState::NonPixelShaderResource,
            )?;
        }
        Ok(())
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        Self::upload_cpu_cascades(ctx)
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            destroy_compute_pipeline(device, "CascadeMatricesPass", pipeline);
        }
    }
}

/// Renders the directional shadow casters into every sun cascade.
#[derive(Debug)]
pub struct CascadedShadowPass {
    pipelines: PipelineCache<PipelineKey, GraphicsPipelineId>,
}

impl Default for CascadedShadowPass {
    fn default() -> Self {
        Self::new()
    }
}

impl CascadedShadowPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self {
            pipelines: PipelineCache::new("CascadedShadows"),
        }
    }

    fn clear(ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let maps: TextureId = ctx.texture(FrameResource::CascadeShadowMaps)?;
        ctx.encoder.clear_depth(maps, 1.0);
        Ok(())
    }
}

impl FramePass for CascadedShadowPass {
    fn name(&self) -> &'static str {
        "CascadedShadows"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::CascadeShadowMaps, ResourceState::DepthWrite)
            .uses(
                FrameResource::CascadeMatrixBuffer,
                ResourceState::NonPixelShaderResource,
            )
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.sun_shadows_active()
    }

    fn on_initialize(
        &mut self,
        _device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("CascadedShadowPass: Initializing GPU resources...");
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), RenderError> {
        if ctx.inputs.lights.cascade_count == 0 {
            return Ok(());
        }
        prepare_material_pipelines(
            ctx.device,
            &mut self.pipelines,
            ctx.inputs,
            &ctx.inputs.batches.directional,
            |key| depth_only_descriptor("CascadedShadows", "CascadeShadow.vs", key, &[]),
        )
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let cascade_count = ctx.inputs.lights.cascade_count;
        if cascade_count == 0 {
            return Self::clear(ctx);
        }
        let maps = ctx.texture(FrameResource::CascadeShadowMaps)?;
        let matrices = ctx.buffer(FrameResource::CascadeMatrixBuffer)?;
        let inputs = ctx.inputs;
        let pipelines = &self.pipelines;

        for cascade in 0..cascade_count {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(Cow::Owned(format!("CascadedShadow {cascade}"))),
                color_attachments: &[],
                depth_attachment: Some(DepthAttachment {
                    texture: maps,
                    layer: cascade,
                    load: LoadOp::Clear(1.0),
                    read_only: false,
                }),
            });
            pass.set_binding(SHADOW_VIEWS_SLOT, ResourceBinding::Buffer(matrices));
            let draws = draw_batches(
                pass.as_mut(),
                ctx.resources,
                inputs,
                &inputs.batches.directional,
                &BatchDraw::single(cascade),
                |material| {
                    let key = PipelineKey::from_flags(material.flags());
                    Ok(Some((pipelines.get(key)?, key.depth_only_streams())))
                },
            )?;
            drop(pass);
            ctx.products.draw_calls += draws;
        }
        Ok(())
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        Self::clear(ctx)
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        for pipeline in self.pipelines.drain() {
            destroy_graphics_pipeline(device, "CascadedShadowPass", pipeline);
        }
    }
}

const MASK_OUTPUTS: [FrameResource; 2] = [FrameResource::ShadowMask, FrameResource::CascadeIndex];

/// Resolves sun visibility and cascade selection per pixel.
#[derive(Debug, Default)]
pub struct ShadowMaskPass {
    pipeline: Option<ComputePipelineId>,
}

impl ShadowMaskPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }

    fn leave(ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        for resource in MASK_OUTPUTS {
            ctx.transition(
                resource,
                ResourceState::UnorderedAccess,
                ResourceState::NonPixelShaderResource,
            )?;
        }
        Ok(())
    }

    /// Fully lit, cascade 0.
    fn clear(ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let mask = ctx.texture(FrameResource::ShadowMask)?;
        let index = ctx.texture(FrameResource::CascadeIndex)?;
        ctx.encoder.clear_unordered_access(mask, [1.0; 4]);
        ctx.encoder.clear_unordered_access(index, [0.0; 4]);
        Self::leave(ctx)
    }
}

impl FramePass for ShadowMaskPass {
    fn name(&self) -> &'static str {
        "ShadowMask"
    }

    fn declaration(&self) -> PassDeclaration {
        let mut declaration = PassDeclaration::new();
        for resource in MASK_OUTPUTS {
            declaration = declaration.access(
                resource,
                ResourceState::UnorderedAccess,
                ResourceState::NonPixelShaderResource,
            );
        }
        declaration
            .uses_all(
                [
                    FrameResource::GBufferDepth,
                    FrameResource::CascadeShadowMaps,
                    FrameResource::CascadeMatrixBuffer,
                    FrameResource::CascadeSplitsBuffer,
                ],
                ResourceState::NonPixelShaderResource,
            )
            .uses_all(
                [
                    FrameResource::CameraBuffer,
                    FrameResource::DirectionalLightBuffer,
                ],
                ResourceState::ConstantBuffer,
            )
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.shadows && settings.shadow_mask
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("ShadowMaskPass: Initializing GPU resources...");
        self.pipeline = Some(compute_pipeline(
            device,
            "ShadowMask",
            ShaderProgram::new("ShadowMask.cs"),
        )?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        if ctx.inputs.lights.cascade_count == 0 {
            return Self::clear(ctx);
        }
        let pipeline = initialized(&self.pipeline, self.name())?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;
        let sun = ctx.buffer(FrameResource::DirectionalLightBuffer)?;
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        let maps = ctx.texture(FrameResource::CascadeShadowMaps)?;
        let matrices = ctx.buffer(FrameResource::CascadeMatrixBuffer)?;
        let splits = ctx.buffer(FrameResource::CascadeSplitsBuffer)?;
        let mask = ctx.texture(FrameResource::ShadowMask)?;
        let index = ctx.texture(FrameResource::CascadeIndex)?;
        let (x, y) = TileSize::X16.tile_dimensions(ctx.resources.width(), ctx.resources.height());

        {
            let mut pass = ctx.encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some(Cow::Borrowed("ShadowMask")),
            });
            pass.set_pipeline(pipeline);
            pass.set_binding(0, ResourceBinding::ConstantBuffer(camera));
            pass.set_binding(1, ResourceBinding::ConstantBuffer(sun));
            pass.set_binding(2, ResourceBinding::Texture(depth));
            pass.set_binding(3, ResourceBinding::Texture(maps));
            pass.set_binding(4, ResourceBinding::Buffer(matrices));
            pass.set_binding(5, ResourceBinding::Buffer(splits));
            pass.set_binding(6, ResourceBinding::StorageTexture(mask));
            pass.set_binding(7, ResourceBinding::StorageTexture(index));
            pass.dispatch_workgroups(x, y, 1);
        }
        ctx.products.dispatches += 1;
        Self::leave(ctx)
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        Self::clear(ctx)
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            destroy_compute_pipeline(device, "ShadowMaskPass", pipeline);
        }
    }
}

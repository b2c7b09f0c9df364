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

//! The depth pre-pass, the shading-rate image and the GBuffer pass.

use super::draw::{
    compute_pipeline, depth_only_descriptor, destroy_compute_pipeline, destroy_graphics_pipeline,
    draw_batches, initialized, prepare_material_pipelines, BatchDraw,
};
use super::{
    FramePass, FrameResource, FrameResources, PassContext, PassDeclaration, PipelineCache,
    PipelineKey, PrepareContext, CAMERA_SLOT, SHADING_RATE_TILE,
};
use penumbra_core::renderer::{
    ColorAttachment, CompareFunction, ComputePassDescriptor, ComputePipelineId, DepthAttachment,
    DepthState, DeviceFeature, GraphicsDevice, GraphicsPipelineDescriptor, GraphicsPipelineId,
    LoadOp, RenderError, RenderPassDescriptor, RendererSettings, ResourceBinding, ResourceState,
    ShaderProgram, TextureFormat,
};
use std::borrow::Cow;

/// Formats of the GBuffer color targets, in [`FrameResource::GBUFFER_COLORS`] order.
pub const GBUFFER_FORMATS: [TextureFormat; 4] = [
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgb10A2Unorm,
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rg16Float,
];

/// Thread-group edge of the shading-rate generation shader.
const VRS_GROUP_SIZE: u32 = 8;

/// Lays down scene depth for the deferred drawables so later passes shade each
/// pixel once.
#[derive(Debug)]
pub struct DepthPrePass {
    pipelines: PipelineCache<PipelineKey, GraphicsPipelineId>,
}

impl Default for DepthPrePass {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthPrePass {
    /// Creates the pass. Pipelines are built per material variant on first use.
    pub fn new() -> Self {
        Self {
            pipelines: PipelineCache::new("DepthPrePass"),
        }
    }
}

impl FramePass for DepthPrePass {
    fn name(&self) -> &'static str {
        "DepthPrePass"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::GBufferDepth, ResourceState::DepthWrite)
            .uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.pre_pass
    }

    fn on_initialize(
        &mut self,
        _device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("DepthPrePass: Initializing GPU resources...");
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), RenderError> {
        prepare_material_pipelines(
            ctx.device,
            &mut self.pipelines,
            ctx.inputs,
            &ctx.inputs.batches.deferred,
            |key| depth_only_descriptor("DepthPrePass", "DepthOnly.vs", key, &[]),
        )
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;

        let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some(Cow::Borrowed("DepthPrePass")),
            color_attachments: &[],
            depth_attachment: Some(DepthAttachment {
                texture: depth,
                layer: 0,
                load: LoadOp::Clear(1.0),
                read_only: false,
            }),
        });
        pass.set_binding(CAMERA_SLOT, ResourceBinding::ConstantBuffer(camera));

        let draw = BatchDraw {
            skip_occluded: true,
            ..BatchDraw::single(0)
        };
        let pipelines = &self.pipelines;
        let draws = draw_batches(
            pass.as_mut(),
            ctx.resources,
            ctx.inputs,
            &ctx.inputs.batches.deferred,
            &draw,
            |material| {
                if !material.render_in_pre_pass() {
                    return Ok(None);
                }
                let key = PipelineKey::from_flags(material.flags());
                Ok(Some((pipelines.get(key)?, key.depth_only_streams())))
            },
        )?;
        drop(pass);

        ctx.products.draw_calls += draws;
        Ok(())
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        ctx.encoder.clear_depth(depth, 1.0);
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        for pipeline in self.pipelines.drain() {
            destroy_graphics_pipeline(device, "DepthPrePass", pipeline);
        }
    }
}

/// Generates the variable-rate-shading image that coarsens shading of the GBuffer
/// pass.
#[derive(Debug, Default)]
pub struct VariableRateShadingPass {
    pipeline: Option<ComputePipelineId>,
}

impl VariableRateShadingPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FramePass for VariableRateShadingPass {
    fn name(&self) -> &'static str {
        "VariableRateShading"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .access(
                FrameResource::ShadingRateImage,
                ResourceState::UnorderedAccess,
                ResourceState::ShadingRateSource,
            )
            .uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn is_enabled(&self, settings: &RendererSettings, device: &dyn GraphicsDevice) -> bool {
        settings.vrs && device.supports_feature(DeviceFeature::VariableRateShadingImage)
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        resources: &FrameResources,
    ) -> Result<(), RenderError> {
        if !resources.contains(FrameResource::ShadingRateImage) {
            log::info!("VariableRateShading: no shading-rate image, pass is inert");
            return Ok(());
        }
        log::info!("VariableRateShading: Initializing GPU resources...");
        self.pipeline = Some(compute_pipeline(
            device,
            "VariableRateShading",
            ShaderProgram::new("VariableRateShading.cs"),
        )?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        if !ctx.resources.contains(FrameResource::ShadingRateImage) {
            return Ok(());
        }
        let pipeline = initialized(&self.pipeline, self.name())?;
        let image = ctx.texture(FrameResource::ShadingRateImage)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;
        let width = ctx.resources.width().div_ceil(SHADING_RATE_TILE);
        let height = ctx.resources.height().div_ceil(SHADING_RATE_TILE);

        {
            let mut pass = ctx.encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some(Cow::Borrowed("VariableRateShading")),
            });
            pass.set_pipeline(pipeline);
            pass.set_binding(0, ResourceBinding::ConstantBuffer(camera));
            pass.set_binding(1, ResourceBinding::StorageTexture(image));
            pass.dispatch_workgroups(
                width.div_ceil(VRS_GROUP_SIZE),
                height.div_ceil(VRS_GROUP_SIZE),
                1,
            );
        }
        ctx.products.dispatches += 1;

        ctx.transition(
            FrameResource::ShadingRateImage,
            ResourceState::UnorderedAccess,
            ResourceState::ShadingRateSource,
        )
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        if !ctx.resources.contains(FrameResource::ShadingRateImage) {
            return Ok(());
        }
        // Zero encodes the full 1x1 rate.
        let image = ctx.texture(FrameResource::ShadingRateImage)?;
        ctx.encoder.clear_unordered_access(image, [0.0; 4]);
        ctx.transition(
            FrameResource::ShadingRateImage,
            ResourceState::UnorderedAccess,
            ResourceState::ShadingRateSource,
        )
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            destroy_compute_pipeline(device, "VariableRateShading", pipeline);
        }
    }
}

fn base_pass_descriptor(key: PipelineKey) -> GraphicsPipelineDescriptor {
    GraphicsPipelineDescriptor {
        label: format!("BasePass {key:?}"),
        vertex: key.program("BasePass.vs"),
        pixel: Some(key.program("BasePass.ps")),
        vertex_streams: key.shading_streams(),
        color_formats: GBUFFER_FORMATS.to_vec(),
        depth: Some(DepthState {
            format: TextureFormat::Depth32Float,
            write_enabled: true,
            compare: CompareFunction::LessEqual,
        }),
        cull_mode: key.cull_mode(),
        color_writes: true,
    }
}

/// Fills the GBuffer with the deferred drawables.
#[derive(Debug)]
pub struct BasePass {
    pipelines: PipelineCache<PipelineKey, GraphicsPipelineId>,
}

impl Default for BasePass {
    fn default() -> Self {
        Self::new()
    }
}

impl BasePass {
    /// Creates the pass. Pipelines are built per material variant on first use.
    pub fn new() -> Self {
        Self {
            pipelines: PipelineCache::new("BasePass"),
        }
    }

    fn gbuffer_attachments(ctx: &PassContext<'_>) -> Result<Vec<ColorAttachment>, RenderError> {
        FrameResource::GBUFFER_COLORS
            .iter()
            .map(|resource| Ok(ColorAttachment::clear(ctx.texture(*resource)?, [0.0; 4])))
            .collect()
    }
}

impl FramePass for BasePass {
    fn name(&self) -> &'static str {
        "BasePass"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses_all(FrameResource::GBUFFER_COLORS, ResourceState::RenderTarget)
            .uses(FrameResource::GBufferDepth, ResourceState::DepthWrite)
            .uses(FrameResource::ShadingRateImage, ResourceState::ShadingRateSource)
            .uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.base_pass
    }

    fn on_initialize(
        &mut self,
        _device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("BasePass: Initializing GPU resources...");
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), RenderError> {
        prepare_material_pipelines(
            ctx.device,
            &mut self.pipelines,
            ctx.inputs,
            &ctx.inputs.batches.deferred,
            base_pass_descriptor,
        )
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let attachments = Self::gbuffer_attachments(ctx)?;
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;
        let shading_rate_image = if ctx.inputs.settings.vrs
            && ctx.resources.contains(FrameResource::ShadingRateImage)
        {
            Some(ctx.texture(FrameResource::ShadingRateImage)?)
        } else {
            None
        };

        ctx.encoder.set_shading_rate_image(shading_rate_image);
        let draws = {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(Cow::Borrowed("BasePass")),
                color_attachments: &attachments,
                depth_attachment: Some(DepthAttachment {
                    texture: depth,
                    layer: 0,
                    load: LoadOp::Load,
                    read_only: false,
                }),
            });
            pass.set_binding(CAMERA_SLOT, ResourceBinding::ConstantBuffer(camera));

            let draw = BatchDraw {
                skip_occluded: true,
                ..BatchDraw::single(0)
            };
            let pipelines = &self.pipelines;
            draw_batches(
                pass.as_mut(),
                ctx.resources,
                ctx.inputs,
                &ctx.inputs.batches.deferred,
                &draw,
                |material| {
                    let key = PipelineKey::from_flags(material.flags());
                    Ok(Some((pipelines.get(key)?, key.shading_streams())))
                },
            )?
        };
        if shading_rate_image.is_some() {
            ctx.encoder.set_shading_rate_image(None);
        }

        ctx.products.draw_calls += draws;
        Ok(())
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let attachments = Self::gbuffer_attachments(ctx)?;
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        let _clear = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some(Cow::Borrowed("BasePass (cleared)")),
            color_attachments: &attachments,
            depth_attachment: Some(DepthAttachment {
                texture: depth,
                layer: 0,
                load: LoadOp::Load,
                read_only: false,
            }),
        });
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        for pipeline in self.pipelines.drain() {
            destroy_graphics_pipeline(device, "BasePass", pipeline);
        }
    }
}

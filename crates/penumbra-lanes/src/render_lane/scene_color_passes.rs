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

//! Passes that draw into the lit scene color: skybox, forward drawables and the
//! temporal resolve.

use super::draw::{
    compute_pipeline, destroy_compute_pipeline, destroy_graphics_pipeline, draw_batches,
    initialized, prepare_material_pipelines, BatchDraw,
};
use super::{
    FramePass, FrameResource, FrameResources, PassContext, PassDeclaration, PipelineCache,
    PipelineKey, PrepareContext, CAMERA_SLOT, TEXTURE_SLOT_BASE,
};
use penumbra_core::renderer::{
    ColorAttachment, CompareFunction, ComputePassDescriptor, ComputePipelineId, CullMode,
    DepthAttachment, DepthState, GraphicsDevice, GraphicsPipelineDescriptor, GraphicsPipelineId,
    LoadOp, RenderError, RenderPassDescriptor, RendererSettings, ResourceBinding, ResourceState,
    ShaderProgram, TextureFormat, TileSize, VertexStreams,
};
use std::borrow::Cow;

/// Format of the scene color target.
pub const SCENE_COLOR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

const SKYBOX_VERTICES: u32 = 36;

/// Draws the sky behind everything rendered so far.
#[derive(Debug, Default)]
pub struct SkyboxPass {
    pipeline: Option<GraphicsPipelineId>,
}

impl SkyboxPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FramePass for SkyboxPass {
    fn name(&self) -> &'static str {
        "Skybox"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::FinalTarget, ResourceState::RenderTarget)
            .uses(FrameResource::GBufferDepth, ResourceState::DepthRead)
            .uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.skybox
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("SkyboxPass: Initializing GPU resources...");
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDescriptor {
            label: "Skybox".to_string(),
            vertex: ShaderProgram::new("Skybox.vs"),
            pixel: Some(ShaderProgram::new("Skybox.ps")),
            vertex_streams: VertexStreams::empty(),
            color_formats: vec![SCENE_COLOR_FORMAT],
            depth: Some(DepthState {
                format: TextureFormat::Depth32Float,
                write_enabled: false,
                compare: CompareFunction::LessEqual,
            }),
            cull_mode: CullMode::None,
            color_writes: true,
        })?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let pipeline = initialized(&self.pipeline, self.name())?;
        let target = ctx.texture(FrameResource::FinalTarget)?;
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;

        {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(Cow::Borrowed("Skybox")),
                color_attachments: &[ColorAttachment::load(target)],
                depth_attachment: Some(DepthAttachment {
                    texture: depth,
                    layer: 0,
                    load: LoadOp::Load,
                    read_only: true,
                }),
            });
            pass.set_pipeline(pipeline);
            pass.set_binding(CAMERA_SLOT, ResourceBinding::ConstantBuffer(camera));
            pass.draw(0..SKYBOX_VERTICES, 0..1);
        }
        ctx.products.draw_calls += 1;
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            destroy_graphics_pipeline(device, "SkyboxPass", pipeline);
        }
    }
}

/// Lighting inputs bound after the material textures, in binding order.
const FORWARD_LIGHTING_BUFFERS: [FrameResource; 5] = [
    FrameResource::PointLights,
    FrameResource::PointLightsPosRad,
    FrameResource::ShadowPointLights,
    FrameResource::ShadowPointLightsPosRad,
    FrameResource::CascadeMatrixBuffer,
];

const FORWARD_SHADOW_MAPS: [FrameResource; 2] = [
    FrameResource::PointLightShadowMaps,
    FrameResource::CascadeShadowMaps,
];

/// First binding slot after the four material textures.
const FORWARD_LIGHTING_SLOT: u32 = TEXTURE_SLOT_BASE + 4;

fn forward_descriptor(key: PipelineKey) -> GraphicsPipelineDescriptor {
    GraphicsPipelineDescriptor {
        label: format!("Forward {key:?}"),
        vertex: key.program("Forward.vs"),
        pixel: Some(key.program("Forward.ps")),
        vertex_streams: key.shading_streams(),
        color_formats: vec![SCENE_COLOR_FORMAT],
        depth: Some(DepthState {
            format: TextureFormat::Depth32Float,
            write_enabled: true,
            compare: CompareFunction::LessEqual,
        }),
        cull_mode: key.cull_mode(),
        color_writes: true,
    }
}

/// Shades the drawables the deferred path cannot handle, directly into scene color.
#[derive(Debug)]
pub struct ForwardPass {
    pipelines: PipelineCache<PipelineKey, GraphicsPipelineId>,
}

impl Default for ForwardPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self {
            pipelines: PipelineCache::new("ForwardPass"),
        }
    }
}

impl FramePass for ForwardPass {
    fn name(&self) -> &'static str {
        "Forward"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::FinalTarget, ResourceState::RenderTarget)
            .uses(FrameResource::GBufferDepth, ResourceState::DepthWrite)
            .uses_all(FORWARD_SHADOW_MAPS, ResourceState::PixelShaderResource)
            .uses_all(FORWARD_LIGHTING_BUFFERS, ResourceState::PixelShaderResource)
            .uses_all(
                [
                    FrameResource::CameraBuffer,
                    FrameResource::DirectionalLightBuffer,
                ],
                ResourceState::ConstantBuffer,
            )
    }

    fn on_initialize(
        &mut self,
        _device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("ForwardPass: Initializing GPU resources...");
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), RenderError> {
        prepare_material_pipelines(
            ctx.device,
            &mut self.pipelines,
            ctx.inputs,
            &ctx.inputs.batches.forward,
            forward_descriptor,
        )
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let inputs = ctx.inputs;
        if inputs.batches.forward.is_empty() {
            return Ok(());
        }
        let target = ctx.texture(FrameResource::FinalTarget)?;
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;
        let sun = ctx.buffer(FrameResource::DirectionalLightBuffer)?;
        let mut lighting = Vec::with_capacity(FORWARD_LIGHTING_BUFFERS.len() + 2);
        for resource in FORWARD_LIGHTING_BUFFERS {
            lighting.push(ResourceBinding::Buffer(ctx.buffer(resource)?));
        }
        for resource in FORWARD_SHADOW_MAPS {
            lighting.push(ResourceBinding::Texture(ctx.texture(resource)?));
        }

        let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some(Cow::Borrowed("Forward")),
            color_attachments: &[ColorAttachment::load(target)],
            depth_attachment: Some(DepthAttachment {
                texture: depth,
                layer: 0,
                load: LoadOp::Load,
                read_only: false,
            }),
        });
        pass.set_binding(CAMERA_SLOT, ResourceBinding::ConstantBuffer(camera));
        pass.set_binding(FORWARD_LIGHTING_SLOT, ResourceBinding::ConstantBuffer(sun));
        for (slot, binding) in (FORWARD_LIGHTING_SLOT + 1..).zip(lighting) {
            pass.set_binding(slot, binding);
        }

        let pipelines = &self.pipelines;
        let draws = draw_batches(
            pass.as_mut(),
            ctx.resources,
            inputs,
            &inputs.batches.forward,
            &BatchDraw::single(0),
            |material| {
                let key = PipelineKey::from_flags(material.flags());
                Ok(Some((pipelines.get(key)?, key.shading_streams())))
            },
        )?;
        drop(pass);

        ctx.products.draw_calls += draws;
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        for pipeline in self.pipelines.drain() {
            destroy_graphics_pipeline(device, "ForwardPass", pipeline);
        }
    }
}

/// Root constants of the temporal resolve.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TemporalAaConstants {
    /// Zero when the history holds no usable frame.
    pub history_valid: u32,
    /// Padding to 16 bytes.
    pub _padding: [u32; 3],
}

/// Blends the jittered scene color with the reprojected history, then stores the
/// result as the next history.
#[derive(Debug, Default)]
pub struct TemporalAaPass {
    pipeline: Option<ComputePipelineId>,
    history_valid: bool,
}

impl TemporalAaPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the next resolve can blend with history.
    pub fn history_valid(&self) -> bool {
        self.history_valid
    }

    fn leave(ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        ctx.transition(
            FrameResource::FinalTarget,
            ResourceState::UnorderedAccess,
            ResourceState::PixelShaderResource,
        )
    }

    fn store_history(ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let target = ctx.texture(FrameResource::FinalTarget)?;
        let history = ctx.texture(FrameResource::TemporalHistory)?;
        ctx.transition(
            FrameResource::FinalTarget,
            ResourceState::UnorderedAccess,
            ResourceState::CopySource,
        )?;
        ctx.transition(
            FrameResource::TemporalHistory,
            ResourceState::NonPixelShaderResource,
            ResourceState::CopyDest,
        )?;
        ctx.encoder.copy_texture(target, history);
        ctx.transition(
            FrameResource::TemporalHistory,
            ResourceState::CopyDest,
            ResourceState::NonPixelShaderResource,
        )?;
        ctx.transition(
            FrameResource::FinalTarget,
            ResourceState::CopySource,
            ResourceState::PixelShaderResource,
        )
    }
}

impl FramePass for TemporalAaPass {
    fn name(&self) -> &'static str {
        "TemporalAa"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .access(
                FrameResource::FinalTarget,
                ResourceState::UnorderedAccess,
                ResourceState::PixelShaderResource,
            )
            .uses_all(
                [
                    FrameResource::TemporalHistory,
                    FrameResource::GBufferVelocity,
                ],
                ResourceState::NonPixelShaderResource,
            )
            .uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.temporal_aa
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("TemporalAaPass: Initializing GPU resources...");
        self.pipeline = Some(compute_pipeline(
            device,
            "TemporalAa",
            ShaderProgram::new("TemporalAa.cs"),
        )?);
        self.history_valid = false;
        Ok(())
    }

    fn on_resize(&mut self, _width: u32, _height: u32) {
        self.history_valid = false;
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let pipeline = initialized(&self.pipeline, self.name())?;
        let target = ctx.texture(FrameResource::FinalTarget)?;
        let history = ctx.texture(FrameResource::TemporalHistory)?;
        let velocity = ctx.texture(FrameResource::GBufferVelocity)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;
        let constants = TemporalAaConstants {
            history_valid: self.history_valid as u32,
            _padding: [0; 3],
        };
        let (x, y) = TileSize::X16.tile_dimensions(ctx.resources.width(), ctx.resources.height());

        {
            let mut pass = ctx.encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some(Cow::Borrowed("TemporalAa")),
            });
            pass.set_pipeline(pipeline);
            pass.set_constants(bytemuck::bytes_of(&constants));
            pass.set_binding(0, ResourceBinding::ConstantBuffer(camera));
            pass.set_binding(1, ResourceBinding::Texture(history));
            pass.set_binding(2, ResourceBinding::Texture(velocity));
            pass.set_binding(3, ResourceBinding::StorageTexture(target));
            pass.dispatch_workgroups(x, y, 1);
        }
        ctx.products.dispatches += 1;

        Self::store_history(ctx)?;
        self.history_valid = true;
        Ok(())
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        self.history_valid = false;
        Self::leave(ctx)
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            destroy_compute_pipeline(device, "TemporalAaPass", pipeline);
        }
    }
}

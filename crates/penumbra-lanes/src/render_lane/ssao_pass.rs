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

//! Screen-space ambient occlusion.

use super::draw::{compute_pipeline, destroy_compute_pipeline, initialized};
use super::{FramePass, FrameResource, FrameResources, PassContext, PassDeclaration};
use penumbra_core::renderer::{
    ComputePassDescriptor, ComputePipelineId, GraphicsDevice, RenderError, RendererSettings,
    ResourceBinding, ResourceState, ShaderProgram, TileSize,
};
use std::borrow::Cow;

/// Computes ambient occlusion from depth and normals.
#[derive(Debug, Default)]
pub struct AmbientOcclusionPass {
    pipeline: Option<ComputePipelineId>,
}

impl AmbientOcclusionPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }

    fn leave(ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        ctx.transition(
            FrameResource::AmbientOcclusion,
            ResourceState::UnorderedAccess,
            ResourceState::NonPixelShaderResource,
        )
    }
}

impl FramePass for AmbientOcclusionPass {
    fn name(&self) -> &'static str {
        "AmbientOcclusion"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .access(
                FrameResource::AmbientOcclusion,
                ResourceState::UnorderedAccess,
                ResourceState::NonPixelShaderResource,
            )
            .uses(FrameResource::GBufferDepth, ResourceState::NonPixelShaderResource)
            .uses(FrameResource::GBufferNormal, ResourceState::NonPixelShaderResource)
            .uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.ssao
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("AmbientOcclusionPass: Initializing GPU resources...");
        self.pipeline = Some(compute_pipeline(
            device,
            "AmbientOcclusion",
            ShaderProgram::new("Ssao.cs"),
        )?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let pipeline = initialized(&self.pipeline, self.name())?;
        let target = ctx.texture(FrameResource::AmbientOcclusion)?;
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        let normals = ctx.texture(FrameResource::GBufferNormal)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;
        let (x, y) = TileSize::X16.tile_dimensions(ctx.resources.width(), ctx.resources.height());

        {
            let mut pass = ctx.encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some(Cow::Borrowed("AmbientOcclusion")),
            });
            pass.set_pipeline(pipeline);
            pass.set_binding(0, ResourceBinding::ConstantBuffer(camera));
            pass.set_binding(1, ResourceBinding::Texture(depth));
            pass.set_binding(2, ResourceBinding::Texture(normals));
            pass.set_binding(3, ResourceBinding::StorageTexture(target));
            pass.dispatch_workgroups(x, y, 1);
        }
        ctx.products.dispatches += 1;
        Self::leave(ctx)
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let target = ctx.texture(FrameResource::AmbientOcclusion)?;
        ctx.encoder.clear_unordered_access(target, [1.0; 4]);
        Self::leave(ctx)
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            destroy_compute_pipeline(device, "AmbientOcclusionPass", pipeline);
        }
    }
}

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

//! Issues one occlusion query per deferred drawable, drawing its bounding box
//! against the finished scene depth.

use super::draw::{destroy_graphics_pipeline, initialized};
use super::{
    FramePass, FrameResource, FrameResources, ObjectConstants, PassContext, PassDeclaration,
    CAMERA_SLOT,
};
use penumbra_core::renderer::{
    CompareFunction, CullMode, DepthAttachment, DepthState, DeviceFeature, GraphicsDevice,
    GraphicsPipelineDescriptor, GraphicsPipelineId, LoadOp, RenderError, RenderPassDescriptor,
    RendererSettings, ResourceBinding, ResourceState, ShaderProgram, TextureFormat, VertexStreams,
};
use std::borrow::Cow;

/// Vertices of the procedural unit cube drawn for a proxy.
pub const PROXY_CUBE_VERTICES: u32 = 36;

/// Draws the bounding-box proxies of the occlusion tracker inside queries.
#[derive(Debug, Default)]
pub struct OcclusionPass {
    pipeline: Option<GraphicsPipelineId>,
}

impl OcclusionPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FramePass for OcclusionPass {
    fn name(&self) -> &'static str {
        "Occlusion"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::GBufferDepth, ResourceState::DepthRead)
            .uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn is_enabled(&self, settings: &RendererSettings, device: &dyn GraphicsDevice) -> bool {
        settings.occlusion_culling && device.supports_feature(DeviceFeature::OcclusionQueries)
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("OcclusionPass: Initializing GPU resources...");
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDescriptor {
            label: "OcclusionProxy".to_string(),
            vertex: ShaderProgram::new("OcclusionProxy.vs"),
            pixel: None,
            vertex_streams: VertexStreams::empty(),
            color_formats: Vec::new(),
            depth: Some(DepthState {
                format: TextureFormat::Depth32Float,
                write_enabled: false,
                compare: CompareFunction::LessEqual,
            }),
            // The camera may sit inside a proxy.
            cull_mode: CullMode::None,
            color_writes: false,
        })?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let draws = ctx.inputs.occlusion_draws;
        if draws.is_empty() {
            return Ok(());
        }
        let pipeline = initialized(&self.pipeline, self.name())?;
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;

        {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(Cow::Borrowed("Occlusion")),
                color_attachments: &[],
                depth_attachment: Some(DepthAttachment {
                    texture: depth,
                    layer: 0,
                    load: LoadOp::Load,
                    read_only: true,
                }),
            });
            pass.set_pipeline(pipeline);
            pass.set_binding(CAMERA_SLOT, ResourceBinding::ConstantBuffer(camera));
            for draw in draws {
                let constants = ObjectConstants::new(&draw.proxy_transform, 0);
                pass.set_constants(bytemuck::bytes_of(&constants));
                pass.begin_query(draw.query);
                pass.draw(0..PROXY_CUBE_VERTICES, 0..1);
                pass.end_query(draw.query);
            }
        }

        ctx.products.queries += draws.len() as u32;
        ctx.products.draw_calls += draws.len() as u32;
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            destroy_graphics_pipeline(device, "OcclusionPass", pipeline);
        }
    }
}

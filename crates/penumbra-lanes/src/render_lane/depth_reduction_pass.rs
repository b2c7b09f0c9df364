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

//! Min/max depth reduction.
//!
//! The first dispatch reads the depth buffer, every following one reads the previous
//! result, ping-ponging between two targets until a single texel remains.

use super::draw::{compute_pipeline, destroy_compute_pipeline, initialized};
use super::{
    reduction_chain, FramePass, FrameResource, FrameResources, PassContext, PassDeclaration,
};
use penumbra_core::renderer::{
    ComputePassDescriptor, ComputePipelineId, GraphicsDevice, RenderError, RendererSettings,
    ResourceBinding, ResourceState, ShaderProgram,
};
use std::borrow::Cow;

const REDUCED: [FrameResource; 2] = [FrameResource::ReducedDepth0, FrameResource::ReducedDepth1];

/// Index of the target holding the final result of a chain with `steps` steps.
pub fn reduced_depth_index(steps: usize) -> usize {
    steps.saturating_sub(1) % 2
}

/// Reduces scene depth to its min/max range for cascade fitting.
#[derive(Debug, Default)]
pub struct DepthReductionPass {
    initial: Option<ComputePipelineId>,
    reduce: Option<ComputePipelineId>,
    chain: Vec<(u32, u32)>,
}

impl DepthReductionPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// The dispatch size of every step at the current output size.
    pub fn chain(&self) -> &[(u32, u32)] {
        &self.chain
    }
}

impl FramePass for DepthReductionPass {
    fn name(&self) -> &'static str {
        "DepthReduction"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::GBufferDepth, ResourceState::NonPixelShaderResource)
            .uses_all(REDUCED, ResourceState::NonPixelShaderResource)
            .uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn is_enabled(&self, settings: &RendererSettings, _device: &dyn GraphicsDevice) -> bool {
        settings.depth_reduction
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("DepthReductionPass: Initializing GPU resources...");
        self.initial = Some(compute_pipeline(
            device,
            "DepthReductionInitial",
            ShaderProgram::new("DepthReduction.cs").with_define("FROM_DEPTH_BUFFER"),
        )?);
        self.reduce = Some(compute_pipeline(
            device,
            "DepthReduction",
            ShaderProgram::new("DepthReduction.cs"),
        )?);
        self.chain = resources.reduction_chain();
        Ok(())
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        self.chain = reduction_chain(width, height);
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let initial = initialized(&self.initial, self.name())?;
        let reduce = initialized(&self.reduce, self.name())?;
        let depth = ctx.texture(FrameResource::GBufferDepth)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;
        let targets = [ctx.texture(REDUCED[0])?, ctx.texture(REDUCED[1])?];

        for (step, &(x, y)) in self.chain.iter().enumerate() {
            let target = step % 2;
            let source = if step == 0 {
                depth
            } else {
                targets[1 - target]
            };
            ctx.transition(
                REDUCED[target],
                ResourceState::NonPixelShaderResource,
                ResourceState::UnorderedAccess,
            )?;
            {
                let mut pass = ctx.encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some(Cow::Owned(format!("DepthReduction {step}"))),
                });
                pass.set_pipeline(if step == 0 { initial } else { reduce });
                pass.set_binding(0, ResourceBinding::ConstantBuffer(camera));
                pass.set_binding(1, ResourceBinding::Texture(source));
                pass.set_binding(2, ResourceBinding::StorageTexture(targets[target]));
                pass.dispatch_workgroups(x, y, 1);
            }
            ctx.transition(
                REDUCED[target],
                ResourceState::UnorderedAccess,
                ResourceState::NonPixelShaderResource,
            )?;
            ctx.products.dispatches += 1;
        }

        ctx.products.reduced_depth_index = reduced_depth_index(self.chain.len());
        Ok(())
    }

    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        // The full 0..1 range makes cascade fitting fall back to the camera planes.
        let target = ctx.texture(REDUCED[0])?;
        ctx.transition(
            REDUCED[0],
            ResourceState::NonPixelShaderResource,
            ResourceState::UnorderedAccess,
        )?;
        ctx.encoder.clear_unordered_access(target, [0.0, 1.0, 0.0, 0.0]);
        ctx.transition(
            REDUCED[0],
            ResourceState::UnorderedAccess,
            ResourceState::NonPixelShaderResource,
        )?;
        ctx.products.reduced_depth_index = 0;
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        for pipeline in [self.initial.take(), self.reduce.take()].into_iter().flatten() {
            destroy_compute_pipeline(device, "DepthReductionPass", pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_index_follows_ping_pong() {
        assert_eq!(reduced_depth_index(reduction_chain(1920, 1080).len()), 0);
        assert_eq!(reduced_depth_index(reduction_chain(16, 16).len()), 0);
        assert_eq!(reduced_depth_index(reduction_chain(256, 256).len()), 1);
    }
}

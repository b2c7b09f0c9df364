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

//! Rendering lane - the per-frame pass sequence of the deferred renderer.
//!
//! Every pass declares the state it needs each resource in when it starts and the
//! state it leaves it in. [`PassSequence`] turns those declarations into a
//! [`FrameSchedule`] once, at initialisation, and replays it every frame through the
//! [`ResourceStateTracker`].

mod depth_reduction_pass;
mod draw;
mod frame_resources;
mod geometry_passes;
mod occlusion_pass;
mod pipeline_cache;
mod post_process;
mod scene_color_passes;
mod schedule;
mod shadow_passes;
mod ssao_pass;
mod state_tracker;
mod tiled_lighting_pass;
mod upload_passes;

pub use depth_reduction_pass::*;
pub use draw::{ObjectConstants, CAMERA_SLOT, MATERIAL_SLOT, TEXTURE_SLOT_BASE};
pub use frame_resources::*;
pub use geometry_passes::*;
pub use occlusion_pass::*;
pub use pipeline_cache::*;
pub use post_process::*;
pub use scene_color_passes::*;
pub use schedule::*;
pub use shadow_passes::*;
pub use ssao_pass::*;
pub use state_tracker::*;
pub use tiled_lighting_pass::*;
pub use upload_passes::*;

use crate::light_lane::LightFrame;
use crate::visibility_lane::{FrameBatches, OcclusionQueryDraw, VisibilitySets};
use penumbra_core::renderer::{
    BufferId, CommandEncoder, GraphicsDevice, RenderError, RendererSettings, ResourceState,
    TextureId,
};
use penumbra_data::{Scene, SceneAssets};

/// Everything a frame is built from. Read-only for every pass.
#[derive(Clone, Copy)]
pub struct FrameInputs<'a> {
    /// The scene, with visibility flags already written back.
    pub scene: &'a Scene,
    /// Meshes and materials.
    pub assets: &'a SceneAssets,
    /// The settings snapshot of this frame.
    pub settings: &'a RendererSettings,
    /// Culling output.
    pub visibility: &'a VisibilitySets,
    /// Draw batches built from `visibility`.
    pub batches: &'a FrameBatches,
    /// Light records and pending light-buffer uploads.
    pub lights: &'a LightFrame,
    /// Occlusion queries to issue this frame.
    pub occlusion_draws: &'a [OcclusionQueryDraw],
    /// Camera constants of this frame.
    pub camera: &'a GpuCameraData,
    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Values produced while encoding, read by later passes and by telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameProducts {
    /// Which reduced-depth target holds the final min/max, 0 or 1.
    pub reduced_depth_index: usize,
    /// Draw calls recorded.
    pub draw_calls: u32,
    /// Compute dispatches recorded.
    pub dispatches: u32,
    /// Occlusion queries issued.
    pub queries: u32,
    /// Resource transitions recorded, barriers and in-pass.
    pub transitions: u64,
}

/// The CPU-side preparation step of a frame. Runs before encoding starts.
pub struct PrepareContext<'a> {
    /// The device, for lazily created pipelines and buffers.
    pub device: &'a dyn GraphicsDevice,
    /// Frame inputs.
    pub inputs: &'a FrameInputs<'a>,
    /// Frame resources. Passes may register buffers they own.
    pub resources: &'a mut FrameResources,
    /// State tracker. New resources must be registered here.
    pub states: &'a mut ResourceStateTracker,
}

/// What a pass sees while encoding.
///
/// Open render and compute passes borrow `encoder`; look up every id you need
/// before opening one.
pub struct PassContext<'a> {
    /// The device, for reading capabilities.
    pub device: &'a dyn GraphicsDevice,
    /// The frame's only command encoder.
    pub encoder: &'a mut dyn CommandEncoder,
    /// Frame resources.
    pub resources: &'a FrameResources,
    /// State tracker. Every transition goes through it.
    pub states: &'a mut ResourceStateTracker,
    /// Frame inputs.
    pub inputs: &'a FrameInputs<'a>,
    /// Values handed to later passes.
    pub products: &'a mut FrameProducts,
}

impl PassContext<'_> {
    /// The texture of `resource`.
    pub fn texture(&self, resource: FrameResource) -> Result<TextureId, RenderError> {
        self.resources.texture(resource)
    }

    /// The buffer of `resource`.
    pub fn buffer(&self, resource: FrameResource) -> Result<BufferId, RenderError> {
        self.resources.buffer(resource)
    }

    /// Records a checked transition of `resource`.
    pub fn transition(
        &mut self,
        resource: FrameResource,
        from: ResourceState,
        to: ResourceState,
    ) -> Result<(), RenderError> {
        self.states
            .transition_to(&mut *self.encoder, self.resources, resource, from, to)
    }
}

/// One step of the frame.
///
/// A pass may change states inside its body, but must leave every declared resource
/// in the declared exit state, enabled or not.
pub trait FramePass: Send {
    /// Returns a human-readable identifier for this pass, used for debug groups and
    /// logging.
    fn name(&self) -> &'static str;

    /// The entry and exit state of every resource the pass touches. Must not depend
    /// on the settings.
    fn declaration(&self) -> PassDeclaration;

    /// Whether the full pass runs this frame. When `false`,
    /// [`FramePass::execute_disabled`] runs instead.
    fn is_enabled(&self, settings: &RendererSettings, device: &dyn GraphicsDevice) -> bool {
        let _ = (settings, device);
        true
    }

    /// Creates the pipelines and other GPU objects the pass owns.
    ///
    /// # Errors
    ///
    /// Any failure aborts renderer start-up.
    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        resources: &FrameResources,
    ) -> Result<(), RenderError>;

    /// Called once the size-dependent resources have been recreated.
    fn on_resize(&mut self, width: u32, height: u32) {
        let _ = (width, height);
    }

    /// CPU work before encoding. Only called when the pass is enabled.
    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), RenderError> {
        let _ = ctx;
        Ok(())
    }

    /// Records the pass.
    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError>;

    /// Records the cheap substitute of a disabled pass.
    fn execute_disabled(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let _ = ctx;
        Ok(())
    }

    /// Destroys everything created by [`FramePass::on_initialize`] or `prepare`.
    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        let _ = device;
    }
}

/// The passes of a frame, in execution order, and their schedule.
pub struct PassSequence {
    passes: Vec<Box<dyn FramePass>>,
    declarations: Vec<PassDeclaration>,
    schedule: FrameSchedule,
}

impl PassSequence {
    /// A sequence of `passes`, run in the given order. The last one must present.
    pub fn new(passes: Vec<Box<dyn FramePass>>) -> Self {
        Self {
            passes,
            declarations: Vec::new(),
            schedule: FrameSchedule::default(),
        }
    }

    /// The canonical deferred frame.
    pub fn standard(ui: Option<Box<dyn UiOverlay>>) -> Self {
        Self::new(vec![
            Box::new(LightBuffersPass::new()),
            Box::new(CameraBufferPass::new()),
            Box::new(MaterialBuffersPass::new()),
            Box::new(DepthPrePass::new()),
            Box::new(VariableRateShadingPass::new()),
            Box::new(BasePass::new()),
            Box::new(OcclusionPass::new()),
            Box::new(DepthReductionPass::new()),
            Box::new(AmbientOcclusionPass::new()),
            Box::new(PointLightShadowPass::new()),
            Box::new(CascadeMatricesPass::new()),
            Box::new(CascadedShadowPass::new()),
            Box::new(ShadowMaskPass::new()),
            Box::new(TiledLightingPass::new()),
            Box::new(SkyboxPass::new()),
            Box::new(ForwardPass::new()),
            Box::new(TemporalAaPass::new()),
            Box::new(PostProcessPass::new()),
            Box::new(UiPass::new(ui)),
            Box::new(PresentPass::new()),
        ])
    }

    /// Initialises every pass, then assembles and validates the schedule against the
    /// resources that exist.
    ///
    /// # Returns
    ///
    /// [`RenderError::InitializationFailed`] naming the first pass that failed. The
    /// passes initialised before it are shut down again.
    pub fn initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        resources: &FrameResources,
    ) -> Result<(), RenderError> {
        for index in 0..self.passes.len() {
            if let Err(e) = self.passes[index].on_initialize(device, resources) {
                let name = self.passes[index].name();
                log::error!("PassSequence: {name} failed to initialize: {e}");
                for pass in &mut self.passes[..index] {
                    pass.on_shutdown(device);
                }
                return Err(RenderError::InitializationFailed(format!("{name}: {e}")));
            }
        }

        self.declarations = self.passes.iter().map(|p| p.declaration()).collect();
        if let Err(e) = self.build_schedule(resources) {
            self.shutdown(device);
            return Err(RenderError::InitializationFailed(format!(
                "PassSequence: invalid schedule: {e}"
            )));
        }

        log::info!(
            "PassSequence: {} passes, {} scheduled transitions",
            self.passes.len(),
            self.schedule.barrier_transition_count()
        );
        Ok(())
    }

    fn build_schedule(&mut self, resources: &FrameResources) -> Result<(), ScheduleError> {
        let named: Vec<(&str, PassDeclaration)> = self
            .passes
            .iter()
            .zip(&self.declarations)
            .map(|(pass, declaration)| (pass.name(), declaration.clone()))
            .collect();
        let is_live = |resource| resources.contains(resource);
        let schedule = FrameSchedule::assemble(&named, is_live)?;
        schedule.validate(&named, is_live)?;
        self.schedule = schedule;
        Ok(())
    }

    /// Pass names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// The validated schedule.
    pub fn schedule(&self) -> &FrameSchedule {
        &self.schedule
    }

    /// Forwards a completed resize to every pass.
    pub fn resize(&mut self, width: u32, height: u32) {
        for pass in &mut self.passes {
            pass.on_resize(width, height);
        }
    }

    /// Runs the CPU preparation of every enabled pass.
    pub fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<(), RenderError> {
        for pass in &mut self.passes {
            if pass.is_enabled(ctx.inputs.settings, ctx.device) {
                pass.prepare(ctx)?;
            }
        }
        Ok(())
    }

    /// Records the whole frame: barriers, then each pass inside a debug group.
    ///
    /// After every pass the tracked state of each declared resource is checked
    /// against its declared exit state.
    pub fn encode(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let first = ctx.states.transition_count();

        for step in self.schedule.steps() {
            match step {
                ScheduleStep::Barrier(transitions) => {
                    for transition in transitions {
                        ctx.states
                            .transition(&mut *ctx.encoder, ctx.resources, *transition)?;
                    }
                }
                ScheduleStep::Pass(index) => {
                    let pass = &mut self.passes[*index];
                    ctx.encoder.push_debug_group(pass.name());
                    let result = if pass.is_enabled(ctx.inputs.settings, ctx.device) {
                        pass.execute(ctx)
                    } else {
                        pass.execute_disabled(ctx)
                    };
                    ctx.encoder.pop_debug_group();
                    result?;

                    for access in &self.declarations[*index].accesses {
                        if ctx.resources.contains(access.resource) {
                            ctx.states.expect(access.resource, access.exit)?;
                        }
                    }
                }
            }
        }

        ctx.products.transitions += ctx.states.transition_count() - first;
        Ok(())
    }

    /// Shuts every pass down.
    pub fn shutdown(&mut self, device: &dyn GraphicsDevice) {
        for pass in &mut self.passes {
            pass.on_shutdown(device);
        }
    }
}

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

//! Defines the RenderAgent, the orchestrator of one rendered frame.

use super::resize::{coalesce_resizes, ResizeEvent};
use crossbeam_channel::{Receiver, Sender};
use penumbra_core::math::{Mat4, Vec2};
use penumbra_core::renderer::{
    DeviceFeature, FenceValue, GraphicsDevice, PointLightShadowMode, RenderError,
    RendererSettings,
};
use penumbra_data::camera::taa_jitter;
use penumbra_data::{Drawable, Scene, SceneAssets};
use penumbra_lanes::light_lane::{LightFrame, LightSetup};
use penumbra_lanes::render_lane::{
    FrameInputs, FrameProducts, FrameResources, GpuCameraData, PassContext, PassSequence,
    PrepareContext, ResourceStateTracker, UiOverlay,
};
use penumbra_lanes::visibility_lane::{
    apply_camera_visibility, prepare_occlusion_queries, read_back_occlusion,
    release_occlusion_queries, FrameBatches, FrustumCuller,
};
use penumbra_telemetry::{FrameStats, FrameStatsHistory, Stopwatch, DEFAULT_STATS_WINDOW};
use std::sync::Arc;

/// How a [`RenderAgent`] starts.
#[derive(Debug, Clone)]
pub struct RenderAgentConfig {
    /// Initial output width.
    pub width: u32,
    /// Initial output height.
    pub height: u32,
    /// Initial renderer settings.
    pub settings: RendererSettings,
    /// Frames kept for the rolling statistics.
    pub stats_window: usize,
    /// The average is logged every this many frames. Zero disables the log.
    pub stats_log_interval: u64,
}

impl Default for RenderAgentConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            settings: RendererSettings::default(),
            stats_window: DEFAULT_STATS_WINDOW,
            stats_log_interval: DEFAULT_STATS_WINDOW as u64,
        }
    }
}

/// The agent responsible for the state and the per-frame logic of the renderer.
pub struct RenderAgent {
    // Shared with whoever created the swapchain.
    device: Arc<dyn GraphicsDevice>,
    // Every texture and buffer the passes read or write.
    resources: FrameResources,
    // Tracked access state of each entry in `resources`.
    states: ResourceStateTracker,
    // Point-light and sun buffers.
    lights: LightSetup,
    // The frame passes, in execution order.
    passes: PassSequence,
    culler: FrustumCuller,
    // Applied at the start of the next frame.
    settings: RendererSettings,
    resize_tx: Sender<ResizeEvent>,
    resize_rx: Receiver<ResizeEvent>,
    // Fence of the last submitted frame. Waited on before its resources are reused.
    previous_fence: Option<FenceValue>,
    // Unjittered view-projection of the last frame, for motion vectors.
    previous_view_projection: Option<Mat4>,
    // Total number of frames submitted.
    frame_index: u64,
    stats: FrameStatsHistory,
    stats_log_interval: u64,
    shut_down: bool,
}

impl RenderAgent {
    /// Creates the frame resources, the light buffers and every pass.
    ///
    /// # Returns
    ///
    /// [`RenderError::InitializationFailed`] naming the part that failed. Whatever was
    /// created before the failure is destroyed again.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        config: RenderAgentConfig,
    ) -> Result<Self, RenderError> {
        Self::with_ui(device, config, None)
    }

    /// Same as [`RenderAgent::new`], with an overlay drawn after post-processing.
    pub fn with_ui(
        device: Arc<dyn GraphicsDevice>,
        config: RenderAgentConfig,
        ui: Option<Box<dyn UiOverlay>>,
    ) -> Result<Self, RenderError> {
        log::info!(
            "RenderAgent: Initializing {}x{} renderer...",
            config.width,
            config.height
        );
        let gpu = device.as_ref();
        let shading_rate_image = gpu.supports_feature(DeviceFeature::VariableRateShadingImage);
        let mut resources = FrameResources::create(
            gpu,
            config.width,
            config.height,
            &config.settings,
            shading_rate_image,
        )?;

        let lights = match LightSetup::create(gpu, &mut resources) {
            Ok(lights) => lights,
            Err(e) => {
                log::error!("RenderAgent: light buffers failed to initialize: {e}");
                resources.destroy_all(gpu);
                return Err(RenderError::InitializationFailed(format!("LightSetup: {e}")));
            }
        };

        let mut passes = PassSequence::standard(ui);
        if let Err(e) = passes.initialize(gpu, &resources) {
            log::error!("RenderAgent: {e}");
            resources.destroy_all(gpu);
            return Err(e);
        }

        let mut states = ResourceStateTracker::new();
        states.sync(&resources);

        let (resize_tx, resize_rx) = crossbeam_channel::unbounded();
        log::info!(
            "RenderAgent: ready with {} passes and {} frame resources",
            passes.names().len(),
            resources.live().len()
        );

        Ok(Self {
            device,
            resources,
            states,
            lights,
            passes,
            culler: FrustumCuller::new(config.settings.culling_threads),
            settings: config.settings,
            resize_tx,
            resize_rx,
            previous_fence: None,
            previous_view_projection: None,
            frame_index: 0,
            stats: FrameStatsHistory::new(config.stats_window),
            stats_log_interval: config.stats_log_interval,
            shut_down: false,
        })
    }

    /// A sender for window-size changes. Events are applied at the start of the next
    /// frame; only the last one pending counts.
    pub fn resize_sender(&self) -> Sender<ResizeEvent> {
        self.resize_tx.clone()
    }

    /// The settings the next frame will use.
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Replaces the settings. The change takes effect at the next frame.
    pub fn set_settings(&mut self, settings: RendererSettings) {
        self.settings = settings;
    }

    /// Mutable access to the settings of the next frame.
    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        &mut self.settings
    }

    /// The current output size.
    pub fn size(&self) -> (u32, u32) {
        (self.resources.width(), self.resources.height())
    }

    /// Frames submitted so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Statistics of the recent frames.
    pub fn stats(&self) -> &FrameStatsHistory {
        &self.stats
    }

    /// Pass names in execution order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.names()
    }

    /// The frame resources.
    pub fn frame_resources(&self) -> &FrameResources {
        &self.resources
    }

    /// The tracked resource states.
    pub fn resource_states(&self) -> &ResourceStateTracker {
        &self.states
    }

    /// Releases the GPU objects a drawable holds. Call before dropping a drawable
    /// removed from the scene.
    pub fn release_drawable(&self, drawable: &mut Drawable) {
        release_occlusion_queries(drawable, self.device.as_ref());
    }

    /// Recreates the swapchain and every size-dependent target.
    ///
    /// # Returns
    ///
    /// [`RenderError::ResizeFailed`] if either step fails. The previous size and
    /// targets stay in use.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        let (old_width, old_height) = self.size();
        let device = self.device.as_ref();
        device.resize_swapchain(width, height)?;

        if let Err(e) = self.resources.resize(device, width, height) {
            if let Err(restore) = device.resize_swapchain(old_width, old_height) {
                log::error!(
                    "RenderAgent: failed to restore the {old_width}x{old_height} swapchain: \
                     {restore}"
                );
            }
            self.resources.set_back_buffer(device.current_back_buffer());
            return Err(e);
        }

        self.resources.set_back_buffer(device.current_back_buffer());
        self.states.sync(&self.resources);
        self.passes.resize(width, height);
        log::info!("RenderAgent: resized from {old_width}x{old_height} to {width}x{height}");
        Ok(())
    }

    fn apply_pending_resize(&mut self) {
        let current = self.size();
        let Some((width, height)) = coalesce_resizes(&self.resize_rx, current) else {
            return;
        };
        if let Err(e) = self.resize(width, height) {
            log::error!(
                "RenderAgent: keeping {}x{} after a failed resize: {e}",
                current.0,
                current.1
            );
        }
    }

    /// Renders and presents one frame of `scene`.
    ///
    /// Waits for the previous frame, applies pending resizes and settings, culls,
    /// prepares the lights, records every pass into one command buffer and submits it.
    /// Occlusion and visibility flags are written back into `scene`.
    pub fn render_frame(
        &mut self,
        scene: &mut Scene,
        assets: &SceneAssets,
    ) -> Result<FrameStats, RenderError> {
        if let Some(fence) = self.previous_fence.take() {
            self.device.wait_for_fence(fence)?;
        }
        self.apply_pending_resize();

        let settings = self.settings.clone();
        let device = Arc::clone(&self.device);
        let device = device.as_ref();

        self.resources.set_back_buffer(device.current_back_buffer());
        for resource in self.resources.ensure_shadow_maps(device, &settings)? {
            self.states.reset_to_home(resource);
        }

        // 1. Visibility
        let mut timer = Stopwatch::start();
        let occlusion = settings.occlusion_culling
            && device.supports_feature(DeviceFeature::OcclusionQueries);
        let occluded = read_back_occlusion(scene, device, occlusion);
        self.culler.set_partitions(settings.culling_threads);
        let visibility = self
            .culler
            .cull(scene, &assets.materials, settings.frustum_culling);
        apply_camera_visibility(scene, &visibility.camera);
        let batches = FrameBatches::build(&visibility, scene, &assets.meshes);
        let occlusion_draws = if occlusion {
            prepare_occlusion_queries(scene, device, &visibility.camera.deferred)
        } else {
            Vec::new()
        };
        let cpu_culling_ms = timer.lap_ms();

        // 2. Lights
        let lights =
            self.lights
                .prepare(device, scene, &settings, &mut self.resources, &mut self.states)?;

        // 3. Passes
        let (width, height) = self.size();
        let jitter = if settings.temporal_aa {
            taa_jitter(self.frame_index)
        } else {
            Vec2::ZERO
        };
        let camera = GpuCameraData::new(
            scene.camera(),
            jitter,
            self.previous_view_projection,
            width,
            height,
            self.frame_index,
        );
        self.states.verify_home()?;

        let inputs = FrameInputs {
            scene: &*scene,
            assets,
            settings: &settings,
            visibility: &visibility,
            batches: &batches,
            lights: &lights,
            occlusion_draws: &occlusion_draws,
            camera: &camera,
            frame_index: self.frame_index,
        };
        let (products, fence) = match self.record(device, &inputs) {
            Ok(recorded) => recorded,
            Err(e) => {
                log::error!("RenderAgent: frame {} failed: {e}", self.frame_index);
                self.states = ResourceStateTracker::new();
                self.states.sync(&self.resources);
                return Err(e);
            }
        };
        self.states.verify_home()?;
        let cpu_recording_ms = timer.lap_ms();

        self.previous_fence = Some(fence);
        self.previous_view_projection = Some(scene.camera().view_projection());

        let stats = FrameStats {
            frame_index: self.frame_index,
            visible_deferred: visibility.camera.deferred.len() as u32,
            visible_forward: visibility.camera.forward.len() as u32,
            occluded: occluded as u32,
            camera_batches: batches.camera_batch_count() as u32,
            shadow_batches: shadow_batch_count(&settings, &batches, &lights),
            point_lights: lights.point_light_count,
            shadow_point_lights: lights.shadow_point_light_count(),
            draw_calls: products.draw_calls,
            dispatches: products.dispatches,
            queries: products.queries,
            barriers: products.transitions,
            cpu_culling_ms,
            cpu_recording_ms,
        };
        self.stats.push(stats);
        self.frame_index += 1;

        if self.stats_log_interval > 0 && self.frame_index % self.stats_log_interval == 0 {
            log::debug!("RenderAgent: {}", self.stats.average());
        }
        Ok(stats)
    }

    fn record(
        &mut self,
        device: &dyn GraphicsDevice,
        inputs: &FrameInputs<'_>,
    ) -> Result<(FrameProducts, FenceValue), RenderError> {
        self.passes.prepare(&mut PrepareContext {
            device,
            inputs,
            resources: &mut self.resources,
            states: &mut self.states,
        })?;

        let mut encoder = device.create_command_encoder(Some("Frame"));
        let mut products = FrameProducts::default();
        self.passes.encode(&mut PassContext {
            device,
            encoder: encoder.as_mut(),
            resources: &self.resources,
            states: &mut self.states,
            inputs,
            products: &mut products,
        })?;
        let fence = device.submit(encoder.finish())?;
        Ok((products, fence))
    }

    /// Waits for the GPU, then destroys every pass and frame resource. Called by
    /// `Drop` if not called explicitly.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        log::info!("RenderAgent: Shutting down after {} frames", self.frame_index);
        let device = self.device.as_ref();
        if let Some(fence) = self.previous_fence.take() {
            if let Err(e) = device.wait_for_fence(fence) {
                log::warn!("RenderAgent: failed to wait for the last frame: {e}");
            }
        }
        self.passes.shutdown(device);
        self.resources.destroy_all(device);
        self.shut_down = true;
    }
}

impl Drop for RenderAgent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Batches recorded into shadow maps: the sun's list per cascade, plus the lists of
/// the shadow-casting point lights in the active mode.
fn shadow_batch_count(
    settings: &RendererSettings,
    batches: &FrameBatches,
    lights: &LightFrame,
) -> u32 {
    let mut count = batches.directional.len() * lights.cascade_count as usize;
    if settings.point_light_shadows_active() {
        for light in batches
            .point_lights
            .iter()
            .filter(|light| lights.shadow_casters.contains(&light.light))
        {
            count += match settings.point_light_shadow_mode {
                PointLightShadowMode::SinglePass => light.single_pass.len(),
                PointLightShadowMode::TwoPass => light.two_pass.iter().map(Vec::len).sum(),
                PointLightShadowMode::MultiPass => light.per_face.iter().map(Vec::len).sum(),
            };
        }
    }
    count as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_batches_off_without_shadows() {
        let settings = RendererSettings {
            shadows: false,
            ..Default::default()
        };
        let batches = FrameBatches::default();
        assert_eq!(shadow_batch_count(&settings, &batches, &LightFrame::default()), 0);
    }

    #[test]
    fn test_default_config() {
        let config = RenderAgentConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.stats_window, DEFAULT_STATS_WINDOW);
        assert!(config.settings.frustum_culling);
    }
}

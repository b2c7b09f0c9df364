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

//! Tiled deferred lighting.
//!
//! One compute dispatch assigns lights to screen tiles and shades the GBuffer
//! straight into the final target.

use super::draw::{compute_pipeline, destroy_compute_pipeline, initialized};
use super::{FramePass, FrameResource, FrameResources, PassContext, PassDeclaration};
use penumbra_core::renderer::{
    ComputePassDescriptor, ComputePipelineId, DebugView, GraphicsDevice, RenderError,
    RendererSettings, ResourceBinding, ResourceState, ShaderProgram, TileSize,
    TiledLightingConstants,
};
use std::borrow::Cow;

/// Screen tile edge, in pixels, of the light-culling dispatch.
pub const LIGHTING_TILE: TileSize = TileSize::X16;

/// No prefiltered sky cube is bound, so ambient lighting samples no mips.
const SKY_LIGHT_MIPS: u32 = 0;

const TEXTURE_INPUTS: [FrameResource; 10] = [
    FrameResource::GBufferAlbedo,
    FrameResource::GBufferNormal,
    FrameResource::GBufferMaterial,
    FrameResource::GBufferDepth,
    FrameResource::ReducedDepth0,
    FrameResource::ReducedDepth1,
    FrameResource::AmbientOcclusion,
    FrameResource::ShadowMask,
    FrameResource::CascadeIndex,
    FrameResource::PointLightShadowMaps,
];

const LIGHT_BUFFERS: [FrameResource; 4] = [
    FrameResource::PointLights,
    FrameResource::PointLightsPosRad,
    FrameResource::ShadowPointLights,
    FrameResource::ShadowPointLightsPosRad,
];

fn debug_view_index(view: DebugView) -> usize {
    match view {
        DebugView::Standard => 0,
        DebugView::TileHeatmap => 1,
        DebugView::CascadeOverlay => 2,
    }
}

/// Builds the root constants of one dispatch.
pub fn tiled_lighting_constants(
    settings: &RendererSettings,
    point_lights: u32,
    shadow_point_lights: u32,
    width: u32,
    height: u32,
) -> TiledLightingConstants {
    let (tiles_x, _) = LIGHTING_TILE.tile_dimensions(width, height);
    TiledLightingConstants {
        num_point_lights: point_lights,
        num_shadow_casting_point_lights: shadow_point_lights,
        num_sky_light_mips: SKY_LIGHT_MIPS,
        screen_width: width,
        screen_height: height,
        enable_point_light_shadows: settings.point_light_shadows_active() as u32,
        tiles_x,
        _padding: 0,
    }
}

/// Culls lights per tile and shades the deferred drawables.
#[derive(Debug, Default)]
pub struct TiledLightingPass {
    /// Standard, heatmap and cascade overlay, in [`DebugView`] order.
    pipelines: [Option<ComputePipelineId>; 3],
    dispatch: (u32, u32),
}

impl TiledLightingPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread groups dispatched per axis at the current output size.
    pub fn dispatch_size(&self) -> (u32, u32) {
        self.dispatch
    }
}

impl FramePass for TiledLightingPass {
    fn name(&self) -> &'static str {
        "TiledLighting"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::FinalTarget, ResourceState::UnorderedAccess)
            .uses_all(TEXTURE_INPUTS, ResourceState::NonPixelShaderResource)
            .uses_all(LIGHT_BUFFERS, ResourceState::NonPixelShaderResource)
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
        device: &dyn GraphicsDevice,
        resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("TiledLightingPass: Initializing GPU resources...");
        let variants = [
            ("TiledLighting", ShaderProgram::new("TiledLighting.cs")),
            (
                "TiledLightingHeatmap",
                ShaderProgram::new("TiledLighting.cs").with_define("TILE_HEATMAP"),
            ),
            (
                "TiledLightingCascadeOverlay",
                ShaderProgram::new("TiledLighting.cs").with_define("CASCADE_OVERLAY"),
            ),
        ];
        for (slot, (label, program)) in self.pipelines.iter_mut().zip(variants) {
            *slot = Some(compute_pipeline(device, label, program)?);
        }
        self.on_resize(resources.width(), resources.height());
        Ok(())
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        self.dispatch = LIGHTING_TILE.tile_dimensions(width, height);
        log::debug!(
            "TiledLightingPass: {}x{} tiles for {width}x{height}",
            self.dispatch.0,
            self.dispatch.1
        );
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let settings = ctx.inputs.settings;
        let pipeline = initialized(
            &self.pipelines[debug_view_index(settings.debug_view)],
            self.name(),
        )?;
        let constants = tiled_lighting_constants(
            settings,
            ctx.inputs.lights.point_light_count,
            ctx.inputs.lights.shadow_point_light_count(),
            ctx.resources.width(),
            ctx.resources.height(),
        );
        let target = ctx.texture(FrameResource::FinalTarget)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;
        let sun = ctx.buffer(FrameResource::DirectionalLightBuffer)?;
        let textures = TEXTURE_INPUTS
            .iter()
            .map(|&resource| ctx.texture(resource))
            .collect::<Result<Vec<_>, _>>()?;
        let buffers = LIGHT_BUFFERS
            .iter()
            .map(|&resource| ctx.buffer(resource))
            .collect::<Result<Vec<_>, _>>()?;
        let (x, y) = self.dispatch;

        {
            let mut pass = ctx.encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some(Cow::Borrowed("TiledLighting")),
            });
            pass.set_pipeline(pipeline);
            pass.set_constants(bytemuck::bytes_of(&constants));
            pass.set_binding(0, ResourceBinding::ConstantBuffer(camera));
            pass.set_binding(1, ResourceBinding::ConstantBuffer(sun));
            let mut slot = 2;
            for texture in textures {
                pass.set_binding(slot, ResourceBinding::Texture(texture));
                slot += 1;
            }
            for buffer in buffers {
                pass.set_binding(slot, ResourceBinding::Buffer(buffer));
                slot += 1;
            }
            pass.set_binding(slot, ResourceBinding::StorageTexture(target));
            pass.dispatch_workgroups(x, y, 1);
        }
        ctx.products.dispatches += 1;
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        for pipeline in self.pipelines.iter_mut().filter_map(Option::take) {
            destroy_compute_pipeline(device, "TiledLightingPass", pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_follows_resize() {
        let mut pass = TiledLightingPass::new();
        pass.on_resize(1920, 1080);
        assert_eq!(pass.dispatch_size(), (120, 68));
        pass.on_resize(1280, 720);
        assert_eq!(pass.dispatch_size(), (80, 45));
    }

    #[test]
    fn test_constants_follow_settings() {
        let mut settings = RendererSettings::default();
        settings.shadows = true;
        settings.point_light_shadows = true;
        let constants = tiled_lighting_constants(&settings, 5, 2, 1920, 1080);
        assert_eq!(constants.num_point_lights, 5);
        assert_eq!(constants.num_shadow_casting_point_lights, 2);
        assert_eq!(constants.enable_point_light_shadows, 1);
        assert_eq!(constants.tiles_x, 120);

        settings.shadows = false;
        let constants = tiled_lighting_constants(&settings, 5, 2, 1920, 1080);
        assert_eq!(constants.enable_point_light_shadows, 0);
    }
}

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

//! The back-buffer end of the frame: anti-aliasing, overlays and presentation.

use super::draw::{destroy_graphics_pipeline, initialized};
use super::{
    FrameInputs, FramePass, FrameResource, FrameResources, ObjectConstants, PassContext,
    PassDeclaration, CAMERA_SLOT,
};
use crate::visibility_lane::proxy_transform;
use penumbra_core::math::{Aabb, Vec3};
use penumbra_core::renderer::{
    ColorAttachment, CullMode, GraphicsDevice, GraphicsPipelineDescriptor,
    GraphicsPipelineId, RenderError, RenderPass, RenderPassDescriptor, RendererSettings,
    ResourceBinding, ResourceState, ShaderProgram, ShadingRate, TextureFormat, VertexStreams,
};
use std::borrow::Cow;

/// Format of the swapchain images.
pub const BACK_BUFFER_FORMAT: TextureFormat = TextureFormat::Bgra8Unorm;

const FULLSCREEN_TRIANGLE_VERTICES: u32 = 3;
const DEBUG_CUBE_VERTICES: u32 = 36;
const POINT_LIGHT_MARKER_EXTENT: f32 = 0.1;

/// Records user interface draws on top of the finished frame.
///
/// Errors are logged and the rest of the frame still presents.
pub trait UiOverlay: Send {
    /// Records draws into `pass`, which targets the back buffer.
    fn record(
        &mut self,
        pass: &mut dyn RenderPass<'_>,
        inputs: &FrameInputs<'_>,
    ) -> anyhow::Result<()>;
}

fn fullscreen_descriptor(label: &str, pixel: ShaderProgram) -> GraphicsPipelineDescriptor {
    GraphicsPipelineDescriptor {
        label: label.to_string(),
        vertex: ShaderProgram::new("Fullscreen.vs"),
        pixel: Some(pixel),
        vertex_streams: VertexStreams::empty(),
        color_formats: vec![BACK_BUFFER_FORMAT],
        depth: None,
        cull_mode: CullMode::None,
        color_writes: true,
    }
}

/// Root constants of the resolve to the back buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PostProcessConstants {
    /// One over the output size, in pixels.
    pub inverse_screen_size: [f32; 2],
    /// Padding to 16 bytes.
    pub _padding: [f32; 2],
}

/// Which resolve runs for the given settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcessMode {
    /// Plain copy.
    Blit,
    /// FXAA.
    Fxaa,
    /// FXAA with edge visualisation.
    FxaaDebug,
}

impl PostProcessMode {
    /// The resolve selected by `settings`.
    pub fn from_settings(settings: &RendererSettings) -> Self {
        match (settings.fxaa, settings.fxaa_debug) {
            (false, _) => Self::Blit,
            (true, false) => Self::Fxaa,
            (true, true) => Self::FxaaDebug,
        }
    }
}

/// Resolves scene color into the back buffer.
#[derive(Debug, Default)]
pub struct PostProcessPass {
    blit: Option<GraphicsPipelineId>,
    fxaa: Option<GraphicsPipelineId>,
    fxaa_debug: Option<GraphicsPipelineId>,
}

impl PostProcessPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FramePass for PostProcessPass {
    fn name(&self) -> &'static str {
        "PostProcess"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::FinalTarget, ResourceState::PixelShaderResource)
            .uses(FrameResource::BackBuffer, ResourceState::RenderTarget)
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("PostProcessPass: Initializing GPU resources...");
        self.blit = Some(device.create_graphics_pipeline(&fullscreen_descriptor(
            "Blit",
            ShaderProgram::new("Blit.ps"),
        ))?);
        self.fxaa = Some(device.create_graphics_pipeline(&fullscreen_descriptor(
            "Fxaa",
            ShaderProgram::new("Fxaa.ps"),
        ))?);
        self.fxaa_debug = Some(device.create_graphics_pipeline(&fullscreen_descriptor(
            "FxaaDebug",
            ShaderProgram::new("Fxaa.ps").with_define("FXAA_DEBUG"),
        ))?);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let pipeline = match PostProcessMode::from_settings(ctx.inputs.settings) {
            PostProcessMode::Blit => &self.blit,
            PostProcessMode::Fxaa => &self.fxaa,
            PostProcessMode::FxaaDebug => &self.fxaa_debug,
        };
        let pipeline = initialized(pipeline, self.name())?;
        let source = ctx.texture(FrameResource::FinalTarget)?;
        let back_buffer = ctx.texture(FrameResource::BackBuffer)?;
        let constants = PostProcessConstants {
            inverse_screen_size: [
                1.0 / ctx.resources.width().max(1) as f32,
                1.0 / ctx.resources.height().max(1) as f32,
            ],
            _padding: [0.0; 2],
        };

        {
            let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(Cow::Borrowed("PostProcess")),
                color_attachments: &[ColorAttachment::load(back_buffer)],
                depth_attachment: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_constants(bytemuck::bytes_of(&constants));
            pass.set_binding(0, ResourceBinding::Texture(source));
            pass.draw(0..FULLSCREEN_TRIANGLE_VERTICES, 0..1);
        }
        ctx.products.draw_calls += 1;
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        for pipeline in [self.blit.take(), self.fxaa.take(), self.fxaa_debug.take()]
            .into_iter()
            .flatten()
        {
            destroy_graphics_pipeline(device, "PostProcessPass", pipeline);
        }
    }
}

/// View index of debug bounding boxes.
const DEBUG_BOUNDS: u32 = 0;
/// View index of point-light markers.
const DEBUG_LIGHT: u32 = 1;

/// Debug shapes for the camera-visible drawables and the point lights.
fn debug_shapes(inputs: &FrameInputs<'_>) -> Vec<ObjectConstants> {
    let settings = inputs.settings;
    let mut shapes = Vec::new();
    if settings.draw_aabbs {
        let visible = &inputs.visibility.camera;
        for handle in visible.deferred.iter().chain(&visible.forward) {
            if let Some(drawable) = inputs.scene.drawable(*handle) {
                shapes.push(ObjectConstants::new(
                    &proxy_transform(drawable.world_bounds()),
                    DEBUG_BOUNDS,
                ));
            }
        }
    }
    if settings.draw_point_lights {
        let extent = Vec3::splat(POINT_LIGHT_MARKER_EXTENT);
        for (_, light) in inputs.scene.point_lights() {
            let marker = Aabb::from_center_half_extents(light.position(), extent);
            shapes.push(ObjectConstants::new(&proxy_transform(&marker), DEBUG_LIGHT));
        }
    }
    shapes
}

/// Draws debug shapes and the user interface over the back buffer.
#[derive(Default)]
pub struct UiPass {
    overlay: Option<Box<dyn UiOverlay>>,
    debug_pipeline: Option<GraphicsPipelineId>,
}

impl std::fmt::Debug for UiPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiPass")
            .field("overlay", &self.overlay.is_some())
            .field("debug_pipeline", &self.debug_pipeline)
            .finish()
    }
}

impl UiPass {
    /// Creates the pass, optionally with an overlay.
    pub fn new(overlay: Option<Box<dyn UiOverlay>>) -> Self {
        Self {
            overlay,
            debug_pipeline: None,
        }
    }
}

impl FramePass for UiPass {
    fn name(&self) -> &'static str {
        "Ui"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new()
            .uses(FrameResource::BackBuffer, ResourceState::RenderTarget)
            .uses(FrameResource::CameraBuffer, ResourceState::ConstantBuffer)
    }

    fn on_initialize(
        &mut self,
        device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        log::info!("UiPass: Initializing GPU resources...");
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDescriptor {
            label: "DebugShapes".to_string(),
            vertex: ShaderProgram::new("DebugShape.vs"),
            pixel: Some(ShaderProgram::new("DebugShape.ps")),
            vertex_streams: VertexStreams::empty(),
            color_formats: vec![BACK_BUFFER_FORMAT],
            depth: None,
            cull_mode: CullMode::None,
            color_writes: true,
        })?;
        self.debug_pipeline = Some(pipeline);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let inputs = ctx.inputs;
        let shapes = debug_shapes(inputs);
        if shapes.is_empty() && self.overlay.is_none() {
            return Ok(());
        }
        let debug_pipeline = initialized(&self.debug_pipeline, self.name())?;
        let back_buffer = ctx.texture(FrameResource::BackBuffer)?;
        let camera = ctx.buffer(FrameResource::CameraBuffer)?;

        ctx.encoder.set_shading_rate(ShadingRate::Rate1x1);
        let mut pass = ctx.encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some(Cow::Borrowed("Ui")),
            color_attachments: &[ColorAttachment::load(back_buffer)],
            depth_attachment: None,
        });
        if !shapes.is_empty() {
            pass.set_pipeline(debug_pipeline);
            pass.set_binding(CAMERA_SLOT, ResourceBinding::ConstantBuffer(camera));
            for shape in &shapes {
                pass.set_constants(bytemuck::bytes_of(shape));
                pass.draw(0..DEBUG_CUBE_VERTICES, 0..1);
            }
        }
        if let Some(overlay) = self.overlay.as_mut() {
            if let Err(e) = overlay.record(pass.as_mut(), inputs) {
                log::error!("UiPass: overlay failed: {e:#}");
            }
        }
        drop(pass);

        ctx.products.draw_calls += shapes.len() as u32;
        Ok(())
    }

    fn on_shutdown(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipeline) = self.debug_pipeline.take() {
            destroy_graphics_pipeline(device, "UiPass", pipeline);
        }
    }
}

/// Hands the back buffer to the swapchain.
#[derive(Debug, Default)]
pub struct PresentPass;

impl PresentPass {
    /// Creates the pass.
    pub fn new() -> Self {
        Self
    }
}

impl FramePass for PresentPass {
    fn name(&self) -> &'static str {
        "Present"
    }

    fn declaration(&self) -> PassDeclaration {
        PassDeclaration::new().uses(FrameResource::BackBuffer, ResourceState::Present)
    }

    fn on_initialize(
        &mut self,
        _device: &dyn GraphicsDevice,
        _resources: &FrameResources,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext<'_>) -> Result<(), RenderError> {
        let back_buffer = ctx.texture(FrameResource::BackBuffer)?;
        ctx.encoder.present(back_buffer, ctx.inputs.settings.vsync);
        Ok(())
    }
}

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

//! Global settings for the renderer, snapshotted once per frame.

use crate::math::clamp_to_nearest_power_of_two;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest allowed cascaded shadow map resolution.
pub const MIN_CASCADE_SIZE: u32 = 256;
/// Largest allowed cascaded shadow map resolution.
pub const MAX_CASCADE_SIZE: u32 = 8192;
/// Smallest allowed point-light shadow face resolution.
pub const MIN_POINT_LIGHT_SHADOW_SIZE: u32 = 64;
/// Largest allowed point-light shadow face resolution.
pub const MAX_POINT_LIGHT_SHADOW_SIZE: u32 = 4096;
/// Maximum number of shadow cascades.
pub const MAX_CASCADES: u32 = 4;

/// How point-light shadow cube maps are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PointLightShadowMode {
    /// All six faces in one pass, routed to faces by the shader.
    #[default]
    SinglePass,
    /// Two passes of three faces each.
    TwoPass,
    /// One pass per face.
    MultiPass,
}

/// Which tiled-lighting pipeline writes the final image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DebugView {
    /// Regular shading.
    #[default]
    Standard,
    /// Number of lights per tile as a heatmap.
    TileHeatmap,
    /// Cascade index per pixel.
    CascadeOverlay,
}

/// A collection of toggles and sizes that affect the rendering process.
///
/// Unknown fields are rejected and missing fields fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererSettings {
    /// Screen-space ambient occlusion.
    pub ssao: bool,
    /// FXAA on the final blit. When off the scene is blitted unfiltered.
    pub fxaa: bool,
    /// Shows FXAA edge detection instead of the filtered image.
    pub fxaa_debug: bool,
    /// Temporal anti-aliasing, including projection jitter.
    pub temporal_aa: bool,
    /// Variable-rate shading image generation.
    pub vrs: bool,
    /// Depth pre-pass. When off the depth buffer is cleared instead.
    pub pre_pass: bool,
    /// GBuffer geometry pass.
    pub base_pass: bool,
    /// Master shadow switch.
    pub shadows: bool,
    /// Directional shadow-mask generation.
    pub shadow_mask: bool,
    /// Point-light cube shadows.
    pub point_light_shadows: bool,
    /// Directional (sun) cascaded shadows.
    pub sun_shadows: bool,
    /// Compute cascade splits and matrices on the GPU from the reduced depth range.
    pub gpu_cascades: bool,
    /// Min/max depth reduction.
    pub depth_reduction: bool,
    /// Skybox pass.
    pub skybox: bool,
    /// Camera frustum culling. When off every drawable is camera-visible.
    pub frustum_culling: bool,
    /// GPU occlusion culling.
    pub occlusion_culling: bool,
    /// Draws a marker for every point light in the overlay.
    pub draw_point_lights: bool,
    /// Draws the world AABB of every camera-visible drawable in the overlay.
    pub draw_aabbs: bool,
    /// Waits for vertical sync on present.
    pub vsync: bool,
    /// Requested cascade shadow map size. See [`RendererSettings::clamped_cascade_size`].
    pub cascade_size: u32,
    /// Requested point-light shadow face size.
    pub point_light_shadow_size: u32,
    /// Number of directional shadow cascades, `1..=MAX_CASCADES`.
    pub cascade_count: u32,
    /// Upper bound on shadow-casting point lights per frame.
    pub max_point_light_shadows: u32,
    /// Rasterization strategy for point-light shadows.
    pub point_light_shadow_mode: PointLightShadowMode,
    /// Tiled-lighting debug variant.
    pub debug_view: DebugView,
    /// Worker partitions for culling. `0` uses the thread pool width.
    pub culling_threads: usize,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            ssao: true,
            fxaa: true,
            fxaa_debug: false,
            temporal_aa: true,
            vrs: false,
            pre_pass: true,
            base_pass: true,
            shadows: true,
            shadow_mask: true,
            point_light_shadows: true,
            sun_shadows: true,
            gpu_cascades: true,
            depth_reduction: true,
            skybox: true,
            frustum_culling: true,
            occlusion_culling: true,
            draw_point_lights: false,
            draw_aabbs: false,
            vsync: true,
            cascade_size: 2048,
            point_light_shadow_size: 512,
            cascade_count: MAX_CASCADES,
            max_point_light_shadows: 8,
            point_light_shadow_mode: PointLightShadowMode::SinglePass,
            debug_view: DebugView::Standard,
            culling_threads: 0,
        }
    }
}

/// Failure to parse a settings document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsError(pub String);

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid renderer settings: {}", self.0)
    }
}

impl std::error::Error for SettingsError {}

impl RendererSettings {
    /// Parses settings from a RON document. Missing fields take their default value.
    pub fn from_ron_str(source: &str) -> Result<Self, SettingsError> {
        let settings: Self = ron::from_str(source).map_err(|e| {
            log::warn!("RendererSettings: rejected document: {e}");
            SettingsError(e.to_string())
        })?;
        log::debug!("RendererSettings: loaded {settings:?}");
        Ok(settings)
    }

    /// The cascade shadow map size, clamped and rounded to the nearest power of two.
    pub fn clamped_cascade_size(&self) -> u32 {
        clamp_to_nearest_power_of_two(self.cascade_size, MIN_CASCADE_SIZE, MAX_CASCADE_SIZE)
    }

    /// The point-light shadow face size, clamped and rounded to the nearest power of two.
    pub fn clamped_point_light_shadow_size(&self) -> u32 {
        clamp_to_nearest_power_of_two(
            self.point_light_shadow_size,
            MIN_POINT_LIGHT_SHADOW_SIZE,
            MAX_POINT_LIGHT_SHADOW_SIZE,
        )
    }

    /// The cascade count clamped to `1..=MAX_CASCADES`.
    pub fn clamped_cascade_count(&self) -> u32 {
        self.cascade_count.clamp(1, MAX_CASCADES)
    }

    /// Whether point-light shadow maps are rendered this frame.
    pub fn point_light_shadows_active(&self) -> bool {
        self.shadows && self.point_light_shadows
    }

    /// Whether cascaded sun shadows are rendered this frame.
    pub fn sun_shadows_active(&self) -> bool {
        self.shadows && self.sun_shadows
    }
}

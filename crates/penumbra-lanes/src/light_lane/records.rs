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

//! GPU layouts of the light records.

use penumbra_core::renderer::MAX_CASCADES;
use penumbra_data::light::POINT_LIGHT_FACE_COUNT;

/// Color of a point light that casts no shadow.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuPointLightData {
    /// Color times intensity.
    pub color: [f32; 3],
    /// Padding for 16-byte alignment.
    pub _padding: f32,
}

/// Position and influence radius of a point light.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuPointLightPosRad {
    /// World-space position.
    pub position: [f32; 3],
    /// Influence radius.
    pub radius: f32,
}

/// A shadow-casting point light, including the six face matrices its cube is
/// rendered with.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuShadowPointLightData {
    /// Color times intensity.
    pub color: [f32; 3],
    /// Far plane of the shadow faces.
    pub far_plane: f32,
    /// Constant depth bias.
    pub shadow_bias: f32,
    /// Upper bound of the slope-scaled bias.
    pub max_shadow_bias: f32,
    /// Padding for 16-byte alignment.
    pub _padding: [f32; 2],
    /// Face view-projections in cube order.
    pub view_projections: [[[f32; 4]; 4]; POINT_LIGHT_FACE_COUNT],
}

/// The sun.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDirectionalLight {
    /// Unit direction the light travels in.
    pub direction: [f32; 3],
    /// Cascade lookup bias.
    pub shadow_bias: f32,
    /// Color times intensity.
    pub color: [f32; 3],
    /// Split-scheme blend, 1 is fully logarithmic.
    pub cascade_split_lambda: f32,
    /// Up vector of the light views.
    pub up: [f32; 3],
    /// `1` when a sun exists.
    pub enabled: u32,
}

/// Per-frame inputs of the GPU cascade-matrix pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCascadeInputs {
    /// Unjittered camera projection.
    pub projection: [[f32; 4]; 4],
    /// Unit light direction.
    pub light_direction: [f32; 3],
    /// Index of the last cascade.
    pub max_cascade_index: u32,
    /// `1` to fit the splits to the reduced depth range.
    pub use_reduced_depth: u32,
    /// Camera near plane.
    pub near: f32,
    /// Camera far plane.
    pub far: f32,
    /// Edge of a cascade layer in texels.
    pub shadow_map_size: f32,
}

/// Cascade view-projections, written by the cascade-matrix pass or uploaded from
/// the CPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCascadeMatrices {
    /// One matrix per cascade; unused entries are identity.
    pub view_projections: [[[f32; 4]; 4]; MAX_CASCADES as usize],
}

/// Far split distance of each cascade, in view-space units.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCascadeSplits {
    /// Split distances; unused entries repeat the last split.
    pub splits: [f32; MAX_CASCADES as usize],
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_record_sizes() {
        assert_eq!(size_of::<GpuPointLightData>(), 16);
        assert_eq!(size_of::<GpuPointLightPosRad>(), 16);
        assert_eq!(size_of::<GpuShadowPointLightData>(), 416);
        assert_eq!(size_of::<GpuDirectionalLight>(), 48);
        assert_eq!(size_of::<GpuCascadeInputs>(), 96);
        assert_eq!(size_of::<GpuCascadeMatrices>(), 256);
        assert_eq!(size_of::<GpuCascadeSplits>(), 16);
    }
}

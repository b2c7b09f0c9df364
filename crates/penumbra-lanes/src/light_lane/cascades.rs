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

//! CPU cascade fitting for the sun, used when the GPU cascade pass is off.
//!
//! Each cascade covers one slice of the camera frustum. The slice is enclosed in a
//! bounding sphere so the projection does not change size as the camera rotates,
//! and the projection is snapped to the shadow map's texel grid so it does not
//! shimmer as the camera moves.

use super::{GpuCascadeMatrices, GpuCascadeSplits};
use penumbra_core::math::{Mat4, Vec3, Vec4};
use penumbra_core::renderer::MAX_CASCADES;
use penumbra_data::{Camera, DirectionalLight};

/// Depth added behind each cascade sphere so off-screen casters still land in the
/// map.
pub const CASCADE_CASTER_PADDING: f32 = 50.0;

/// One fitted cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cascade {
    /// View-space distance where the slice starts.
    pub near_split: f32,
    /// View-space distance where the slice ends.
    pub far_split: f32,
    /// World-space center of the enclosing sphere.
    pub center: Vec3,
    /// Radius of the enclosing sphere.
    pub radius: f32,
    /// Light view-projection covering the sphere.
    pub view_projection: Mat4,
}

/// The cascades of a frame, nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeSet {
    /// Fitted cascades.
    pub cascades: Vec<Cascade>,
}

impl CascadeSet {
    /// The matrices in their GPU layout.
    pub fn gpu_matrices(&self) -> GpuCascadeMatrices {
        let mut record = GpuCascadeMatrices {
            view_projections: [Mat4::IDENTITY.to_cols_array_2d(); MAX_CASCADES as usize],
        };
        for (slot, cascade) in record.view_projections.iter_mut().zip(&self.cascades) {
            *slot = cascade.view_projection.to_cols_array_2d();
        }
        record
    }

    /// The split distances in their GPU layout.
    pub fn gpu_splits(&self) -> GpuCascadeSplits {
        let last = self.cascades.last().map_or(0.0, |c| c.far_split);
        let mut splits = [last; MAX_CASCADES as usize];
        for (slot, cascade) in splits.iter_mut().zip(&self.cascades) {
            *slot = cascade.far_split;
        }
        GpuCascadeSplits { splits }
    }
}

/// Far distance of each of `count` slices between `near` and `far`.
///
/// `split_i = lambda * near * (far / near)^(i / n) + (1 - lambda) * (near + (far - near) * i / n)`
pub fn practical_splits(near: f32, far: f32, count: u32, lambda: f32) -> Vec<f32> {
    let n = count.max(1) as f32;
    let lambda = lambda.clamp(0.0, 1.0);
    (1..=count.max(1))
        .map(|i| {
            let p = i as f32 / n;
            let log = near * (far / near).powf(p);
            let uniform = near + (far - near) * p;
            lambda * log + (1.0 - lambda) * uniform
        })
        .collect()
}

/// World-space corners of the camera frustum between two view distances.
fn slice_corners(camera: &Camera, camera_to_world: &Mat4, near: f32, far: f32) -> [Vec3; 8] {
    let tan_y = (camera.fov_y * 0.5).tan();
    let tan_x = tan_y * camera.aspect_ratio;
    let mut corners = [Vec3::ZERO; 8];
    let mut i = 0;
    for depth in [near, far] {
        for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            let view = Vec4::new(sx * tan_x * depth, sy * tan_y * depth, -depth, 1.0);
            corners[i] = (*camera_to_world * view).truncate();
            i += 1;
        }
    }
    corners
}

/// Fits `count` cascades of `light` to `camera`.
///
/// # Arguments
///
/// * `shadow_map_size` - Edge of a cascade layer in texels, used for snapping.
pub fn fit_cascades(
    camera: &Camera,
    light: &DirectionalLight,
    count: u32,
    shadow_map_size: u32,
) -> CascadeSet {
    let count = count.clamp(1, MAX_CASCADES);
    let splits = practical_splits(camera.near, camera.far, count, light.cascade_split_lambda);
    // A camera view is a rigid transform, so it always inverts.
    let camera_to_world = camera.view.inverse().unwrap_or(Mat4::IDENTITY);
    let direction = light.normalized_direction();
    let up = light.up();
    let texels = shadow_map_size.max(1) as f32 * 0.5;

    let mut near_split = camera.near;
    let cascades = splits
        .into_iter()
        .map(|far_split| {
            let corners = slice_corners(camera, &camera_to_world, near_split, far_split);
            let center = corners.iter().fold(Vec3::ZERO, |acc, c| acc + *c) / 8.0;
            let radius = corners
                .iter()
                .map(|c| c.distance_squared(center))
                .fold(0.0f32, f32::max)
                .sqrt();
            let radius = (radius * 16.0).ceil() / 16.0;

            let eye = center - direction * (radius + CASCADE_CASTER_PADDING);
            let view = Mat4::look_at_rh(eye, center, up).unwrap_or(Mat4::IDENTITY);
            let mut projection = Mat4::orthographic_rh_zo(
                -radius,
                radius,
                -radius,
                radius,
                0.0,
                2.0 * radius + CASCADE_CASTER_PADDING,
            );

            // Snap the world origin to a texel corner.
            let origin = (projection * view) * Vec4::new(0.0, 0.0, 0.0, 1.0);
            let (x, y) = (origin.x * texels, origin.y * texels);
            projection.cols[3].x += (x.round() - x) / texels;
            projection.cols[3].y += (y.round() - y) / texels;

            let cascade = Cascade {
                near_split,
                far_split,
                center,
                radius,
                view_projection: projection * view,
            };
            near_split = far_split;
            cascade
        })
        .collect();

    CascadeSet { cascades }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use penumbra_core::math::FRAC_PI_2;

    fn camera() -> Camera {
        Camera::look_at(
            Vec3::new(3.0, 2.0, 10.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::Y,
            FRAC_PI_2,
            16.0 / 9.0,
            0.5,
            100.0,
        )
        .expect("valid camera")
    }

    #[test]
    fn test_uniform_and_logarithmic_splits() {
        let uniform = practical_splits(1.0, 101.0, 4, 0.0);
        for (split, expected) in uniform.iter().zip([26.0, 51.0, 76.0, 101.0]) {
            assert_relative_eq!(*split, expected, epsilon = 1e-4);
        }
        let log = practical_splits(1.0, 16.0, 4, 1.0);
        for (split, expected) in log.iter().zip([2.0, 4.0, 8.0, 16.0]) {
            assert_relative_eq!(*split, expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_cascades_cover_their_slices() {
        let camera = camera();
        let sun = DirectionalLight::default();
        let set = fit_cascades(&camera, &sun, 4, 2048);
        assert_eq!(set.cascades.len(), 4);
        assert_relative_eq!(set.cascades[0].near_split, camera.near);
        assert_relative_eq!(set.cascades[3].far_split, camera.far, epsilon = 1e-3);

        let camera_to_world = camera.view.inverse().expect("invertible view");
        for cascade in &set.cascades {
            let (near, far) = (cascade.near_split, cascade.far_split);
            for corner in slice_corners(&camera, &camera_to_world, near, far) {
                let clip = cascade.view_projection * Vec4::from_vec3(corner, 1.0);
                // Snapping moves the projection by at most one texel.
                let slack = 1.0 + 2.0 / 2048.0;
                assert!(clip.x.abs() <= slack && clip.y.abs() <= slack, "{clip:?}");
                assert!(clip.z >= 0.0 && clip.z <= 1.0, "{clip:?}");
            }
        }
    }

    #[test]
    fn test_origin_is_texel_aligned() {
        let set = fit_cascades(&camera(), &DirectionalLight::default(), 2, 1024);
        for cascade in &set.cascades {
            let origin = cascade.view_projection * Vec4::new(0.0, 0.0, 0.0, 1.0);
            let x = origin.x * 512.0;
            assert!((x - x.round()).abs() < 1e-2, "{x}");
        }
    }

    #[test]
    fn test_gpu_layout_pads_unused_cascades() {
        let set = fit_cascades(&camera(), &DirectionalLight::default(), 2, 1024);
        let splits = set.gpu_splits();
        assert_relative_eq!(splits.splits[1], splits.splits[3]);
        let matrices = set.gpu_matrices();
        assert_eq!(matrices.view_projections[3], Mat4::IDENTITY.to_cols_array_2d());
    }
}

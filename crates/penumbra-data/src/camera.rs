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

//! The active view.

use penumbra_core::math::{Frustum, Mat4, Vec2, Vec3};

/// Length of the temporal-AA jitter sequence.
pub const TAA_JITTER_SAMPLES: u64 = 8;

/// A perspective camera.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// World-space position.
    pub position: Vec3,
    /// World to view transform.
    pub view: Mat4,
    /// View to clip transform, without jitter.
    pub projection: Mat4,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width over height.
    pub aspect_ratio: f32,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::ZERO,
            Vec3::Y,
            std::f32::consts::FRAC_PI_3,
            16.0 / 9.0,
            0.1,
            500.0,
        )
        .unwrap_or_else(|| {
            Self::from_parts(Vec3::ZERO, Mat4::IDENTITY, 1.0, 16.0 / 9.0, 0.1, 500.0)
        })
    }
}

impl Camera {
    /// Creates a camera at `eye` looking at `target`.
    ///
    /// # Returns
    ///
    /// `None` if the view matrix is degenerate (see [`Mat4::look_at_rh`]).
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect_ratio: f32,
        near: f32,
        far: f32,
    ) -> Option<Self> {
        let view = Mat4::look_at_rh(eye, target, up)?;
        Some(Self::from_parts(eye, view, fov_y, aspect_ratio, near, far))
    }

    fn from_parts(
        position: Vec3,
        view: Mat4,
        fov_y: f32,
        aspect_ratio: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            view,
            projection: Mat4::perspective_rh_zo(fov_y, aspect_ratio, near, far),
            fov_y,
            aspect_ratio,
            near,
            far,
        }
    }

    /// Re-aims the camera. Keeps the previous view if the new one is degenerate.
    pub fn set_look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) -> bool {
        match Mat4::look_at_rh(eye, target, up) {
            Some(view) => {
                self.position = eye;
                self.view = view;
                true
            }
            None => false,
        }
    }

    /// Updates the aspect ratio after a resize.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.projection = Mat4::perspective_rh_zo(self.fov_y, aspect_ratio, self.near, self.far);
    }

    /// `projection * view`.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// The culling volume of the camera.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// The projection offset by a sub-pixel `jitter` (in pixels) for a target of
    /// `width` by `height`.
    pub fn jittered_projection(&self, jitter: Vec2, width: u32, height: u32) -> Mat4 {
        let mut projection = self.projection;
        projection.cols[2].x += jitter.x * 2.0 / width.max(1) as f32;
        projection.cols[2].y += jitter.y * 2.0 / height.max(1) as f32;
        projection
    }
}

/// Element `index` of the Halton low-discrepancy sequence in `base`.
pub fn halton(mut index: u64, base: u64) -> f32 {
    let mut fraction = 1.0f32;
    let mut result = 0.0f32;
    while index > 0 {
        fraction /= base as f32;
        result += fraction * (index % base) as f32;
        index /= base;
    }
    result
}

/// Sub-pixel offset in `[-0.5, 0.5)` for `frame_index`, cycling every
/// [`TAA_JITTER_SAMPLES`] frames.
pub fn taa_jitter(frame_index: u64) -> Vec2 {
    let sample = frame_index % TAA_JITTER_SAMPLES + 1;
    Vec2::new(halton(sample, 2) - 0.5, halton(sample, 3) - 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_halton_sequence() {
        assert_relative_eq!(halton(1, 2), 0.5);
        assert_relative_eq!(halton(2, 2), 0.25);
        assert_relative_eq!(halton(3, 2), 0.75);
        assert_relative_eq!(halton(1, 3), 1.0 / 3.0);
        assert_relative_eq!(halton(2, 3), 2.0 / 3.0);
    }

    #[test]
    fn test_jitter_cycles() {
        assert_eq!(taa_jitter(0), taa_jitter(TAA_JITTER_SAMPLES));
        let j = taa_jitter(3);
        assert!(j.x >= -0.5 && j.x < 0.5);
        assert!(j.y >= -0.5 && j.y < 0.5);
    }

    #[test]
    fn test_jitter_only_moves_the_third_column() {
        let camera = Camera::default();
        let jittered = camera.jittered_projection(Vec2::new(0.5, -0.5), 100, 50);
        assert_relative_eq!(jittered.cols[2].x - camera.projection.cols[2].x, 0.01);
        assert_relative_eq!(jittered.cols[2].y - camera.projection.cols[2].y, -0.02);
        assert_eq!(jittered.cols[0], camera.projection.cols[0]);
    }

    #[test]
    fn test_degenerate_look_at_keeps_view() {
        let mut camera = Camera::default();
        let before = camera.view;
        assert!(!camera.set_look_at(Vec3::ZERO, Vec3::ZERO, Vec3::Y));
        assert_eq!(camera.view, before);
    }
}
